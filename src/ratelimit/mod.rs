//! Sliding window admission: counter records, their pool and manager, and
//! the limiter that ties them together.

mod identity;
mod limiter;
mod manager;
mod pool;
mod record;
mod rules;

pub use identity::{Caller, IdentityConfig, IdentitySource, Redacted, REDACTED};
pub use limiter::{Decision, Metadata, Outcome, RateLimiter, DEFAULT_MAX, DEFAULT_WINDOW_SECS};
pub use manager::RecordManager;
pub use pool::{PooledRecord, RecordPool};
pub use record::{CodecError, CounterRecord, ENCODED_LEN, RECORD_VERSION};
pub use rules::{FnLimits, LimitResolver, LimitRule, LimitRules};
