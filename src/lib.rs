//! Slidegate - Sliding Window Rate Limiting Engine
//!
//! This crate decides, per identified caller, whether a unit of work may
//! proceed. It keeps two counters per identity (current and previous
//! window) in a pluggable store and blends them into a sliding estimate.
//! Stores can live in process memory or be shared between nodes over a
//! gossip mesh.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod storage;
