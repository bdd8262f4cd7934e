//! Counter record and its wire encoding.

use thiserror::Error;

/// Current wire format version.
pub const RECORD_VERSION: u8 = 1;

/// Encoded size: version + current + previous + expiry.
pub const ENCODED_LEN: usize = 1 + 8 + 8 + 4;

/// Per-identity sliding window state.
///
/// `expiry == 0` marks a fresh record that has never been committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterRecord {
    /// Admissions counted in the active window
    pub current_hits: u64,
    /// Admissions counted in the window immediately before
    pub previous_hits: u64,
    /// When the active window ends (unix seconds)
    pub expiry: u32,
}

/// Errors decoding a stored record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("expected {expected} bytes, got {len}", expected = ENCODED_LEN)]
    Truncated { len: usize },
    #[error("unsupported record version {0}")]
    UnsupportedVersion(u8),
}

impl CounterRecord {
    /// True for a record that has not been stored yet.
    pub fn is_new(&self) -> bool {
        self.expiry == 0
    }

    pub fn reset(&mut self) {
        *self = CounterRecord::default();
    }

    /// Encode as `[version][current:u64 be][previous:u64 be][expiry:u32 be]`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ENCODED_LEN);
        buf.push(RECORD_VERSION);
        buf.extend_from_slice(&self.current_hits.to_be_bytes());
        buf.extend_from_slice(&self.previous_hits.to_be_bytes());
        buf.extend_from_slice(&self.expiry.to_be_bytes());
        buf
    }

    /// Decode into `self`, overwriting every field.
    pub fn decode_into(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        if bytes.len() != ENCODED_LEN {
            return Err(CodecError::Truncated { len: bytes.len() });
        }
        if bytes[0] != RECORD_VERSION {
            return Err(CodecError::UnsupportedVersion(bytes[0]));
        }

        let mut u64_buf = [0u8; 8];
        u64_buf.copy_from_slice(&bytes[1..9]);
        self.current_hits = u64::from_be_bytes(u64_buf);
        u64_buf.copy_from_slice(&bytes[9..17]);
        self.previous_hits = u64::from_be_bytes(u64_buf);

        let mut u32_buf = [0u8; 4];
        u32_buf.copy_from_slice(&bytes[17..21]);
        self.expiry = u32::from_be_bytes(u32_buf);

        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut record = CounterRecord::default();
        record.decode_into(bytes)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_preserves_fields() {
        let cases = [
            CounterRecord::default(),
            CounterRecord {
                current_hits: 3,
                previous_hits: 7,
                expiry: 1_704_067_200,
            },
            CounterRecord {
                current_hits: u64::MAX,
                previous_hits: u64::MAX - 1,
                expiry: u32::MAX,
            },
        ];

        for record in cases {
            let bytes = record.encode();
            assert_eq!(bytes.len(), ENCODED_LEN);
            assert_eq!(CounterRecord::decode(&bytes).unwrap(), record);
        }
    }

    #[test]
    fn test_encoding_layout() {
        let record = CounterRecord {
            current_hits: 1,
            previous_hits: 2,
            expiry: 3,
        };
        let bytes = record.encode();
        assert_eq!(bytes[0], RECORD_VERSION);
        assert_eq!(bytes[8], 1);
        assert_eq!(bytes[16], 2);
        assert_eq!(bytes[20], 3);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert_eq!(
            CounterRecord::decode(&[RECORD_VERSION, 0, 0]),
            Err(CodecError::Truncated { len: 3 })
        );

        let mut bytes = CounterRecord::default().encode();
        bytes.push(0);
        assert_eq!(
            CounterRecord::decode(&bytes),
            Err(CodecError::Truncated { len: ENCODED_LEN + 1 })
        );

        let mut bytes = CounterRecord::default().encode();
        bytes[0] = 9;
        assert_eq!(
            CounterRecord::decode(&bytes),
            Err(CodecError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn test_reset_and_is_new() {
        let mut record = CounterRecord {
            current_hits: 4,
            previous_hits: 2,
            expiry: 99,
        };
        assert!(!record.is_new());
        record.reset();
        assert!(record.is_new());
        assert_eq!(record, CounterRecord::default());
    }
}
