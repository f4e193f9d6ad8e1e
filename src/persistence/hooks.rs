//! Serialization hooks
//!
//! A hook pair transforms each log line on its way to and from disk, for
//! example to encrypt it. Both directions live on one trait object so a store
//! can never be given only one half.

use std::fmt;

use super::errors::{PersistenceError, PersistenceResult};
use crate::id::random_string;

/// Transforms log lines on write and read
pub trait SerializationHook: Send + Sync {
    /// Applied to every line before it is written
    fn after_serialization(&self, line: String) -> String;

    /// Applied to every line read back, before decoding
    fn before_deserialization(&self, line: String) -> String;
}

impl fmt::Debug for dyn SerializationHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerializationHook")
    }
}

/// Checks that `before_deserialization` undoes `after_serialization` on
/// random strings of every length up to 29.
pub fn verify_hook(hook: &dyn SerializationHook) -> PersistenceResult<()> {
    for len in 1..30 {
        for _ in 0..10 {
            let sample = random_string(len);
            let round_trip = hook.before_deserialization(hook.after_serialization(sample.clone()));
            if round_trip != sample {
                return Err(PersistenceError::hook_mismatch());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Reverse;

    impl SerializationHook for Reverse {
        fn after_serialization(&self, line: String) -> String {
            line.chars().rev().collect()
        }

        fn before_deserialization(&self, line: String) -> String {
            line.chars().rev().collect()
        }
    }

    struct Lossy;

    impl SerializationHook for Lossy {
        fn after_serialization(&self, line: String) -> String {
            format!("{}!", line)
        }

        fn before_deserialization(&self, line: String) -> String {
            line
        }
    }

    #[test]
    fn test_inverse_hooks_pass() {
        verify_hook(&Reverse).unwrap();
    }

    #[test]
    fn test_non_inverse_hooks_fail() {
        let err = verify_hook(&Lossy).unwrap_err();
        assert_eq!(err.code().code(), "TIDE_INVALID_ARGUMENT");
    }
}
