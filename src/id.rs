//! Random document identifiers

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of generated `_id` values
pub const ID_LENGTH: usize = 16;

/// Random alphanumeric string of the given length
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Fresh `_id`. Callers retry on collision against the `_id` index.
pub fn new_id() -> String {
    random_string(ID_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_shape() {
        let id = new_id();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(new_id(), new_id());
    }
}
