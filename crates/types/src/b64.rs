//! Base64 conversion used at the API edges. Everything inside the mediator
//! works on raw bytes; only requests, responses, and log output go through
//! these helpers.

use base64::{engine::general_purpose, Engine as _};

pub fn encode(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

pub fn decode(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::STANDARD.decode(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let data = b"confidential bytes";
        assert_eq!(decode(&encode(data)).unwrap(), data);
    }

    #[test]
    fn empty_input() {
        assert_eq!(encode(&[]), "");
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
    }
}
