use crate::domain::types::PuzzleHash;

/// Human-readable encoding of a producer puzzle hash. Derived, never
/// authoritative; the raw hash is stored alongside it.
pub fn encode_producer_address(prefix: &str, hash: &PuzzleHash) -> String {
    format!("{prefix}1{}", hex::encode(hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_prefixed_hex() {
        let hash = [0xabu8; 32];
        let addr = encode_producer_address("xch", &hash);
        assert!(addr.starts_with("xch1"));
        assert_eq!(addr.len(), 4 + 64);
    }

    #[test]
    fn distinct_hashes_encode_distinct_addresses() {
        let a = encode_producer_address("xch", &[1u8; 32]);
        let b = encode_producer_address("xch", &[2u8; 32]);
        assert_ne!(a, b);
    }
}
