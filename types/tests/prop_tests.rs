use proptest::prelude::*;

use tally_types::{ChainAddress, ClaimId, Timestamp, TxHash};

proptest! {
    /// Any 32 bytes printed as hex parse back to the same hash.
    #[test]
    fn tx_hash_display_parses_back(bytes in prop::array::uniform32(0u8..)) {
        let hash = TxHash::new(bytes);
        let parsed = TxHash::parse(&hash.to_string()).unwrap();
        prop_assert_eq!(parsed, hash);
    }

    /// Upper-casing the hex never changes the parsed hash.
    #[test]
    fn tx_hash_parse_ignores_case(bytes in prop::array::uniform32(0u8..)) {
        let hash = TxHash::new(bytes);
        let upper = format!("0x{}", hash.to_string()[2..].to_uppercase());
        prop_assert_eq!(TxHash::parse(&upper).unwrap(), hash);
    }

    /// Address spellings with and without prefix are the same address.
    #[test]
    fn address_prefix_is_optional(bytes in prop::array::uniform20(0u8..)) {
        let addr = ChainAddress::new(bytes);
        let printed = addr.to_string();
        prop_assert_eq!(ChainAddress::parse(&printed[2..]).unwrap(), addr);
    }

    /// Claim id key bytes sort in the same order as the ids.
    #[test]
    fn claim_id_keys_preserve_order(a in any::<u64>(), b in any::<u64>()) {
        let (ka, kb) = (ClaimId::new(a).to_key(), ClaimId::new(b).to_key());
        prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
        prop_assert_eq!(ClaimId::from_key(ka).get(), a);
    }

    /// elapsed_since never underflows.
    #[test]
    fn elapsed_since_saturates(a in any::<u64>(), b in any::<u64>()) {
        let elapsed = Timestamp::new(a).elapsed_since(Timestamp::new(b));
        prop_assert_eq!(elapsed, b.saturating_sub(a));
    }

    /// Bincode round-trip of a hash keeps every byte.
    #[test]
    fn tx_hash_bincode_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = TxHash::new(bytes);
        let encoded = bincode::serialize(&hash).unwrap();
        let decoded: TxHash = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded.as_bytes(), hash.as_bytes());
    }
}
