//! Confirmation depth.

/// Blocks mined on top of the receipt's block, as seen at `current_height`.
///
/// Clamped to zero when the receipt height is at or above the observed head,
/// which happens when the two values come from differently-synced nodes.
pub fn confirmations(current_height: u64, receipt_height: u64) -> u64 {
    current_height.saturating_sub(receipt_height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_is_height_difference() {
        assert_eq!(confirmations(1012, 1000), 12);
        assert_eq!(confirmations(1005, 1000), 5);
    }

    #[test]
    fn lagging_head_clamps_to_zero() {
        assert_eq!(confirmations(1000, 1000), 0);
        assert_eq!(confirmations(990, 1000), 0);
    }
}
