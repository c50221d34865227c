use crate::error::{ChainError, Result};

use super::chain::Block;

/// Recompute the content hash of `block` and compare it with the carried hash.
/// Blocks carrying the genesis sentinel always verify.
pub fn verify_hash(block: &Block) -> bool {
    block.is_genesis() || block.hash == block.header.hash()
}

/// Like [`verify_hash`], but reports what was expected on mismatch.
pub fn check_integrity(block: &Block) -> Result<()> {
    if verify_hash(block) {
        return Ok(());
    }
    Err(ChainError::IntegrityError {
        have: block.hash.clone(),
        want: block.header.hash(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::core::chain::{Roots, GENESIS_HASH};

    fn child() -> Block {
        let g = Block::genesis(1_000, "", &Roots::default());
        Block::child(Some(&g), 1_010, 1_000, &Roots::default(), "payload").unwrap()
    }

    #[test]
    fn test_fresh_child_verifies() {
        assert!(verify_hash(&child()));
        assert!(check_integrity(&child()).is_ok());
    }

    #[test]
    fn test_any_field_mutation_breaks_hash() {
        let mutations: Vec<fn(&mut Block)> = vec![
            |b| b.header.parent_hash = "0x01".to_string(),
            |b| b.header.timestamp += 1,
            |b| b.header.sequence += 1,
            |b| b.header.state_root = "0x02".to_string(),
            |b| b.header.transactions_root = "0x03".to_string(),
            |b| b.header.receipts_root = "0x04".to_string(),
            |b| b.header.events_root = "0x05".to_string(),
            |b| b.header.extra_data.push('!'),
        ];
        for mutate in mutations {
            let mut block = child();
            mutate(&mut block);
            assert!(!verify_hash(&block));
            assert!(matches!(
                check_integrity(&block),
                Err(ChainError::IntegrityError { .. })
            ));
        }
    }

    #[test]
    fn test_genesis_sentinel_always_verifies() {
        let mut g = Block::genesis(1_000, "a", &Roots::default());
        g.header.extra_data = "tampered".to_string();
        g.header.timestamp = 42;
        assert_eq!(g.hash, GENESIS_HASH);
        assert!(verify_hash(&g));
    }
}
