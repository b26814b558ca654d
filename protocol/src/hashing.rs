use crate::BlockHash;

/// Tokens per cache block, by convention.
pub const DEFAULT_BLOCK_SIZE: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BlockHashError {
    #[error("cannot hash an empty token sequence")]
    EmptyInput,
}

/// Deterministically splits a tokenized prompt into an ordered sequence of
/// fixed-size block hashes.
///
/// Only full blocks of exactly `block_size` tokens are hashed; a trailing
/// partial block is dropped from the returned sequence but still counted in
/// `total_tokens`. Same input (same tokens, same `block_size`) always
/// produces the same output, on any host — this is required for the
/// router and worker to agree on cache identity without exchanging raw
/// prompts.
pub fn hash_prompt(
    tokens: &[u32],
    block_size: usize,
) -> Result<(Vec<BlockHash>, usize), BlockHashError> {
    if tokens.is_empty() {
        return Err(BlockHashError::EmptyInput);
    }

    let total_tokens = tokens.len();
    let full_blocks = total_tokens / block_size;
    let mut hashes = Vec::with_capacity(full_blocks);

    for chunk in tokens[..full_blocks * block_size].chunks_exact(block_size) {
        hashes.push(hash_block(chunk));
    }

    Ok((hashes, total_tokens))
}

/// Digest a single block's raw token bytes into a stable hex string.
///
/// `blake3` is used as a fast, collision-resistant digest; cryptographic
/// strength is not required here, only determinism and low collision
/// probability across an LLM-scale vocabulary of block contents.
fn hash_block(tokens: &[u32]) -> BlockHash {
    let mut hasher = blake3::Hasher::new();
    for token in tokens {
        hasher.update(&token.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_fails() {
        assert_eq!(hash_prompt(&[], DEFAULT_BLOCK_SIZE), Err(BlockHashError::EmptyInput));
    }

    #[test]
    fn drops_trailing_partial_block_but_counts_tokens() {
        let tokens: Vec<u32> = (0..20).collect();
        let (hashes, total) = hash_prompt(&tokens, DEFAULT_BLOCK_SIZE).unwrap();
        assert_eq!(hashes.len(), 1);
        assert_eq!(total, 20);
    }

    #[test]
    fn shorter_than_one_block_yields_empty_sequence() {
        let tokens: Vec<u32> = (0..5).collect();
        let (hashes, total) = hash_prompt(&tokens, DEFAULT_BLOCK_SIZE).unwrap();
        assert!(hashes.is_empty());
        assert_eq!(total, 5);
    }

    #[test]
    fn deterministic_across_calls() {
        let tokens: Vec<u32> = (0..48).collect();
        let (a, _) = hash_prompt(&tokens, DEFAULT_BLOCK_SIZE).unwrap();
        let (b, _) = hash_prompt(&tokens, DEFAULT_BLOCK_SIZE).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn longest_common_prefix_shares_identical_leading_hashes() {
        let a: Vec<u32> = (0..32).collect();
        let mut b = a.clone();
        b.extend([9999, 9998]);
        let (hashes_a, _) = hash_prompt(&a, DEFAULT_BLOCK_SIZE).unwrap();
        let (hashes_b, _) = hash_prompt(&b, DEFAULT_BLOCK_SIZE).unwrap();
        assert_eq!(hashes_a, hashes_b[..hashes_a.len()]);
    }

    #[test]
    fn differing_content_produces_different_hash() {
        let a: Vec<u32> = vec![1; 16];
        let b: Vec<u32> = vec![2; 16];
        let (hashes_a, _) = hash_prompt(&a, DEFAULT_BLOCK_SIZE).unwrap();
        let (hashes_b, _) = hash_prompt(&b, DEFAULT_BLOCK_SIZE).unwrap();
        assert_ne!(hashes_a, hashes_b);
    }
}
