//! Bidirectional token↔index tables with reserved sentinel indices.
//!
//! Four independent tables cover characters, words, user ids, and duration
//! buckets. Text tables (char, word) reserve index 0 for PAD and index 1 for
//! UNK; user and duration tables reserve index 0 for UNK only. Indices are
//! assigned in first-seen order after the reserved prefix, so a table built
//! from the same token stream always yields the same mapping.

use crate::{PrepError, PrepResult};
use std::collections::HashMap;
use std::hash::Hash;

/// Padding sentinel index for text tables (char, word).
pub const PAD_INDEX: usize = 0;
/// Unknown-token sentinel index for text tables (char, word).
pub const TEXT_UNK_INDEX: usize = 1;
/// Unknown-token sentinel index for id tables (user, duration).
pub const ID_UNK_INDEX: usize = 0;

/// An append-only token↔index table.
///
/// Reserved sentinel indices have no backing token; [`TokenTable::token`]
/// returns `None` for them. During the build phase the table grows via
/// [`TokenTable::ensure`]; once frozen, any further `ensure` is a contract
/// violation, which keeps index assignment stable across encoding passes.
#[derive(Debug, Clone)]
pub struct TokenTable<T> {
    index_of: HashMap<T, usize>,
    tokens: Vec<Option<T>>,
    unk_index: usize,
    pad_index: Option<usize>,
    frozen: bool,
}

impl<T: Eq + Hash + Clone> TokenTable<T> {
    /// Create a text table with PAD at index 0 and UNK at index 1.
    #[must_use]
    pub fn with_pad_and_unk() -> Self {
        Self {
            index_of: HashMap::new(),
            tokens: vec![None, None],
            unk_index: TEXT_UNK_INDEX,
            pad_index: Some(PAD_INDEX),
            frozen: false,
        }
    }

    /// Create an id table with UNK at index 0 and no PAD.
    #[must_use]
    pub fn with_unk() -> Self {
        Self {
            index_of: HashMap::new(),
            tokens: vec![None],
            unk_index: ID_UNK_INDEX,
            pad_index: None,
            frozen: false,
        }
    }

    /// Register `token` if absent and return its index.
    ///
    /// Idempotent: repeated calls with the same token return the same index
    /// and grow the table by at most one entry in total.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::Contract`] if the table has been frozen.
    pub fn ensure(&mut self, token: T) -> PrepResult<usize> {
        if let Some(&index) = self.index_of.get(&token) {
            return Ok(index);
        }
        if self.frozen {
            return Err(PrepError::Contract(
                "ensure() on a frozen vocabulary table".into(),
            ));
        }
        let index = self.tokens.len();
        self.index_of.insert(token.clone(), index);
        self.tokens.push(Some(token));
        Ok(index)
    }

    /// Look up a token's index, resolving absent keys to UNK. Never fails.
    #[must_use]
    pub fn lookup(&self, token: &T) -> usize {
        self.index_of.get(token).copied().unwrap_or(self.unk_index)
    }

    /// Inverse lookup. Sentinel and out-of-range indices yield `None`.
    #[must_use]
    pub fn token(&self, index: usize) -> Option<&T> {
        self.tokens.get(index).and_then(Option::as_ref)
    }

    /// Map a token sequence elementwise via [`TokenTable::lookup`].
    #[must_use]
    pub fn map_sequence<'a, I>(&self, tokens: I) -> Vec<usize>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        tokens.into_iter().map(|t| self.lookup(t)).collect()
    }

    /// Inverse of [`TokenTable::map_sequence`]: map indices back to tokens.
    ///
    /// PAD entries are elided (used when reconstructing readable text from
    /// padded index sequences); UNK and out-of-range indices yield `None`.
    #[must_use]
    pub fn invert_sequence(&self, indices: &[usize]) -> Vec<Option<&T>> {
        indices
            .iter()
            .filter(|&&i| Some(i) != self.pad_index)
            .map(|&i| self.token(i))
            .collect()
    }

    /// Total entries including reserved sentinels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of reserved sentinel indices at the front of the table.
    #[must_use]
    pub fn reserved_len(&self) -> usize {
        1 + usize::from(self.pad_index.is_some())
    }

    #[must_use]
    pub fn unk_index(&self) -> usize {
        self.unk_index
    }

    #[must_use]
    pub fn pad_index(&self) -> Option<usize> {
        self.pad_index
    }

    /// Mark the table immutable. Later `ensure` calls fail.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Non-sentinel tokens in index order (index `reserved_len()` first).
    pub fn tokens(&self) -> impl Iterator<Item = &T> {
        self.tokens.iter().filter_map(Option::as_ref)
    }
}

/// The four vocabulary tables shared by the build and encode passes.
#[derive(Debug, Clone)]
pub struct VocabularyTable {
    /// Character table (PAD=0, UNK=1).
    pub chars: TokenTable<char>,
    /// Word table (PAD=0, UNK=1); fixed by the embedding filter, then frozen.
    pub words: TokenTable<String>,
    /// User-id table (UNK=0).
    pub users: TokenTable<String>,
    /// Duration-bucket table keyed by rounded minutes (UNK=0).
    pub durations: TokenTable<u32>,
}

impl VocabularyTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            chars: TokenTable::with_pad_and_unk(),
            words: TokenTable::with_pad_and_unk(),
            users: TokenTable::with_unk(),
            durations: TokenTable::with_unk(),
        }
    }

    /// Freeze every table once the dataset is fully built.
    pub fn freeze_all(&mut self) {
        self.chars.freeze();
        self.words.freeze();
        self.users.freeze();
        self.durations.freeze();
    }

    /// Reconstruct readable words from a (possibly padded) word-index
    /// sequence. PAD entries are dropped; unknown indices render as `<unk>`.
    #[must_use]
    pub fn decode_words(&self, indices: &[usize]) -> Vec<String> {
        self.words
            .invert_sequence(indices)
            .into_iter()
            .map(|t| t.cloned().unwrap_or_else(|| "<unk>".to_string()))
            .collect()
    }
}

impl Default for VocabularyTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_order_after_sentinels() {
        let mut table: TokenTable<String> = TokenTable::with_pad_and_unk();
        assert_eq!(table.ensure("alpha".to_string()).unwrap(), 2);
        assert_eq!(table.ensure("beta".to_string()).unwrap(), 3);
        assert_eq!(table.ensure("alpha".to_string()).unwrap(), 2);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_lookup_absent_resolves_to_unk() {
        let mut table: TokenTable<char> = TokenTable::with_pad_and_unk();
        table.ensure('a').unwrap();
        assert_eq!(table.lookup(&'a'), 2);
        assert_eq!(table.lookup(&'z'), TEXT_UNK_INDEX);

        let id_table: TokenTable<u32> = TokenTable::with_unk();
        assert_eq!(id_table.lookup(&90), ID_UNK_INDEX);
    }

    #[test]
    fn test_freeze_rejects_new_tokens() {
        let mut table: TokenTable<u32> = TokenTable::with_unk();
        table.ensure(30).unwrap();
        table.freeze();
        // Existing tokens still resolve.
        assert_eq!(table.ensure(30).unwrap(), 1);
        assert!(table.ensure(60).is_err());
    }

    #[test]
    fn test_inverse_lookup() {
        let mut table: TokenTable<String> = TokenTable::with_pad_and_unk();
        table.ensure("meeting".to_string()).unwrap();
        assert_eq!(table.token(2), Some(&"meeting".to_string()));
        assert_eq!(table.token(PAD_INDEX), None);
        assert_eq!(table.token(TEXT_UNK_INDEX), None);
        assert_eq!(table.token(99), None);
    }

    #[test]
    fn test_map_and_invert_sequence() {
        let mut table: TokenTable<String> = TokenTable::with_pad_and_unk();
        let words: Vec<String> = ["weekly", "sync"].iter().map(|s| s.to_string()).collect();
        for w in &words {
            table.ensure(w.clone()).unwrap();
        }
        let mapped = table.map_sequence(&words);
        assert_eq!(mapped, vec![2, 3]);

        // PAD elided, UNK yields None.
        let inverted = table.invert_sequence(&[2, PAD_INDEX, 3, TEXT_UNK_INDEX, PAD_INDEX]);
        assert_eq!(
            inverted,
            vec![
                Some(&"weekly".to_string()),
                Some(&"sync".to_string()),
                None
            ]
        );
    }

    #[test]
    fn test_decode_words() {
        let mut vocab = VocabularyTable::new();
        vocab.words.ensure("standup".to_string()).unwrap();
        let decoded = vocab.decode_words(&[2, PAD_INDEX, TEXT_UNK_INDEX]);
        assert_eq!(decoded, vec!["standup".to_string(), "<unk>".to_string()]);
    }

    #[test]
    fn test_tokens_iterate_in_index_order() {
        let mut table: TokenTable<u32> = TokenTable::with_unk();
        table.ensure(30).unwrap();
        table.ensure(90).unwrap();
        table.ensure(60).unwrap();
        let tokens: Vec<u32> = table.tokens().copied().collect();
        assert_eq!(tokens, vec![30, 90, 60]);
        assert_eq!(table.reserved_len(), 1);
    }
}
