//! Query tokenization for the sentence encoder.
//!
//! Published sentence-transformer `tokenizer.json` files often carry a fixed
//! padding block meant for batched training. Queries are encoded one at a
//! time, so [`TokenizerHandle`] strips that padding on load and hands the
//! model only real tokens together with their attention mask.

use crate::error::EmbeddingError;
use tokenizers::tokenizer::{Tokenizer, TruncationDirection, TruncationParams, TruncationStrategy};

/// Token ids for one query and the matching attention mask.
///
/// Both vectors always have the same length; a mask entry of 0 marks a
/// position the model must not attend to or pool over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedQuery {
    pub ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
}

impl TokenizedQuery {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of positions the model attends to.
    pub fn attended(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m != 0).count()
    }
}

/// A loaded tokenizer, unpadded and truncated to the encoder's limit.
///
/// ```ignore
/// let handle = TokenizerHandle::from_bytes(std::fs::read("tokenizer.json")?, MAX_QUERY_TOKENS)?;
/// let query = handle.tokenize("Integrate x squared")?;
/// assert_eq!(query.ids.len(), query.attention_mask.len());
/// ```
#[derive(Clone)]
pub struct TokenizerHandle {
    tokenizer: Tokenizer,
    max_length: usize,
}

impl TokenizerHandle {
    /// Parses `tokenizer.json` bytes.
    ///
    /// Any padding configured in the file is removed and right-side
    /// truncation to `max_length` tokens is installed.
    ///
    /// # Errors
    ///
    /// - `EmbeddingError::TokenizerUnavailable` if the JSON cannot be parsed
    /// - `EmbeddingError::InvalidConfig` if truncation cannot be applied
    pub fn from_bytes(tokenizer_bytes: Vec<u8>, max_length: usize) -> Result<Self, EmbeddingError> {
        let mut tokenizer = Tokenizer::from_bytes(tokenizer_bytes).map_err(|e| {
            EmbeddingError::TokenizerUnavailable(format!("Failed to parse tokenizer.json: {}", e))
        })?;

        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                stride: 0,
                strategy: TruncationStrategy::OnlyFirst,
                direction: TruncationDirection::Right,
            }))
            .map_err(|e| {
                EmbeddingError::InvalidConfig(format!("Cannot truncate queries to {} tokens: {}", max_length, e))
            })?;

        Ok(Self {
            tokenizer,
            max_length,
        })
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Encodes one query with special tokens.
    ///
    /// # Errors
    ///
    /// `EmbeddingError::TokenizationFailed` if encoding fails or yields no
    /// attended tokens.
    pub fn tokenize(&self, text: &str) -> Result<TokenizedQuery, EmbeddingError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::TokenizationFailed(format!("Encoding failed: {}", e)))?;

        let ids = encoding.get_ids().to_vec();
        let mask = encoding.get_attention_mask();
        // Some tokenizers leave the mask empty when nothing is padded
        let attention_mask = if mask.len() == ids.len() {
            mask.to_vec()
        } else {
            vec![1; ids.len()]
        };

        let query = TokenizedQuery { ids, attention_mask };
        if query.attended() == 0 {
            return Err(EmbeddingError::TokenizationFailed(
                "Query produced no tokens".to_string(),
            ));
        }
        Ok(query)
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{padded_tokenizer_handle, test_tokenizer_handle};

    #[test]
    fn test_tokenize_known_words() {
        let handle = test_tokenizer_handle(32);
        let query = handle.tokenize("what is two plus two").unwrap();
        assert_eq!(query.ids, vec![1, 2, 3, 4, 3]);
        assert_eq!(query.attention_mask, vec![1; 5]);
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let handle = test_tokenizer_handle(32);
        let query = handle.tokenize("two times pi").unwrap();
        assert_eq!(query.ids, vec![3, 0, 0]);
    }

    #[test]
    fn test_tokenize_empty_string_fails() {
        let handle = test_tokenizer_handle(32);
        assert!(handle.tokenize("").is_err());
    }

    #[test]
    fn test_fixed_padding_in_file_is_ignored() {
        let handle = padded_tokenizer_handle(32);
        let query = handle.tokenize("two plus two").unwrap();
        assert_eq!(query.ids, vec![3, 4, 3]);
        assert_eq!(query.attention_mask, vec![1, 1, 1]);
    }

    #[test]
    fn test_padded_file_still_rejects_empty_query() {
        let handle = padded_tokenizer_handle(32);
        assert!(handle.tokenize("").is_err());
    }

    #[test]
    fn test_truncation() {
        let handle = test_tokenizer_handle(10);
        let query = handle.tokenize(&"two ".repeat(100)).unwrap();
        assert_eq!(query.len(), 10);
        assert_eq!(query.attended(), 10);
    }

    #[test]
    fn test_max_length_and_vocab() {
        let handle = test_tokenizer_handle(256);
        assert_eq!(handle.max_length(), 256);
        assert_eq!(handle.vocab_size(), 5);
    }
}
