//! Pretrained word-vector loading and word-vocabulary admission.
//!
//! The embedding source is a whitespace-delimited text file, one token
//! followed by its numeric vector per line. Only tokens seen during the
//! build pass are considered; of those, only tokens occurring strictly more
//! often than `min_word_occurrence` (and present in the embedding file, when
//! one is given) enter the word vocabulary. The returned vector list is
//! aligned with word indices: rows 0 and 1 are zero vectors for PAD and UNK.

use crate::data::records::WordCounts;
use crate::data::vocab::VocabularyTable;
use crate::{PrepConfig, PrepError, PrepResult};
use std::collections::HashMap;
use std::path::Path;

/// Load pretrained vectors, admitting matching frequent words into the word
/// vocabulary in first-seen corpus order.
///
/// # Errors
///
/// Returns [`PrepError::Format`] if the file cannot be read, a vector
/// component fails to parse, or a vector has the wrong dimension.
pub fn load_pretrained(
    path: &Path,
    counts: &WordCounts,
    vocab: &mut VocabularyTable,
    config: &PrepConfig,
) -> PrepResult<Vec<Vec<f32>>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PrepError::Format(format!("failed to read {}: {}", path.display(), e))
    })?;

    let mut found: HashMap<String, Vec<f32>> = HashMap::new();
    for (line_no, line) in content.lines().enumerate() {
        let mut parts = line.split_whitespace();
        let Some(token) = parts.next() else {
            continue;
        };
        if !counts.contains(token) {
            continue;
        }
        let vector: Vec<f32> = parts
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|e| {
                PrepError::Format(format!(
                    "embedding line {}: bad vector component: {}",
                    line_no + 1,
                    e
                ))
            })?;
        if vector.len() != config.word_embedding_dim {
            return Err(PrepError::Format(format!(
                "embedding line {}: expected {} components, found {}",
                line_no + 1,
                config.word_embedding_dim,
                vector.len()
            )));
        }
        found.insert(token.to_string(), vector);
    }

    let mut vectors = vec![vec![0.0; config.word_embedding_dim]; 2];
    for (word, count) in counts.iter() {
        if count > config.min_word_occurrence {
            if let Some(vector) = found.get(word) {
                vocab.words.ensure(word.to_string())?;
                vectors.push(vector.clone());
            }
        }
    }
    debug_assert_eq!(vectors.len(), vocab.words.len());
    Ok(vectors)
}

/// Admit every sufficiently frequent word with a zero vector. Used when no
/// pretrained file is configured.
///
/// # Errors
///
/// Returns [`PrepError::Contract`] if the word table is already frozen.
pub fn admit_frequent_words(
    counts: &WordCounts,
    vocab: &mut VocabularyTable,
    config: &PrepConfig,
) -> PrepResult<Vec<Vec<f32>>> {
    let mut vectors = vec![vec![0.0; config.word_embedding_dim]; 2];
    for (word, count) in counts.iter() {
        if count > config.min_word_occurrence {
            vocab.words.ensure(word.to_string())?;
            vectors.push(vec![0.0; config.word_embedding_dim]);
        }
    }
    debug_assert_eq!(vectors.len(), vocab.words.len());
    Ok(vectors)
}
