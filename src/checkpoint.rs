//! Save/load for a fully materialized dataset.
//!
//! Serializes the vocabulary tables, examples, embeddings, and derived size
//! configuration to JSON. Token tables store their non-sentinel tokens in
//! index order and are rebuilt on load, so a restored dataset reproduces the
//! exact token→index mappings of the original build.

use crate::data::dataset::CalendarDataset;
use crate::data::encoder::{Example, PassStats, SizeAccumulator};
use crate::data::vocab::{TokenTable, VocabularyTable};
use crate::PrepConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Serializable checkpoint data.
#[derive(Debug, Serialize, Deserialize)]
pub struct DatasetCheckpoint {
    pub config: PrepConfig,
    pub sizes: SizeAccumulator,
    /// Non-sentinel tokens of each table, in index order.
    pub chars: Vec<char>,
    pub words: Vec<String>,
    pub users: Vec<String>,
    pub durations: Vec<u32>,
    pub embeddings: Vec<Vec<f32>>,
    pub examples: Vec<Example>,
    pub stats: PassStats,
}

fn rebuild_table<T: Eq + std::hash::Hash + Clone>(
    mut table: TokenTable<T>,
    tokens: Vec<T>,
) -> Result<TokenTable<T>, String> {
    for token in tokens {
        table
            .ensure(token)
            .map_err(|e| format!("Failed to rebuild vocabulary table: {e}"))?;
    }
    table.freeze();
    Ok(table)
}

/// Save a dataset checkpoint to a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be written or the data cannot be
/// serialized.
pub fn save_dataset(dataset: &CalendarDataset, path: &Path) -> Result<(), String> {
    let data = DatasetCheckpoint {
        config: dataset.config.clone(),
        sizes: dataset.sizes,
        chars: dataset.vocab.chars.tokens().copied().collect(),
        words: dataset.vocab.words.tokens().cloned().collect(),
        users: dataset.vocab.users.tokens().cloned().collect(),
        durations: dataset.vocab.durations.tokens().copied().collect(),
        embeddings: dataset.embeddings.clone(),
        examples: dataset.examples.clone(),
        stats: dataset.stats.clone(),
    };

    let json = serde_json::to_string_pretty(&data)
        .map_err(|e| format!("Failed to serialize dataset: {e}"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create checkpoint directory: {e}"))?;
    }

    std::fs::write(path, json)
        .map_err(|e| format!("Failed to write checkpoint to {}: {e}", path.display()))
}

/// Load a dataset checkpoint from a JSON file.
///
/// The restored vocabulary tables are frozen; the dataset is ready for
/// sampling and collation but not for further encode passes.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_dataset(path: &Path) -> Result<CalendarDataset, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read checkpoint from {}: {e}", path.display()))?;

    let data: DatasetCheckpoint =
        serde_json::from_str(&json).map_err(|e| format!("Failed to parse checkpoint: {e}"))?;

    let vocab = VocabularyTable {
        chars: rebuild_table(TokenTable::with_pad_and_unk(), data.chars)?,
        words: rebuild_table(TokenTable::with_pad_and_unk(), data.words)?,
        users: rebuild_table(TokenTable::with_unk(), data.users)?,
        durations: rebuild_table(TokenTable::with_unk(), data.durations)?,
    };

    Ok(CalendarDataset {
        config: data.config,
        vocab,
        examples: data.examples,
        sizes: data.sizes,
        embeddings: data.embeddings,
        stats: data.stats,
        user_event_counts: HashMap::new(),
        invalid_weeks: std::collections::HashSet::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_dataset() -> CalendarDataset {
        let dir = std::env::temp_dir().join("calprep_test_checkpoint_build");
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("records.csv");
        fs::write(
            &path,
            [
                "u1,team sync,45,r,s,2018,10,0,0,0,False,20",
                "u1,dentist,30,r,s,2018,10,1,0,0,False,24",
            ]
            .join("\n"),
        )
        .expect("write fixture");
        CalendarDataset::build(&path, None, PrepConfig::default()).expect("build")
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dataset = make_dataset();
        let path = std::env::temp_dir()
            .join("calprep_test_checkpoint")
            .join("dataset.json");

        save_dataset(&dataset, &path).expect("save");
        let restored = load_dataset(&path).expect("load");

        assert_eq!(restored.examples, dataset.examples);
        assert_eq!(restored.sizes, dataset.sizes);
        assert_eq!(restored.embeddings, dataset.embeddings);

        // Identical token→index mappings, both directions.
        for word in dataset.vocab.words.tokens() {
            assert_eq!(
                restored.vocab.words.lookup(word),
                dataset.vocab.words.lookup(word)
            );
        }
        for index in 0..dataset.vocab.durations.len() {
            assert_eq!(
                restored.vocab.durations.token(index),
                dataset.vocab.durations.token(index)
            );
        }
        assert_eq!(restored.vocab.chars.len(), dataset.vocab.chars.len());
        assert!(restored.vocab.words.is_frozen());

        let _ = fs::remove_dir_all(std::env::temp_dir().join("calprep_test_checkpoint"));
    }

    #[test]
    fn test_load_nonexistent_checkpoint() {
        let result = load_dataset(Path::new("/nonexistent/dataset.json"));
        assert!(result.is_err());
    }
}
