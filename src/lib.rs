//! # calprep
//!
//! Converts a chronologically-ordered log of calendar-scheduling events into
//! fixed-shape training examples for a next-time-slot prediction model, and
//! orders them into length-sorted minibatches to minimize padding waste.
//!
//! ## Structure
//!
//! - [`data`] — vocabulary tables, record parsing, feature encoding, dataset controller
//! - [`sampler`] — length-sorted batch sampler with per-epoch randomized tie-breaking
//! - [`collate`] — batch assembly into dense arrays
//! - [`checkpoint`] — save/load of a fully materialized dataset
//!
//! ## Pipeline
//!
//! 1. A build pass streams the record file once, collecting word frequencies
//!    per valid week and marking invalid weeks.
//! 2. The word vocabulary is fixed from the frequency table (optionally
//!    filtered through a pretrained embedding file) and frozen.
//! 3. An encode pass streams the file again, producing one [`data::encoder::Example`]
//!    per surviving event: title token indices, duration bucket, the snapshot
//!    of prior same-week events, and a binary occupancy grid over coarse slots.
//! 4. The sampler orders example indices by length keys; collation turns each
//!    batch of examples into dense arrays for the training loop.

pub mod checkpoint;
pub mod collate;
pub mod data;
pub mod sampler;

pub use collate::{collate, Batch};
pub use data::dataset::CalendarDataset;
pub use data::encoder::{Example, FeatureEncoder, PassStats, SizeAccumulator};
pub use data::records::{RawEvent, RecordStream, WeekKey};
pub use data::vocab::{TokenTable, VocabularyTable};
pub use sampler::LengthSortedBatchSampler;

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// Error type for preprocessing operations.
#[derive(Debug, Clone)]
pub enum PrepError {
    /// Input-format error: wrong field count, unreadable file, non-numeric
    /// required field. Fatal for the whole pass.
    Format(String),
    /// Semantic-contract violation: out-of-range slot, broken week sequencing,
    /// mutation of a frozen vocabulary. Indicates an upstream data or logic
    /// defect and is never absorbed.
    Contract(String),
    /// A target class had zero examples when class weights were requested.
    ZeroClassCount(usize),
}

impl fmt::Display for PrepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrepError::Format(msg) => write!(f, "Input format error: {}", msg),
            PrepError::Contract(msg) => write!(f, "Contract violation: {}", msg),
            PrepError::ZeroClassCount(class) => {
                write!(f, "Class {} has zero examples; weights are undefined", class)
            }
        }
    }
}

impl Error for PrepError {}

pub type PrepResult<T> = Result<T, PrepError>;

/// Configuration for the preprocessing passes.
///
/// Immutable once a build starts. Sizes that are only known after encoding
/// (max word length, max sentence length) live in
/// [`data::encoder::SizeAccumulator`], returned by the encode pass, rather
/// than being mutated here mid-iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepConfig {
    /// Dimension of pretrained word vectors.
    pub word_embedding_dim: usize,
    /// Minibatch size used by the sampler.
    pub batch_size: usize,
    /// Durations are rounded up to the next multiple of this many minutes.
    pub duration_unit: u32,
    /// Maximum allowed registration-to-start distance in weeks.
    pub max_registration_start_distance: i32,
    /// Maximum snapshot size for an example to be emitted.
    pub max_snapshot_size: usize,
    /// Ceiling on emitted examples per user.
    pub max_event_count_per_user: usize,
    /// Words must occur strictly more often than this to enter the vocabulary.
    pub min_word_occurrence: usize,
    /// Titles with more tokens than this invalidate their week.
    pub max_title_token_count: usize,
    /// Tokens longer than this many characters invalidate their week.
    pub max_token_char_length: usize,
    /// Fine slots are collapsed into coarse prediction classes by this divisor.
    pub class_divisor: usize,
    /// Total number of fine time slots in a week.
    pub total_slot_count: usize,
    /// Lowercase title tokens (for lower-cased embedding variants).
    pub lowercase_tokens: bool,
    /// Route every example through the user table's UNK index. The user table
    /// is still populated; this flag preserves the modeling choice of not
    /// using per-user identities as an input feature.
    pub route_users_to_unk: bool,
    /// Worker threads for parallel batch assembly.
    pub worker_count: usize,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            word_embedding_dim: 300,
            batch_size: 16,
            duration_unit: 30,
            max_registration_start_distance: 2,
            max_snapshot_size: usize::MAX,
            max_event_count_per_user: 5000,
            min_word_occurrence: 0,
            max_title_token_count: 50,
            max_token_char_length: 50,
            class_divisor: 2,
            total_slot_count: 336,
            lowercase_tokens: false,
            route_users_to_unk: true,
            worker_count: 5,
        }
    }
}

impl PrepConfig {
    /// Number of coarse prediction classes.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.total_slot_count / self.class_divisor
    }

    /// Highest valid coarse slot index.
    #[must_use]
    pub fn max_coarse_slot_index(&self) -> usize {
        self.num_classes() - 1
    }

    /// Minutes covered by one coarse slot.
    #[must_use]
    pub fn minutes_per_coarse_slot(&self) -> usize {
        self.duration_unit as usize * self.class_divisor
    }

    /// Check that the configuration is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::Contract`] for zero-valued divisors, slot counts,
    /// or batch sizes.
    pub fn validate(&self) -> PrepResult<()> {
        if self.duration_unit == 0 {
            return Err(PrepError::Contract("duration_unit must be positive".into()));
        }
        if self.class_divisor == 0 {
            return Err(PrepError::Contract("class_divisor must be positive".into()));
        }
        if self.total_slot_count < self.class_divisor {
            return Err(PrepError::Contract(format!(
                "total_slot_count {} yields no classes with class_divisor {}",
                self.total_slot_count, self.class_divisor
            )));
        }
        if self.batch_size == 0 {
            return Err(PrepError::Contract("batch_size must be positive".into()));
        }
        if self.worker_count == 0 {
            return Err(PrepError::Contract("worker_count must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PrepConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_classes(), 168);
        assert_eq!(config.max_coarse_slot_index(), 167);
        assert_eq!(config.minutes_per_coarse_slot(), 60);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PrepConfig {
            class_divisor: 0,
            ..PrepConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PrepConfig {
            batch_size: 0,
            ..PrepConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
