//! Top-level dataset controller: runs the build and encode passes, owns the
//! vocabulary tables and the materialized examples, and derives class
//! statistics.

use crate::data::embedding::{admit_frequent_words, load_pretrained};
use crate::data::encoder::{EncodeOutcome, Example, FeatureEncoder, PassStats, SizeAccumulator};
use crate::data::records::{build_word_counts, RecordStream, WeekKey};
use crate::data::vocab::VocabularyTable;
use crate::{PrepConfig, PrepError, PrepResult};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// A fully materialized dataset: frozen vocabulary tables plus the flat,
/// immutable example collection.
#[derive(Debug, Clone)]
pub struct CalendarDataset {
    pub config: PrepConfig,
    pub vocab: VocabularyTable,
    pub examples: Vec<Example>,
    /// Word/sentence length maxima observed while encoding; consumers size
    /// their padding from these.
    pub sizes: SizeAccumulator,
    /// Pretrained vectors aligned with word indices (zero rows for PAD/UNK).
    pub embeddings: Vec<Vec<f32>>,
    pub stats: PassStats,
    /// Emitted-example count per user, shared across splits so the per-user
    /// ceiling spans the whole dataset.
    pub user_event_counts: HashMap<String, usize>,
    pub invalid_weeks: HashSet<WeekKey>,
}

impl CalendarDataset {
    /// Build a dataset from a record file: dictionary-build pass, word
    /// admission (through the pretrained file when given), then the encode
    /// pass with growing char/user/duration tables. All tables are frozen
    /// before this returns.
    ///
    /// # Errors
    ///
    /// Propagates fatal format and contract errors from any pass.
    pub fn build(
        records: &Path,
        embeddings: Option<&Path>,
        config: PrepConfig,
    ) -> PrepResult<Self> {
        config.validate()?;

        let outcome = build_word_counts(records, &config)?;
        let mut vocab = VocabularyTable::new();
        let vectors = match embeddings {
            Some(path) => load_pretrained(path, &outcome.word_counts, &mut vocab, &config)?,
            None => admit_frequent_words(&outcome.word_counts, &mut vocab, &config)?,
        };
        vocab.words.freeze();

        let mut user_event_counts = HashMap::new();
        let mut encoder = FeatureEncoder::new(&config, true);
        let mut examples = Vec::new();
        for item in RecordStream::open(records)? {
            let (event, new_week) = item?;
            if outcome.invalid_weeks.contains(&event.week_key()) {
                continue;
            }
            if let Some(example) =
                encoder.encode_event(&event, new_week, &mut vocab, &mut user_event_counts)?
            {
                examples.push(example);
            }
        }
        let (sizes, stats) = encoder.finish();
        vocab.freeze_all();

        Ok(Self {
            config,
            vocab,
            examples,
            sizes,
            embeddings: vectors,
            stats,
            user_event_counts,
            invalid_weeks: outcome.invalid_weeks,
        })
    }

    /// Encode a further split (validation, test) against the frozen
    /// vocabulary. Unknown tokens resolve to UNK; the per-user ceiling keeps
    /// counting across splits.
    ///
    /// # Errors
    ///
    /// Propagates fatal format and contract errors.
    pub fn encode_split(&mut self, records: &Path) -> PrepResult<EncodeOutcome> {
        // Validity is per file: scan for invalid weeks first.
        let outcome = build_word_counts(records, &self.config)?;
        let mut encoder = FeatureEncoder::new(&self.config, false);
        let mut examples = Vec::new();
        for item in RecordStream::open(records)? {
            let (event, new_week) = item?;
            if outcome.invalid_weeks.contains(&event.week_key()) {
                continue;
            }
            if let Some(example) = encoder.encode_event(
                &event,
                new_week,
                &mut self.vocab,
                &mut self.user_event_counts,
            )? {
                examples.push(example);
            }
        }
        let (sizes, stats) = encoder.finish();
        self.invalid_weeks.extend(outcome.invalid_weeks);
        Ok(EncodeOutcome {
            examples,
            sizes,
            stats,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.config.num_classes()
    }

    /// Per-class example counts. The counts always sum to the dataset
    /// length; a target outside the class range is an upstream defect.
    #[must_use]
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes()];
        for example in &self.examples {
            counts[example.target_slot] += 1;
        }
        assert_eq!(
            counts.iter().sum::<usize>(),
            self.examples.len(),
            "class counts must cover every example"
        );
        counts
    }

    /// Inverse-frequency class weights: `total / (classes * count)`.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::ZeroClassCount`] if any class has no examples;
    /// callers must guarantee full class coverage before asking for weights.
    pub fn class_weights(&self) -> PrepResult<Vec<f32>> {
        let counts = self.class_counts();
        let n_classes = counts.len();
        let n_examples = self.examples.len();
        counts
            .iter()
            .enumerate()
            .map(|(class, &count)| {
                if count == 0 {
                    Err(PrepError::ZeroClassCount(class))
                } else {
                    Ok(n_examples as f32 / (n_classes as f32 * count as f32))
                }
            })
            .collect()
    }

    /// Two-part length keys for every example, in dataset order. Feed these
    /// to [`crate::sampler::LengthSortedBatchSampler`].
    #[must_use]
    pub fn lengths(&self) -> Vec<(usize, usize)> {
        self.examples.iter().map(Example::length_key).collect()
    }
}
