//! Per-event feature encoding: titles, duration buckets, snapshots, and
//! occupancy grids.
//!
//! The encoder consumes the record stream in order, carrying one week's
//! state at a time. For every surviving event it reconstructs the set of
//! sibling events already known in that week (the *snapshot*) and derives a
//! binary occupancy grid over coarse slots that is guaranteed never to
//! contain the event's own target slot.

use crate::data::records::{tokenize, RawEvent};
use crate::data::vocab::VocabularyTable;
use crate::{PrepConfig, PrepError, PrepResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Token encoding of one title: per-word character-index sequences, the
/// word-index sequence, and the token count. `chars` and `words` are
/// parallel arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleEncoding {
    pub chars: Vec<Vec<usize>>,
    pub words: Vec<usize>,
    pub len: usize,
}

/// One prior event as seen from a later event in the same week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub title: TitleEncoding,
    /// Bucketed duration in minutes (multiple of the duration unit).
    pub duration_minutes: u32,
    /// Coarse slot the event starts at.
    pub slot: usize,
}

/// One training example. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub user: usize,
    pub title: TitleEncoding,
    /// Index into the duration-bucket table.
    pub duration_bucket: usize,
    /// Prior same-week events in registration order.
    pub snapshot: Vec<SnapshotEntry>,
    /// Occupied coarse slots; never contains `target_slot`.
    pub grid: Vec<usize>,
    /// Coarse prediction class.
    pub target_slot: usize,
}

impl Example {
    /// Two-part length key for the sampler: title length first, then the
    /// longest title among snapshot entries (0 for an empty snapshot).
    #[must_use]
    pub fn length_key(&self) -> (usize, usize) {
        let snapshot_max = self.snapshot.iter().map(|e| e.title.len).max().unwrap_or(0);
        (self.title.len, snapshot_max)
    }
}

/// Running maxima of word and sentence lengths observed while encoding.
///
/// Returned by the pass and applied to the dataset once, instead of being
/// mutated into the configuration mid-iteration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeAccumulator {
    pub max_word_len: usize,
    pub max_sent_len: usize,
}

impl SizeAccumulator {
    fn observe(&mut self, tokens: &[String]) {
        for token in tokens {
            self.max_word_len = self.max_word_len.max(token.chars().count());
        }
        self.max_sent_len = self.max_sent_len.max(tokens.len());
    }

    /// Combine with the accumulator of another pass.
    #[must_use]
    pub fn merged(self, other: Self) -> Self {
        Self {
            max_word_len: self.max_word_len.max(other.max_word_len),
            max_sent_len: self.max_sent_len.max(other.max_sent_len),
        }
    }
}

/// Counters reported by one encode pass.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PassStats {
    /// Examples emitted.
    pub examples: usize,
    /// Weeks opened (sequence-0 records seen).
    pub weeks_seen: usize,
    /// Events dropped because their target slot duplicated a prior
    /// same-week slot.
    pub dropped_duplicate_slot: usize,
    /// Events that reached the emission filter and were rejected by it.
    pub filtered_out: usize,
    pub min_duration: Option<u32>,
    pub max_duration: u32,
    /// Largest snapshot among emitted examples.
    pub max_snapshot: usize,
}

impl PassStats {
    fn observe_duration(&mut self, minutes: u32) {
        self.min_duration = Some(self.min_duration.map_or(minutes, |m| m.min(minutes)));
        self.max_duration = self.max_duration.max(minutes);
    }
}

/// Output of one encode pass over a record file.
#[derive(Debug, Clone, Default)]
pub struct EncodeOutcome {
    pub examples: Vec<Example>,
    pub sizes: SizeAccumulator,
    pub stats: PassStats,
}

/// Round a duration up to the next multiple of `unit`; exact multiples pass
/// through unchanged.
#[must_use]
pub fn bucket_duration(minutes: u32, unit: u32) -> u32 {
    if minutes % unit == 0 {
        minutes
    } else {
        (minutes / unit + 1) * unit
    }
}

/// Coarse slots a booking occupies: `ceil(minutes / span)` consecutive slots
/// from `start`, stopping before the last valid slot index.
fn slot_run(start: usize, minutes: u32, span_minutes: usize, max_index: usize) -> Vec<usize> {
    let n_slots = (minutes as usize).div_ceil(span_minutes);
    (0..n_slots)
        .map(|shift| start + shift)
        .take_while(|&slot| slot < max_index)
        .collect()
}

/// Streaming per-event encoder.
///
/// Owns the transient per-week snapshot buffer; week transitions reset it.
/// The caller is responsible for skipping records of invalid weeks before
/// they reach [`FeatureEncoder::encode_event`].
pub struct FeatureEncoder<'a> {
    config: &'a PrepConfig,
    /// When set, the char, user, and duration tables grow as new tokens
    /// appear. The word table is always treated as fixed.
    update_dict: bool,
    buffer: Vec<SnapshotEntry>,
    sizes: SizeAccumulator,
    stats: PassStats,
}

impl<'a> FeatureEncoder<'a> {
    #[must_use]
    pub fn new(config: &'a PrepConfig, update_dict: bool) -> Self {
        Self {
            config,
            update_dict,
            buffer: Vec::new(),
            sizes: SizeAccumulator::default(),
            stats: PassStats::default(),
        }
    }

    /// Encode one event, returning `Some(example)` if it survives every
    /// filter.
    ///
    /// Events of users past their example ceiling, and events registered
    /// after their week already started, are skipped before the snapshot
    /// buffer is touched. Events whose target slot duplicates a prior
    /// same-week slot are dropped entirely. Events rejected only by the
    /// emission filter (registration distance, snapshot size, recurrence)
    /// still extend the week buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::Contract`] for an out-of-range start slot or a
    /// grid/target overlap.
    pub fn encode_event(
        &mut self,
        event: &RawEvent,
        new_week: bool,
        vocab: &mut VocabularyTable,
        user_event_counts: &mut HashMap<String, usize>,
    ) -> PrepResult<Option<Example>> {
        if new_week {
            self.buffer.clear();
            self.stats.weeks_seen += 1;
        }

        let emitted = user_event_counts
            .get(&event.user_id)
            .copied()
            .unwrap_or(0);
        if emitted > self.config.max_event_count_per_user {
            return Ok(None);
        }
        if event.reg_start_week_dist < 0 {
            return Ok(None);
        }

        if self.update_dict {
            vocab.users.ensure(event.user_id.clone())?;
        }
        let user = if self.config.route_users_to_unk {
            vocab.users.unk_index()
        } else {
            vocab.users.lookup(&event.user_id)
        };

        let tokens = tokenize(&event.title, self.config.lowercase_tokens);
        self.sizes.observe(&tokens);
        if self.update_dict {
            for c in event.title.chars() {
                vocab.chars.ensure(c)?;
            }
        }
        let chars: Vec<Vec<usize>> = tokens
            .iter()
            .map(|word| word.chars().map(|c| vocab.chars.lookup(&c)).collect())
            .collect();
        let words = vocab.words.map_sequence(&tokens);
        let title = TitleEncoding {
            len: words.len(),
            chars,
            words,
        };

        let bucket_minutes = bucket_duration(event.duration_minutes, self.config.duration_unit);
        if self.update_dict {
            vocab.durations.ensure(bucket_minutes)?;
        }
        let duration_bucket = vocab.durations.lookup(&bucket_minutes);
        self.stats.observe_duration(event.duration_minutes);

        if event.start_slot >= self.config.total_slot_count {
            return Err(PrepError::Contract(format!(
                "start slot {} outside valid range 0..{} for user {}",
                event.start_slot, self.config.total_slot_count, event.user_id
            )));
        }
        let target_slot = event.start_slot / self.config.class_divisor;

        // Duplicate-slot events within a week are not valid training signal:
        // drop without extending the buffer.
        if self.buffer.iter().any(|entry| entry.slot == target_slot) {
            self.stats.dropped_duplicate_slot += 1;
            return Ok(None);
        }
        let snapshot = self.buffer.clone();
        self.buffer.push(SnapshotEntry {
            title: title.clone(),
            duration_minutes: bucket_minutes,
            slot: target_slot,
        });

        let grid = self.build_grid(&snapshot, target_slot, bucket_minutes);
        if grid.contains(&target_slot) {
            return Err(PrepError::Contract(format!(
                "occupancy grid contains target slot {}",
                target_slot
            )));
        }

        let keep = event.reg_start_week_dist <= self.config.max_registration_start_distance
            && snapshot.len() <= self.config.max_snapshot_size
            && !event.recurrent;
        if !keep {
            self.stats.filtered_out += 1;
            return Ok(None);
        }

        self.stats.max_snapshot = self.stats.max_snapshot.max(snapshot.len());
        self.stats.examples += 1;
        *user_event_counts.entry(event.user_id.clone()).or_insert(0) += 1;

        Ok(Some(Example {
            user,
            title,
            duration_bucket,
            snapshot,
            grid,
            target_slot,
        }))
    }

    /// Expand snapshot entries into occupied coarse slots, excluding both
    /// duplicates and the slots of the target's own run.
    fn build_grid(
        &self,
        snapshot: &[SnapshotEntry],
        target_slot: usize,
        target_minutes: u32,
    ) -> Vec<usize> {
        let span = self.config.minutes_per_coarse_slot();
        let max_index = self.config.max_coarse_slot_index();
        let target_run = slot_run(target_slot, target_minutes, span, max_index);

        let mut grid = Vec::new();
        for entry in snapshot {
            for slot in slot_run(entry.slot, entry.duration_minutes, span, max_index) {
                if target_run.contains(&slot) || grid.contains(&slot) {
                    continue;
                }
                grid.push(slot);
            }
        }
        grid
    }

    /// Consume the encoder, returning the size accumulator and pass counters.
    #[must_use]
    pub fn finish(self) -> (SizeAccumulator, PassStats) {
        (self.sizes, self.stats)
    }
}
