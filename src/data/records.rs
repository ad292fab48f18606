//! Delimited record source: parsing, week grouping, and validity checks.
//!
//! Each line of the source file carries exactly [`FIELD_COUNT`] quoted-CSV
//! fields describing one scheduled event. Records for a given week are
//! contiguous and ordered by ascending registration sequence; sequence 0
//! marks the first record of a new week. [`RecordStream`] enforces that
//! ordering contract and yields `(RawEvent, is_new_week)` pairs so the
//! encoder never has to infer week transitions itself.

use crate::{PrepConfig, PrepError, PrepResult};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;

/// Fixed field count of the record source.
pub const FIELD_COUNT: usize = 12;

/// Compound identity grouping events into weeks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WeekKey {
    pub user_id: String,
    pub year: String,
    pub week: String,
}

/// One parsed input record.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub user_id: String,
    pub title: String,
    /// Raw duration in minutes, before bucketing.
    pub duration_minutes: u32,
    pub registered_at: String,
    pub starts_at: String,
    pub start_year: String,
    pub start_week: String,
    /// Registration sequence within the week; 0 starts a new week.
    pub reg_seq: u32,
    /// Registration-to-start distance in weeks; negative means the event was
    /// registered after its week already started.
    pub reg_start_week_dist: i32,
    pub reg_start_day_dist: i32,
    pub recurrent: bool,
    /// Fine-grained start time slot, `0 <= slot < total_slot_count`.
    pub start_slot: usize,
}

impl RawEvent {
    /// Parse one CSV record.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::Format`] on a wrong field count or a non-numeric
    /// required field; the source file is assumed structurally trustworthy,
    /// so this aborts the pass.
    pub fn from_record(record: &csv::StringRecord, line: u64) -> PrepResult<Self> {
        if record.len() != FIELD_COUNT {
            return Err(PrepError::Format(format!(
                "record {} has {} fields, expected {}",
                line,
                record.len(),
                FIELD_COUNT
            )));
        }

        let numeric = |idx: usize, name: &str| -> PrepResult<i64> {
            record[idx].trim().parse::<i64>().map_err(|_| {
                PrepError::Format(format!(
                    "record {}: field `{}` is not numeric: {:?}",
                    line, name, &record[idx]
                ))
            })
        };

        let duration = numeric(2, "duration")?;
        if duration < 0 {
            return Err(PrepError::Format(format!(
                "record {}: negative duration {}",
                line, duration
            )));
        }
        let start_slot = numeric(11, "start_slot")?;
        if start_slot < 0 {
            return Err(PrepError::Format(format!(
                "record {}: negative start slot {}",
                line, start_slot
            )));
        }

        Ok(Self {
            user_id: record[0].to_string(),
            title: record[1].to_string(),
            duration_minutes: duration as u32,
            registered_at: record[3].to_string(),
            starts_at: record[4].to_string(),
            start_year: record[5].to_string(),
            start_week: record[6].to_string(),
            reg_seq: numeric(7, "reg_seq")? as u32,
            reg_start_week_dist: numeric(8, "reg_start_week_dist")? as i32,
            reg_start_day_dist: numeric(9, "reg_start_day_dist")? as i32,
            recurrent: &record[10] != "False",
            start_slot: start_slot as usize,
        })
    }

    #[must_use]
    pub fn week_key(&self) -> WeekKey {
        WeekKey {
            user_id: self.user_id.clone(),
            year: self.start_year.clone(),
            week: self.start_week.clone(),
        }
    }
}

/// True for characters a title may contain: printable ASCII plus the usual
/// whitespace controls.
#[must_use]
pub fn is_printable(c: char) -> bool {
    (' '..='~').contains(&c) || matches!(c, '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

/// Split a title into word tokens.
///
/// Whitespace-separated chunks, with leading and trailing ASCII punctuation
/// peeled off into their own tokens, so "sync (weekly)" yields
/// `["sync", "(", "weekly", ")"]`.
#[must_use]
pub fn tokenize(title: &str, lowercase: bool) -> Vec<String> {
    let mut tokens = Vec::new();
    for chunk in title.split_whitespace() {
        let mut rest = chunk;
        let mut leading = Vec::new();
        while let Some(c) = rest.chars().next() {
            if !c.is_ascii_punctuation() {
                break;
            }
            leading.push(c.to_string());
            rest = &rest[c.len_utf8()..];
        }
        let mut trailing = Vec::new();
        while let Some(c) = rest.chars().last() {
            if !c.is_ascii_punctuation() {
                break;
            }
            trailing.push(c.to_string());
            rest = &rest[..rest.len() - c.len_utf8()];
        }
        tokens.append(&mut leading);
        if !rest.is_empty() {
            tokens.push(rest.to_string());
        }
        tokens.extend(trailing.into_iter().rev());
    }
    if lowercase {
        for token in &mut tokens {
            *token = token.to_lowercase();
        }
    }
    tokens
}

/// Whether a title violates the content-validity rules that mark its whole
/// week invalid: non-printable characters, too many tokens, or a token
/// exceeding the character-length cap.
#[must_use]
pub fn title_violates(title: &str, config: &PrepConfig) -> bool {
    if title.chars().any(|c| !is_printable(c)) {
        return true;
    }
    let tokens = tokenize(title, false);
    if tokens.len() > config.max_title_token_count {
        return true;
    }
    tokens
        .iter()
        .any(|t| t.chars().count() > config.max_token_char_length)
}

/// Streaming reader over the record source.
///
/// Yields `(RawEvent, is_new_week)` in file order and enforces the weekly
/// ordering contract: a sequence-0 record must open a week distinct from the
/// previous one, and every other record must continue the current week.
pub struct RecordStream {
    records: csv::StringRecordsIntoIter<File>,
    prev_week: Option<WeekKey>,
    line: u64,
}

impl RecordStream {
    /// Open a record file.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::Format`] if the file cannot be opened.
    pub fn open(path: &Path) -> PrepResult<Self> {
        let file = File::open(path).map_err(|e| {
            PrepError::Format(format!("failed to open {}: {}", path.display(), e))
        })?;
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);
        Ok(Self {
            records: reader.into_records(),
            prev_week: None,
            line: 0,
        })
    }
}

impl Iterator for RecordStream {
    type Item = PrepResult<(RawEvent, bool)>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(PrepError::Format(format!("CSV read error: {}", e)))),
        };
        self.line += 1;

        let event = match RawEvent::from_record(&record, self.line) {
            Ok(event) => event,
            Err(e) => return Some(Err(e)),
        };

        let key = event.week_key();
        let new_week = event.reg_seq == 0;
        if new_week {
            if self.prev_week.as_ref() == Some(&key) {
                return Some(Err(PrepError::Contract(format!(
                    "record {}: sequence 0 repeats week ({}, {}, {})",
                    self.line, key.user_id, key.year, key.week
                ))));
            }
        } else if self.prev_week.as_ref() != Some(&key) {
            return Some(Err(PrepError::Contract(format!(
                "record {}: sequence {} continues a week that was never opened",
                self.line, event.reg_seq
            ))));
        }
        self.prev_week = Some(key);

        Some(Ok((event, new_week)))
    }
}

/// Word-frequency table preserving first-seen order, so that vocabulary
/// indices derived from it are deterministic across builds.
#[derive(Debug, Default, Clone)]
pub struct WordCounts {
    index: HashMap<String, usize>,
    entries: Vec<(String, usize)>,
}

impl WordCounts {
    pub fn observe(&mut self, word: String) {
        match self.index.get(&word) {
            Some(&i) => self.entries[i].1 += 1,
            None => {
                self.index.insert(word.clone(), self.entries.len());
                self.entries.push((word, 1));
            }
        }
    }

    #[must_use]
    pub fn count(&self, word: &str) -> usize {
        self.index.get(word).map_or(0, |&i| self.entries[i].1)
    }

    #[must_use]
    pub fn contains(&self, word: &str) -> bool {
        self.index.contains_key(word)
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(w, c)| (w.as_str(), *c))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of the dictionary-build pass over a record file.
#[derive(Debug, Default)]
pub struct BuildOutcome {
    /// Frequencies of words from titles of valid weeks.
    pub word_counts: WordCounts,
    /// Weeks excluded from vocabulary building and example emission.
    pub invalid_weeks: HashSet<WeekKey>,
}

/// Dictionary-build pass: one full scan of the record file.
///
/// Buffers each week's titles and folds them into the word-frequency table
/// at the week transition (and at end of file), but only if the week stayed
/// valid. The first title violation marks the whole week invalid; remaining
/// records of that week are skipped without further checks.
///
/// # Errors
///
/// Propagates fatal format and ordering-contract errors from the stream.
pub fn build_word_counts(path: &Path, config: &PrepConfig) -> PrepResult<BuildOutcome> {
    let mut outcome = BuildOutcome::default();
    let mut week_titles: Vec<String> = Vec::new();
    let mut current_week: Option<WeekKey> = None;

    let mut fold_week = |titles: &[String], counts: &mut WordCounts| {
        for title in titles {
            for word in tokenize(title, config.lowercase_tokens) {
                counts.observe(word);
            }
        }
    };

    for item in RecordStream::open(path)? {
        let (event, new_week) = item?;
        let key = event.week_key();

        if new_week {
            if let Some(prev) = current_week.take() {
                if !outcome.invalid_weeks.contains(&prev) {
                    fold_week(&week_titles, &mut outcome.word_counts);
                }
            }
            week_titles.clear();
            current_week = Some(key.clone());
        }

        if outcome.invalid_weeks.contains(&key) {
            continue;
        }
        if title_violates(&event.title, config) {
            outcome.invalid_weeks.insert(key);
            continue;
        }
        week_titles.push(event.title);
    }

    if let Some(last) = current_week {
        if !outcome.invalid_weeks.contains(&last) {
            fold_week(&week_titles, &mut outcome.word_counts);
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn write_records(name: &str, lines: &[String]) -> PathBuf {
        let dir = std::env::temp_dir().join("calprep_test_records");
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join(name);
        fs::write(&path, lines.join("\n")).expect("write fixture");
        path
    }

    fn event_line(
        user: &str,
        title: &str,
        duration: u32,
        year: &str,
        week: &str,
        seq: u32,
        slot: usize,
    ) -> String {
        format!(
            "{user},{title},{duration},r,s,{year},{week},{seq},0,0,False,{slot}"
        )
    }

    #[test]
    fn test_tokenize_peels_punctuation() {
        assert_eq!(
            tokenize("sync (weekly)", false),
            vec!["sync", "(", "weekly", ")"]
        );
        assert_eq!(tokenize("1:1 w/ Sam.", false), vec!["1:1", "w", "/", "Sam", "."]);
        assert_eq!(tokenize("Team Sync", true), vec!["team", "sync"]);
        assert!(tokenize("   ", false).is_empty());
    }

    #[test]
    fn test_is_printable() {
        assert!(is_printable('a'));
        assert!(is_printable(' '));
        assert!(is_printable('~'));
        assert!(is_printable('\t'));
        assert!(!is_printable('\u{00e9}'));
        assert!(!is_printable('\u{0000}'));
    }

    #[test]
    fn test_title_violations() {
        let config = PrepConfig {
            max_title_token_count: 3,
            max_token_char_length: 8,
            ..PrepConfig::default()
        };
        assert!(!title_violates("quick chat", &config));
        assert!(title_violates("caf\u{00e9} chat", &config));
        assert!(title_violates("one two three four", &config));
        assert!(title_violates("retrospective", &config));
    }

    #[test]
    fn test_from_record_field_count() {
        let record = csv::StringRecord::from(vec!["u1", "title", "30"]);
        let err = RawEvent::from_record(&record, 1).unwrap_err();
        assert!(matches!(err, PrepError::Format(_)));
    }

    #[test]
    fn test_from_record_non_numeric_field() {
        let record = csv::StringRecord::from(vec![
            "u1", "title", "thirty", "r", "s", "2018", "10", "0", "0", "0", "False", "20",
        ]);
        let err = RawEvent::from_record(&record, 1).unwrap_err();
        assert!(matches!(err, PrepError::Format(_)));
    }

    #[test]
    fn test_stream_marks_new_weeks() {
        let path = write_records(
            "stream_weeks.csv",
            &[
                event_line("u1", "a", 30, "2018", "10", 0, 20),
                event_line("u1", "b", 30, "2018", "10", 1, 24),
                event_line("u1", "c", 30, "2018", "11", 0, 30),
            ],
        );
        let flags: Vec<bool> = RecordStream::open(&path)
            .unwrap()
            .map(|item| item.unwrap().1)
            .collect();
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn test_stream_rejects_orphan_continuation() {
        let path = write_records(
            "stream_orphan.csv",
            &[
                event_line("u1", "a", 30, "2018", "10", 0, 20),
                event_line("u2", "b", 30, "2018", "10", 1, 24),
            ],
        );
        let mut stream = RecordStream::open(&path).unwrap();
        assert!(stream.next().unwrap().is_ok());
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(err, PrepError::Contract(_)));
    }

    #[test]
    fn test_quoted_titles_survive_commas() {
        let path = write_records(
            "stream_quoted.csv",
            &["u1,\"lunch, then dentist\",30,r,s,2018,10,0,0,0,False,20".to_string()],
        );
        let (event, _) = RecordStream::open(&path).unwrap().next().unwrap().unwrap();
        assert_eq!(event.title, "lunch, then dentist");
    }

    #[test]
    fn test_build_word_counts_skips_invalid_weeks() {
        let path = write_records(
            "build_invalid.csv",
            &[
                // Week one: second title is unprintable, whole week excluded.
                event_line("u1", "planning", 30, "2018", "10", 0, 20),
                event_line("u1", "caf\u{00e9}", 30, "2018", "10", 1, 24),
                // Week two: valid throughout.
                event_line("u2", "planning review", 30, "2018", "10", 0, 30),
            ],
        );
        let outcome = build_word_counts(&path, &PrepConfig::default()).unwrap();
        assert_eq!(outcome.invalid_weeks.len(), 1);
        assert_eq!(outcome.word_counts.count("planning"), 1);
        assert_eq!(outcome.word_counts.count("review"), 1);
        assert_eq!(outcome.word_counts.count("caf\u{00e9}"), 0);
    }

    #[test]
    fn test_build_word_counts_folds_final_week() {
        let path = write_records(
            "build_final.csv",
            &[
                event_line("u1", "standup", 30, "2018", "10", 0, 20),
                event_line("u1", "standup notes", 30, "2018", "10", 1, 24),
            ],
        );
        let outcome = build_word_counts(&path, &PrepConfig::default()).unwrap();
        assert_eq!(outcome.word_counts.count("standup"), 2);
        assert_eq!(outcome.word_counts.count("notes"), 1);
    }

    #[test]
    fn test_word_counts_first_seen_order() {
        let mut counts = WordCounts::default();
        counts.observe("beta".to_string());
        counts.observe("alpha".to_string());
        counts.observe("beta".to_string());
        let order: Vec<&str> = counts.iter().map(|(w, _)| w).collect();
        assert_eq!(order, vec!["beta", "alpha"]);
        assert_eq!(counts.count("beta"), 2);
    }
}
