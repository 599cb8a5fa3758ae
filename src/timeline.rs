//! Time-ranged subtitle entries.
//!
//! A [`Timeline`] is built once from parsed subtitles and is read-only
//! afterwards. It answers one question: which entry is on screen at a given
//! millisecond.
//!
//! # Example
//!
//! ```
//! use subgrid::Timeline;
//!
//! let timeline = Timeline::from_srt_str(
//!     "1\n00:00:01,000 --> 00:00:02,500\nHello there\n\n\
//!      2\n00:00:03,000 --> 00:00:04,000\nGeneral Kenobi\n",
//! );
//!
//! assert_eq!(timeline.lookup_text(2500), "Hello there");
//! assert_eq!(timeline.lookup_text(2501), "");
//! assert_eq!(timeline.lookup(3000).map(|entry| entry.index), Some(2));
//! ```

use std::path::Path;

use crate::error::SubgridError;
use crate::srt;
use crate::utilities::frame_time_ms;

/// One subtitle cue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubtitleEntry {
    /// Identifier from the subtitle file, unique within a timeline.
    pub index: u32,
    /// First millisecond the cue is shown (inclusive).
    pub start_ms: u64,
    /// Last millisecond the cue is shown (inclusive).
    pub end_ms: u64,
    /// Display text, lines joined with single spaces.
    pub text: String,
}

impl SubtitleEntry {
    /// Whether the cue is on screen at `time_ms`.
    pub fn covers(&self, time_ms: u64) -> bool {
        self.start_ms <= time_ms && time_ms <= self.end_ms
    }

    /// Milliseconds between the first and last shown instant.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Subtitle entries in file order.
///
/// Entries are assumed not to overlap; when they do, the first one in file
/// order wins.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Vec<SubtitleEntry>,
}

impl Timeline {
    /// Wrap already-parsed entries.
    pub fn new(entries: Vec<SubtitleEntry>) -> Self {
        Self { entries }
    }

    /// Parse SRT text. Malformed blocks are skipped.
    pub fn from_srt_str(content: &str) -> Self {
        Self::new(srt::parse_srt(content))
    }

    /// Load and parse an SRT file.
    ///
    /// # Errors
    ///
    /// Returns [`SubgridError::IoError`] if the file cannot be read.
    pub fn from_srt_file<P: AsRef<Path>>(path: P) -> Result<Self, SubgridError> {
        let path = path.as_ref();
        let entries = srt::load_srt(path)?;
        log::info!(
            "Loaded {} subtitles from {}",
            entries.len(),
            path.display()
        );
        Ok(Self::new(entries))
    }

    /// All entries in file order.
    pub fn entries(&self) -> &[SubtitleEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the timeline has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry with subtitle index `index`.
    pub fn get(&self, index: u32) -> Option<&SubtitleEntry> {
        self.entries.iter().find(|entry| entry.index == index)
    }

    /// The first entry in file order whose `[start, end]` range contains
    /// `time_ms`.
    pub fn lookup(&self, time_ms: u64) -> Option<&SubtitleEntry> {
        self.entries.iter().find(|entry| entry.covers(time_ms))
    }

    /// Text of the active entry at `time_ms`, or `""` when none is active.
    pub fn lookup_text(&self, time_ms: u64) -> &str {
        self.lookup(time_ms).map_or("", |entry| entry.text.as_str())
    }

    /// The active entry for a 0-based frame number at `frames_per_second`.
    pub fn lookup_frame(
        &self,
        frame_number: u64,
        frames_per_second: f64,
    ) -> Option<&SubtitleEntry> {
        self.lookup(frame_time_ms(frame_number, frames_per_second))
    }
}
