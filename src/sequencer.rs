//! Per-frame transmission state machine.
//!
//! [`FrameSequencer`] decides, for every frame, which packet (if any) goes
//! into the grid. It is edge-triggered on the active subtitle's index: when
//! the index changes it restarts at the beginning of that subtitle's
//! precomputed [`PacketSequence`], emits one packet per frame until the
//! sequence is exhausted, then emits the empty grid until the next change.
//!
//! [`TransmissionPlan`] answers the same question ahead of time: how many
//! frames each subtitle is on screen and whether its whole sequence fits.
//!
//! # Example
//!
//! ```
//! use subgrid::{FrameSequencer, FrameSignal, SignalOptions, Timeline};
//!
//! let timeline = Timeline::from_srt_str("1\n00:00:00,000 --> 00:00:01,000\nHi\n");
//! let mut sequencer = FrameSequencer::new(&timeline, &SignalOptions::new())?;
//!
//! let active = timeline.lookup(0);
//! for _ in 0..4 {
//!     assert!(matches!(sequencer.step(active), FrameSignal::Packet(_)));
//! }
//! assert!(matches!(sequencer.step(active), FrameSignal::Empty));
//! # Ok::<(), subgrid::SubgridError>(())
//! ```

use std::collections::HashMap;

use crate::configuration::{SignalOptions, TransmissionMode};
use crate::error::SubgridError;
use crate::packet::{Packet, PacketEncoder, PacketSequence};
use crate::timeline::{SubtitleEntry, Timeline};
use crate::utilities::frames_in_span;

/// Transmission state carried from one frame to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencerState {
    /// Nothing to send.
    #[default]
    Idle,
    /// Walking a subtitle's packet sequence.
    Transmitting {
        /// Index of the subtitle being sent.
        subtitle_index: u32,
        /// Position of the next packet to emit.
        cursor: usize,
    },
}

/// What to embed in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSignal<'a> {
    /// Embed this packet.
    Packet(&'a Packet),
    /// Embed the all-zero grid.
    Empty,
}

/// Selects one packet per frame as the active subtitle changes.
#[derive(Debug, Clone)]
pub struct FrameSequencer {
    encoder: PacketEncoder,
    mode: TransmissionMode,
    cache: HashMap<u32, PacketSequence>,
    previous: Option<u32>,
    state: SequencerState,
}

impl FrameSequencer {
    /// Precompute the packet sequence of every subtitle in `timeline`.
    ///
    /// # Errors
    ///
    /// Returns [`SubgridError::InvalidGrid`] for an unusable grid shape.
    pub fn new(timeline: &Timeline, options: &SignalOptions) -> Result<Self, SubgridError> {
        let encoder = PacketEncoder::from_options(options)?;
        let cache: HashMap<u32, PacketSequence> = timeline
            .entries()
            .iter()
            .map(|entry| (entry.index, build_sequence(&encoder, options.mode, &entry.text)))
            .collect();

        log::debug!(
            "Prepared {} packet sequences ({:?} mode, {} chars per packet)",
            cache.len(),
            options.mode,
            encoder.grid().capacity_chars()
        );

        Ok(Self {
            encoder,
            mode: options.mode,
            cache,
            previous: None,
            state: SequencerState::Idle,
        })
    }

    /// The encoder used to build the cached sequences.
    pub fn encoder(&self) -> &PacketEncoder {
        &self.encoder
    }

    /// The current state.
    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// The cached sequence for a subtitle index.
    pub fn sequence(&self, subtitle_index: u32) -> Option<&PacketSequence> {
        self.cache.get(&subtitle_index)
    }

    /// Forget the previous frame and return to [`SequencerState::Idle`].
    pub fn reset(&mut self) {
        self.previous = None;
        self.state = SequencerState::Idle;
    }

    /// Advance one frame given the subtitle active on it.
    pub fn step(&mut self, active: Option<&SubtitleEntry>) -> FrameSignal<'_> {
        let active_index = active.map(|entry| entry.index);
        if active_index != self.previous {
            self.previous = active_index;
            self.state = match active_index {
                Some(index) if self.cache.get(&index).is_some_and(|s| !s.is_empty()) => {
                    SequencerState::Transmitting {
                        subtitle_index: index,
                        cursor: 0,
                    }
                }
                _ => SequencerState::Idle,
            };
            log::debug!("Subtitle changed to {active_index:?}: {:?}", self.state);
        }

        let SequencerState::Transmitting {
            subtitle_index,
            cursor,
        } = &mut self.state
        else {
            return FrameSignal::Empty;
        };
        let Some(sequence) = self.cache.get(&*subtitle_index) else {
            return FrameSignal::Empty;
        };

        match self.mode {
            TransmissionMode::Sequenced => match sequence.get(*cursor) {
                Some(packet) => {
                    *cursor += 1;
                    FrameSignal::Packet(packet)
                }
                None => FrameSignal::Empty,
            },
            TransmissionMode::Continuous => {
                sequence.get(0).map_or(FrameSignal::Empty, FrameSignal::Packet)
            }
        }
    }
}

fn build_sequence(encoder: &PacketEncoder, mode: TransmissionMode, text: &str) -> PacketSequence {
    match mode {
        TransmissionMode::Sequenced => encoder.sequence(text),
        TransmissionMode::Continuous => encoder.single(text),
    }
}

/// Transmission budget for one subtitle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitlePlan {
    /// Subtitle index.
    pub index: u32,
    /// Distinct packets the text splits into.
    pub packets: usize,
    /// Frames needed to send the whole sequence once.
    pub sequence_len: usize,
    /// Frames the subtitle is on screen.
    pub display_frames: u64,
    /// Whether the whole text reaches the grid. In sequenced mode the
    /// sequence must fit the display frames; in continuous mode the text
    /// must fit one packet.
    pub fits: bool,
}

/// Per-subtitle transmission budget at a given frame rate.
#[derive(Debug, Clone, Default)]
pub struct TransmissionPlan {
    subtitles: Vec<SubtitlePlan>,
}

impl TransmissionPlan {
    /// Compute the plan for every subtitle in `timeline`.
    ///
    /// # Errors
    ///
    /// Returns [`SubgridError::InvalidGrid`] for an unusable grid shape.
    pub fn new(
        timeline: &Timeline,
        options: &SignalOptions,
        frames_per_second: f64,
    ) -> Result<Self, SubgridError> {
        let encoder = PacketEncoder::from_options(options)?;
        let subtitles = timeline
            .entries()
            .iter()
            .map(|entry| {
                let packets = if entry.text.trim().is_empty() {
                    0
                } else {
                    encoder.text_to_packets(&entry.text).len()
                };
                let sequence_len = build_sequence(&encoder, options.mode, &entry.text).len();
                let display_frames = frames_in_span(entry.start_ms, entry.end_ms, frames_per_second);
                let fits = match options.mode {
                    TransmissionMode::Sequenced => sequence_len as u64 <= display_frames,
                    TransmissionMode::Continuous => {
                        packets <= 1 && (packets == 0 || display_frames > 0)
                    }
                };
                SubtitlePlan {
                    index: entry.index,
                    packets,
                    sequence_len,
                    display_frames,
                    fits,
                }
            })
            .collect();

        Ok(Self { subtitles })
    }

    /// One plan per subtitle, in timeline order.
    pub fn subtitles(&self) -> &[SubtitlePlan] {
        &self.subtitles
    }

    /// Subtitles whose text will not fully reach the grid.
    pub fn incomplete(&self) -> impl Iterator<Item = &SubtitlePlan> {
        self.subtitles.iter().filter(|plan| !plan.fits)
    }

    /// `true` if every subtitle fits.
    pub fn all_fit(&self) -> bool {
        self.subtitles.iter().all(|plan| plan.fits)
    }
}
