//! Frame sequencing and transmission planning tests.

use subgrid::{
    FrameSequencer, FrameSignal, SequencerState, SignalOptions, SubtitleEntry, Timeline,
    TransmissionMode, TransmissionPlan,
};

fn entry(index: u32, start_ms: u64, end_ms: u64, text: &str) -> SubtitleEntry {
    SubtitleEntry {
        index,
        start_ms,
        end_ms,
        text: text.to_string(),
    }
}

/// Step through `frames` frames at `fps`, recording the text of each packet
/// or `None` for an empty grid.
fn run(
    timeline: &Timeline,
    options: &SignalOptions,
    fps: f64,
    frames: u64,
) -> Vec<Option<String>> {
    let mut sequencer = FrameSequencer::new(timeline, options).expect("sequencer");
    (0..frames)
        .map(|frame| match sequencer.step(timeline.lookup_frame(frame, fps)) {
            FrameSignal::Packet(packet) => Some(packet.text()),
            FrameSignal::Empty => None,
        })
        .collect()
}

// ── Sequenced mode ─────────────────────────────────────────────────

#[test]
fn sends_each_packet_repeated_then_goes_quiet() {
    let text = "a".repeat(18) + "bbb";
    let timeline = Timeline::new(vec![entry(1, 0, 2000, &text)]);
    let signals = run(&timeline, &SignalOptions::new(), 10.0, 12);

    let first = "a".repeat(18);
    for signal in &signals[..4] {
        assert_eq!(signal.as_deref(), Some(first.as_str()));
    }
    for signal in &signals[4..8] {
        assert_eq!(signal.as_deref(), Some("bbb"));
    }
    assert!(signals[8..].iter().all(Option::is_none));
}

#[test]
fn gaps_between_subtitles_are_empty() {
    let timeline = Timeline::new(vec![
        entry(1, 0, 500, "one"),
        entry(2, 1500, 2000, "two"),
    ]);
    let signals = run(&timeline, &SignalOptions::new().with_repetition(2), 10.0, 21);

    assert_eq!(signals[0].as_deref(), Some("one"));
    assert_eq!(signals[1].as_deref(), Some("one"));
    assert!(signals[2..15].iter().all(Option::is_none));
    assert_eq!(signals[15].as_deref(), Some("two"));
    assert_eq!(signals[16].as_deref(), Some("two"));
    assert!(signals[17..].iter().all(Option::is_none));
}

#[test]
fn identical_text_on_a_new_index_restarts() {
    let timeline = Timeline::new(vec![
        entry(1, 0, 250, "same"),
        entry(2, 251, 1000, "same"),
    ]);
    let options = SignalOptions::new();
    let mut sequencer = FrameSequencer::new(&timeline, &options).expect("sequencer");

    for frame in 0..3 {
        let active = timeline.lookup_frame(frame, 10.0);
        assert!(matches!(sequencer.step(active), FrameSignal::Packet(_)));
    }
    assert_eq!(
        sequencer.state(),
        SequencerState::Transmitting {
            subtitle_index: 1,
            cursor: 3
        }
    );

    let active = timeline.lookup_frame(3, 10.0);
    assert!(matches!(sequencer.step(active), FrameSignal::Packet(_)));
    assert_eq!(
        sequencer.state(),
        SequencerState::Transmitting {
            subtitle_index: 2,
            cursor: 1
        }
    );
}

#[test]
fn short_subtitle_only_gets_a_prefix() {
    let text = "x".repeat(40);
    let timeline = Timeline::new(vec![entry(7, 0, 200, &text)]);
    let options = SignalOptions::new();

    let signals = run(&timeline, &options, 10.0, 6);
    let first = "x".repeat(18);
    for signal in &signals[..3] {
        assert_eq!(signal.as_deref(), Some(first.as_str()));
    }
    assert!(signals[3..].iter().all(Option::is_none));

    let plan = TransmissionPlan::new(&timeline, &options, 10.0).expect("plan");
    let subtitle = &plan.subtitles()[0];
    assert_eq!(subtitle.packets, 3);
    assert_eq!(subtitle.sequence_len, 12);
    assert_eq!(subtitle.display_frames, 3);
    assert!(!subtitle.fits);
    assert_eq!(plan.incomplete().count(), 1);
    assert!(!plan.all_fit());
}

#[test]
fn whitespace_only_text_sends_nothing() {
    let timeline = Timeline::new(vec![entry(1, 0, 1000, "   ")]);
    let signals = run(&timeline, &SignalOptions::new(), 10.0, 5);
    assert!(signals.iter().all(Option::is_none));
}

#[test]
fn reset_forgets_the_previous_subtitle() {
    let timeline = Timeline::new(vec![entry(1, 0, 1000, "again")]);
    let mut sequencer = FrameSequencer::new(&timeline, &SignalOptions::new()).expect("sequencer");
    let active = timeline.lookup(0);

    for _ in 0..4 {
        sequencer.step(active);
    }
    assert!(matches!(sequencer.step(active), FrameSignal::Empty));

    sequencer.reset();
    assert_eq!(sequencer.state(), SequencerState::Idle);
    assert!(matches!(sequencer.step(active), FrameSignal::Packet(_)));
}

// ── Continuous mode ────────────────────────────────────────────────

#[test]
fn continuous_mode_repeats_the_first_packet() {
    let text = "continuous mode keeps going";
    let timeline = Timeline::new(vec![entry(1, 0, 900, text)]);
    let options = SignalOptions::new().with_mode(TransmissionMode::Continuous);
    let signals = run(&timeline, &options, 10.0, 12);

    let prefix: String = text.chars().take(18).collect();
    for signal in &signals[..10] {
        assert_eq!(signal.as_deref(), Some(prefix.as_str()));
    }
    assert!(signals[10..].iter().all(Option::is_none));

    let plan = TransmissionPlan::new(&timeline, &options, 10.0).expect("plan");
    assert_eq!(plan.subtitles()[0].sequence_len, 1);
    assert!(!plan.subtitles()[0].fits, "text longer than one packet");
}

// ── Planning ───────────────────────────────────────────────────────

#[test]
fn plan_counts_display_frames() {
    let timeline = Timeline::new(vec![
        entry(1, 0, 1000, "fits easily"),
        entry(2, 5000, 5000, "one frame"),
    ]);
    let plan = TransmissionPlan::new(&timeline, &SignalOptions::new(), 10.0).expect("plan");

    let subtitles = plan.subtitles();
    assert_eq!(subtitles[0].display_frames, 11);
    assert_eq!(subtitles[0].sequence_len, 4);
    assert!(subtitles[0].fits);
    assert_eq!(subtitles[1].display_frames, 1);
    assert!(!subtitles[1].fits);
}
