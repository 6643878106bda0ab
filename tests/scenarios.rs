// End-to-end trial scenarios against the public trainer API with a simulated
// player sampled every frame at 60 Hz and a hand-driven clock.

use assert_matches::assert_matches;
use impact_trainer::clip::{ClipDescriptor, ReasonCode, TrialOutcome};
use impact_trainer::clock::{Clock, ManualClock};
use impact_trainer::config::{Config, SamplingMode};
use impact_trainer::manifest::parse_manifest;
use impact_trainer::playback::SimulatedPlayback;
use impact_trainer::selection::SelectionStrategy;
use impact_trainer::session::{Session, SessionStats};
use impact_trainer::trainer::{InputSource, Trainer, TrainerSettings, TrainerState};

const MANIFEST: &str = r#"[
    {"id": "a", "src": "/clips/a.mp4", "driveImpactTime": 2.0},
    {"id": "b", "src": "/clips/b.mp4", "driveImpactTime": null}
]"#;

fn build(config: &Config) -> Trainer<SimulatedPlayback> {
    Trainer::new(
        parse_manifest(MANIFEST).unwrap(),
        SimulatedPlayback::new(config.sampling(), config.default_clip_secs),
        Session::new(config.selection, config.seed),
        TrainerSettings::from(config),
    )
    .unwrap()
}

fn sequential() -> Config {
    Config {
        selection: SelectionStrategy::Sequential,
        seed: Some(11),
        ..Config::default()
    }
}

/// Advance the clock in 4 ms steps until `until`, ticking the trainer.
fn run_until(
    trainer: &mut Trainer<SimulatedPlayback>,
    clock: &ManualClock,
    until: f64,
) -> Vec<TrialOutcome> {
    let mut outcomes = Vec::new();
    while clock.now_ms() < until {
        clock.advance(4.0);
        outcomes.extend(trainer.tick(clock.now_ms()));
    }
    outcomes
}

#[test]
fn reaction_inside_window_is_good_with_measured_time() {
    let clock = ManualClock::new();
    let mut trainer = build(&sequential());
    trainer.start(clock.now_ms());

    assert!(run_until(&mut trainer, &clock, 2100.0).is_empty());
    let outcome = trainer.react(clock.now_ms(), InputSource::Pointer).unwrap();

    assert_eq!(outcome.clip_id, "a");
    assert!(outcome.success);
    assert_eq!(outcome.reason, ReasonCode::GoodReaction);
    assert!((outcome.reaction_time_ms.unwrap() - 100.0).abs() < 1e-6);
    assert_eq!(trainer.stats(), SessionStats { pass: 1, fail: 0 });
}

#[test]
fn no_reaction_until_deadline_is_missed() {
    let clock = ManualClock::new();
    let mut trainer = build(&sequential());
    trainer.start(clock.now_ms());

    let outcomes = run_until(&mut trainer, &clock, 2420.0);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].reason, ReasonCode::Missed);
    assert!(!outcomes[0].success);
    assert_eq!(trainer.stats(), SessionStats { pass: 0, fail: 1 });
}

#[test]
fn holding_still_on_no_event_clip_is_a_dodge() {
    let clock = ManualClock::new();
    let mut trainer = build(&sequential());
    trainer.start(clock.now_ms());

    // a resolves missed at ~2417 ms, b starts a second later and ends 4 s after that.
    let outcomes = run_until(&mut trainer, &clock, 7500.0);
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[1].clip_id, "b");
    assert_eq!(outcomes[1].reason, ReasonCode::Dodged);
    assert_eq!(trainer.stats(), SessionStats { pass: 1, fail: 1 });
}

#[test]
fn early_input_is_too_soon_and_locks_the_trial() {
    let clock = ManualClock::new();
    let mut trainer = build(&sequential());
    trainer.start(clock.now_ms());

    run_until(&mut trainer, &clock, 1500.0);
    let outcome = trainer.react(clock.now_ms(), InputSource::Key).unwrap();
    assert_eq!(outcome.reason, ReasonCode::TooSoon);

    // Nothing else resolves before the next clip begins.
    assert!(trainer.react(1600.0, InputSource::Key).is_none());
    assert!(run_until(&mut trainer, &clock, 2504.0).is_empty());
    assert_matches!(trainer.state(), TrainerState::Playing);
    assert_eq!(trainer.current_clip().unwrap().id, "b");
    assert_eq!(trainer.stats().total(), 1);
}

#[test]
fn coarse_polling_still_scores_the_window_from_the_impact() {
    let clock = ManualClock::new();
    let config = Config {
        sampling: SamplingMode::Polled,
        poll_interval_ms: 250.0,
        ..sequential()
    };
    let mut trainer = build(&config);
    trainer.start(clock.now_ms());

    // Polling lands on exactly 2000 here, so check a reaction between polls.
    run_until(&mut trainer, &clock, 2120.0);
    let outcome = trainer.react(clock.now_ms(), InputSource::Pointer).unwrap();
    assert_eq!(outcome.reason, ReasonCode::GoodReaction);
    assert!((outcome.reaction_time_ms.unwrap() - 120.0).abs() < 1e-6);
}

#[test]
fn reaction_racing_ahead_of_sampling_is_back_dated() {
    let clock = ManualClock::new();
    let config = Config {
        sampling: SamplingMode::Polled,
        poll_interval_ms: 300.0,
        ..sequential()
    };
    let mut trainer = build(&config);
    trainer.start(clock.now_ms());

    // Last poll at 1800 ms; the input's own position reading opens the window.
    run_until(&mut trainer, &clock, 2080.0);
    assert!(!trainer.view(clock.now_ms()).window_open);
    let outcome = trainer.react(clock.now_ms(), InputSource::Pointer).unwrap();
    assert_eq!(outcome.reason, ReasonCode::GoodReaction);
    assert!((outcome.reaction_time_ms.unwrap() - 80.0).abs() < 1e-6);
}

#[test]
fn uniform_selection_never_repeats_back_to_back() {
    let clock = ManualClock::new();
    let config = Config {
        selection: SelectionStrategy::Uniform,
        seed: Some(5),
        ..Config::default()
    };
    let mut trainer = build(&config);
    trainer.start(clock.now_ms());

    let mut shown = vec![trainer.current_clip().unwrap().id.clone()];
    for _ in 0..10 {
        let now = clock.now_ms() + 10.0;
        clock.set(now);
        trainer.react(now, InputSource::Key);
        run_until(&mut trainer, &clock, now + 1004.0);
        shown.push(trainer.current_clip().unwrap().id.clone());
    }
    assert!(shown.windows(2).all(|w| w[0] != w[1]), "{shown:?}");
    assert_eq!(trainer.stats().total(), 10);
}

#[test]
fn impact_past_clip_end_resolves_missed() {
    let clips = vec![ClipDescriptor::new("x", "x.mp4", Some(9.0)).with_duration(3.0)];
    let clock = ManualClock::new();
    let config = sequential();
    let mut trainer = Trainer::new(
        clips,
        SimulatedPlayback::new(config.sampling(), config.default_clip_secs),
        Session::new(config.selection, config.seed),
        TrainerSettings::from(&config),
    )
    .unwrap();
    trainer.start(clock.now_ms());

    // Impact past the end of the clip: end of media resolves it as missed.
    let outcomes = run_until(&mut trainer, &clock, 3100.0);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].reason, ReasonCode::Missed);
}
