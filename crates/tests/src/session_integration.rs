//! Integration tests for the training session
//!
//! These drive a full session (chain, round engine, offline output) through
//! its command surface and check what the player would see and hear.

use eqtrain_core::domain::output::same_node;
use eqtrain_core::domain::{
    Command, CommandResult, FileHandle, GuessFeedback, GuessOutcome, Route,
    SessionEvent, SignalSourceKind,
};
use eqtrain_infra::SymphoniaLoader;
use eqtrain_tests::{offline_session, reset_until_target, rms, sine, MemoryLoader};
use std::io::Write;
use std::time::{Duration, Instant};

fn guess(frequency: f32, gain_db: f32) -> Command {
    Command::SubmitGuess { frequency, gain_db }
}

fn outcome(result: CommandResult) -> GuessOutcome {
    match result {
        CommandResult::GuessSubmitted { outcome } => outcome,
        other => panic!("expected a guess result, got {:?}", other),
    }
}

// ============================================================================
// SCORING
// ============================================================================

#[test]
fn test_correct_guess_scores() {
    let (mut session, _tap) = offline_session(11, MemoryLoader::new());
    let now = Instant::now();
    reset_until_target(&mut session, 1000.0, 6.0, now);

    let result = session.execute(guess(1000.0, 6.0), now);

    assert_eq!(outcome(result), GuessOutcome::Correct);
    let snapshot = session.snapshot();
    assert!(snapshot.is_correct_guess);
    assert!(snapshot.has_guessed);
    assert_eq!(snapshot.score, 1);
    assert_eq!(snapshot.total_tries, 1);
}

#[test]
fn test_wrong_guess_counts_try_only() {
    let (mut session, _tap) = offline_session(12, MemoryLoader::new());
    let now = Instant::now();
    reset_until_target(&mut session, 1000.0, 6.0, now);

    let result = session.execute(guess(500.0, -6.0), now);

    assert_eq!(outcome(result), GuessOutcome::Incorrect);
    let snapshot = session.snapshot();
    assert!(!snapshot.is_correct_guess);
    assert_eq!(snapshot.score, 0);
    assert_eq!(snapshot.total_tries, 1);
}

#[test]
fn test_second_guess_in_round_is_ignored() {
    let (mut session, _tap) = offline_session(13, MemoryLoader::new());
    let now = Instant::now();
    reset_until_target(&mut session, 1000.0, 6.0, now);

    session.execute(guess(500.0, -6.0), now);
    let second = session.execute(guess(1000.0, 6.0), now);

    assert_eq!(outcome(second), GuessOutcome::Ignored);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.score, 0);
    assert_eq!(snapshot.total_tries, 1);
    assert!(!snapshot.is_correct_guess);
}

#[test]
fn test_off_grid_guess_changes_nothing() {
    let (mut session, _tap) = offline_session(14, MemoryLoader::new());
    let now = Instant::now();
    session.execute(Command::ResetGame, now);
    let before = session.snapshot();

    let result = session.execute(guess(1234.0, 6.0), now);

    assert_eq!(outcome(result), GuessOutcome::Invalid);
    assert_eq!(session.snapshot(), before);
    assert_eq!(session.next_deadline(), None);
}

#[test]
fn test_reset_zeroes_and_starts_round() {
    let (mut session, _tap) = offline_session(15, MemoryLoader::new());
    let now = Instant::now();
    session.execute(Command::ResetGame, now);

    for _ in 0..3 {
        let target = session.round().target();
        session.execute(guess(target.center_frequency(), target.gain_db()), now);
        session.poll(now + Duration::from_secs(5));
    }
    assert_eq!(session.snapshot().score, 3);

    assert_eq!(session.execute(Command::ResetGame, now), CommandResult::GameReset);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.score, 0);
    assert_eq!(snapshot.total_tries, 0);
    assert!(!snapshot.has_guessed);
    assert!(snapshot.is_playing);
    assert!(!snapshot.eq_bypassed);
}

// ============================================================================
// ROUND TIMELINE
// ============================================================================

#[test]
fn test_wrong_guess_plays_guess_then_reveals_then_advances() {
    let (mut session, _tap) = offline_session(21, MemoryLoader::new());
    let start = Instant::now();
    reset_until_target(&mut session, 1000.0, 6.0, start);
    let target = session.round().target();

    session.execute(guess(500.0, -6.0), start);
    assert!(session.chain().eq_settings().matches(500.0, -6.0));
    assert_eq!(session.next_deadline(), Some(start + Duration::from_millis(1000)));

    // Nothing fires early
    assert_eq!(session.poll(start + Duration::from_millis(999)), 0);
    assert!(session.chain().eq_settings().matches(500.0, -6.0));

    assert_eq!(session.poll(start + Duration::from_millis(1000)), 1);
    assert_eq!(session.chain().eq_settings(), target);
    assert!(session.snapshot().has_guessed);

    // The advance is measured from the reveal
    assert_eq!(session.next_deadline(), Some(start + Duration::from_millis(2500)));
    assert_eq!(session.poll(start + Duration::from_millis(2500)), 1);
    let snapshot = session.snapshot();
    assert!(!snapshot.has_guessed);
    assert_eq!(snapshot.total_tries, 1);
    assert_eq!(session.next_deadline(), None);
}

#[test]
fn test_late_poll_runs_reveal_and_advance_together() {
    let (mut session, _tap) = offline_session(22, MemoryLoader::new());
    let start = Instant::now();
    reset_until_target(&mut session, 1000.0, 6.0, start);

    session.execute(guess(250.0, 6.0), start);

    assert_eq!(session.poll(start + Duration::from_secs(10)), 2);
    assert!(!session.snapshot().has_guessed);
}

#[test]
fn test_correct_guess_advances_after_one_delay() {
    let (mut session, _tap) = offline_session(23, MemoryLoader::new());
    let start = Instant::now();
    session.execute(Command::ResetGame, start);
    let target = session.round().target();

    session.execute(guess(target.center_frequency(), target.gain_db()), start);
    assert_eq!(session.chain().eq_settings(), target);

    assert_eq!(session.poll(start + Duration::from_millis(1000)), 1);
    assert!(!session.snapshot().has_guessed);
    assert_eq!(session.snapshot().score, 1);
}

#[test]
fn test_reset_mid_resolution_cancels_stale_reveal() {
    let (mut session, _tap) = offline_session(24, MemoryLoader::new());
    let start = Instant::now();
    reset_until_target(&mut session, 1000.0, 6.0, start);
    session.execute(guess(500.0, -6.0), start);

    session.execute(Command::ResetGame, start + Duration::from_millis(200));
    let fresh = session.round().target();

    assert_eq!(session.next_deadline(), None);
    assert_eq!(session.poll(start + Duration::from_secs(10)), 0);
    assert_eq!(session.chain().eq_settings(), fresh);
    assert_eq!(session.snapshot().total_tries, 0);
}

#[test]
fn test_source_change_mid_resolution_starts_fresh_round() {
    let (mut session, tap) = offline_session(25, MemoryLoader::new());
    let start = Instant::now();
    reset_until_target(&mut session, 1000.0, 6.0, start);
    session.execute(guess(500.0, -6.0), start);

    let result = session.execute(
        Command::SetSource {
            kind: SignalSourceKind::BrownNoise,
        },
        start,
    );

    assert_eq!(
        result,
        CommandResult::SourceChanged {
            name: "Brownian Noise".to_string()
        }
    );
    let snapshot = session.snapshot();
    assert!(!snapshot.has_guessed);
    assert_eq!(snapshot.total_tries, 1);
    assert!(snapshot.is_playing);
    assert!(tap.is_running());
    assert_eq!(session.poll(start + Duration::from_secs(10)), 0);
    assert_eq!(session.chain().eq_settings(), session.round().target());
}

// ============================================================================
// PLAYBACK AND ROUTING
// ============================================================================

#[test]
fn test_start_is_idempotent() {
    let (mut session, tap) = offline_session(31, MemoryLoader::new());
    let now = Instant::now();

    session.execute(Command::ResetGame, now);
    session.execute(Command::ResetGame, now);

    assert!(session.snapshot().is_playing);
    assert_eq!(tap.start_count(), 1);
    assert!(same_node(
        &tap.connected().expect("connected"),
        &session.chain().output_node()
    ));
}

#[test]
fn test_exactly_one_route_after_every_step() {
    let (mut session, tap) = offline_session(32, MemoryLoader::new().with_clip(
        "/clips/tone.wav",
        sine(440.0, 48000, 0.5),
    ));
    let now = Instant::now();

    let check = |session: &eqtrain_core::domain::Session| {
        let expected = if session.snapshot().eq_bypassed {
            Route::Raw
        } else {
            Route::Filtered
        };
        assert_eq!(session.routing(), Some(expected));
        assert!(same_node(
            &tap.connected().expect("connected"),
            &session.chain().output_node()
        ));
    };

    check(&session);
    let steps = vec![
        Command::ToggleBypass,
        Command::SetSource {
            kind: SignalSourceKind::PinkNoise,
        },
        Command::TogglePlayback,
        Command::ToggleBypass,
        Command::LoadFile {
            handle: FileHandle::from_path("/clips/tone.wav"),
        },
        Command::ToggleBypass,
        Command::LoadFile {
            handle: FileHandle::from_path("/clips/missing.wav"),
        },
        Command::SetSource {
            kind: SignalSourceKind::WhiteNoise,
        },
        Command::TogglePlayback,
        Command::ToggleBypass,
    ];
    for command in steps {
        session.execute(command, now);
        check(&session);
    }
}

#[test]
fn test_switch_to_pink_while_playing_filtered() {
    let (mut session, tap) = offline_session(33, MemoryLoader::new());
    let now = Instant::now();
    session.execute(Command::ResetGame, now);
    assert!(session.snapshot().is_playing);
    assert!(!session.snapshot().eq_bypassed);

    session.execute(
        Command::SetSource {
            kind: SignalSourceKind::PinkNoise,
        },
        now,
    );

    let snapshot = session.snapshot();
    assert!(snapshot.is_playing);
    assert!(!snapshot.eq_bypassed);
    assert_eq!(snapshot.current_sample, "pink-noise");
    assert_eq!(snapshot.current_audio_file_name, "Pink Noise");
    assert_eq!(session.routing(), Some(Route::Filtered));
    assert!(tap.is_running());

    assert_eq!(session.chain().source_kind(), &SignalSourceKind::PinkNoise);
    let connected = tap.connected().expect("connected");
    assert!(same_node(&connected, &session.chain().output_node()));
    assert!(rms(&tap.render(4800)) > 0.01);
}

#[test]
fn test_bypass_while_playing_restarts_output() {
    let (mut session, tap) = offline_session(34, MemoryLoader::new());
    let now = Instant::now();
    session.execute(Command::ResetGame, now);

    assert_eq!(
        session.execute(Command::ToggleBypass, now),
        CommandResult::BypassToggled { bypassed: true }
    );

    assert!(tap.is_running());
    assert_eq!(tap.start_count(), 2);
    assert_eq!(session.routing(), Some(Route::Raw));
    assert!(rms(&tap.render(4800)) > 0.01);
}

#[test]
fn test_volume_reaches_output() {
    let (mut session, tap) = offline_session(35, MemoryLoader::new());
    let now = Instant::now();
    session.execute(Command::ToggleBypass, now);
    session.execute(Command::TogglePlayback, now);
    let loud = rms(&tap.render(9600));

    session.execute(Command::SetVolume { volume: 0.1 }, now);
    let quiet = rms(&tap.render(9600));

    assert!(quiet < loud * 0.5, "quiet {} loud {}", quiet, loud);

    assert_eq!(
        session.execute(Command::SetVolume { volume: 3.0 }, now),
        CommandResult::VolumeChanged { volume: 1.0 }
    );
}

#[test]
fn test_stopped_session_is_silent() {
    let (mut session, tap) = offline_session(36, MemoryLoader::new());
    let now = Instant::now();
    session.execute(Command::ResetGame, now);
    session.execute(Command::TogglePlayback, now);

    assert!(!session.snapshot().is_playing);
    assert!(!tap.is_running());
    assert_eq!(rms(&tap.render(512)), 0.0);
}

// ============================================================================
// FAILURES
// ============================================================================

#[test]
fn test_failed_load_leaves_source_playing() {
    let (mut session, tap) = offline_session(41, MemoryLoader::new());
    let now = Instant::now();
    session.execute(Command::ResetGame, now);
    let before = session.snapshot();
    let node_before = session.chain().output_node();
    let starts_before = tap.start_count();

    for path in ["/clips/missing.flac", "/clips/notes.txt"] {
        let result = session.execute(
            Command::LoadFile {
                handle: FileHandle::from_path(path),
            },
            now,
        );
        assert!(result.is_error(), "{} should fail", path);
    }

    assert_eq!(session.snapshot(), before);
    assert!(same_node(&session.chain().output_node(), &node_before));
    assert_eq!(tap.start_count(), starts_before);
    assert!(tap.is_running());
}

#[test]
fn test_unavailable_device_leaves_playback_stopped() {
    let (mut session, tap) = offline_session(42, MemoryLoader::new());
    let now = Instant::now();
    tap.set_unavailable(Some("device unplugged".to_string()));

    let result = session.execute(Command::TogglePlayback, now);

    match result {
        CommandResult::Error(message) => assert!(message.contains("device unplugged")),
        other => panic!("expected an error, got {:?}", other),
    }
    assert!(!session.snapshot().is_playing);
    assert!(!tap.is_running());

    // Retry once the device is back
    tap.set_unavailable(None);
    assert_eq!(
        session.execute(Command::TogglePlayback, now),
        CommandResult::PlaybackToggled { playing: true }
    );
    assert!(tap.is_running());
}

#[test]
fn test_failed_advance_keeps_round_going() {
    let (mut session, tap) = offline_session(43, MemoryLoader::new());
    let start = Instant::now();
    session.execute(Command::ResetGame, start);
    session.execute(Command::TogglePlayback, start);
    tap.set_unavailable(Some("gone".to_string()));

    let target = session.round().target();
    session.execute(guess(target.center_frequency(), target.gain_db()), start);
    session.poll(start + Duration::from_secs(2));

    let snapshot = session.snapshot();
    assert!(!snapshot.has_guessed);
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.score, 1);
}

#[test]
fn test_source_swap_on_dead_device_cancels_pending_reveal() {
    let (mut session, tap) = offline_session(44, MemoryLoader::new());
    let start = Instant::now();
    reset_until_target(&mut session, 1000.0, 6.0, start);
    assert_eq!(outcome(session.execute(guess(500.0, -6.0), start)), GuessOutcome::Incorrect);
    tap.set_unavailable(Some("gone".to_string()));

    let result = session.execute(
        Command::SetSource {
            kind: SignalSourceKind::PinkNoise,
        },
        start,
    );

    assert!(!result.is_error(), "{:?}", result);
    assert!(matches!(result, CommandResult::SourceChangedStopped { .. }));
    let snapshot = session.snapshot();
    assert_eq!(snapshot.current_sample, "pink-noise");
    assert!(!snapshot.has_guessed);
    assert!(!snapshot.is_playing);
    assert_eq!(session.next_deadline(), None);
    assert_eq!(session.poll(start + Duration::from_secs(10)), 0);

    // The fresh round plays once the device is back
    tap.set_unavailable(None);
    assert_eq!(
        session.execute(Command::TogglePlayback, start),
        CommandResult::PlaybackToggled { playing: true }
    );
    assert_eq!(session.routing(), Some(Route::Filtered));
}

// ============================================================================
// PRESENTATION
// ============================================================================

#[test]
fn test_grid_feedback_after_wrong_guess() {
    let (mut session, _tap) = offline_session(51, MemoryLoader::new());
    let now = Instant::now();
    reset_until_target(&mut session, 1000.0, 6.0, now);

    let grid = session.grid();
    assert_eq!(grid.len(), 12);
    assert!(grid
        .iter()
        .all(|c| matches!(c.feedback, GuessFeedback::Boost | GuessFeedback::Cut)));

    session.execute(guess(500.0, -6.0), now);
    let grid = session.grid();

    let missed: Vec<_> = grid
        .iter()
        .filter(|c| c.feedback == GuessFeedback::Missed)
        .collect();
    assert_eq!(missed.len(), 1);
    assert_eq!(missed[0].label, "1000 Hz +6dB");
    let wrong: Vec<_> = grid
        .iter()
        .filter(|c| c.feedback == GuessFeedback::WrongGuess)
        .collect();
    assert_eq!(wrong.len(), 1);
    assert_eq!(wrong[0].label, "500 Hz -6dB");
    assert!(grid.iter().all(|c| c.feedback != GuessFeedback::Correct));
}

#[test]
fn test_snapshot_active_band_is_the_target() {
    let (mut session, _tap) = offline_session(52, MemoryLoader::new());
    let now = Instant::now();
    reset_until_target(&mut session, 1000.0, 6.0, now);
    session.execute(guess(4000.0, -6.0), now);

    // The wrong guess is audible, the snapshot still names the answer
    assert!(session.chain().eq_settings().matches(4000.0, -6.0));
    let snapshot = session.snapshot();
    assert_eq!(snapshot.active_frequency, 1000.0);
    assert_eq!(snapshot.active_gain, 6.0);
}

#[tokio::test]
async fn test_events_follow_a_round() {
    let (mut session, _tap) = offline_session(53, MemoryLoader::new());
    let mut events = session.subscribe();
    let start = Instant::now();

    session.execute(Command::ResetGame, start);
    let target = session.round().target();
    session.execute(guess(target.center_frequency(), target.gain_db()), start);
    session.poll(start + Duration::from_secs(1));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    let position = |wanted: &dyn Fn(&SessionEvent) -> bool| seen.iter().position(wanted);
    let reset = position(&|e| matches!(e, SessionEvent::GameReset)).expect("reset event");
    let resolved = position(&|e| {
        matches!(
            e,
            SessionEvent::GuessResolved {
                correct: true,
                score: 1,
                total_tries: 1
            }
        )
    })
    .expect("resolved event");
    let rounds = seen
        .iter()
        .filter(|e| matches!(e, SessionEvent::RoundStarted))
        .count();

    assert!(reset < resolved);
    assert_eq!(rounds, 2);
    assert!(seen
        .iter()
        .any(|e| matches!(e, SessionEvent::PlaybackChanged { playing: true })));
}

// ============================================================================
// FILE DECODING
// ============================================================================

#[test]
fn test_symphonia_wav_plays_through_session() {
    let samples: Vec<i16> = (0..24000)
        .map(|i| ((i as f32 * 0.06).sin() * 12000.0) as i16)
        .collect();
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("drums.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 48000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
    for sample in samples {
        writer.write_sample(sample).expect("write sample");
    }
    writer.finalize().expect("finalize wav");

    let (mut session, tap) = offline_session(61, SymphoniaLoader::new());
    let now = Instant::now();
    session.execute(Command::ResetGame, now);

    let handle = FileHandle::from_path(&path);
    let name = handle.display_name.clone();
    let result = session.execute(Command::LoadFile { handle }, now);

    assert_eq!(result, CommandResult::SourceChanged { name: name.clone() });
    let snapshot = session.snapshot();
    assert_eq!(snapshot.current_audio_file_name, name);
    assert_eq!(snapshot.current_sample, "custom-file");
    assert!(snapshot.is_playing);
    assert_eq!(session.routing(), Some(Route::Filtered));
    assert!(rms(&tap.render(4800)) > 0.01);
}

#[test]
fn test_symphonia_rejects_non_audio_without_side_effects() {
    let mut file = tempfile::Builder::new()
        .suffix(".wav")
        .tempfile()
        .expect("temp file");
    file.write_all(&[0x42; 2048]).expect("write junk");
    file.flush().expect("flush junk");

    let (mut session, tap) = offline_session(62, SymphoniaLoader::new());
    let now = Instant::now();
    session.execute(Command::ResetGame, now);
    let before = session.snapshot();

    let result = session.execute(
        Command::LoadFile {
            handle: FileHandle::from_path(file.path()),
        },
        now,
    );

    assert!(result.is_error());
    assert_eq!(session.snapshot(), before);
    assert!(tap.is_running());
}
