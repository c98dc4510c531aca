#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::Arc;
use std::time::Duration;

use cuebank_audio::xact::WaveEntry;
use cuebank_audio::{
    AudioEngine, CompressedAudioSource, ConsumeMode, EngineConfig, Mixer, SoundBank, StopOptions,
    StopReason, StreamConfig, StreamEvent, StreamHandle, StreamRequest, WaveBank,
};
use cuebank_core::{
    CategoryDefinition, CueDefinition, GlobalSettings, LimitBehavior, RpcCurve, RpcParameter,
    RpcPoint, RpcVariable, SoundBankDefinition, SoundDefinition, SourceFormat, WaveRef,
};

const TIMEOUT_MS: u64 = 20;

fn settings() -> GlobalSettings {
    let mut wetness = RpcVariable::new("Wetness", 0.0, 0.0, 1.0);
    wetness.is_global = true;

    GlobalSettings {
        categories: vec![CategoryDefinition::new("Effects")],
        variables: vec![RpcVariable::new("Rpm", 0.0, 0.0, 8000.0), wetness],
        rpc_curves: vec![
            RpcCurve {
                variable: 0,
                is_global: false,
                parameter: RpcParameter::Volume,
                points: vec![RpcPoint::new(0.0, -1200.0), RpcPoint::new(8000.0, 0.0)],
            },
            RpcCurve {
                variable: 0,
                is_global: false,
                parameter: RpcParameter::Pitch,
                points: vec![RpcPoint::new(0.0, -600.0), RpcPoint::new(8000.0, 600.0)],
            },
            RpcCurve {
                variable: 0,
                is_global: true,
                parameter: RpcParameter::ReverbSend,
                points: vec![RpcPoint::new(0.0, -2000.0), RpcPoint::new(1.0, 0.0)],
            },
        ],
    }
}

fn bank_definition() -> SoundBankDefinition {
    let mut motor = SoundDefinition::new(
        "Effects",
        WaveRef {
            bank: "Waves".into(),
            index: 0,
        },
    );
    motor.rpc_curves = vec![0, 1, 2];
    motor.use_reverb = true;

    let mut alarm = CueDefinition::new("Alarm", vec![0]);
    alarm.instance_limit = 1;
    alarm.limit_behavior = LimitBehavior::ReplaceOldest;

    SoundBankDefinition {
        name: "Vehicles".into(),
        sounds: vec![motor],
        cues: vec![CueDefinition::new("Motor", vec![0]), alarm],
    }
}

fn engine(mode: ConsumeMode) -> (Arc<Mixer>, AudioEngine, SoundBank) {
    let mixer = Arc::new(Mixer::new(mode));
    let config = EngineConfig::from_json(&format!(
        r#"{{"stream":{{"buffer_count":3,"buffer_size":512,"wait_timeout_ms":{TIMEOUT_MS}}},"rng_seed":3}}"#
    ))
    .unwrap();

    let engine = AudioEngine::new(mixer.clone(), &settings(), &config).unwrap();
    let pcm: Vec<u8> = (0..16_000u32).map(|i| (i % 200) as u8).collect();
    let source = CompressedAudioSource::new(pcm, SourceFormat::Stereo16, 22050, 4).unwrap();
    engine.add_wave_bank(WaveBank::new("Waves", vec![WaveEntry::new(source)]));
    let bank = SoundBank::new(&engine, bank_definition()).unwrap();
    (mixer, engine, bank)
}

#[test]
fn instance_limit_replaces_oldest() {
    let (_mixer, engine, bank) = engine(ConsumeMode::Manual);
    let first = bank.get_cue("Alarm").unwrap();
    let second = bank.get_cue("Alarm").unwrap();

    first.play().unwrap();
    assert!(first.is_playing());

    second.play().unwrap();
    assert!(first.is_stopped());
    assert!(second.is_playing());
    assert_eq!(engine.active_cue_count(), 1);

    let cues = [first, second];
    for round in 0..4 {
        let cue = &cues[round % 2];
        cue.play().unwrap();
        engine.update(Duration::from_millis(16));
        assert!(cue.is_playing());
        assert_eq!(cues.iter().filter(|c| c.is_playing()).count(), 1);
        assert_eq!(engine.active_cue_count(), 1);
    }
}

#[test]
fn rpc_evaluation_is_idempotent() {
    let (_mixer, engine, bank) = engine(ConsumeMode::Manual);
    let cue = bank.get_cue("Motor").unwrap();
    cue.set_variable("Rpm", 4000.0).unwrap();
    engine.set_global_variable("Wetness", 0.5).unwrap();
    cue.play().unwrap();

    engine.update(Duration::from_millis(16));
    let first = cue.voice_parameters().unwrap();
    engine.update(Duration::from_millis(16));
    let second = cue.voice_parameters().unwrap();

    assert_eq!(first, second);
    // -6 dB at half range, no pitch shift at the midpoint.
    assert!((first.volume - 0.501).abs() < 1e-3);
    assert!(first.pitch.abs() < 1e-6);
    assert!((first.reverb_mix - 0.316).abs() < 1e-3);
    assert!(cue.is_pitch_controlled_by_rpc());
}

#[test]
fn stop_releases_category_and_worker() {
    let (mixer, engine, bank) = engine(ConsumeMode::Manual);
    let category = engine.category("Effects").unwrap();

    let other = bank.get_cue("Motor").unwrap();
    other.play().unwrap();
    let cue = bank.get_cue("Motor").unwrap();
    cue.play().unwrap();
    assert_eq!(category.playing_count(), 2);

    let voice = cue.voice().unwrap();
    cue.stop(StopOptions::Immediate);
    assert_eq!(category.playing_count(), 1);
    assert!(cue.voice().is_none());

    std::thread::sleep(Duration::from_millis(TIMEOUT_MS * 3));
    assert!(mixer.queued(voice).is_err());
    let submitted = mixer.total_submitted();
    std::thread::sleep(Duration::from_millis(TIMEOUT_MS * 3));
    assert_eq!(mixer.total_submitted(), submitted);
    assert!(other.is_playing());
}

#[test]
fn loop_count_two_restarts_twice() {
    let mixer = Arc::new(Mixer::new(ConsumeMode::Immediate));
    let source = Arc::new(
        CompressedAudioSource::new(vec![1u8; 3000], SourceFormat::Mono16, 8000, 2).unwrap(),
    );
    let mut request = StreamRequest::new(source);
    request.loop_count = 2;
    let config = StreamConfig {
        buffer_count: 4,
        buffer_size: 1024,
        wait_timeout_ms: TIMEOUT_MS,
    };

    let handle = StreamHandle::start(mixer.clone(), request, &config).unwrap();
    assert!(handle.wait_stopped(Duration::from_secs(5)));

    let events: Vec<StreamEvent> = handle.events().try_iter().collect();
    let restarts: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::LoopRestarted { count } => Some(*count),
            _ => None,
        })
        .collect();
    assert_eq!(restarts, vec![1, 2]);
    assert_eq!(handle.loops_played(), 2);
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Stopped {
            reason: StopReason::Finished
        })
    );
    // Three passes of 3000 bytes.
    assert_eq!(mixer.total_submitted(), 9);
}
