//! Whole-pipeline checks: coordinates in, committed frames out.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use glam::Vec3;
use treelights::compositor::FrameBuffer;
use treelights::controller::{AnimationController, ControllerSettings};
use treelights::field::{FieldEffect, FieldPattern, SpiralConfig};
use treelights::presets::{Catalogue, PRESETS};
use treelights::runner::{self, CancelToken, RealClock, RunOptions, SimulatedClock, StopReason};
use treelights::sink::{RecordingSink, SinkWriter};
use treelights::wavefront::{Membership, OriginPolicy, WaveColor, WavefrontConfig};
use treelights::{
    ChannelOrder, Color, Effect, EffectSpec, FrameContext, GeometryCache, HelixLayout, PointCloud,
};

fn helix_geometry() -> Arc<GeometryCache> {
    Arc::new(GeometryCache::new(PointCloud::helix(&HelixLayout::default()).unwrap()).unwrap())
}

#[test]
fn test_helix_spiral_bottom_and_top_differ() {
    let geometry = helix_geometry();
    assert_eq!(geometry.len(), 500);
    let pattern = FieldPattern::Spiral(SpiralConfig {
        height: 50.0,
        ..Default::default()
    });
    let field = FieldEffect::new(pattern, geometry, 0).unwrap();
    let bottom = field.intensity_at(0, 0.0);
    let top = field.intensity_at(499, 0.0);
    assert!((0.0..=1.0).contains(&bottom));
    assert!((0.0..=1.0).contains(&top));
    assert_ne!(bottom, top);
}

#[test]
fn test_wavefront_full_at_five_seconds_through_runner() {
    let positions = (0..=10).map(|i| Vec3::new(0.0, i as f32 * 5.0, 0.0)).collect();
    let geometry = Arc::new(GeometryCache::new(PointCloud::from_positions(positions).unwrap()).unwrap());
    let spec = EffectSpec::Wavefront(WavefrontConfig {
        membership: Membership::MonotonicFill,
        origin: OriginPolicy::Fixed { index: 0 },
        color: WaveColor::Fixed { color: Color::WHITE },
        speed: 10.0,
        ..Default::default()
    });
    let mut effect = Effect::build(&spec, geometry, 1).unwrap();
    let mut writer = SinkWriter::new(RecordingSink::new(11), ChannelOrder::Grb);
    let mut options = RunOptions::new("wave", 0.05);
    options.max_frames = Some(110);

    let summary = runner::run(
        &mut effect,
        &mut writer,
        &options,
        &mut SimulatedClock::new(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(summary.frames, 110);

    let Effect::Wavefront(wave) = &effect else {
        panic!("expected a wavefront effect");
    };
    let full_at = wave.last_full_at().expect("wave never reached full");
    assert!((full_at - 5.0).abs() <= 0.05 + 1e-4, "full at {}", full_at);
}

#[test]
fn test_every_preset_fills_whole_buffer() {
    let geometry = helix_geometry();
    for preset in PRESETS {
        let mut effect = Effect::build(&preset.spec(), geometry.clone(), 42).unwrap();
        let sink = RecordingSink::new(500);
        let probe = sink.probe();
        let mut writer = SinkWriter::new(sink, ChannelOrder::Grb);
        let mut frame = FrameBuffer::new(500);
        for tick in 0..40u64 {
            let t = tick as f32 * preset.interval;
            let dt = if tick == 0 { 0.0 } else { preset.interval };
            effect.render(&FrameContext::at(t, dt, preset.interval), &mut frame);
            assert_eq!(frame.len(), 500, "{}", preset.name);
            writer.write_frame(&frame).unwrap();
        }
        assert_eq!(probe.committed().len(), 500, "{}", preset.name);
        assert_eq!(probe.commit_count(), 40);
    }
}

#[test]
fn test_cancel_mid_run_leaves_lights_dark() {
    let geometry = helix_geometry();
    let mut effect = Effect::build(&EffectSpec::Solid { color: Color::WHITE }, geometry, 0).unwrap();
    let sink = RecordingSink::new(500);
    let probe = sink.probe();
    let mut writer = SinkWriter::new(sink, ChannelOrder::Grb);
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();

    let worker = thread::spawn(move || {
        runner::run(
            &mut effect,
            &mut writer,
            &RunOptions::new("solid", 0.01),
            &mut RealClock::new(),
            &worker_cancel,
        )
    });

    for _ in 0..200 {
        if probe.commit_count() >= 2 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!probe.is_dark());
    cancel.cancel();
    let summary = worker.join().unwrap().unwrap();
    assert_eq!(summary.reason, StopReason::Cancelled);
    assert!(probe.is_dark());
}

#[test]
fn test_cancel_goes_dark_within_one_interval() {
    let interval = 0.5;
    let geometry = helix_geometry();
    let mut effect = Effect::build(&EffectSpec::Solid { color: Color::RED }, geometry, 0).unwrap();
    let sink = RecordingSink::new(500);
    let probe = sink.probe();
    let mut writer = SinkWriter::new(sink, ChannelOrder::Grb);
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();

    let worker = thread::spawn(move || {
        runner::run(
            &mut effect,
            &mut writer,
            &RunOptions::new("slow", interval),
            &mut RealClock::new(),
            &worker_cancel,
        )
    });

    for _ in 0..200 {
        if probe.commit_count() >= 1 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!probe.is_dark());

    // The worker is now sleeping towards its next 0.5 s deadline.
    let cancelled_at = Instant::now();
    cancel.cancel();
    let summary = worker.join().unwrap().unwrap();
    let latency = cancelled_at.elapsed();

    assert_eq!(summary.reason, StopReason::Cancelled);
    assert!(summary.frames >= 1);
    assert!(probe.is_dark());
    assert!(
        latency < Duration::from_secs_f32(interval / 2.0),
        "dark after {:?}",
        latency
    );
}

#[test]
fn test_controller_switches_and_stops_dark() {
    let sink = RecordingSink::new(500);
    let probe = sink.probe();
    let mut controller = AnimationController::new(
        helix_geometry(),
        Catalogue::builtin(),
        SinkWriter::new(sink, ChannelOrder::Grb),
        ControllerSettings {
            seed: 9,
            interval_override: Some(0.01),
            duration: None,
        },
    );
    for name in ["candy_cane", "contagious", "meteor_shower", "snake"] {
        let before = probe.commit_count();
        controller.start(name).unwrap();
        for _ in 0..200 {
            if probe.commit_count() >= before + 3 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(controller.current(), Some(name));
    }
    let summary = controller.stop().unwrap().unwrap();
    assert_eq!(summary.name, "snake");
    assert!(probe.is_dark());
}

#[test]
fn test_coordinate_file_round_trip() {
    let path = std::env::temp_dir().join(format!("treelights-coords-{}.json", std::process::id()));
    let cloud = PointCloud::helix(&HelixLayout {
        count: 30,
        ..Default::default()
    })
    .unwrap();
    std::fs::write(&path, cloud.to_json().unwrap()).unwrap();
    let loaded = PointCloud::load(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded.len(), 30);
    assert!((loaded.position(29) - cloud.position(29)).length() < 1e-3);
}
