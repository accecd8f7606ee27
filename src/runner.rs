//! Cooperative tick loop: render, write, commit, pace.
//!
//! Every exit path goes through [`BlackoutGuard`], so the lights are dark
//! after a run whether it was cancelled, hit its time limit, or failed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compositor::FrameBuffer;
use crate::effect::{Effect, FrameContext};
use crate::error::{LightsError, LightsResult};
use crate::sink::{RenderSink, SinkWriter};

/// How often to log frame timing (every N frames).
const TIMING_LOG_INTERVAL: u64 = 300;

/// Longest single sleep before re-checking cancellation.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// Attempts at the final dark frame before giving up.
const BLACKOUT_ATTEMPTS: usize = 3;

/// Shared stop flag checked once per tick and inside per-point loops.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Clocks
// ============================================================================

/// Time source for the loop, in seconds since the clock was created.
pub trait FrameClock {
    fn now(&mut self) -> f64;

    /// Block until `deadline` or until `cancel` fires.
    fn sleep_until(&mut self, deadline: f64, cancel: &CancelToken);
}

/// Wall clock with sliced sleeps.
#[derive(Debug)]
pub struct RealClock {
    start: Instant,
}

impl RealClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for RealClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock for RealClock {
    fn now(&mut self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn sleep_until(&mut self, deadline: f64, cancel: &CancelToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let remaining = deadline - self.now();
            if remaining <= 0.0 {
                return;
            }
            std::thread::sleep(Duration::from_secs_f64(remaining).min(SLEEP_SLICE));
        }
    }
}

/// Clock that jumps straight to each deadline. Runs are exact and instant.
#[derive(Debug, Default)]
pub struct SimulatedClock {
    now: f64,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameClock for SimulatedClock {
    fn now(&mut self) -> f64 {
        self.now
    }

    fn sleep_until(&mut self, deadline: f64, _cancel: &CancelToken) {
        self.now = self.now.max(deadline);
    }
}

// ============================================================================
// Run loop
// ============================================================================

#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Name used in logs and the summary.
    pub name: String,
    /// Seconds between ticks.
    pub interval: f32,
    /// Stop after this many seconds of animation.
    pub duration: Option<f32>,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
}

impl RunOptions {
    pub fn new(name: impl Into<String>, interval: f32) -> Self {
        Self {
            name: name.into(),
            interval,
            duration: None,
            max_frames: None,
        }
    }

    pub fn validate(&self) -> LightsResult<()> {
        if !self.interval.is_finite() || self.interval <= 0.0 {
            return Err(LightsError::config(format!(
                "frame interval {} must be positive",
                self.interval
            )));
        }
        if let Some(d) = self.duration {
            if d.is_nan() || d < 0.0 {
                return Err(LightsError::config("duration must not be negative"));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    Cancelled,
    DurationElapsed,
    FrameLimit,
}

/// Outcome of a completed run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub name: String,
    /// Frames successfully committed.
    pub frames: u64,
    /// Ticks whose write or commit failed.
    pub transient_errors: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub reason: StopReason,
}

/// Commits a dark frame when dropped unless `finish` already did.
pub struct BlackoutGuard<'a, S: RenderSink> {
    writer: &'a mut SinkWriter<S>,
    armed: bool,
}

impl<'a, S: RenderSink> BlackoutGuard<'a, S> {
    pub fn new(writer: &'a mut SinkWriter<S>) -> Self {
        Self {
            writer,
            armed: true,
        }
    }

    pub fn writer(&mut self) -> &mut SinkWriter<S> {
        self.writer
    }

    /// Blackout with retries, reporting the last failure.
    pub fn finish(mut self) -> LightsResult<()> {
        self.armed = false;
        blackout_with_retry(self.writer)
    }
}

impl<S: RenderSink> Drop for BlackoutGuard<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = blackout_with_retry(self.writer) {
                log::error!("Failed to blank lights: {}", e);
            }
        }
    }
}

fn blackout_with_retry<S: RenderSink>(writer: &mut SinkWriter<S>) -> LightsResult<()> {
    let mut last = None;
    for attempt in 1..=BLACKOUT_ATTEMPTS {
        match writer.blackout() {
            Ok(()) => return Ok(()),
            Err(e) => {
                log::warn!("Blackout attempt {} failed: {}", attempt, e);
                last = Some(e);
            }
        }
    }
    Err(last.unwrap_or_else(|| LightsError::transient("blackout failed")))
}

/// Drive `effect` until cancelled or a limit is reached, then go dark.
///
/// Transient sink failures are logged and the next tick retries. Any other
/// error ends the run; the lights are still blanked on the way out.
pub fn run<S: RenderSink, C: FrameClock>(
    effect: &mut Effect,
    writer: &mut SinkWriter<S>,
    options: &RunOptions,
    clock: &mut C,
    cancel: &CancelToken,
) -> LightsResult<RunSummary> {
    options.validate()?;
    let started_at = Utc::now();
    let interval = f64::from(options.interval);
    let mut guard = BlackoutGuard::new(writer);
    let mut frame = FrameBuffer::new(guard.writer().len());

    log::info!(
        "Starting '{}' on {} points at {:.1} fps",
        options.name,
        frame.len(),
        1.0 / interval
    );

    let start = clock.now();
    let mut last = start;
    let mut frames = 0u64;
    let mut ticks = 0u64;
    let mut transient_errors = 0u64;
    let mut render_time = Duration::ZERO;
    let mut write_time = Duration::ZERO;

    let reason = loop {
        if cancel.is_cancelled() {
            break StopReason::Cancelled;
        }
        if options.max_frames.is_some_and(|max| ticks >= max) {
            break StopReason::FrameLimit;
        }
        let now = clock.now();
        let elapsed = now - start;
        if options.duration.is_some_and(|d| elapsed >= f64::from(d)) {
            break StopReason::DurationElapsed;
        }

        let ctx = FrameContext::new(
            elapsed as f32,
            (now - last) as f32,
            options.interval,
            ticks,
            cancel,
        );
        last = now;

        let t0 = Instant::now();
        effect.render(&ctx, &mut frame);
        render_time += t0.elapsed();
        if cancel.is_cancelled() {
            break StopReason::Cancelled;
        }

        let t1 = Instant::now();
        match guard.writer().write_frame(&frame) {
            Ok(()) => frames += 1,
            Err(e) if e.is_transient() => {
                transient_errors += 1;
                log::warn!("Frame {} not shown: {}", ticks, e);
            }
            Err(e) => return Err(e),
        }
        write_time += t1.elapsed();
        ticks += 1;

        if ticks % TIMING_LOG_INTERVAL == 0 {
            log::debug!(
                "[PERF] {}: {} frames, render {:.2}ms, write {:.2}ms avg",
                options.name,
                ticks,
                render_time.as_secs_f64() * 1000.0 / TIMING_LOG_INTERVAL as f64,
                write_time.as_secs_f64() * 1000.0 / TIMING_LOG_INTERVAL as f64
            );
            render_time = Duration::ZERO;
            write_time = Duration::ZERO;
        }

        clock.sleep_until(now + interval, cancel);
    };

    guard.finish()?;
    let summary = RunSummary {
        name: options.name.clone(),
        frames,
        transient_errors,
        started_at,
        completed_at: Utc::now(),
        reason,
    };
    log::info!(
        "Stopped '{}' after {} frames ({:?}, {} transient errors)",
        summary.name,
        summary.frames,
        summary.reason,
        summary.transient_errors
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{ChannelOrder, Color};
    use crate::effect::EffectSpec;
    use crate::geometry::GeometryCache;
    use crate::point_cloud::{HelixLayout, PointCloud};
    use crate::sink::{RecordingSink, SinkProbe};

    fn setup(spec: EffectSpec) -> (Effect, SinkWriter<RecordingSink>, SinkProbe) {
        let layout = HelixLayout {
            count: 50,
            ..Default::default()
        };
        let geometry = Arc::new(GeometryCache::new(PointCloud::helix(&layout).unwrap()).unwrap());
        let effect = Effect::build(&spec, geometry, 1).unwrap();
        let sink = RecordingSink::new(50);
        let probe = sink.probe();
        (effect, SinkWriter::new(sink, ChannelOrder::Rgb), probe)
    }

    /// Simulated clock that fires `cancel` on its `cancel_on`-th reading.
    /// The runner reads once at start and once per tick before rendering.
    struct CancellingClock {
        inner: SimulatedClock,
        cancel: CancelToken,
        readings: u32,
        cancel_on: u32,
    }

    impl FrameClock for CancellingClock {
        fn now(&mut self) -> f64 {
            self.readings += 1;
            if self.readings == self.cancel_on {
                self.cancel.cancel();
            }
            self.inner.now()
        }

        fn sleep_until(&mut self, deadline: f64, cancel: &CancelToken) {
            self.inner.sleep_until(deadline, cancel);
        }
    }

    fn cancel_during_tick(spec: EffectSpec, tick: u32) -> (RunSummary, SinkProbe) {
        let (mut effect, mut writer, probe) = setup(spec);
        let cancel = CancelToken::new();
        let mut clock = CancellingClock {
            inner: SimulatedClock::new(),
            cancel: cancel.clone(),
            readings: 0,
            cancel_on: tick + 2,
        };
        let summary = run(
            &mut effect,
            &mut writer,
            &RunOptions::new("cancel", 0.05),
            &mut clock,
            &cancel,
        )
        .unwrap();
        (summary, probe)
    }

    #[test]
    fn test_cancel_inside_first_tick_commits_nothing_lit() {
        let field = EffectSpec::Field(crate::field::FieldPattern::Spiral(Default::default()));
        let wave = EffectSpec::Wavefront(Default::default());
        for spec in [field, wave] {
            let (summary, probe) = cancel_during_tick(spec, 0);
            assert_eq!(summary.reason, StopReason::Cancelled);
            assert_eq!(summary.frames, 0);
            // Only the blackout reached the sink.
            assert_eq!(probe.commit_count(), 1);
            assert!(probe.is_dark());
        }
    }

    #[test]
    fn test_cancel_inside_later_tick_drops_that_frame() {
        let (summary, probe) = cancel_during_tick(EffectSpec::Solid { color: Color::GREEN }, 3);
        assert_eq!(summary.frames, 3);
        assert_eq!(probe.commit_count(), 4);
        assert!(probe.is_dark());
    }

    #[test]
    fn test_frame_limit_then_dark() {
        let (mut effect, mut writer, probe) = setup(EffectSpec::Solid { color: Color::RED });
        let mut options = RunOptions::new("solid", 0.05);
        options.max_frames = Some(10);
        let summary = run(
            &mut effect,
            &mut writer,
            &options,
            &mut SimulatedClock::new(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(summary.frames, 10);
        assert_eq!(summary.reason, StopReason::FrameLimit);
        assert_eq!(probe.commit_count(), 11);
        assert!(probe.is_dark());
    }

    #[test]
    fn test_duration_uses_clock() {
        let (mut effect, mut writer, _probe) = setup(EffectSpec::Solid { color: Color::RED });
        let mut options = RunOptions::new("solid", 0.05);
        options.duration = Some(1.0);
        let summary = run(
            &mut effect,
            &mut writer,
            &options,
            &mut SimulatedClock::new(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(summary.reason, StopReason::DurationElapsed);
        assert!((20..=21).contains(&summary.frames), "{}", summary.frames);
    }

    #[test]
    fn test_cancelled_before_start_stays_dark() {
        let (mut effect, mut writer, probe) = setup(EffectSpec::Solid { color: Color::WHITE });
        let cancel = CancelToken::new();
        cancel.cancel();
        let summary = run(
            &mut effect,
            &mut writer,
            &RunOptions::new("solid", 0.05),
            &mut SimulatedClock::new(),
            &cancel,
        )
        .unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.reason, StopReason::Cancelled);
        assert!(probe.is_dark());
    }

    #[test]
    fn test_transient_failures_do_not_stop_run() {
        let (mut effect, mut writer, probe) = setup(EffectSpec::Solid { color: Color::BLUE });
        probe.fail_commits(3);
        let mut options = RunOptions::new("solid", 0.05);
        options.max_frames = Some(10);
        let summary = run(
            &mut effect,
            &mut writer,
            &options,
            &mut SimulatedClock::new(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(summary.transient_errors, 3);
        assert_eq!(summary.frames, 7);
        assert!(probe.is_dark());
    }

    #[test]
    fn test_guard_blanks_on_drop() {
        let sink = RecordingSink::new(3);
        let probe = sink.probe();
        let mut writer = SinkWriter::new(sink, ChannelOrder::Grb);
        {
            let mut guard = BlackoutGuard::new(&mut writer);
            let mut frame = FrameBuffer::new(3);
            frame.fill(Color::WHITE);
            guard.writer().write_frame(&frame).unwrap();
            assert!(!probe.is_dark());
        }
        assert!(probe.is_dark());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let (mut effect, mut writer, _probe) = setup(EffectSpec::Solid { color: Color::RED });
        let err = run(
            &mut effect,
            &mut writer,
            &RunOptions::new("solid", 0.0),
            &mut SimulatedClock::new(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, LightsError::Config(_)));
    }
}
