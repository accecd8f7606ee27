//! Start/stop lifecycle: one animation at a time on a worker thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::effect::Effect;
use crate::error::{LightsError, LightsResult};
use crate::geometry::GeometryCache;
use crate::presets::Catalogue;
use crate::runner::{self, CancelToken, RealClock, RunOptions, RunSummary};
use crate::sink::{RenderSink, SinkWriter};

/// Run-wide settings applied to every animation the controller starts.
#[derive(Clone, Debug, Default)]
pub struct ControllerSettings {
    pub seed: u64,
    /// Replaces each animation's own frame interval.
    pub interval_override: Option<f32>,
    pub duration: Option<f32>,
}

type WorkerResult<S> = (SinkWriter<S>, LightsResult<RunSummary>);

struct ActiveRun<S: RenderSink> {
    name: String,
    cancel: CancelToken,
    handle: JoinHandle<WorkerResult<S>>,
}

pub struct AnimationController<S: RenderSink + 'static> {
    geometry: Arc<GeometryCache>,
    catalogue: Catalogue,
    settings: ControllerSettings,
    /// Present while idle; lent to the worker while running.
    writer: Option<SinkWriter<S>>,
    active: Option<ActiveRun<S>>,
}

impl<S: RenderSink + 'static> AnimationController<S> {
    pub fn new(
        geometry: Arc<GeometryCache>,
        catalogue: Catalogue,
        writer: SinkWriter<S>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            geometry,
            catalogue,
            settings,
            writer: Some(writer),
            active: None,
        }
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// Name of the animation currently owning the sink.
    pub fn current(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.name.as_str())
    }

    /// Whether a worker is still rendering.
    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|a| !a.handle.is_finished())
    }

    /// Stop whatever is running, then start `name`.
    ///
    /// The effect and its frame pacing are checked before the old animation
    /// is stopped, so an unknown name or a bad config leaves the current
    /// animation running.
    pub fn start(&mut self, name: &str) -> LightsResult<()> {
        let animation = self.catalogue.get(name)?.clone();
        let effect = Effect::build(&animation.effect, self.geometry.clone(), self.settings.seed)?;
        let mut options = RunOptions::new(
            animation.name.clone(),
            self.settings.interval_override.unwrap_or(animation.interval),
        );
        options.duration = self.settings.duration;
        options.validate()?;

        self.stop()?;
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| LightsError::config("render sink is no longer available"))?;

        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name(format!("lights-{}", animation.name))
            .spawn(move || {
                let mut effect = effect;
                let mut clock = RealClock::new();
                let result = runner::run(&mut effect, &mut writer, &options, &mut clock, &worker_cancel);
                (writer, result)
            })?;

        self.active = Some(ActiveRun {
            name: animation.name,
            cancel,
            handle,
        });
        Ok(())
    }

    /// Cancel the current animation and wait until the lights are dark.
    ///
    /// Returns the finished run's summary, or `None` when nothing was running.
    pub fn stop(&mut self) -> LightsResult<Option<RunSummary>> {
        match self.active.take() {
            Some(active) => {
                active.cancel.cancel();
                self.join(active).map(Some)
            }
            None => {
                self.blackout()?;
                Ok(None)
            }
        }
    }

    /// Wait for the current animation to end by itself (duration limit).
    pub fn wait(&mut self) -> LightsResult<Option<RunSummary>> {
        match self.active.take() {
            Some(active) => self.join(active).map(Some),
            None => Ok(None),
        }
    }

    fn join(&mut self, active: ActiveRun<S>) -> LightsResult<RunSummary> {
        let (writer, result) = active.handle.join().map_err(|_| {
            LightsError::transient(format!("animation '{}' worker panicked", active.name))
        })?;
        self.writer = Some(writer);
        let summary = result?;
        if !self.writer.as_ref().is_some_and(|w| w.last_committed_dark()) {
            self.blackout()?;
        }
        Ok(summary)
    }

    /// Commit a dark frame on the idle sink.
    pub fn blackout(&mut self) -> LightsResult<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.blackout(),
            None => Err(LightsError::config("render sink is no longer available")),
        }
    }

    /// Stop and hand the sink back.
    pub fn shutdown(mut self) -> LightsResult<Option<SinkWriter<S>>> {
        self.stop()?;
        Ok(self.writer.take())
    }
}

impl<S: RenderSink + 'static> Drop for AnimationController<S> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let Err(e) = self.join(active) {
                log::error!("Animation did not stop cleanly: {}", e);
            }
        }
    }
}
