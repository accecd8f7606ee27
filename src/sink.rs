//! Render sink boundary: the only place canonical RGB becomes wire order.
//!
//! A frame reaches hardware as N `set` calls followed by one `commit`. The
//! writer only commits after every `set` succeeded, so a failed tick leaves
//! the previously committed frame on the lights.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::color::{ChannelOrder, Color};
use crate::compositor::FrameBuffer;
use crate::error::{LightsError, LightsResult};

/// Hardware (or stand-in) consuming wire-ordered channel triples.
pub trait RenderSink: Send {
    /// Number of addressable points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stage one point. Not visible until `commit`.
    fn set(&mut self, index: usize, wire: [u8; 3]) -> LightsResult<()>;

    /// Latch every staged point.
    fn commit(&mut self) -> LightsResult<()>;
}

impl<S: RenderSink + ?Sized> RenderSink for Box<S> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn set(&mut self, index: usize, wire: [u8; 3]) -> LightsResult<()> {
        (**self).set(index, wire)
    }

    fn commit(&mut self) -> LightsResult<()> {
        (**self).commit()
    }
}

/// Applies channel order and the global brightness cap, then writes and commits.
pub struct SinkWriter<S: RenderSink> {
    sink: S,
    order: ChannelOrder,
    /// Global cap out of 255.
    brightness: u8,
    last_committed_dark: bool,
    commits: u64,
}

impl<S: RenderSink> SinkWriter<S> {
    pub fn new(sink: S, order: ChannelOrder) -> Self {
        Self {
            sink,
            order,
            brightness: 255,
            last_committed_dark: false,
            commits: 0,
        }
    }

    pub fn with_brightness(mut self, brightness: u8) -> Self {
        self.brightness = brightness;
        self
    }

    pub fn len(&self) -> usize {
        self.sink.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sink.is_empty()
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    /// Whether the most recent successful commit was all black.
    pub fn last_committed_dark(&self) -> bool {
        self.last_committed_dark
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    /// Write one full frame. Sink failures come back as `Transient`.
    pub fn write_frame(&mut self, frame: &FrameBuffer) -> LightsResult<()> {
        if frame.len() != self.sink.len() {
            return Err(LightsError::config(format!(
                "frame has {} points but the sink has {}",
                frame.len(),
                self.sink.len()
            )));
        }
        let scale = f32::from(self.brightness) / 255.0;
        let mut dark = true;
        for (i, &color) in frame.pixels().iter().enumerate() {
            let color = if self.brightness == u8::MAX {
                color
            } else {
                color.scale(scale)
            };
            dark &= color.is_dark();
            self.sink
                .set(i, self.order.permute(color))
                .map_err(|e| LightsError::transient(format!("set point {}: {}", i, e)))?;
        }
        self.commit(dark)
    }

    /// Commit an all-dark frame.
    pub fn blackout(&mut self) -> LightsResult<()> {
        let wire = self.order.permute(Color::BLACK);
        for i in 0..self.sink.len() {
            self.sink
                .set(i, wire)
                .map_err(|e| LightsError::transient(format!("blackout point {}: {}", i, e)))?;
        }
        self.commit(true)
    }

    fn commit(&mut self, dark: bool) -> LightsResult<()> {
        self.sink
            .commit()
            .map_err(|e| LightsError::transient(format!("commit: {}", e)))?;
        self.last_committed_dark = dark;
        self.commits += 1;
        Ok(())
    }
}

// ============================================================================
// In-memory sink
// ============================================================================

#[derive(Debug, Default)]
struct ProbeState {
    staged: Vec<[u8; 3]>,
    committed: Vec<[u8; 3]>,
    commit_count: u64,
    fail_sets: usize,
    fail_commits: usize,
}

/// Shared view into a [`RecordingSink`], usable after the sink moved to a worker.
#[derive(Clone, Debug, Default)]
pub struct SinkProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl SinkProbe {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Last committed frame in wire order.
    pub fn committed(&self) -> Vec<[u8; 3]> {
        self.lock().committed.clone()
    }

    pub fn commit_count(&self) -> u64 {
        self.lock().commit_count
    }

    /// Whether anything was committed and the last commit was all zeros.
    pub fn is_dark(&self) -> bool {
        let state = self.lock();
        state.commit_count > 0 && state.committed.iter().all(|w| *w == [0, 0, 0])
    }

    /// Make the next `n` `set` calls fail.
    pub fn fail_sets(&self, n: usize) {
        self.lock().fail_sets = n;
    }

    /// Make the next `n` commits fail.
    pub fn fail_commits(&self, n: usize) {
        self.lock().fail_commits = n;
    }
}

/// Sink that keeps the last committed frame in memory.
#[derive(Debug)]
pub struct RecordingSink {
    len: usize,
    probe: SinkProbe,
}

impl RecordingSink {
    pub fn new(len: usize) -> Self {
        let probe = SinkProbe::default();
        {
            let mut state = probe.lock();
            state.staged = vec![[0; 3]; len];
        }
        Self { len, probe }
    }

    pub fn probe(&self) -> SinkProbe {
        self.probe.clone()
    }
}

impl RenderSink for RecordingSink {
    fn len(&self) -> usize {
        self.len
    }

    fn set(&mut self, index: usize, wire: [u8; 3]) -> LightsResult<()> {
        let mut state = self.probe.lock();
        if state.fail_sets > 0 {
            state.fail_sets -= 1;
            return Err(LightsError::transient("injected set failure"));
        }
        let slot = state
            .staged
            .get_mut(index)
            .ok_or_else(|| LightsError::config(format!("point {} out of range", index)))?;
        *slot = wire;
        Ok(())
    }

    fn commit(&mut self) -> LightsResult<()> {
        let mut state = self.probe.lock();
        if state.fail_commits > 0 {
            state.fail_commits -= 1;
            return Err(LightsError::transient("injected commit failure"));
        }
        state.committed = state.staged.clone();
        state.commit_count += 1;
        Ok(())
    }
}

// ============================================================================
// Stream and null sinks
// ============================================================================

/// Writes one line of hex triples per committed frame.
pub struct StreamSink<W: Write + Send> {
    out: W,
    staged: Vec<[u8; 3]>,
    line: String,
}

impl StreamSink<io::Stdout> {
    pub fn stdout(len: usize) -> Self {
        Self::new(io::stdout(), len)
    }
}

impl<W: Write + Send> StreamSink<W> {
    pub fn new(out: W, len: usize) -> Self {
        Self {
            out,
            staged: vec![[0; 3]; len],
            line: String::with_capacity(len * 7),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> RenderSink for StreamSink<W> {
    fn len(&self) -> usize {
        self.staged.len()
    }

    fn set(&mut self, index: usize, wire: [u8; 3]) -> LightsResult<()> {
        let slot = self
            .staged
            .get_mut(index)
            .ok_or_else(|| LightsError::config(format!("point {} out of range", index)))?;
        *slot = wire;
        Ok(())
    }

    fn commit(&mut self) -> LightsResult<()> {
        use std::fmt::Write as _;
        self.line.clear();
        for (i, [a, b, c]) in self.staged.iter().enumerate() {
            if i > 0 {
                self.line.push(' ');
            }
            let _ = write!(self.line, "{:02x}{:02x}{:02x}", a, b, c);
        }
        self.line.push('\n');
        self.out.write_all(self.line.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

/// Accepts and discards everything.
#[derive(Clone, Copy, Debug)]
pub struct NullSink {
    len: usize,
}

impl NullSink {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl RenderSink for NullSink {
    fn len(&self) -> usize {
        self.len
    }

    fn set(&mut self, _index: usize, _wire: [u8; 3]) -> LightsResult<()> {
        Ok(())
    }

    fn commit(&mut self) -> LightsResult<()> {
        Ok(())
    }
}
