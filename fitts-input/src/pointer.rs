use crate::device::PointerEvent;
use parking_lot::Mutex;
use std::sync::Arc;

/// Raw motion summed since the last logged frame. Never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameDelta {
    pub dx: f64,
    pub dy: f64,
    pub buttons: u32,
}

#[derive(Debug)]
struct PointerInner {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    frame: FrameDelta,
}

impl PointerInner {
    fn apply(&mut self, dx: f64, dy: f64) {
        self.x = (self.x + dx).clamp(0.0, self.width);
        self.y = (self.y + dy).clamp(0.0, self.height);
        self.frame.dx += dx;
        self.frame.dy += dy;
    }
}

/// Cursor position driven purely by raw device deltas.
///
/// Cloning yields another handle to the same state. Position and frame
/// accumulator are updated under a single lock, so readers never see a
/// half-applied delta.
#[derive(Debug, Clone)]
pub struct RawPointerState {
    inner: Arc<Mutex<PointerInner>>,
}

impl RawPointerState {
    /// Starts at the centre of a `width` × `height` screen.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PointerInner {
                x: (width / 2) as f64,
                y: (height / 2) as f64,
                width: width as f64,
                height: height as f64,
                frame: FrameDelta::default(),
            })),
        }
    }

    /// Adds a raw delta, then pins the position to the screen bounds.
    /// Excess motion past an edge is discarded from the position but kept
    /// in the frame accumulator.
    pub fn apply_delta(&self, dx: f64, dy: f64) {
        self.inner.lock().apply(dx, dy);
    }

    /// Applies a device event's motion and latches its button mask.
    pub fn apply_event(&self, event: &PointerEvent) {
        let mut inner = self.inner.lock();
        inner.apply(event.dx, event.dy);
        inner.frame.buttons = event.buttons;
    }

    /// Cursor position in whole pixels.
    pub fn snapshot_position(&self) -> (i32, i32) {
        let inner = self.inner.lock();
        (inner.x as i32, inner.y as i32)
    }

    pub fn position(&self) -> (f64, f64) {
        let inner = self.inner.lock();
        (inner.x, inner.y)
    }

    pub fn frame_delta(&self) -> FrameDelta {
        self.inner.lock().frame
    }

    /// Returns the accumulated frame delta and zeroes the motion sums.
    /// The button mask is a level, not a sum, and is kept.
    pub fn take_frame_delta(&self) -> FrameDelta {
        let mut inner = self.inner.lock();
        let frame = inner.frame;
        inner.frame.dx = 0.0;
        inner.frame.dy = 0.0;
        frame
    }

    /// Zeroes the frame dx/dy and keeps the button level. Called on block
    /// entry so the first row of a block carries no motion made in between.
    pub fn reset_frame_delta(&self) {
        let mut inner = self.inner.lock();
        inner.frame.dx = 0.0;
        inner.frame.dy = 0.0;
    }

    pub fn bounds(&self) -> (u32, u32) {
        let inner = self.inner.lock();
        (inner.width as u32, inner.height as u32)
    }

    /// Adopts new screen bounds and re-clamps the current position.
    pub fn resize(&self, width: u32, height: u32) {
        let mut inner = self.inner.lock();
        inner.width = width as f64;
        inner.height = height as f64;
        inner.x = inner.x.clamp(0.0, inner.width);
        inner.y = inner.y.clamp(0.0, inner.height);
    }

    /// Adopts new screen bounds and moves the cursor to their centre.
    pub fn recenter(&self, width: u32, height: u32) {
        let mut inner = self.inner.lock();
        inner.width = width as f64;
        inner.height = height as f64;
        inner.x = (width / 2) as f64;
        inner.y = (height / 2) as f64;
    }
}
