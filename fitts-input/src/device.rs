use crate::error::InputError;
use crate::pointer::RawPointerState;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default bound of the device event queue.
pub const DEFAULT_CAPACITY: usize = 4096;

const PUMP_POLL: Duration = Duration::from_millis(20);

/// One report from the pointing device: relative motion plus the
/// button bitmask as it stood when the report was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub timestamp_ns: u64,
    pub dx: f64,
    pub dy: f64,
    pub buttons: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceScheme {
    /// Whatever raw pointer stream the window system exposes
    Any,
    Winit,
}

/// Who drains the event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpMode {
    /// A dedicated thread applies events as they arrive.
    Thread,
    /// The host calls [`PointingDevice::idle`] once per frame.
    Idle,
}

/// Parsed device URI, e.g. `any:?debugLevel=2&capacity=1024&pump=idle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceUri {
    pub scheme: DeviceScheme,
    pub debug_level: u8,
    pub capacity: usize,
    pub pump: PumpMode,
}

impl FromStr for DeviceUri {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| InputError::MalformedUri(s.to_string()))?;

        let scheme = match scheme {
            "any" => DeviceScheme::Any,
            "winit" => DeviceScheme::Winit,
            other => return Err(InputError::UnsupportedScheme(other.to_string())),
        };

        let mut uri = DeviceUri {
            scheme,
            debug_level: 0,
            capacity: DEFAULT_CAPACITY,
            pump: PumpMode::Thread,
        };

        let query = rest.trim_start_matches('/');
        let query = match query.split_once('?') {
            Some((_, q)) => q,
            None if query.is_empty() => "",
            None => return Err(InputError::MalformedUri(s.to_string())),
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| InputError::MalformedUri(s.to_string()))?;
            let invalid = || InputError::InvalidParameter {
                key: key.to_string(),
                value: value.to_string(),
            };
            match key {
                "debugLevel" => {
                    uri.debug_level = value.parse().map_err(|_| invalid())?;
                }
                "capacity" => {
                    uri.capacity = value.parse().map_err(|_| invalid())?;
                    if uri.capacity == 0 {
                        return Err(invalid());
                    }
                }
                "pump" => {
                    uri.pump = match value {
                        "thread" => PumpMode::Thread,
                        "idle" => PumpMode::Idle,
                        _ => return Err(invalid()),
                    };
                }
                _ => {
                    tracing::warn!(key, value, "ignoring unknown device parameter");
                }
            }
        }

        Ok(uri)
    }
}

/// Pointer buttons with a fixed bit in the logged button mask:
/// left = bit 0, right = bit 1, middle = bit 2, further buttons from bit 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
    Other(u32),
}

impl PointerButton {
    /// Maps the window system's raw device button id. X11 numbers buttons
    /// from 1 (1 left, 2 middle, 3 right), Wayland uses evdev codes
    /// (0x110 left, 0x111 right, 0x112 middle), Windows raw input reports
    /// 0 left, 1 middle, 2 right and macOS 0 left, 1 right, 2 middle.
    pub fn from_raw(raw: u32) -> Self {
        #[cfg(any(target_os = "linux", target_os = "freebsd", target_os = "openbsd"))]
        let button = match raw {
            1 | 0x110 => Self::Left,
            3 | 0x111 => Self::Right,
            2 | 0x112 => Self::Middle,
            other => Self::Other(other),
        };
        #[cfg(target_os = "windows")]
        let button = match raw {
            0 => Self::Left,
            1 => Self::Middle,
            2 => Self::Right,
            other => Self::Other(other),
        };
        #[cfg(not(any(
            target_os = "linux",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "windows"
        )))]
        let button = match raw {
            0 => Self::Left,
            1 => Self::Right,
            2 => Self::Middle,
            other => Self::Other(other),
        };
        button
    }

    pub fn bit(self) -> u32 {
        match self {
            Self::Left => 1,
            Self::Right => 1 << 1,
            Self::Middle => 1 << 2,
            Self::Other(raw) => 1u32.checked_shl(raw.saturating_add(3)).unwrap_or(0),
        }
    }
}

/// Consumer used in [`PumpMode::Idle`]. Shared by the device and its sinks
/// so a producer on the host thread can apply the backlog itself.
#[derive(Debug, Clone)]
struct IdleDrain {
    receiver: Receiver<PointerEvent>,
    pointer: RawPointerState,
    applied: Arc<AtomicU64>,
    debug_level: u8,
}

impl IdleDrain {
    fn run(&self) -> usize {
        let mut count = 0;
        for event in self.receiver.try_iter() {
            apply(&self.pointer, &event, self.debug_level);
            count += 1;
        }
        self.applied.fetch_add(count as u64, Ordering::Relaxed);
        count
    }
}

/// Producer half of the device queue, fed by the window system's raw
/// device stream. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DeviceSink {
    sender: Sender<PointerEvent>,
    buttons: Arc<AtomicU32>,
    idle: Option<IdleDrain>,
}

impl DeviceSink {
    /// Queues an event without ever dropping it. With a pump thread a full
    /// queue blocks until the pump catches up; in idle mode the producer is
    /// usually the only consumer's thread, so a full queue is applied inline
    /// before the event is queued.
    pub fn push(&self, event: PointerEvent) -> Result<(), InputError> {
        let Some(drain) = &self.idle else {
            return self
                .sender
                .send(event)
                .map_err(|_| InputError::Disconnected);
        };

        let mut event = event;
        loop {
            match self.sender.try_send(event) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(back)) => {
                    drain.run();
                    event = back;
                }
                Err(TrySendError::Disconnected(_)) => return Err(InputError::Disconnected),
            }
        }
    }

    pub fn motion(&self, timestamp_ns: u64, dx: f64, dy: f64) -> Result<(), InputError> {
        self.push(PointerEvent {
            timestamp_ns,
            dx,
            dy,
            buttons: self.buttons.load(Ordering::Acquire),
        })
    }

    /// Records a press or release of `button` as a zero-motion event.
    pub fn button(
        &self,
        timestamp_ns: u64,
        button: PointerButton,
        pressed: bool,
    ) -> Result<(), InputError> {
        let bit = button.bit();
        let buttons = if pressed {
            self.buttons.fetch_or(bit, Ordering::AcqRel) | bit
        } else {
            self.buttons.fetch_and(!bit, Ordering::AcqRel) & !bit
        };
        self.push(PointerEvent {
            timestamp_ns,
            dx: 0.0,
            dy: 0.0,
            buttons,
        })
    }
}

/// A bound raw pointing device.
///
/// Events pushed through [`DeviceSink`] are applied to the shared
/// [`RawPointerState`] strictly in arrival order, either by a pump thread
/// or on the host thread ([`PointingDevice::idle`] and full-queue pushes),
/// never both.
pub struct PointingDevice {
    uri: DeviceUri,
    sink: DeviceSink,
    pump: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    applied: Arc<AtomicU64>,
}

impl PointingDevice {
    /// Binds the device described by `uri`, spawning the pump thread when
    /// the URI asks for one.
    pub fn open(uri: &str, pointer: RawPointerState) -> Result<Self, InputError> {
        let uri: DeviceUri = uri.parse()?;
        let (sender, receiver) = bounded(uri.capacity);
        let applied = Arc::new(AtomicU64::new(0));

        let idle = (uri.pump == PumpMode::Idle).then(|| IdleDrain {
            receiver: receiver.clone(),
            pointer: pointer.clone(),
            applied: Arc::clone(&applied),
            debug_level: uri.debug_level,
        });

        let mut device = Self {
            sink: DeviceSink {
                sender,
                buttons: Arc::new(AtomicU32::new(0)),
                idle,
            },
            pump: None,
            running: Arc::new(AtomicBool::new(true)),
            applied,
            uri,
        };

        if device.uri.pump == PumpMode::Thread {
            device.spawn_pump(receiver, pointer)?;
        }

        tracing::info!(
            scheme = ?device.uri.scheme,
            pump = ?device.uri.pump,
            capacity = device.uri.capacity,
            "pointing device bound"
        );
        Ok(device)
    }

    pub fn sink(&self) -> DeviceSink {
        self.sink.clone()
    }

    /// Total events applied to the pointer so far.
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Applies every pending event and returns how many were applied.
    /// Does nothing while a pump thread owns the queue.
    pub fn idle(&self) -> usize {
        self.sink.idle.as_ref().map_or(0, IdleDrain::run)
    }

    fn spawn_pump(
        &mut self,
        receiver: Receiver<PointerEvent>,
        pointer: RawPointerState,
    ) -> Result<(), InputError> {
        let running = Arc::clone(&self.running);
        let applied = Arc::clone(&self.applied);
        let debug_level = self.uri.debug_level;

        let handle = thread::Builder::new()
            .name("pointer-pump".into())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    match receiver.recv_timeout(PUMP_POLL) {
                        Ok(event) => {
                            apply(&pointer, &event, debug_level);
                            applied.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                // whatever is still queued belongs to this session
                for event in receiver.try_iter() {
                    apply(&pointer, &event, debug_level);
                    applied.fetch_add(1, Ordering::Relaxed);
                }
            })
            .map_err(InputError::Spawn)?;

        self.pump = Some(handle);
        Ok(())
    }

    /// Stops the pump thread after it has drained the queue.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.pump.take() {
            if handle.join().is_err() {
                tracing::error!("pointer pump thread panicked");
            }
        }
    }
}

impl Drop for PointingDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn apply(pointer: &RawPointerState, event: &PointerEvent, debug_level: u8) {
    pointer.apply_event(event);
    if debug_level >= 2 {
        tracing::trace!(
            t = event.timestamp_ns,
            dx = event.dx,
            dy = event.dy,
            buttons = event.buttons,
            "device event"
        );
    }
}
