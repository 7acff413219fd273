//! Raw pointer input: a lock-guarded accumulator fed by a bounded device
//! event queue.

pub mod device;
pub mod error;
pub mod pointer;

pub use device::{DeviceSink, DeviceUri, PointerButton, PointerEvent, PointingDevice, PumpMode};
pub use error::InputError;
pub use pointer::{FrameDelta, RawPointerState};
