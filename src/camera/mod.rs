//! Camera capture module for webcam access and frame delivery.
//!
//! - Device enumeration via [`list_devices`] and [`select_default`]
//! - Frame delivery via [`CaptureSession`] driving a [`FrameSource`]
//! - Configuration via [`CameraSettings`] and [`Resolution`]

mod device;
mod frame_utils;
mod session;
mod source;
mod types;

pub use device::{list_devices, select_default};
pub use frame_utils::{mirror_horizontal, to_rgb_image};
pub use session::{CaptureEvent, CaptureSession, FrameHandler, HandlerError, SessionEvent, SessionId};
pub use source::{FrameSource, NokhwaSource};
pub use types::{CameraError, CameraInfo, CameraSettings, Frame, Resolution};
