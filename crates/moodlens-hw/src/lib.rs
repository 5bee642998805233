//! moodlens-hw — Hardware abstraction for camera capture.
//!
//! Provides V4L2-based continuous capture and device enumeration.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CaptureSession, DeviceInfo, PixelFormat};
pub use frame::Frame;
