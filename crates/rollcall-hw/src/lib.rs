//! rollcall-hw — V4L2 webcam capture for the check-in station.
//!
//! Negotiates a YUYV or MJPG stream and hands out RGB8 frames with
//! dark-frame filtering.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
