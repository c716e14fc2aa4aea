//! Client for a remote fire detection service.
//!
//! Stills come either from a file or from a camera frame, are submitted to the service as a
//! multipart upload and the returned detections are presented as a text view.
pub mod client;
pub mod frame;
pub mod payload;
pub mod sensors;
pub mod surface;
pub mod utils;

/// Error type.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
