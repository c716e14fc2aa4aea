//! Sensors module.
//!
//! A [`CaptureSession`] owns at most one open camera stream. Streams are released through a
//! single routine that runs both on [`CaptureSession::stop`] and when the session is dropped.
use crate::{
    frame::{encode_jpeg, rasterize, RawFrame, JPEG_QUALITY},
    payload::ImagePayload,
};

mod fake;
#[cfg(target_os = "linux")]
mod v4l;

pub use crate::frame::PixelFormat;
pub use fake::{FakeCamera, FakeCounters, FakeOutcome};
#[cfg(target_os = "linux")]
pub use v4l::V4lProvider;

/// File name given to captured frames.
pub const CAPTURE_FILE_NAME: &str = "capture.jpg";

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("access to the camera was denied: {0}")]
    DeviceAccessDenied(String),
    #[error("no usable camera: {0}")]
    DeviceUnavailable(String),
    #[error("no frame available")]
    NoFrameAvailable,
    #[error("could not encode frame: {0}")]
    Encode(String),
    #[error("could not read image file: {0}")]
    File(#[from] std::io::Error),
}

impl CaptureError {
    /// Classify an I/O error raised while opening or starting a device.
    pub fn from_device_io(device: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                CaptureError::DeviceAccessDenied(format!("{device}: {err}"))
            }
            _ => CaptureError::DeviceUnavailable(format!("{device}: {err}")),
        }
    }

    /// Whether the error concerns the device itself rather than a single frame.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            CaptureError::DeviceAccessDenied(_) | CaptureError::DeviceUnavailable(_)
        )
    }
}

/// An open, streaming camera.
pub trait VideoSource: Send {
    fn name(&self) -> &str;

    fn resolution(&self) -> (u32, u32);

    /// Latest frame, `None` while the device has not decoded one yet.
    fn capture(&mut self) -> Option<RawFrame>;

    /// Stop streaming and give the device back to the system.
    fn release(&mut self);
}

/// Opens camera streams on request.
pub trait DeviceProvider {
    fn open(&self) -> Result<Box<dyn VideoSource>, CaptureError>;
}

/// Provider for platforms without a video backend.
pub struct NoDevice;

impl DeviceProvider for NoDevice {
    fn open(&self) -> Result<Box<dyn VideoSource>, CaptureError> {
        Err(CaptureError::DeviceUnavailable(
            "no video backend on this platform".into(),
        ))
    }
}

/// What the preview of an active session shows.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DevicePreview {
    pub name: String,
    pub resolution: (u32, u32),
}

pub struct CaptureSession {
    provider: Box<dyn DeviceProvider>,
    stream: Option<Box<dyn VideoSource>>,
}

impl CaptureSession {
    pub fn new(provider: Box<dyn DeviceProvider>) -> Self {
        Self {
            provider,
            stream: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    pub fn preview(&self) -> Option<DevicePreview> {
        self.stream.as_ref().map(|stream| DevicePreview {
            name: stream.name().to_owned(),
            resolution: stream.resolution(),
        })
    }

    /// Acquire the camera. An already active stream is kept as is.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if let Some(stream) = &self.stream {
            log::debug!("Camera {} already active", stream.name());
            return Ok(());
        }

        let stream = self.provider.open()?;
        let (width, height) = stream.resolution();
        log::info!("Using camera {} at {width}x{height}", stream.name());
        self.stream = Some(stream);

        Ok(())
    }

    /// Release the camera, a no-op while no stream is active.
    pub fn stop(&mut self) {
        self.release();
    }

    /// Capture the current frame and encode it as JPEG.
    ///
    /// Reading the device and encoding both run on the blocking pool, the stream is handed back
    /// to the session afterwards.
    pub async fn capture_frame(&mut self) -> Result<ImagePayload, CaptureError> {
        let mut stream = self.stream.take().ok_or(CaptureError::NoFrameAvailable)?;

        let (stream, encoded) = tokio::task::spawn_blocking(move || {
            let encoded = stream
                .capture()
                .ok_or(CaptureError::NoFrameAvailable)
                .and_then(|frame| {
                    log::debug!(
                        "Captured {}x{} {:?} frame ({} bytes)",
                        frame.width,
                        frame.height,
                        frame.format,
                        frame.data.len()
                    );
                    let raster = rasterize(&frame)?;
                    encode_jpeg(&raster, JPEG_QUALITY)
                });
            (stream, encoded)
        })
        .await
        .map_err(|err| CaptureError::Encode(err.to_string()))?;

        self.stream = Some(stream);
        let jpeg = encoded?;

        Ok(ImagePayload::new(jpeg, "image/jpeg", CAPTURE_FILE_NAME))
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
            log::info!("Released camera {}", stream.name());
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[tokio::test]
    async fn capture_while_off_has_no_frame() {
        let mut session = CaptureSession::new(Box::new(FakeCamera::with_gray_frames(32, 24)));

        let captured = session.capture_frame().await;
        assert!(matches!(captured, Err(CaptureError::NoFrameAvailable)));
    }

    #[tokio::test]
    async fn capture_encodes_jpeg() -> Result<(), CaptureError> {
        let mut session = CaptureSession::new(Box::new(FakeCamera::with_gray_frames(32, 24)));
        session.start()?;

        let payload = session.capture_frame().await?;
        assert!(session.is_active());
        assert_eq!(payload.mime(), "image/jpeg");
        assert_eq!(payload.file_name(), CAPTURE_FILE_NAME);

        let decoded = image::load_from_memory(payload.bytes())
            .map_err(|err| CaptureError::Encode(err.to_string()))?;
        assert_eq!((decoded.width(), decoded.height()), (32, 24));

        Ok(())
    }

    #[tokio::test]
    async fn repeated_captures_keep_one_stream() -> Result<(), CaptureError> {
        let camera = FakeCamera::with_gray_frames(16, 16);
        let counters = camera.counters();
        let mut session = CaptureSession::new(Box::new(camera));
        session.start()?;

        for _ in 0..3 {
            session.capture_frame().await?;
        }
        assert!(session.is_active());
        assert_eq!(counters.opened(), 1);
        assert_eq!(counters.released(), 0);

        session.stop();
        assert_eq!(counters.released(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn capture_before_first_frame_fails() -> Result<(), CaptureError> {
        let mut session = CaptureSession::new(Box::new(FakeCamera::new(FakeOutcome::Warming)));
        session.start()?;

        let captured = session.capture_frame().await;
        assert!(matches!(captured, Err(CaptureError::NoFrameAvailable)));
        assert!(session.is_active());

        Ok(())
    }

    #[test]
    fn stop_is_idempotent() -> Result<(), CaptureError> {
        let camera = FakeCamera::with_gray_frames(8, 8);
        let counters = camera.counters();
        let mut session = CaptureSession::new(Box::new(camera));

        session.stop();
        assert_eq!(counters.released(), 0);

        session.start()?;
        session.stop();
        session.stop();
        assert!(!session.is_active());
        assert_eq!(counters.opened(), 1);
        assert_eq!(counters.released(), 1);

        Ok(())
    }

    #[test]
    fn start_twice_keeps_one_stream() -> Result<(), CaptureError> {
        let camera = FakeCamera::with_gray_frames(8, 8);
        let counters = camera.counters();
        let mut session = CaptureSession::new(Box::new(camera));

        session.start()?;
        session.start()?;
        assert_eq!(counters.opened(), 1);

        Ok(())
    }

    #[test]
    fn drop_releases_active_stream() -> Result<(), CaptureError> {
        let camera = FakeCamera::with_gray_frames(8, 8);
        let counters = camera.counters();

        {
            let mut session = CaptureSession::new(Box::new(camera));
            session.start()?;
        }

        assert_eq!(counters.released(), 1);
        Ok(())
    }

    #[test]
    fn denied_device_leaves_session_off() {
        let mut session = CaptureSession::new(Box::new(FakeCamera::new(FakeOutcome::Denied)));

        let started = session.start();
        assert!(matches!(started, Err(CaptureError::DeviceAccessDenied(_))));
        assert!(!session.is_active());
        assert!(session.preview().is_none());
    }

    #[test]
    fn permission_errors_are_access_denied() {
        let err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(matches!(
            CaptureError::from_device_io("/dev/video0", err),
            CaptureError::DeviceAccessDenied(_)
        ));

        let err = std::io::Error::from(std::io::ErrorKind::NotFound);
        let err = CaptureError::from_device_io("/dev/video0", err);
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        assert!(err.is_device_error());
    }
}
