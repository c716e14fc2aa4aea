//! V4L2 camera backend.
//!
use bytes::Bytes;
use rscam::{Camera, Config};

use super::{CaptureError, DeviceProvider, VideoSource};
use crate::frame::{PixelFormat, RawFrame};

/// Formats we can rasterize, in order of preference.
const PREFERRED_FORMATS: [PixelFormat; 3] =
    [PixelFormat::Mjpeg, PixelFormat::Yuyv, PixelFormat::Rgb24];

/// Opens a video device on a Linux machine.
#[derive(Clone, Debug)]
pub struct V4lProvider {
    device: String,
    format: Option<PixelFormat>,
    resolution: Option<(u32, u32)>,
    frame_rate: Option<(u32, u32)>,
}

impl V4lProvider {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            format: None,
            resolution: None,
            frame_rate: None,
        }
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_resolution(mut self, resolution: (u32, u32)) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Frame interval as `(numerator, denominator)` seconds.
    pub fn with_frame_rate(mut self, frame_rate: (u32, u32)) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    fn device_error(&self, err: rscam::Error) -> CaptureError {
        match err {
            rscam::Error::Io(err) => CaptureError::from_device_io(&self.device, err),
            other => self.unavailable(&other.to_string()),
        }
    }

    fn unavailable(&self, reason: &str) -> CaptureError {
        CaptureError::DeviceUnavailable(format!("{}: {reason}", self.device))
    }
}

impl DeviceProvider for V4lProvider {
    fn open(&self) -> Result<Box<dyn VideoSource>, CaptureError> {
        let mut cam = Camera::new(&self.device)
            .map_err(|err| CaptureError::from_device_io(&self.device, err))?;

        let format = match self.format {
            Some(format) => format,
            None => select_format(&cam, &self.device)?,
        };
        log_supported_formats(&cam, format);

        let resolution = match self.resolution {
            Some(resolution) => resolution,
            None => get_max_resolution(&cam, format.fourcc())
                .map_err(|err| self.device_error(err))?
                .ok_or_else(|| self.unavailable("no resolution found"))?,
        };

        let frame_rate = match self.frame_rate {
            Some(frame_rate) => frame_rate,
            None => get_max_frame_rate(&cam, format.fourcc(), resolution)
                .map_err(|err| self.device_error(err))?
                .ok_or_else(|| self.unavailable("no frame rate found"))?,
        };

        cam.start(&Config {
            interval: frame_rate,
            resolution,
            format: format.fourcc(),
            ..Default::default()
        })
        .map_err(|err| self.device_error(err))?;

        Ok(Box::new(V4lStream {
            name: self.device.clone(),
            camera: Some(cam),
            format,
            resolution,
        }))
    }
}

struct V4lStream {
    name: String,
    camera: Option<Camera>,
    format: PixelFormat,
    resolution: (u32, u32),
}

impl VideoSource for V4lStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn capture(&mut self) -> Option<RawFrame> {
        let camera = self.camera.as_ref()?;
        match camera.capture() {
            Ok(frame) => Some(RawFrame {
                width: frame.resolution.0,
                height: frame.resolution.1,
                format: PixelFormat::from_fourcc(&frame.format).unwrap_or(self.format),
                data: Bytes::copy_from_slice(&frame[..]),
            }),
            Err(err) => {
                log::error!("Error capturing frame from {}: {err}", self.name);
                None
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(err) = camera.stop() {
                log::warn!("Error stopping camera {}: {err}", self.name);
            }
        }
    }
}

impl Drop for V4lStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Pick the first preferred format the device supports.
fn select_format(cam: &Camera, device: &str) -> Result<PixelFormat, CaptureError> {
    let supported: Vec<[u8; 4]> = cam
        .formats()
        .filter_map(Result::ok)
        .map(|info| info.format)
        .collect();

    PREFERRED_FORMATS
        .into_iter()
        .find(|format| supported.iter().any(|fourcc| &fourcc[..] == format.fourcc()))
        .ok_or_else(|| {
            CaptureError::DeviceUnavailable(format!("{device}: no supported pixel format"))
        })
}

/// Get the maximum supported resolution for the given format.
fn get_max_resolution(cam: &Camera, format: &[u8]) -> Result<Option<(u32, u32)>, rscam::Error> {
    let resolution_info = cam.resolutions(format)?;
    log::debug!("Found resolutions: {:?}", &resolution_info);
    Ok(match resolution_info {
        rscam::ResolutionInfo::Discretes(resolutions) => resolutions
            .into_iter()
            // Highest resolution in terms of number of pixels
            .max_by_key(|(width, height)| u64::from(*width) * u64::from(*height)),
        rscam::ResolutionInfo::Stepwise { max, .. } => Some(max),
    })
}

/// Get the shortest frame interval for the given format and resolution.
fn get_max_frame_rate(
    cam: &Camera,
    format: &[u8],
    resolution: (u32, u32),
) -> Result<Option<(u32, u32)>, rscam::Error> {
    let interval_info = cam.intervals(format, resolution)?;
    log::debug!("Found frame rates: {:?}", &interval_info);
    Ok(match interval_info {
        // Intervals are `numerator / denominator` seconds, the rate is the inverse
        rscam::IntervalInfo::Discretes(intervals) => intervals.into_iter().max_by(|a, b| {
            (u64::from(a.1) * u64::from(b.0)).cmp(&(u64::from(b.1) * u64::from(a.0)))
        }),
        rscam::IntervalInfo::Stepwise { min, .. } => Some(min),
    })
}

fn log_supported_formats(cam: &Camera, format: PixelFormat) {
    let formats: Vec<_> = cam.formats().filter_map(Result::ok).collect();
    log::debug!(
        "Supported formats: {:?}, using format {:?}",
        formats,
        format
    );
}
