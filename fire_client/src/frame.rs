//! Raw camera frames and their conversion to encoded stills.
//!
use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, ColorType, ImageFormat, RgbImage};

use crate::sensors::CaptureError;

/// Quality used when encoding captured frames, same as a browser canvas export.
pub const JPEG_QUALITY: u8 = 92;

/// Pixel layouts a camera may deliver.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PixelFormat {
    Mjpeg,
    Yuyv,
    Rgb24,
}

impl PixelFormat {
    pub fn fourcc(&self) -> &'static [u8] {
        match self {
            PixelFormat::Mjpeg => b"MJPG",
            PixelFormat::Yuyv => b"YUYV",
            PixelFormat::Rgb24 => b"RGB3",
        }
    }

    pub fn from_fourcc(fourcc: &[u8]) -> Option<Self> {
        match fourcc {
            b"MJPG" => Some(PixelFormat::Mjpeg),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"RGB3" => Some(PixelFormat::Rgb24),
            _ => None,
        }
    }
}

/// A single frame as delivered by the device.
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Bytes,
}

/// Draw a frame into an RGB raster at its native resolution.
pub fn rasterize(frame: &RawFrame) -> Result<RgbImage, CaptureError> {
    if frame.data.is_empty() || frame.width == 0 || frame.height == 0 {
        return Err(CaptureError::NoFrameAvailable);
    }

    match frame.format {
        PixelFormat::Mjpeg => image::load_from_memory_with_format(&frame.data, ImageFormat::Jpeg)
            .map(|image| image.to_rgb8())
            .map_err(|err| CaptureError::Encode(err.to_string())),
        PixelFormat::Yuyv => yuyv_to_rgb(frame.width, frame.height, &frame.data),
        PixelFormat::Rgb24 => RgbImage::from_raw(frame.width, frame.height, frame.data.to_vec())
            .ok_or_else(|| size_mismatch(frame)),
    }
}

/// Encode a raster as JPEG.
pub fn encode_jpeg(raster: &RgbImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode(
            raster.as_raw(),
            raster.width(),
            raster.height(),
            ColorType::Rgb8,
        )
        .map_err(|err| CaptureError::Encode(err.to_string()))?;

    Ok(buf)
}

fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<RgbImage, CaptureError> {
    let num_pixels = width as usize * height as usize;
    let expected = num_pixels * 2;
    if data.len() < expected {
        return Err(CaptureError::Encode(format!(
            "YUYV frame of {} bytes is too short for {width}x{height}",
            data.len()
        )));
    }

    let mut rgb = Vec::with_capacity(num_pixels * 3);
    // Every 4 bytes hold two pixels sharing their chroma: Y0 U Y1 V
    for chunk in data[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        rgb.extend_from_slice(&yuv_to_pixel(chunk[0] as f32, u, v));
        rgb.extend_from_slice(&yuv_to_pixel(chunk[2] as f32, u, v));
    }

    RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
        CaptureError::Encode(format!("odd pixel count for YUYV frame {width}x{height}"))
    })
}

fn yuv_to_pixel(y: f32, u: f32, v: f32) -> [u8; 3] {
    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;
    [clamp(r), clamp(g), clamp(b)]
}

fn clamp(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn size_mismatch(frame: &RawFrame) -> CaptureError {
    CaptureError::Encode(format!(
        "{} bytes do not match a {}x{} {:?} frame",
        frame.data.len(),
        frame.width,
        frame.height,
        frame.format
    ))
}
