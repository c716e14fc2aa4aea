//! In-memory camera for machines without a video device.
//!
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use bytes::Bytes;

use super::{CaptureError, DeviceProvider, VideoSource};
use crate::frame::{PixelFormat, RawFrame};

/// How the fake device behaves when opened.
#[derive(Clone, Debug)]
pub enum FakeOutcome {
    /// Opens and repeats the given frame.
    Frames(RawFrame),
    /// Opens but never delivers a frame.
    Warming,
    Denied,
    Absent,
}

/// Shared counters of streams opened and released by a [`FakeCamera`].
#[derive(Clone, Debug, Default)]
pub struct FakeCounters {
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl FakeCounters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

pub struct FakeCamera {
    outcome: FakeOutcome,
    counters: FakeCounters,
}

impl FakeCamera {
    pub fn new(outcome: FakeOutcome) -> Self {
        Self {
            outcome,
            counters: FakeCounters::default(),
        }
    }

    /// Camera delivering uniform gray RGB frames.
    pub fn with_gray_frames(width: u32, height: u32) -> Self {
        Self::new(FakeOutcome::Frames(RawFrame {
            width,
            height,
            format: PixelFormat::Rgb24,
            data: Bytes::from(vec![128_u8; (width * height * 3) as usize]),
        }))
    }

    pub fn counters(&self) -> FakeCounters {
        self.counters.clone()
    }
}

impl DeviceProvider for FakeCamera {
    fn open(&self) -> Result<Box<dyn VideoSource>, CaptureError> {
        let frame = match &self.outcome {
            FakeOutcome::Frames(frame) => Some(frame.clone()),
            FakeOutcome::Warming => None,
            FakeOutcome::Denied => {
                return Err(CaptureError::DeviceAccessDenied("fake: permission denied".into()))
            }
            FakeOutcome::Absent => {
                return Err(CaptureError::DeviceUnavailable("fake: no such device".into()))
            }
        };

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            frame,
            released: Arc::clone(&self.counters.released),
        }))
    }
}

struct FakeStream {
    frame: Option<RawFrame>,
    released: Arc<AtomicUsize>,
}

impl VideoSource for FakeStream {
    fn name(&self) -> &str {
        "fake"
    }

    fn resolution(&self) -> (u32, u32) {
        self.frame
            .as_ref()
            .map(|frame| (frame.width, frame.height))
            .unwrap_or((0, 0))
    }

    fn capture(&mut self) -> Option<RawFrame> {
        self.frame.clone()
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
