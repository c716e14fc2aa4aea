//! Presentation surface.
//!
//! Drives the [`RequestState`] of user triggered submissions and renders the camera preview,
//! the selected file, the result image, the detections and the live feed as text.
use std::{fmt, path::Path};

use common::protocol::DetectionResult;

use crate::{
    client::Submitter,
    payload::{self, SelectedFile},
    sensors::{CaptureError, CaptureSession},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestState {
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("a detection is already running")]
    Busy,
    #[error("no image selected")]
    NothingSelected,
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

pub struct Surface {
    submitter: Submitter,
    camera: CaptureSession,
    state: RequestState,
    selected: Option<SelectedFile>,
    result: Option<DetectionResult>,
    live_feed: Option<String>,
    alert: Option<String>,
}

impl Surface {
    pub fn new(submitter: Submitter, camera: CaptureSession) -> Self {
        Self {
            submitter,
            camera,
            state: RequestState::Idle,
            selected: None,
            result: None,
            live_feed: None,
            alert: None,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn result(&self) -> Option<&DetectionResult> {
        self.result.as_ref()
    }

    pub fn selected(&self) -> Option<&SelectedFile> {
        self.selected.as_ref()
    }

    pub fn live_feed(&self) -> Option<&str> {
        self.live_feed.as_deref()
    }

    pub fn camera_active(&self) -> bool {
        self.camera.is_active()
    }

    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Pending alert for the user, cleared once taken.
    pub fn take_alert(&mut self) -> Option<String> {
        self.alert.take()
    }

    pub fn start_camera(&mut self) {
        self.settle();
        if let Err(err) = self.camera.start() {
            log::error!("Error accessing camera: {err}");
            self.alert = Some(format!("Error accessing camera: {err}"));
        }
    }

    pub fn stop_camera(&mut self) {
        self.settle();
        self.camera.stop();
    }

    pub fn toggle_camera(&mut self) {
        if self.camera.is_active() {
            self.stop_camera();
        } else {
            self.start_camera();
        }
    }

    /// Choose a local image, dropping the previous result.
    pub async fn select_file(&mut self, path: impl AsRef<Path>) -> Result<(), SurfaceError> {
        self.ensure_not_busy()?;
        let selected = payload::select_file(path).await?;

        self.selected = Some(selected);
        self.result = None;
        self.state = RequestState::Idle;

        Ok(())
    }

    /// Submit the selected file.
    pub async fn submit_selected(&mut self) -> Result<RequestState, SurfaceError> {
        self.ensure_not_busy()?;
        let payload = self
            .selected
            .as_ref()
            .map(|selected| selected.payload.clone())
            .ok_or(SurfaceError::NothingSelected)?;

        self.begin_submission()?;
        let result = self.submitter.submit(payload).await;
        Ok(self.finish_submission(result))
    }

    /// Capture the current camera frame and submit it.
    pub async fn capture_and_detect(&mut self) -> Result<RequestState, SurfaceError> {
        self.ensure_not_busy()?;
        self.settle();
        let payload = self.camera.capture_frame().await.map_err(|err| {
            log::warn!("Capture failed: {err}");
            err
        })?;

        self.begin_submission()?;
        let result = self.submitter.submit(payload).await;
        Ok(self.finish_submission(result))
    }

    /// Attach or detach the live feed, returns whether it is now shown.
    pub fn toggle_live_feed(&mut self) -> bool {
        self.settle();
        self.live_feed = match self.live_feed.take() {
            Some(_) => None,
            None => Some(self.submitter.live_feed_url()),
        };
        self.live_feed.is_some()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }

    fn ensure_not_busy(&self) -> Result<(), SurfaceError> {
        match self.state {
            RequestState::Submitting => Err(SurfaceError::Busy),
            _ => Ok(()),
        }
    }

    /// A finished submission returns to idle on the next action.
    fn settle(&mut self) {
        if matches!(self.state, RequestState::Succeeded | RequestState::Failed) {
            self.state = RequestState::Idle;
        }
    }

    fn begin_submission(&mut self) -> Result<(), SurfaceError> {
        self.ensure_not_busy()?;
        self.settle();
        self.state = RequestState::Submitting;
        log::info!("Analyzing...");
        Ok(())
    }

    fn finish_submission(&mut self, result: DetectionResult) -> RequestState {
        self.state = match result.is_failure() {
            true => RequestState::Failed,
            false => RequestState::Succeeded,
        };
        self.result = Some(result);
        self.state
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Forest Fire Detection")?;

        match self.camera.preview() {
            Some(preview) => writeln!(
                f,
                "Camera: {} ({}x{})",
                preview.name, preview.resolution.0, preview.resolution.1
            )?,
            None => writeln!(f, "Camera: off")?,
        }

        if let Some(selected) = &self.selected {
            writeln!(f, "Preview: {}", selected.preview)?;
        }

        match self.state {
            RequestState::Submitting => writeln!(f, "Analyzing...")?,
            RequestState::Failed => writeln!(f, "Detection failed")?,
            RequestState::Idle | RequestState::Succeeded => {}
        }

        if let Some(result) = &self.result {
            if let Some(image) = &result.result_image {
                writeln!(f, "Result image: {image}")?;
            }
            if !result.detections.is_empty() {
                writeln!(f, "Detections:")?;
                for detection in &result.detections {
                    write!(f, "  {} - {}%", detection.label, detection.confidence)?;
                    if let Some([x1, y1, x2, y2]) = detection.bbox {
                        write!(f, " at ({x1}, {y1})-({x2}, {y2})")?;
                    }
                    writeln!(f)?;
                }
            }
        }

        if let Some(url) = &self.live_feed {
            writeln!(f, "Live feed: {url}")?;
        }

        Ok(())
    }
}
