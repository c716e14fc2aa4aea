//! Client of the fire detection service.
//!
//! Submissions are fail-soft: [`Submitter::submit`] turns every transport or parsing error into
//! a [`DetectionResult::failure`] so callers always have something to render.
use std::path::Path;

use common::protocol::{DetectionResult, HistoryEntry, PredictResponse};
use reqwest::{multipart, Client};

use crate::{payload::ImagePayload, utils::download_file, Error};

/// Address used when none is configured.
pub const DEFAULT_ADDRESS: &str = "localhost:5000";

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("could not parse response: {0}")]
    ResponseParse(#[from] serde_json::Error),
}

/// Location of the detection service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoint {
    base: String,
}

impl Endpoint {
    /// Accepts either a full base URL or a bare `host:port`.
    pub fn new(address: &str) -> Self {
        let address = address.trim_end_matches('/');
        let base = if has_http_scheme(address) {
            address.to_owned()
        } else {
            format!("http://{address}")
        };
        Self { base }
    }

    pub fn predict_url(&self) -> String {
        format!("{}/predict", self.base)
    }

    pub fn live_feed_url(&self) -> String {
        format!("{}/live_feed", self.base)
    }

    pub fn history_url(&self) -> String {
        format!("{}/history", self.base)
    }
}

/// Whether the address starts with `http://` or `https://`, in any case.
fn has_http_scheme(address: &str) -> bool {
    ["http://", "https://"].iter().any(|scheme| {
        address
            .get(..scheme.len())
            .map_or(false, |prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}

pub struct Submitter {
    client: Client,
    endpoint: Endpoint,
}

impl Submitter {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }

    /// Submit an image, collapsing any failure into a single synthetic entry.
    pub async fn submit(&self, payload: ImagePayload) -> DetectionResult {
        match self.try_submit(payload).await {
            Ok(result) => result,
            Err(err) => {
                log::warn!("Prediction failed: {err}");
                DetectionResult::failure()
            }
        }
    }

    /// Submit an image as a multipart upload and parse the detections.
    pub async fn try_submit(
        &self,
        payload: ImagePayload,
    ) -> Result<DetectionResult, SubmissionError> {
        let url = self.endpoint.predict_url();
        let (bytes, mime, file_name) = payload.into_parts();
        log::info!("Submitting {} ({} bytes) to {}", file_name, bytes.len(), url);

        let part = multipart::Part::bytes(bytes.to_vec())
            .file_name(file_name)
            .mime_str(&mime)?;
        let form = multipart::Form::new().part(IMAGE_FIELD, part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;

        let prediction: PredictResponse = serde_json::from_slice(&body)?;
        let result = DetectionResult::from(prediction);
        log::info!("Received {} detections", result.detections.len());

        Ok(result)
    }

    /// URL of the server-pushed stream of annotated frames.
    pub fn live_feed_url(&self) -> String {
        self.endpoint.live_feed_url()
    }

    /// Past detections of the service, newest first.
    pub async fn history(&self) -> Result<Vec<HistoryEntry>, SubmissionError> {
        let response = self
            .client
            .get(self.endpoint.history_url())
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;

        Ok(serde_json::from_slice(&body)?)
    }

    /// Save the annotated image of a result to disk, if it references one.
    pub async fn download_result_image(
        &self,
        result: &DetectionResult,
        filepath: impl AsRef<Path>,
    ) -> Result<bool, Error> {
        match result.result_image.as_deref() {
            Some(url) if has_http_scheme(url) => {
                download_file(&self.client, url, filepath).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
