//! Protocol definition for the fire detection service.
//!
use serde::{Deserialize, Deserializer, Serialize};

/// Label of the synthetic entry standing in for a failed submission.
pub const FAILURE_LABEL: &str = "Error during prediction.";

/// One entry of the `prediction` array.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Prediction {
    pub class: String,
    pub confidence: f32,
    /// Box corners `[x1, y1, x2, y2]` in pixels of the uploaded image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[i32; 4]>,
}

impl Prediction {
    pub fn new(class: impl Into<String>, confidence: f32) -> Self {
        Self {
            class: class.into(),
            confidence,
            bbox: None,
        }
    }
}

/// Body of a `POST /predict` response.
#[derive(Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PredictResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub prediction: Vec<Prediction>,
    #[serde(default)]
    pub result_image: Option<String>,
}

/// One record of `GET /history`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub image: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub prediction: Vec<Prediction>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Prediction>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<Prediction>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// A single labeled classification, confidence in percent.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: Option<[i32; 4]>,
}

impl From<Prediction> for Detection {
    fn from(prediction: Prediction) -> Self {
        Self {
            label: prediction.class,
            confidence: prediction.confidence,
            bbox: prediction.bbox,
        }
    }
}

/// Outcome of one submission.
///
/// A new result always replaces the previous one, detections keep the order of the response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    /// Reference to the annotated image, usually a URL served by the detection service.
    pub result_image: Option<String>,
    failed: bool,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>, result_image: Option<String>) -> Self {
        Self {
            detections,
            result_image,
            failed: false,
        }
    }

    /// Renderable stand-in for a submission that did not produce a response.
    pub fn failure() -> Self {
        Self {
            detections: vec![Detection {
                label: FAILURE_LABEL.to_owned(),
                confidence: 0.0,
                bbox: None,
            }],
            result_image: None,
            failed: true,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failed
    }
}

impl From<PredictResponse> for DetectionResult {
    fn from(response: PredictResponse) -> Self {
        Self::new(
            response.prediction.into_iter().map(Detection::from).collect(),
            response.result_image,
        )
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::Error;

    #[test]
    fn test_predict_response_to_result() -> Result<(), Error> {
        let body = r#"{
            "prediction": [
                {"class": "Fire", "confidence": 97},
                {"class": "Smoke", "confidence": 61.5, "bbox": [1, 2, 30, 40]}
            ],
            "result_image": "http://x/y.jpg"
        }"#;

        let response: PredictResponse = serde_json::from_str(body)?;
        let result = DetectionResult::from(response);

        assert_eq!(result.detections.len(), 2);
        assert_eq!(result.detections[0].label, "Fire");
        assert_eq!(result.detections[0].confidence, 97.0);
        assert_eq!(result.detections[1].bbox, Some([1, 2, 30, 40]));
        assert_eq!(result.result_image.as_deref(), Some("http://x/y.jpg"));
        assert!(!result.is_failure());

        Ok(())
    }

    #[test]
    fn test_missing_or_null_prediction_is_empty() -> Result<(), Error> {
        let missing: PredictResponse = serde_json::from_str(r#"{"result_image": null}"#)?;
        assert!(missing.prediction.is_empty());
        assert!(missing.result_image.is_none());

        let null: PredictResponse = serde_json::from_str(r#"{"prediction": null}"#)?;
        assert!(null.prediction.is_empty());

        Ok(())
    }

    #[test]
    fn test_failure_has_single_zero_entry() {
        let failure = DetectionResult::failure();

        assert!(failure.is_failure());
        assert_eq!(failure.detections.len(), 1);
        assert_eq!(failure.detections[0].label, FAILURE_LABEL);
        assert_eq!(failure.detections[0].confidence, 0.0);
        assert!(failure.result_image.is_none());
    }

    #[test]
    fn test_history_entry() -> Result<(), Error> {
        let body = r#"[{
            "timestamp": "2024-05-01 12:00:00",
            "image": "http://localhost:5000/results/a_result.jpg",
            "prediction": [{"class": "No fire detected", "confidence": 100}]
        }]"#;

        let history: Vec<HistoryEntry> = serde_json::from_str(body)?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].prediction, vec![Prediction::new("No fire detected", 100.0)]);

        Ok(())
    }
}
