use eframe::egui;
use reqwest::blocking::multipart;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ApiError;
use crate::model::{AnnotationSet, Tag};
use crate::session::SelectedFile;

const STATUS_SUCCESS: &str = "success";

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Deserialize)]
pub struct UploadResponse {
    pub filename: String,
    pub status: String,
    /// Size of the copy the server kept, which may have been downscaled.
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Coordinates {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Prediction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    pub coordinates: Coordinates,
}

impl Prediction {
    /// Box and tag for this detection. Labels outside the tag set come back
    /// unassigned.
    pub fn to_box(&self) -> (egui::Rect, Tag) {
        let c = &self.coordinates;
        let rect = egui::Rect::from_min_size(egui::pos2(c.x, c.y), egui::vec2(c.width, c.height));
        let tag = Tag::parse(&self.kind).unwrap_or_else(|| {
            log::warn!("Unknown predicted type '{}', leaving it untagged", self.kind);
            Tag::Unassigned
        });
        (rect, tag)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PredictResponse {
    pub filename: String,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SavedAnnotation {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub tag: Tag,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub filename: String,
    pub annotations: Vec<SavedAnnotation>,
    pub image_width: u32,
    pub image_height: u32,
}

impl SaveRequest {
    /// Snapshot of every committed box. A box still being drawn lives in the
    /// editor's gesture state and is never part of `set`.
    pub fn new(filename: String, set: &AnnotationSet, image_size: [u32; 2]) -> Self {
        let annotations = set
            .iter()
            .map(|a| SavedAnnotation {
                id: a.id.to_string(),
                x: a.x,
                y: a.y,
                width: a.width,
                height: a.height,
                tag: a.tag,
            })
            .collect();
        Self {
            filename,
            annotations,
            image_width: image_size[0],
            image_height: image_size[1],
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SaveResponse {
    pub filename: String,
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

trait Reply {
    fn status(&self) -> &str;
}

impl Reply for UploadResponse {
    fn status(&self) -> &str {
        &self.status
    }
}

impl Reply for PredictResponse {
    fn status(&self) -> &str {
        &self.status
    }
}

impl Reply for SaveResponse {
    fn status(&self) -> &str {
        &self.status
    }
}

// ── Client ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    pub fn upload(&self, file: &SelectedFile) -> Result<UploadResponse, ApiError> {
        log::info!("Uploading {} ({} bytes)", file.name, file.bytes.len());
        let response = self
            .http
            .post(self.url("upload"))
            .multipart(file_form(file)?)
            .send()?;
        read_reply(response)
    }

    pub fn predict(&self, file: &SelectedFile) -> Result<PredictResponse, ApiError> {
        log::info!("Requesting predictions for {}", file.name);
        let response = self
            .http
            .post(self.url("predict"))
            .multipart(file_form(file)?)
            .send()?;
        read_reply(response)
    }

    pub fn save(&self, request: &SaveRequest) -> Result<SaveResponse, ApiError> {
        log::info!(
            "Saving {} annotations for {}",
            request.annotations.len(),
            request.filename
        );
        let response = self
            .http
            .post(self.url("save-annotations"))
            .json(request)
            .send()?;
        read_reply(response)
    }
}

fn file_form(file: &SelectedFile) -> Result<multipart::Form, ApiError> {
    let mut part = multipart::Part::bytes(file.bytes.to_vec()).file_name(file.name.clone());
    if let Ok(format) = image::ImageFormat::from_path(&file.name) {
        part = part.mime_str(format.to_mime_type())?;
    }
    Ok(multipart::Form::new().part("file", part))
}

fn read_reply<T: DeserializeOwned + Reply>(
    response: reqwest::blocking::Response,
) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(ApiError::Server {
            status: status.as_u16(),
            message: error_message(&body).unwrap_or_else(|| status.to_string()),
        });
    }
    let reply: T = response.json()?;
    if reply.status() != STATUS_SUCCESS {
        return Err(ApiError::Rejected(reply.status().to_string()));
    }
    Ok(reply)
}

/// Pulls the human readable part out of an error body: `message` as sent by
/// the handlers, `detail` as sent by the framework, else the raw text.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed: ErrorBody = match serde_json::from_str(trimmed) {
        Ok(parsed) => parsed,
        Err(_) => return Some(trimmed.to_string()),
    };
    parsed.message.or_else(|| {
        parsed.detail.map(|detail| match detail {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
    })
}

// ── User-facing messages ────────────────────────────────────────────────────

pub fn describe_predict_failure(err: &ApiError) -> String {
    let message = err.user_message();
    if err.is_configuration_problem() {
        format!(
            "The detection service rejected the request: {message}\n\n\
             Please make sure:\n\
             1. The detection API key is configured correctly\n\
             2. Billing is enabled for the detection service\n\
             3. You have sufficient credits/quota"
        )
    } else {
        format!(
            "Failed to detect UI elements: {message}\n\n\
             Please make sure the annotation server is running and reachable,\n\
             and that its detection API key, billing and quota are set up."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> egui::Rect {
        egui::Rect::from_min_size(egui::pos2(x, y), egui::vec2(w, h))
    }

    #[test]
    fn save_request_shape() {
        let mut set = AnnotationSet::new();
        set.insert(rect(10.0, 20.0, 30.0, 40.0), Tag::Button);
        set.insert(rect(0.0, 0.0, 8.0, 8.0), Tag::Unassigned);
        let request = SaveRequest::new("login.jpg".into(), &set, [1024, 768]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "filename": "login.jpg",
                "annotations": [
                    { "id": "1", "x": 10.0, "y": 20.0, "width": 30.0, "height": 40.0, "tag": "button" },
                    { "id": "2", "x": 0.0, "y": 0.0, "width": 8.0, "height": 8.0, "tag": "" }
                ],
                "imageWidth": 1024,
                "imageHeight": 768
            })
        );
    }

    #[test]
    fn predict_response_parses() {
        let body = json!({
            "filename": "form.png",
            "status": "success",
            "predictions": [
                { "type": "Button", "text": "OK", "coordinates": { "x": 5, "y": 6, "width": 70, "height": 20 } },
                { "type": "checkbox", "text": "", "coordinates": { "x": 1, "y": 2, "width": 3, "height": 4 } }
            ]
        });
        let response: PredictResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.predictions.len(), 2);
        let (r, tag) = response.predictions[0].to_box();
        assert_eq!(tag, Tag::Button);
        assert_eq!(r, rect(5.0, 6.0, 70.0, 20.0));
        assert_eq!(response.predictions[1].to_box().1, Tag::Unassigned);
    }

    #[test]
    fn upload_response_without_size() {
        let response: UploadResponse =
            serde_json::from_str(r#"{ "filename": "a.png", "status": "success" }"#).unwrap();
        assert_eq!(response.width, None);
        assert_eq!(response.status(), STATUS_SUCCESS);
    }

    #[test]
    fn error_message_sources() {
        assert_eq!(
            error_message(r#"{"message": "Failed to upload image: bad"}"#).as_deref(),
            Some("Failed to upload image: bad")
        );
        assert_eq!(
            error_message(r#"{"detail": "Not Found"}"#).as_deref(),
            Some("Not Found")
        );
        assert_eq!(
            error_message("Internal Server Error").as_deref(),
            Some("Internal Server Error")
        );
        assert_eq!(error_message("  "), None);
    }

    #[test]
    fn predict_failure_messages_differ() {
        let quota = ApiError::Server {
            status: 429,
            message: "Quota exceeded".into(),
        };
        let generic = ApiError::Server {
            status: 500,
            message: "boom".into(),
        };
        let quota_text = describe_predict_failure(&quota);
        let generic_text = describe_predict_failure(&generic);
        assert!(quota_text.starts_with("The detection service rejected the request: Quota exceeded"));
        assert!(generic_text.starts_with("Failed to detect UI elements: boom"));
        assert_ne!(quota_text, generic_text);
    }

    #[test]
    fn base_url_trailing_slash() {
        let client = ApiClient::new("http://localhost:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("predict"), "http://localhost:8000/predict");
    }
}
