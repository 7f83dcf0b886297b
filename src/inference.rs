//! HTTP client for the remote inference endpoint.
//!
//! Each frame is one `multipart/form-data` POST:
//!
//! | field | value |
//! |---|---|
//! | `frame_number` | decimal count of samples processed at dispatch time |
//! | `image_data` | JPEG bytes, file name `frame_{n}.jpg` |
//! | `timestamp` | decimal seconds |
//! | `user_uuid` | subject identifier |
//! | `user_email` | optional |
//!
//! A 2xx response body is parsed as a [`DetectionResponse`] and logged; any
//! other status is an [`UploadError::UnexpectedStatus`].

use reqwest::{
    Client, RequestBuilder,
    header::AUTHORIZATION,
    multipart::{Form, Part},
};
use serde::Deserialize;
use url::Url;

use crate::{
    configuration::UploadOptions,
    dispatcher::{FrameSink, SinkFuture, UploadRecord},
    error::{FrameSiftError, UploadError},
};

/// Classification result returned by the inference service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectionResponse {
    /// Human-readable status.
    pub message: String,
    /// Frame number echoed back.
    pub frame: u64,
    /// Subject identifier echoed back.
    pub user_uuid: String,
    /// Whether fire or smoke was detected.
    pub fire_detected: bool,
    /// Model confidence in `[0, 1]`.
    pub confidence_score: f64,
    /// Email the alert was addressed to.
    #[serde(default)]
    pub user_email: Option<String>,
    /// Public URL of the stored frame, if the service kept it.
    #[serde(default)]
    pub supabase_url: Option<String>,
    /// Outcome of the alert email, if one was sent.
    #[serde(default)]
    pub email_alert: Option<String>,
    /// Storage error reported by the service.
    #[serde(default)]
    pub supabase_error: Option<String>,
}

/// Posts frames to the inference endpoint. One send attempt per frame.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    endpoint: Url,
    http: Client,
    auth_token: Option<String>,
}

impl InferenceClient {
    /// Build a client from `options`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSiftError::InvalidConfiguration`] if the HTTP client
    /// cannot be constructed.
    pub fn new(options: UploadOptions) -> Result<Self, FrameSiftError> {
        let http = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|error| FrameSiftError::InvalidConfiguration(error.to_string()))?;

        Ok(Self {
            endpoint: options.endpoint,
            http,
            auth_token: options.auth_token,
        })
    }

    /// The endpoint frames are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send one frame and return the parsed response, if it was JSON of the
    /// expected shape.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Transport`] when the request cannot be sent and
    /// [`UploadError::UnexpectedStatus`] for non-2xx answers.
    pub async fn upload(
        &self,
        record: UploadRecord,
    ) -> Result<Option<DetectionResponse>, UploadError> {
        let frame_number = record.frame_number;
        let form = build_form(record)?;

        let request = self.http.post(self.endpoint.clone()).multipart(form);
        let response = self.authorized(request).send().await?;

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(error) if status.is_success() => {
                log::debug!(
                    "Frame {frame_number} uploaded ({status}) but the body was unreadable: {error}"
                );
                return Ok(None);
            }
            Err(error) => {
                log::debug!("Could not read error body for frame {frame_number}: {error}");
                String::new()
            }
        };
        if !status.is_success() {
            return Err(UploadError::UnexpectedStatus { status, body });
        }

        match serde_json::from_str::<DetectionResponse>(&body) {
            Ok(detection) => {
                if detection.fire_detected {
                    log::warn!(
                        "Fire detected in frame {frame_number} (confidence {:.2}): {}",
                        detection.confidence_score,
                        detection.message
                    );
                } else {
                    log::info!(
                        "Frame {frame_number} analysed: {} (confidence {:.2})",
                        detection.message,
                        detection.confidence_score
                    );
                }
                if let Some(error) = &detection.supabase_error {
                    log::warn!("Inference service could not store frame {frame_number}: {error}");
                }
                Ok(Some(detection))
            }
            Err(_) => {
                log::debug!("Frame {frame_number} uploaded ({status}): {body}");
                Ok(None)
            }
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }
}

impl FrameSink for InferenceClient {
    fn deliver(&self, record: UploadRecord) -> SinkFuture<'_> {
        Box::pin(async move { self.upload(record).await.map(|_| ()) })
    }
}

/// Assemble the multipart form for one frame.
pub(crate) fn build_form(record: UploadRecord) -> Result<Form, UploadError> {
    let file_name = record.file_name();
    let UploadRecord {
        frame_number,
        timestamp,
        image_payload,
        user,
    } = record;

    let image = Part::bytes(image_payload)
        .file_name(file_name)
        .mime_str("image/jpeg")?;

    let mut form = Form::new()
        .text("frame_number", frame_number.to_string())
        .part("image_data", image)
        .text("timestamp", timestamp.as_secs_f64().to_string())
        .text("user_uuid", user.id);

    if let Some(email) = user.email {
        form = form.text("user_email", email);
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_response_optional_fields() {
        let body = r#"{
            "message": "No fire detected",
            "frame": 20,
            "user_uuid": "user-1",
            "fire_detected": false,
            "confidence_score": 0.12
        }"#;
        let detection: DetectionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(detection.frame, 20);
        assert!(!detection.fire_detected);
        assert!(detection.user_email.is_none());
        assert!(detection.supabase_error.is_none());
    }

    #[test]
    fn client_keeps_endpoint() {
        let options = UploadOptions::new("http://127.0.0.1:9/upload").unwrap();
        let client = InferenceClient::new(options).unwrap();
        assert_eq!(client.endpoint().path(), "/upload");
    }
}
