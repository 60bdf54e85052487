//! Client for the Planora relay: composes the publish payload and hits the
//! relay's Meta endpoints.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::calendar::PostIdea;
use crate::visual::VisualArtifact;

#[derive(Clone)]
pub struct RelayClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PublishPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PublishReceipt {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelayErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisconnectReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl RelayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// URL a browser should open to start the OAuth connect flow.
    pub fn connect_url(&self) -> String {
        format!("{}/connect/meta", self.base_url)
    }

    /// Publish one post through the relay. The caption and hashtags are
    /// joined into the message; the visual rides along as base64 media.
    pub async fn publish(
        &self,
        post: &PostIdea,
        visual: Option<&VisualArtifact>,
    ) -> Result<PublishReceipt, RelayError> {
        let payload = build_payload(post, visual);

        let resp = self
            .http
            .post(format!("{}/publish/meta", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<RelayErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.or(b.message))
                .unwrap_or_else(|| format!("Status {}: {}", status, body));
            return Err(RelayError::Api(message));
        }

        Ok(resp.json().await?)
    }

    /// Clear the relay's stored credential.
    pub async fn disconnect(&self) -> Result<DisconnectReceipt, RelayError> {
        let resp = self
            .http
            .post(format!("{}/disconnect/meta", self.base_url))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<RelayErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.or(b.message))
                .unwrap_or_else(|| "Failed to disconnect from the server.".to_string());
            return Err(RelayError::Api(message));
        }

        Ok(resp.json().await?)
    }

    /// A connection-level failure almost always means the relay process is
    /// not up; say so instead of echoing a bare transport error.
    fn transport_error(&self, e: reqwest::Error) -> RelayError {
        if e.is_connect() || e.is_timeout() {
            RelayError::Unreachable(format!(
                "Could not connect to the relay at {}. Is the backend server running?",
                self.base_url
            ))
        } else {
            RelayError::Http(e)
        }
    }
}

pub fn build_payload(post: &PostIdea, visual: Option<&VisualArtifact>) -> PublishPayload {
    let mut payload = PublishPayload {
        message: format!("{}\n\n{}", post.caption, post.hashtags),
        photo_data: None,
        video_data: None,
        video_mime_type: None,
    };

    match visual {
        Some(VisualArtifact::Image { data_uri }) => {
            // Data URI: "data:image/png;base64,<payload>" - the relay wants
            // only the payload.
            payload.photo_data = data_uri.split(',').nth(1).map(str::to_string);
        }
        Some(VisualArtifact::Video { bytes, mime_type }) => {
            payload.video_data = Some(base64::engine::general_purpose::STANDARD.encode(bytes));
            payload.video_mime_type = Some(mime_type.clone());
        }
        None => {}
    }

    payload
}

#[derive(Debug)]
pub enum RelayError {
    Http(reqwest::Error),
    Api(String),
    Unreachable(String),
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        RelayError::Http(e)
    }
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::Http(e) => write!(f, "HTTP error: {}", e),
            RelayError::Api(s) => write!(f, "Relay error: {}", s),
            RelayError::Unreachable(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for RelayError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> PostIdea {
        PostIdea {
            platform: "Facebook".to_string(),
            theme: "Promotional".to_string(),
            idea: "Launch teaser".to_string(),
            caption: "Big news coming".to_string(),
            hashtags: "#launch #brand".to_string(),
            visual: "Short video".to_string(),
        }
    }

    #[test]
    fn text_only_payload_joins_caption_and_hashtags() {
        let payload = build_payload(&post(), None);
        assert_eq!(payload.message, "Big news coming\n\n#launch #brand");
        assert_eq!(payload.photo_data, None);
        assert_eq!(payload.video_data, None);

        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("photo_data"));
        assert!(!json.contains("video_data"));
    }

    #[test]
    fn image_payload_strips_the_data_uri_header() {
        let artifact = VisualArtifact::Image {
            data_uri: "data:image/png;base64,QUJD".to_string(),
        };
        let payload = build_payload(&post(), Some(&artifact));
        assert_eq!(payload.photo_data.as_deref(), Some("QUJD"));
        assert_eq!(payload.video_data, None);
    }

    #[test]
    fn video_payload_carries_base64_bytes_and_mime() {
        let artifact = VisualArtifact::Video {
            bytes: vec![0x41, 0x42, 0x43],
            mime_type: "video/mp4".to_string(),
        };
        let payload = build_payload(&post(), Some(&artifact));
        assert_eq!(payload.video_data.as_deref(), Some("QUJD"));
        assert_eq!(payload.video_mime_type.as_deref(), Some("video/mp4"));
        assert_eq!(payload.photo_data, None);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = RelayClient::new("http://localhost:5000/");
        assert_eq!(client.connect_url(), "http://localhost:5000/connect/meta");
    }
}
