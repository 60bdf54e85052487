//! Publish dispatch: pick the post shape (video > photo > text) and drive
//! the matching Graph call with the stored page token.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::meta::{MetaClient, MetaError};
use crate::session::SessionStore;

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub message: Option<String>,
    pub photo_data: Option<String>,
    pub video_data: Option<String>,
    pub video_mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublishOutcome {
    pub id: String,
    pub message: String,
}

#[derive(Debug)]
pub enum PublishError {
    /// No page token stored; connect first. Checked before any outbound call.
    NotConnected,
    MissingMessage,
    BadMedia(String),
    Meta(MetaError),
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::NotConnected => {
                write!(f, "Not authenticated with Meta. Please connect your account first.")
            }
            PublishError::MissingMessage => write!(f, "Missing required field: message"),
            PublishError::BadMedia(s) => write!(f, "Invalid media payload: {}", s),
            PublishError::Meta(e) => write!(f, "Failed to publish to Meta: {}", e),
        }
    }
}

impl std::error::Error for PublishError {}

/// Run one publish request end to end. Preconditions (stored token, message
/// present, decodable media) are all checked before the first network call.
pub async fn dispatch(
    meta: &MetaClient,
    session: &SessionStore,
    req: &PublishRequest,
) -> Result<PublishOutcome, PublishError> {
    let page_token = session
        .page_token()
        .await
        .ok_or(PublishError::NotConnected)?;

    let message = req
        .message
        .as_deref()
        .filter(|m| !m.is_empty())
        .ok_or(PublishError::MissingMessage)?;

    if let Some(video_data) = &req.video_data {
        let video = decode_media(video_data)?;
        let mime_type = req.video_mime_type.as_deref().unwrap_or("video/mp4");

        let video_id = meta
            .publish_video(&page_token, message, video, mime_type)
            .await
            .map_err(PublishError::Meta)?;

        return Ok(PublishOutcome {
            message: format!(
                "Video upload successful! It may take a few moments to process. Video ID: {}",
                video_id
            ),
            id: video_id,
        });
    }

    if let Some(photo_data) = &req.photo_data {
        let photo = decode_media(photo_data)?;

        let post_id = meta
            .publish_photo(&page_token, message, photo)
            .await
            .map_err(PublishError::Meta)?;

        return Ok(PublishOutcome {
            id: post_id,
            message: "Image post published successfully!".to_string(),
        });
    }

    let post_id = meta
        .publish_text(&page_token, message)
        .await
        .map_err(PublishError::Meta)?;

    Ok(PublishOutcome {
        id: post_id,
        message: "Text post published successfully!".to_string(),
    })
}

fn decode_media(data: &str) -> Result<Vec<u8>, PublishError> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| PublishError::BadMedia(e.to_string()))
}
