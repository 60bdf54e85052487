//! Thin client for the Meta Graph API: OAuth code exchange, page token
//! lookup, and the three publish shapes (feed, photo, video).

use reqwest::Client;
use serde::Deserialize;

const GRAPH_VERSION: &str = "v19.0";
const GRAPH_BASE: &str = "https://graph.facebook.com";
const GRAPH_VIDEO_BASE: &str = "https://graph-video.facebook.com";

/// Permissions required to manage and post content to a Facebook Page.
const PAGE_SCOPES: &str = "pages_show_list,pages_manage_posts,pages_read_engagement";

#[derive(Clone)]
pub struct MetaClient {
    app_id: String,
    app_secret: String,
    redirect_uri: String,
    page_id: String,
    http: Client,
}

impl MetaClient {
    pub fn new(app_id: &str, app_secret: &str, redirect_uri: &str, page_id: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            app_secret: app_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
            page_id: page_id.to_string(),
            http: Client::new(),
        }
    }

    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    /// Step 1: Build the URL for the Facebook login dialog.
    pub fn authorize_url(&self) -> String {
        format!(
            "https://www.facebook.com/{}/dialog/oauth?client_id={}&redirect_uri={}&scope={}&response_type=code",
            GRAPH_VERSION,
            percent_encode(&self.app_id),
            percent_encode(&self.redirect_uri),
            PAGE_SCOPES,
        )
    }

    /// Step 2: Exchange the callback code for a short-lived user access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, MetaError> {
        let url = format!(
            "{}/{}/oauth/access_token?client_id={}&redirect_uri={}&client_secret={}&code={}",
            GRAPH_BASE,
            GRAPH_VERSION,
            percent_encode(&self.app_id),
            percent_encode(&self.redirect_uri),
            percent_encode(&self.app_secret),
            percent_encode(code),
        );

        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(graph_error(resp).await);
        }

        let token: TokenResponse = resp.json().await?;
        if token.access_token.is_empty() {
            return Err(MetaError::Api(
                "Could not retrieve user access token.".to_string(),
            ));
        }
        Ok(token.access_token)
    }

    /// Step 3: Use the user token to fetch the access token for the
    /// configured page from `/me/accounts`.
    pub async fn page_access_token(&self, user_token: &str) -> Result<String, MetaError> {
        let url = format!(
            "{}/me/accounts?access_token={}",
            GRAPH_BASE,
            percent_encode(user_token)
        );

        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(graph_error(resp).await);
        }

        let accounts: AccountsResponse = resp.json().await?;
        accounts
            .data
            .into_iter()
            .find(|page| page.id == self.page_id)
            .and_then(|page| page.access_token)
            .ok_or_else(|| {
                MetaError::Api(format!(
                    "Could not find Page with ID {} or permission was not granted.",
                    self.page_id
                ))
            })
    }

    /// Text-only post to the page feed. Returns the created post id.
    pub async fn publish_text(
        &self,
        page_token: &str,
        message: &str,
    ) -> Result<String, MetaError> {
        let url = format!("{}/{}/{}/feed", GRAPH_BASE, GRAPH_VERSION, self.page_id);

        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "message": message,
                "access_token": page_token,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(graph_error(resp).await);
        }

        let created: FeedResponse = resp.json().await?;
        Ok(created.id)
    }

    /// Photo post: one multipart call to the `/photos` endpoint. The post id
    /// comes back as `post_id`, with `id` as a fallback.
    pub async fn publish_photo(
        &self,
        page_token: &str,
        message: &str,
        photo: Vec<u8>,
    ) -> Result<String, MetaError> {
        let url = format!("{}/{}/{}/photos", GRAPH_BASE, GRAPH_VERSION, self.page_id);

        let part = reqwest::multipart::Part::bytes(photo)
            .file_name("upload.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| MetaError::Api(format!("Invalid mime type: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .text("access_token", page_token.to_string())
            .text("message", message.to_string())
            .part("source", part);

        let resp = self.http.post(&url).multipart(form).send().await?;
        if !resp.status().is_success() {
            return Err(graph_error(resp).await);
        }

        let created: PhotoResponse = resp.json().await?;
        created
            .post_id
            .or(created.id)
            .ok_or_else(|| MetaError::Api("Photo upload returned no post id.".to_string()))
    }

    /// Video post: the Graph resumable upload, a strict three-phase sequence.
    ///
    /// 1. `start` declares the byte size and yields a video id plus an upload
    ///    session id.
    /// 2. `transfer` streams the raw bytes tagged with that session at offset
    ///    zero.
    /// 3. `finish` attaches the caption; the response must carry an explicit
    ///    `success` acknowledgment or the upload is treated as failed.
    pub async fn publish_video(
        &self,
        page_token: &str,
        message: &str,
        video: Vec<u8>,
        mime_type: &str,
    ) -> Result<String, MetaError> {
        let url = format!(
            "{}/{}/{}/videos",
            GRAPH_VIDEO_BASE, GRAPH_VERSION, self.page_id
        );

        println!(
            "[meta] video upload start: {} bytes, mime {}",
            video.len(),
            mime_type
        );

        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "access_token": page_token,
                "upload_phase": "start",
                "file_size": video.len(),
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(graph_error(resp).await);
        }

        let init: VideoStartResponse = resp.json().await?;

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("OAuth {}", page_token))
            .header("Content-Type", mime_type)
            .query(&[
                ("upload_phase", "transfer"),
                ("upload_session_id", &init.upload_session_id),
                ("start_offset", "0"),
            ])
            .body(video)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(graph_error(resp).await);
        }

        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "access_token": page_token,
                "upload_phase": "finish",
                "upload_session_id": init.upload_session_id,
                "description": message,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(graph_error(resp).await);
        }

        let finish: VideoFinishResponse = resp.json().await?;
        if !finish.success {
            return Err(MetaError::Api(
                "Failed to finalize video upload.".to_string(),
            ));
        }

        println!("[meta] video upload complete, video_id: {}", init.video_id);
        Ok(init.video_id)
    }
}

/// Read a failed Graph response into an error, preferring the structured
/// `(code) message` form the API uses when it can be parsed.
async fn graph_error(resp: reqwest::Response) -> MetaError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    match serde_json::from_str::<GraphErrorEnvelope>(&body) {
        Ok(envelope) => MetaError::Api(envelope.error.to_message()),
        Err(_) => MetaError::Api(format!("Status {}: {}", status, body)),
    }
}

fn percent_encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    #[serde(default)]
    data: Vec<PageAccount>,
}

#[derive(Debug, Deserialize)]
struct PageAccount {
    id: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PhotoResponse {
    post_id: Option<String>,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoStartResponse {
    video_id: String,
    upload_session_id: String,
}

#[derive(Debug, Deserialize)]
struct VideoFinishResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphErrorBody,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    code: Option<i64>,
    message: String,
}

impl GraphErrorBody {
    fn to_message(&self) -> String {
        match self.code {
            Some(code) => format!("({}) {}", code, self.message),
            None => self.message.clone(),
        }
    }
}

#[derive(Debug)]
pub enum MetaError {
    Http(reqwest::Error),
    Api(String),
}

impl From<reqwest::Error> for MetaError {
    fn from(e: reqwest::Error) -> Self {
        MetaError::Http(e)
    }
}

impl std::fmt::Display for MetaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetaError::Http(e) => write!(f, "HTTP error: {}", e),
            MetaError::Api(s) => write!(f, "Meta API error: {}", s),
        }
    }
}

impl std::error::Error for MetaError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MetaClient {
        MetaClient::new("app-id", "app-secret", "http://localhost:5000/connect/meta/callback", "1234")
    }

    #[test]
    fn authorize_url_carries_page_scopes() {
        let url = client().authorize_url();
        assert!(url.starts_with("https://www.facebook.com/v19.0/dialog/oauth?"));
        assert!(url.contains("client_id=app%2Did"));
        assert!(url.contains("scope=pages_show_list,pages_manage_posts,pages_read_engagement"));
        assert!(url.contains("response_type=code"));
    }

    #[test]
    fn graph_error_body_prefers_coded_message() {
        let body = GraphErrorBody {
            code: Some(190),
            message: "Invalid OAuth access token.".to_string(),
        };
        assert_eq!(body.to_message(), "(190) Invalid OAuth access token.");

        let bare = GraphErrorBody {
            code: None,
            message: "Something went wrong.".to_string(),
        };
        assert_eq!(bare.to_message(), "Something went wrong.");
    }

    #[test]
    fn graph_error_envelope_parses_api_shape() {
        let raw = r#"{"error":{"message":"Unsupported post request.","type":"GraphMethodException","code":100}}"#;
        let envelope: GraphErrorEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.error.to_message(), "(100) Unsupported post request.");
    }
}
