//! Thin client for the Gemini generative endpoints: structured calendar
//! generation, synchronous image generation, and long-running video
//! generation with a status-refresh call.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::calendar::CalendarPlan;
use crate::config::CampaignConfig;
use crate::visual::VideoBackend;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const TEXT_MODEL: &str = "gemini-2.5-flash";
const IMAGE_MODEL: &str = "imagen-3.0-generate-002";
const VIDEO_MODEL: &str = "veo-2.0-generate-001";

#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    http: Client,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: Client::new(),
        }
    }

    /// Generate a full-month calendar plan. A single failed call surfaces
    /// immediately; there is no retry.
    pub async fn generate_calendar(
        &self,
        config: &CampaignConfig,
    ) -> Result<CalendarPlan, GeminiError> {
        let prompt = build_prompt(config);

        let mut parts = Vec::new();
        if let Some(image) = &config.reference_image {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.data,
                }
            }));
        }
        parts.push(json!({ "text": prompt }));

        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": response_schema(),
            },
        });

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            BASE_URL, TEXT_MODEL, self.api_key
        );
        let resp = self.http.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let generated: GenerateContentResponse = resp.json().await?;
        let text = generated
            .first_text()
            .ok_or_else(|| GeminiError::BadShape("response carried no text part".to_string()))?;

        parse_calendar(text)
    }

    /// Generate one image for a post idea. Returns a data URI.
    pub async fn generate_image(&self, prompt: &str) -> Result<String, GeminiError> {
        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": { "sampleCount": 1 },
        });

        let url = format!(
            "{}/models/{}:predict?key={}",
            BASE_URL, IMAGE_MODEL, self.api_key
        );
        let resp = self.http.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let predicted: PredictResponse = resp.json().await?;
        let image = predicted
            .predictions
            .into_iter()
            .next()
            .ok_or_else(|| GeminiError::Api("no image was returned".to_string()))?;

        let mime_type = image.mime_type.unwrap_or_else(|| "image/png".to_string());
        Ok(format!("data:{};base64,{}", mime_type, image.bytes_base64_encoded))
    }
}

impl VideoBackend for GeminiClient {
    /// Kick off a long-running video generation and return the operation
    /// handle to poll.
    async fn start_video(&self, prompt: &str) -> Result<VideoOperation, GeminiError> {
        let body = json!({ "instances": [{ "prompt": prompt }] });

        let url = format!(
            "{}/models/{}:predictLongRunning?key={}",
            BASE_URL, VIDEO_MODEL, self.api_key
        );
        let resp = self.http.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        Ok(resp.json().await?)
    }

    /// Refresh the operation handle by name.
    async fn refresh_video(&self, operation: &VideoOperation) -> Result<VideoOperation, GeminiError> {
        let url = format!("{}/{}?key={}", BASE_URL, operation.name, self.api_key);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    /// Download the finished video. The API key rides along as a query
    /// parameter on the download URI.
    async fn fetch_video(&self, uri: &str) -> Result<Vec<u8>, GeminiError> {
        let separator = if uri.contains('?') { '&' } else { '?' };
        let url = format!("{}{}key={}", uri, separator, self.api_key);

        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Opaque handle for an in-progress video generation job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoOperation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub metadata: Option<OperationMetadata>,
    #[serde(default)]
    pub response: Option<OperationResponse>,
}

impl VideoOperation {
    pub fn progress_percent(&self) -> Option<u32> {
        self.metadata.as_ref().and_then(|m| m.progress_percent)
    }

    pub fn video_uri(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generated_videos
            .first()?
            .video
            .as_ref()?
            .uri
            .as_deref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationMetadata {
    #[serde(rename = "progressPercent")]
    pub progress_percent: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationResponse {
    #[serde(rename = "generatedVideos", default)]
    pub generated_videos: Vec<GeneratedVideo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedVideo {
    pub video: Option<VideoRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoRef {
    pub uri: Option<String>,
}

fn build_prompt(config: &CampaignConfig) -> String {
    let platform_details = config
        .platforms
        .iter()
        .filter(|p| !p.name.is_empty() && !p.considerations.is_empty())
        .map(|p| format!("{}: \"{}\"", p.name, p.considerations))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Generate a detailed social media content calendar for "{brand}" for the month of "{month}".

Target Audience: "{audience}".

Content Themes:
- Promotional: "{promotional}".
- Educational: "{educational}".
- Entertaining: "{entertaining}".
- Engagement-focused: "{engagement}".
- Community Building: "{community}".

Preferred Platforms (and specific content considerations for each):
{platforms}

Posting frequency preference: {frequency}.

Key Dates/Campaigns to Include:
"{key_dates}"

For each day of the month, create a JSON object. The 'date' field should be a string like "Month Day" (e.g., "{month} 1"). The 'posts' field should be an array of post objects.

The tone should be "{tone}".

Ensure every single day of the month of {month} is included in the calendar array, even if there are no posts scheduled for that day. In that case, return an empty 'posts' array for that date."#,
        brand = config.brand_name,
        month = config.month,
        audience = config.target_audience,
        promotional = config.promotional_theme,
        educational = config.educational_theme,
        entertaining = config.entertaining_theme,
        engagement = config.engagement_theme,
        community = config.community_theme,
        platforms = platform_details,
        frequency = config.post_frequency,
        key_dates = config.key_dates,
        tone = config.tone,
    )
}

/// Output schema forcing a `calendar` array of day objects, each post fully
/// populated.
fn response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "calendar": {
                "type": "ARRAY",
                "description": "List of daily content plans for the entire month.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "date": { "type": "STRING", "description": "The date for the post, e.g., 'October 1'." },
                        "posts": {
                            "type": "ARRAY",
                            "description": "Posts for this date. A single day can have multiple posts for different platforms.",
                            "items": {
                                "type": "OBJECT",
                                "properties": {
                                    "platform": { "type": "STRING", "description": "The social media platform, e.g., 'Instagram'." },
                                    "theme": { "type": "STRING", "description": "The content theme, e.g., 'Promotional'." },
                                    "idea": { "type": "STRING", "description": "The post idea or concept." },
                                    "caption": { "type": "STRING", "description": "A caption draft, including a call to action where appropriate." },
                                    "hashtags": { "type": "STRING", "description": "Space-separated hashtags (e.g., #brand #niche #topic)." },
                                    "visual": { "type": "STRING", "description": "Suggested visual/media type (e.g., 'Image of product', 'Short video')." }
                                },
                                "required": ["platform", "theme", "idea", "caption", "hashtags", "visual"]
                            }
                        }
                    },
                    "required": ["date", "posts"]
                }
            }
        },
        "required": ["calendar"]
    })
}

/// The model sometimes wraps its JSON in markdown backticks; strip them.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

fn parse_calendar(text: &str) -> Result<CalendarPlan, GeminiError> {
    let sanitized = strip_code_fence(text);

    let value: serde_json::Value = serde_json::from_str(sanitized)
        .map_err(|e| GeminiError::BadShape(format!("response was not valid JSON: {}", e)))?;

    if !value.get("calendar").is_some_and(|c| c.is_array()) {
        return Err(GeminiError::BadShape(
            "response JSON has no 'calendar' array".to_string(),
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| GeminiError::BadShape(format!("calendar entries were malformed: {}", e)))
}

async fn api_error(resp: reqwest::Response) -> GeminiError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    GeminiError::Api(format!("Status {}: {}", status, body))
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .parts
            .iter()
            .find_map(|part| part.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<ImagePrediction>,
}

#[derive(Debug, Deserialize)]
struct ImagePrediction {
    #[serde(rename = "bytesBase64Encoded")]
    bytes_base64_encoded: String,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}

#[derive(Debug)]
pub enum GeminiError {
    Http(reqwest::Error),
    Api(String),
    /// The call succeeded but the payload did not have the promised shape.
    BadShape(String),
}

impl From<reqwest::Error> for GeminiError {
    fn from(e: reqwest::Error) -> Self {
        GeminiError::Http(e)
    }
}

impl std::fmt::Display for GeminiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeminiError::Http(e) => write!(f, "HTTP error: {}", e),
            GeminiError::Api(s) => write!(f, "Gemini API error: {}", s),
            GeminiError::BadShape(s) => write!(f, "Unexpected Gemini response: {}", s),
        }
    }
}

impl std::error::Error for GeminiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CampaignConfig, Platform, PostFrequency};

    fn config() -> CampaignConfig {
        CampaignConfig {
            brand_name: "Verdant".to_string(),
            month: "October".to_string(),
            post_frequency: PostFrequency::High,
            target_audience: "Young adults".to_string(),
            promotional_theme: "Launches".to_string(),
            educational_theme: "Tips".to_string(),
            entertaining_theme: "Memes".to_string(),
            engagement_theme: "Questions".to_string(),
            community_theme: "Testimonials".to_string(),
            platforms: vec![
                Platform {
                    id: "1".to_string(),
                    name: "Instagram".to_string(),
                    considerations: "Reels ideas".to_string(),
                },
                Platform {
                    id: "2".to_string(),
                    name: String::new(),
                    considerations: "ignored".to_string(),
                },
            ],
            key_dates: "Launch on Oct 15th".to_string(),
            tone: "Friendly".to_string(),
            reference_image: None,
        }
    }

    #[test]
    fn prompt_embeds_config_and_skips_unnamed_platforms() {
        let prompt = build_prompt(&config());
        assert!(prompt.contains("\"Verdant\""));
        assert!(prompt.contains("month of \"October\""));
        assert!(prompt.contains("Instagram: \"Reels ideas\""));
        assert!(!prompt.contains("ignored"));
        assert!(prompt.contains("frequency preference: high"));
        assert!(prompt.contains("every single day of the month of October"));
    }

    #[test]
    fn code_fence_wrapping_is_stripped() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn fenced_calendar_parses() {
        let raw = "```json\n{\"calendar\":[{\"date\":\"October 1\",\"posts\":[]}]}\n```";
        let plan = parse_calendar(raw).unwrap();
        assert_eq!(plan.calendar.len(), 1);
        assert_eq!(plan.calendar[0].date, "October 1");
        assert!(plan.calendar[0].posts.is_empty());
    }

    #[test]
    fn missing_calendar_array_is_a_shape_error() {
        let err = parse_calendar("{\"days\": []}").unwrap_err();
        assert!(matches!(err, GeminiError::BadShape(_)));

        let err = parse_calendar("{\"calendar\": \"not an array\"}").unwrap_err();
        assert!(matches!(err, GeminiError::BadShape(_)));
    }

    #[test]
    fn invalid_json_is_a_shape_error() {
        let err = parse_calendar("not json at all").unwrap_err();
        assert!(matches!(err, GeminiError::BadShape(_)));
    }

    #[test]
    fn operation_accessors_read_nested_fields() {
        let raw = r#"{
            "name": "models/veo/operations/op-1",
            "done": true,
            "metadata": { "progressPercent": 80 },
            "response": { "generatedVideos": [ { "video": { "uri": "https://dl/video.mp4" } } ] }
        }"#;
        let op: VideoOperation = serde_json::from_str(raw).unwrap();
        assert!(op.done);
        assert_eq!(op.progress_percent(), Some(80));
        assert_eq!(op.video_uri(), Some("https://dl/video.mp4"));
    }

    #[test]
    fn fresh_operation_has_no_result() {
        let op: VideoOperation =
            serde_json::from_str(r#"{ "name": "models/veo/operations/op-2" }"#).unwrap();
        assert!(!op.done);
        assert_eq!(op.progress_percent(), None);
        assert_eq!(op.video_uri(), None);
    }
}
