//! Campaign configuration: everything the form collects, loaded from a JSON
//! file and validated before any generation call.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::calendar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostFrequency {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for PostFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostFrequency::Low => write!(f, "low"),
            PostFrequency::Medium => write!(f, "medium"),
            PostFrequency::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub id: String,
    pub name: String,
    pub considerations: String,
}

/// Optional brand reference image, sent as a multimodal part ahead of the
/// text prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceImage {
    pub mime_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignConfig {
    pub brand_name: String,
    pub month: String,
    #[serde(default)]
    pub post_frequency: PostFrequency,
    pub target_audience: String,
    pub promotional_theme: String,
    pub educational_theme: String,
    pub entertaining_theme: String,
    pub engagement_theme: String,
    pub community_theme: String,
    pub platforms: Vec<Platform>,
    pub key_dates: String,
    pub tone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<ReferenceImage>,
}

impl CampaignConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: CampaignConfig = serde_json::from_str(&raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.brand_name.trim().is_empty() {
            return Err(ConfigError::Invalid("brand name is required".to_string()));
        }
        if calendar::month_number(&self.month).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unrecognized month name: {:?}",
                self.month
            )));
        }
        if !self.platforms.iter().any(|p| !p.name.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "at least one platform with a name is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "could not read config: {}", e),
            ConfigError::Parse(e) => write!(f, "could not parse config: {}", e),
            ConfigError::Invalid(s) => write!(f, "invalid config: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}
