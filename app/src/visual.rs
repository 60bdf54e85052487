//! Per-post visual generation: classify once, then either one synchronous
//! image call or the long-running video flow (start, poll, fetch).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::gemini::{GeminiClient, GeminiError, VideoOperation};

/// Media kind, decided once by classification and carried explicitly from
/// then on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualKind {
    Image,
    Video,
}

const VIDEO_TOKENS: [&str; 4] = ["video", "reel", "short", "animation"];

/// Keyword heuristic over the post's visual description. The service never
/// confirms the media type, so this is best-effort.
pub fn classify(visual_description: &str) -> VisualKind {
    let lowered = visual_description.to_lowercase();
    if VIDEO_TOKENS.iter().any(|token| lowered.contains(token)) {
        VisualKind::Video
    } else {
        VisualKind::Image
    }
}

/// Bounds for the video polling loop. The interval is a tunable, not a
/// contract; attempts cap the total wait so a stuck job cannot spin forever.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 90,
        }
    }
}

/// Lifecycle of one generation attempt, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisualState {
    Idle,
    Generating,
    Polling { progress: Option<u32> },
    Success(VisualKind),
    Error { message: String, kind: VisualKind },
}

impl Default for VisualState {
    fn default() -> Self {
        VisualState::Idle
    }
}

impl std::fmt::Display for VisualState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisualState::Idle => write!(f, "idle"),
            VisualState::Generating => write!(f, "starting generation..."),
            VisualState::Polling {
                progress: Some(percent),
            } => write!(f, "video progress: {}%", percent),
            VisualState::Polling { progress: None } => write!(f, "still working..."),
            VisualState::Success(VisualKind::Image) => write!(f, "image ready"),
            VisualState::Success(VisualKind::Video) => write!(f, "video ready"),
            VisualState::Error { message, kind } => {
                let label = match kind {
                    VisualKind::Image => "image",
                    VisualKind::Video => "video",
                };
                write!(f, "{} generation failed: {}", label, message)
            }
        }
    }
}

/// A finished visual, addressable locally.
#[derive(Debug, Clone)]
pub enum VisualArtifact {
    Image { data_uri: String },
    Video { bytes: Vec<u8>, mime_type: String },
}

impl VisualArtifact {
    pub fn kind(&self) -> VisualKind {
        match self {
            VisualArtifact::Image { .. } => VisualKind::Image,
            VisualArtifact::Video { .. } => VisualKind::Video,
        }
    }
}

#[derive(Debug)]
pub enum VisualError {
    Cancelled,
    TimedOut { attempts: u32 },
    /// The operation finished but carried no downloadable result.
    NoResult,
    Backend(GeminiError),
}

impl std::fmt::Display for VisualError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisualError::Cancelled => write!(f, "generation was cancelled"),
            VisualError::TimedOut { attempts } => {
                write!(f, "gave up after {} status checks", attempts)
            }
            VisualError::NoResult => {
                write!(f, "video process finished but no downloadable video was found")
            }
            VisualError::Backend(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for VisualError {}

/// The three video calls the polling loop needs, split out so the loop can
/// be exercised against a scripted backend.
#[allow(async_fn_in_trait)]
pub trait VideoBackend {
    async fn start_video(&self, prompt: &str) -> Result<VideoOperation, GeminiError>;
    async fn refresh_video(&self, operation: &VideoOperation)
    -> Result<VideoOperation, GeminiError>;
    async fn fetch_video(&self, uri: &str) -> Result<Vec<u8>, GeminiError>;
}

/// Drive one video generation to completion.
///
/// Steps are strictly sequential: start, then one refresh per poll tick
/// while the operation reports not-done, then a single fetch of the result
/// URI. The cancel flag is honored at each wait boundary. Every refresh
/// calls `on_progress` with the last percentage the operation has reported;
/// a refresh without metadata keeps the previously seen value.
pub async fn run_video_generation<B, F>(
    backend: &B,
    prompt: &str,
    policy: &PollPolicy,
    cancel: &AtomicBool,
    mut on_progress: F,
) -> Result<VisualArtifact, VisualError>
where
    B: VideoBackend,
    F: FnMut(Option<u32>),
{
    let mut operation = backend
        .start_video(prompt)
        .await
        .map_err(VisualError::Backend)?;

    let mut attempts = 0u32;
    let mut last_progress = None;
    while !operation.done {
        if cancel.load(Ordering::Relaxed) {
            return Err(VisualError::Cancelled);
        }
        if attempts >= policy.max_attempts {
            return Err(VisualError::TimedOut { attempts });
        }

        tokio::time::sleep(policy.interval).await;
        if cancel.load(Ordering::Relaxed) {
            return Err(VisualError::Cancelled);
        }

        operation = backend
            .refresh_video(&operation)
            .await
            .map_err(VisualError::Backend)?;
        attempts += 1;
        if let Some(percent) = operation.progress_percent() {
            last_progress = Some(percent);
        }
        on_progress(last_progress);
    }

    let uri = operation.video_uri().ok_or(VisualError::NoResult)?;
    let bytes = backend
        .fetch_video(uri)
        .await
        .map_err(VisualError::Backend)?;

    Ok(VisualArtifact::Video {
        bytes,
        mime_type: "video/mp4".to_string(),
    })
}

/// Generate the visual for one post, following its classified kind.
pub async fn generate_visual<F>(
    gemini: &GeminiClient,
    idea: &str,
    visual_description: &str,
    policy: &PollPolicy,
    cancel: &AtomicBool,
    on_progress: F,
) -> Result<VisualArtifact, VisualError>
where
    F: FnMut(Option<u32>),
{
    match classify(visual_description) {
        VisualKind::Image => {
            let data_uri = gemini
                .generate_image(idea)
                .await
                .map_err(VisualError::Backend)?;
            Ok(VisualArtifact::Image { data_uri })
        }
        VisualKind::Video => {
            run_video_generation(gemini, idea, policy, cancel, on_progress).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn reel_in_any_case_is_video() {
        assert_eq!(classify("An Instagram Reel of the workshop"), VisualKind::Video);
        assert_eq!(classify("REEL walkthrough"), VisualKind::Video);
        assert_eq!(classify("short clip of the team"), VisualKind::Video);
        assert_eq!(classify("Looping animation"), VisualKind::Video);
    }

    #[test]
    fn plain_image_description_is_image() {
        assert_eq!(classify("image of the product on a shelf"), VisualKind::Image);
        assert_eq!(classify("Flat-lay photo"), VisualKind::Image);
    }

    /// Scripted backend: a queue of refresh results plus call counters.
    struct ScriptedBackend {
        refreshes: RefCell<Vec<VideoOperation>>,
        refresh_calls: RefCell<u32>,
        fetch_calls: RefCell<u32>,
        fail_fetch: bool,
    }

    impl ScriptedBackend {
        fn new(refreshes: Vec<VideoOperation>) -> Self {
            Self {
                refreshes: RefCell::new(refreshes),
                refresh_calls: RefCell::new(0),
                fetch_calls: RefCell::new(0),
                fail_fetch: false,
            }
        }
    }

    fn pending(progress: Option<u32>) -> VideoOperation {
        let raw = match progress {
            Some(p) => format!(
                r#"{{ "name": "op", "done": false, "metadata": {{ "progressPercent": {} }} }}"#,
                p
            ),
            None => r#"{ "name": "op", "done": false }"#.to_string(),
        };
        serde_json::from_str(&raw).unwrap()
    }

    fn finished(uri: Option<&str>) -> VideoOperation {
        let raw = match uri {
            Some(u) => format!(
                r#"{{ "name": "op", "done": true,
                     "response": {{ "generatedVideos": [ {{ "video": {{ "uri": "{}" }} }} ] }} }}"#,
                u
            ),
            None => r#"{ "name": "op", "done": true }"#.to_string(),
        };
        serde_json::from_str(&raw).unwrap()
    }

    impl VideoBackend for ScriptedBackend {
        async fn start_video(&self, _prompt: &str) -> Result<VideoOperation, GeminiError> {
            Ok(pending(None))
        }

        async fn refresh_video(
            &self,
            _operation: &VideoOperation,
        ) -> Result<VideoOperation, GeminiError> {
            *self.refresh_calls.borrow_mut() += 1;
            Ok(self.refreshes.borrow_mut().remove(0))
        }

        async fn fetch_video(&self, uri: &str) -> Result<Vec<u8>, GeminiError> {
            *self.fetch_calls.borrow_mut() += 1;
            if self.fail_fetch {
                return Err(GeminiError::Api("download failed".to_string()));
            }
            assert_eq!(uri, "https://dl/v.mp4");
            Ok(vec![1, 2, 3])
        }
    }

    fn fast_policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn polls_exactly_n_times_and_surfaces_progress() {
        let backend = ScriptedBackend::new(vec![
            pending(Some(10)),
            pending(None),
            pending(Some(70)),
            finished(Some("https://dl/v.mp4")),
        ]);
        let cancel = AtomicBool::new(false);
        let mut seen = Vec::new();

        let artifact = run_video_generation(
            &backend,
            "a reel",
            &fast_policy(10),
            &cancel,
            |p| seen.push(p),
        )
        .await
        .unwrap();

        // Three not-done responses then done: exactly four refresh calls,
        // one progress report per refresh, one fetch. Reports without
        // metadata repeat the last percentage instead of dropping it.
        assert_eq!(*backend.refresh_calls.borrow(), 4);
        assert_eq!(seen, vec![Some(10), Some(10), Some(70), Some(70)]);
        assert_eq!(*backend.fetch_calls.borrow(), 1);
        assert!(matches!(artifact, VisualArtifact::Video { ref bytes, .. } if bytes == &vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn refresh_without_metadata_keeps_the_last_seen_progress() {
        let backend = ScriptedBackend::new(vec![
            pending(Some(10)),
            pending(None),
            finished(Some("https://dl/v.mp4")),
        ]);
        let cancel = AtomicBool::new(false);
        let mut seen = Vec::new();

        run_video_generation(&backend, "a reel", &fast_policy(10), &cancel, |p| {
            seen.push(p)
        })
        .await
        .unwrap();

        assert_eq!(seen[1], Some(10));
        assert_eq!(seen, vec![Some(10), Some(10), Some(10)]);
    }

    #[test]
    fn lifecycle_states_render_for_the_terminal() {
        assert_eq!(VisualState::default(), VisualState::Idle);
        assert_eq!(VisualState::Idle.to_string(), "idle");
        assert_eq!(VisualState::Generating.to_string(), "starting generation...");
        assert_eq!(
            VisualState::Polling { progress: Some(40) }.to_string(),
            "video progress: 40%"
        );
        assert_eq!(
            VisualState::Polling { progress: None }.to_string(),
            "still working..."
        );
        assert_eq!(
            VisualState::Success(VisualKind::Video).to_string(),
            "video ready"
        );
        assert_eq!(
            VisualState::Error {
                message: "gave up after 2 status checks".to_string(),
                kind: VisualKind::Video,
            }
            .to_string(),
            "video generation failed: gave up after 2 status checks"
        );
    }

    #[tokio::test]
    async fn done_without_uri_is_a_terminal_no_result() {
        let backend = ScriptedBackend::new(vec![finished(None)]);
        let cancel = AtomicBool::new(false);

        let err = run_video_generation(&backend, "a reel", &fast_policy(10), &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, VisualError::NoResult));
        assert_eq!(*backend.fetch_calls.borrow(), 0);
    }

    #[tokio::test]
    async fn exceeding_max_attempts_times_out() {
        let backend = ScriptedBackend::new(vec![pending(None), pending(None), pending(None)]);
        let cancel = AtomicBool::new(false);

        let err = run_video_generation(&backend, "a reel", &fast_policy(2), &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, VisualError::TimedOut { attempts: 2 }));
        assert_eq!(*backend.refresh_calls.borrow(), 2);
    }

    #[tokio::test]
    async fn cancel_flag_stops_the_loop_before_the_next_refresh() {
        let backend = ScriptedBackend::new(vec![pending(None)]);
        let cancel = AtomicBool::new(true);

        let err = run_video_generation(&backend, "a reel", &fast_policy(10), &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, VisualError::Cancelled));
        assert_eq!(*backend.refresh_calls.borrow(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_surfaces_the_backend_error() {
        let mut backend = ScriptedBackend::new(vec![finished(Some("https://dl/v.mp4"))]);
        backend.fail_fetch = true;
        let cancel = AtomicBool::new(false);

        let err = run_video_generation(&backend, "a reel", &fast_policy(10), &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, VisualError::Backend(GeminiError::Api(_))));
    }
}
