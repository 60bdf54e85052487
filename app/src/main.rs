mod calendar;
mod config;
mod export;
mod gemini;
mod relay;
mod visual;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use chrono::Datelike;

use crate::calendar::{CalendarPlan, PostIdea};
use crate::config::CampaignConfig;
use crate::gemini::GeminiClient;
use crate::relay::RelayClient;
use crate::visual::{PollPolicy, VisualArtifact, VisualState};

const DEFAULT_RELAY_URL: &str = "http://localhost:5000";

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let result = match args.as_slice() {
        ["generate", config_path] => generate(Path::new(config_path)).await,
        ["visual", plan_path, date, index] => {
            visual_command(Path::new(plan_path), date, index).await
        }
        ["show", plan_path, date, index] => show(Path::new(plan_path), date, index),
        ["publish", plan_path, date, index] => {
            publish(Path::new(plan_path), date, index, None).await
        }
        ["publish", plan_path, date, index, media_path] => {
            publish(Path::new(plan_path), date, index, Some(Path::new(media_path))).await
        }
        ["connect"] => connect(),
        ["disconnect"] => disconnect().await,
        _ => {
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("[planora] error: {}", e);
        std::process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  planora generate <config.json>");
    eprintln!("  planora visual <plan.json> <date> <post-index>");
    eprintln!("  planora show <plan.json> <date> <post-index>");
    eprintln!("  planora publish <plan.json> <date> <post-index> [media-file]");
    eprintln!("  planora connect");
    eprintln!("  planora disconnect");
    eprintln!();
    eprintln!("  <date> is the day label from the plan, e.g. \"October 5\".");
}

fn gemini_client() -> Result<GeminiClient, Box<dyn std::error::Error>> {
    let api_key =
        std::env::var("GEMINI_API_KEY").map_err(|_| "GEMINI_API_KEY must be set".to_string())?;
    Ok(GeminiClient::new(&api_key))
}

fn relay_client() -> RelayClient {
    let base_url =
        std::env::var("PLANORA_RELAY_URL").unwrap_or_else(|_| DEFAULT_RELAY_URL.to_string());
    RelayClient::new(&base_url)
}

/// Generate the month's plan, print the grid, and write the CSV plus a plan
/// file the other subcommands read.
async fn generate(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = CampaignConfig::load(config_path)?;
    let gemini = gemini_client()?;

    let month = calendar::month_number(&config.month)
        .ok_or_else(|| format!("unrecognized month name: {:?}", config.month))?;
    let year = chrono::Utc::now().year();

    println!(
        "[generate] requesting a {} calendar for {}...",
        config.month, config.brand_name
    );
    let plan = gemini.generate_calendar(&config).await?;

    if let Err(e) = calendar::validate_full_month(&plan, month, year) {
        eprintln!("[generate] warning: {}", e);
    }

    let grid = calendar::month_grid(&plan, &config.month, month, year);
    println!("\n{}", grid.render());

    let csv_path = export::csv_filename(&config.brand_name, &config.month);
    std::fs::write(&csv_path, export::to_csv(&plan))?;
    println!("[generate] wrote {}", csv_path);

    let plan_path = plan_filename(&config.brand_name, &config.month);
    std::fs::write(&plan_path, serde_json::to_string_pretty(&plan)?)?;
    println!("[generate] wrote {}", plan_path);

    Ok(())
}

/// Generate the visual for one post and save it next to the plan.
async fn visual_command(
    plan_path: &Path,
    date: &str,
    index: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let plan = load_plan(plan_path)?;
    let post = find_post(&plan, date, index)?;
    let gemini = gemini_client()?;

    let cancel = Arc::new(AtomicBool::new(false));
    let signal_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n[visual] cancelling after the current step...");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    println!("[visual] generating for {:?}: {}", date, post.idea);
    let kind = visual::classify(&post.visual);
    let mut state = VisualState::Generating;
    println!("[visual] {}", state);

    let result = visual::generate_visual(
        &gemini,
        &post.idea,
        &post.visual,
        &PollPolicy::default(),
        &cancel,
        |progress| {
            state = VisualState::Polling { progress };
            println!("[visual] {}", state);
        },
    )
    .await;

    let artifact = match result {
        Ok(artifact) => {
            state = VisualState::Success(artifact.kind());
            println!("[visual] {}", state);
            artifact
        }
        Err(e) => {
            state = VisualState::Error {
                message: e.to_string(),
                kind,
            };
            eprintln!("[visual] {}", state);
            return Err(e.into());
        }
    };

    let out_path = save_artifact(&artifact, date, index)?;
    println!("[visual] wrote {}", out_path);
    Ok(())
}

/// Print the clipboard-ready block for one post.
fn show(plan_path: &Path, date: &str, index: &str) -> Result<(), Box<dyn std::error::Error>> {
    let plan = load_plan(plan_path)?;
    let post = find_post(&plan, date, index)?;
    println!("{}", post.copy_text());
    Ok(())
}

/// Publish one post through the relay, optionally attaching a media file
/// produced by the visual subcommand.
async fn publish(
    plan_path: &Path,
    date: &str,
    index: &str,
    media_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let plan = load_plan(plan_path)?;
    let post = find_post(&plan, date, index)?;

    let artifact = match media_path {
        Some(path) => Some(load_artifact(path)?),
        None => None,
    };

    let relay = relay_client();
    println!("[publish] sending {:?} post {} to the relay...", date, index);
    let receipt = relay.publish(post, artifact.as_ref()).await?;

    match receipt.id {
        Some(id) => println!("[publish] published successfully (post id {})", id),
        None => println!(
            "[publish] {}",
            receipt.message.unwrap_or_else(|| "published".to_string())
        ),
    }
    Ok(())
}

fn connect() -> Result<(), Box<dyn std::error::Error>> {
    let relay = relay_client();
    println!("Open this URL in a browser to connect your Meta account:");
    println!("  {}", relay.connect_url());
    Ok(())
}

async fn disconnect() -> Result<(), Box<dyn std::error::Error>> {
    let relay = relay_client();
    let receipt = relay.disconnect().await?;
    println!(
        "[disconnect] {}",
        receipt
            .message
            .unwrap_or_else(|| "Disconnected from Meta.".to_string())
    );
    Ok(())
}

fn load_plan(path: &Path) -> Result<CalendarPlan, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn find_post<'a>(
    plan: &'a CalendarPlan,
    date: &str,
    index: &str,
) -> Result<&'a PostIdea, Box<dyn std::error::Error>> {
    let index: usize = index
        .parse()
        .map_err(|_| format!("post index must be a number, got {:?}", index))?;

    let day = plan
        .calendar
        .iter()
        .find(|d| d.date.eq_ignore_ascii_case(date))
        .ok_or_else(|| format!("no day {:?} in the plan", date))?;

    day.posts.get(index).ok_or_else(|| {
        format!(
            "day {:?} has {} posts, index {} is out of range",
            date,
            day.posts.len(),
            index
        )
        .into()
    })
}

fn plan_filename(brand_name: &str, month: &str) -> String {
    format!("{}-{}-plan.json", brand_name, month)
}

fn artifact_filename(date: &str, index: &str, extension: &str) -> String {
    format!("visual-{}-{}.{}", date.replace(' ', "-"), index, extension)
}

fn save_artifact(
    artifact: &VisualArtifact,
    date: &str,
    index: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    match artifact {
        VisualArtifact::Image { data_uri } => {
            let payload = data_uri
                .split(',')
                .nth(1)
                .ok_or("image data URI had no payload")?;
            let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;
            let path = artifact_filename(date, index, "png");
            std::fs::write(&path, bytes)?;
            Ok(path)
        }
        VisualArtifact::Video { bytes, .. } => {
            let path = artifact_filename(date, index, "mp4");
            std::fs::write(&path, bytes)?;
            Ok(path)
        }
    }
}

/// Read a saved visual back as an artifact, keyed on file extension.
fn load_artifact(path: &Path) -> Result<VisualArtifact, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "mp4" | "mov" | "webm" => Ok(VisualArtifact::Video {
            bytes,
            mime_type: match extension.as_str() {
                "mov" => "video/quicktime".to_string(),
                "webm" => "video/webm".to_string(),
                _ => "video/mp4".to_string(),
            },
        }),
        "png" | "jpg" | "jpeg" => {
            let mime = if extension == "png" {
                "image/png"
            } else {
                "image/jpeg"
            };
            let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
            Ok(VisualArtifact::Image {
                data_uri: format!("data:{};base64,{}", mime, encoded),
            })
        }
        other => Err(format!("unsupported media file extension: {:?}", other).into()),
    }
}
