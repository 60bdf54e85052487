mod meta;
mod publish;
mod session;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{Html, Redirect},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use meta::MetaClient;
use publish::{PublishError, PublishRequest};
use session::SessionStore;

// Base64-encoded video payloads get large; mirror a 50 MB JSON body cap.
const MAX_PUBLISH_BODY_SIZE: usize = 50 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    meta: MetaClient,
    session: SessionStore,
}

async fn health() -> &'static str {
    "ok"
}

/// GET /connect/meta - Kick off the OAuth flow by redirecting the browser to
/// the Facebook login dialog.
async fn connect_meta(State(state): State<Arc<AppState>>) -> Redirect {
    println!("[oauth] redirecting user to Meta for authorization");
    Redirect::temporary(&state.meta.authorize_url())
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
}

/// GET /connect/meta/callback - Meta redirects here after approval/denial.
/// The outcome goes back to the opening window via postMessage, and the
/// popup closes itself either way.
async fn connect_meta_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Html<String> {
    let Some(code) = query.code else {
        eprintln!("[oauth] callback without code: authorization was cancelled");
        return auth_result_page("meta-oauth-error", "Authorization was cancelled.");
    };

    let page_token = match connect_with_code(&state.meta, &code).await {
        Ok(token) => token,
        Err(e) => {
            eprintln!("[oauth] callback error: {}", e);
            return auth_result_page("meta-oauth-error", &e.to_string());
        }
    };

    state.session.connect(page_token).await;
    println!(
        "[oauth] stored page access token for page {}",
        state.meta.page_id()
    );
    auth_result_page("meta-oauth-success", "")
}

/// Both exchange steps; failing either one leaves no partial state behind.
async fn connect_with_code(meta: &MetaClient, code: &str) -> Result<String, meta::MetaError> {
    let user_token = meta.exchange_code(code).await?;
    meta.page_access_token(&user_token).await
}

fn auth_result_page(source: &str, message: &str) -> Html<String> {
    // JSON-encode the message so quotes, backslashes, and newlines are all
    // valid inside the string literal, then escape '<' so a body containing
    // "</script>" cannot terminate the inline script early.
    let encoded = serde_json::json!(message)
        .to_string()
        .replace('<', "\\u003c");
    Html(format!(
        r#"<script>
    window.opener.postMessage({{ source: "{}", message: {} }}, "*");
    window.close();
</script>"#,
        source, encoded
    ))
}

#[derive(Serialize)]
struct DisconnectResponse {
    success: bool,
    message: String,
}

/// POST /disconnect/meta - Clear the stored page token.
async fn disconnect_meta(State(state): State<Arc<AppState>>) -> Json<DisconnectResponse> {
    state.session.disconnect().await;
    println!("[oauth] user disconnected from Meta, access token cleared");
    Json(DisconnectResponse {
        success: true,
        message: "Successfully disconnected from Meta.".to_string(),
    })
}

#[derive(Serialize)]
struct PublishResponse {
    success: bool,
    id: String,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// POST /publish/meta - Publish one text/photo/video post to the page.
async fn publish_meta(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, (StatusCode, Json<ErrorResponse>)> {
    let outcome = publish::dispatch(&state.meta, &state.session, &req)
        .await
        .map_err(|e| {
            eprintln!("[publish] {}", e);
            let status = match &e {
                PublishError::NotConnected => StatusCode::UNAUTHORIZED,
                PublishError::MissingMessage | PublishError::BadMedia(_) => {
                    StatusCode::BAD_REQUEST
                }
                PublishError::Meta(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
        })?;

    Ok(Json(PublishResponse {
        success: true,
        id: outcome.id,
        message: outcome.message,
    }))
}

#[tokio::main]
async fn main() {
    let app_id = std::env::var("META_APP_ID").expect("META_APP_ID must be set");
    let app_secret = std::env::var("META_APP_SECRET").expect("META_APP_SECRET must be set");
    let redirect_uri = std::env::var("META_REDIRECT_URI").expect("META_REDIRECT_URI must be set");
    let page_id = std::env::var("META_PAGE_ID").expect("META_PAGE_ID must be set");

    let state = Arc::new(AppState {
        meta: MetaClient::new(&app_id, &app_secret, &redirect_uri, &page_id),
        session: SessionStore::new(),
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/connect/meta", get(connect_meta))
        .route("/connect/meta/callback", get(connect_meta_callback))
        .route("/disconnect/meta", post(disconnect_meta))
        .route("/publish/meta", post(publish_meta))
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_PUBLISH_BODY_SIZE))
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "5000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", addr, e));

    println!("Relay listening on http://{}", addr);
    println!("Waiting for requests from the studio app...");
    axum::serve(listener, app).await.expect("Server failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_result_page_escapes_quotes_in_the_message() {
        let Html(page) = auth_result_page("meta-oauth-error", r#"bad "token" value"#);
        assert!(page.contains(r#"source: "meta-oauth-error""#));
        assert!(page.contains(r#"message: "bad \"token\" value""#));
        assert!(page.contains("window.close()"));
    }

    #[test]
    fn auth_result_page_neutralizes_newlines_and_script_closers() {
        // A raw upstream body can carry both; neither may break out of the
        // inline script.
        let message = "Status 400: line one\nline two </script><script>alert(1)</script>";
        let Html(page) = auth_result_page("meta-oauth-error", message);

        assert!(page.contains("\\n"));
        assert!(!page.contains("line one\nline two"));
        assert!(page.contains("\\u003c/script>"));
        assert!(!page.contains("</script><script>"));
        // The page's own closing tag is still the only raw one.
        assert_eq!(page.matches("</script>").count(), 1);
    }
}
