use crate::answer::ChatResponse;
use crate::pages;
use crate::relay::{ChatRelay, error_answer};
use crate::upload::{UploadError, UploadPipeline, UploadedFile};
use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::{error, warn};

const UPLOAD_FIELD: &str = "image";

#[derive(Clone)]
pub struct AppState {
    pub relay: ChatRelay,
    pub uploads: Arc<UploadPipeline>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub query: String,
}

pub fn router(state: AppState, images_dir: &Path, max_body: usize, passthrough: bool) -> Router {
    let mut router = Router::new()
        .route("/", get(index))
        .route("/ask", post(ask))
        .route("/upload", post(upload))
        .route("/payment", get(payment))
        .route("/success", get(success));

    if passthrough {
        router = router.route("/ask/stream", post(ask_stream));
    }

    router
        .nest_service("/static/images", ServeDir::new(images_dir))
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}

async fn catalog_rows(state: &AppState) -> Vec<crate::catalog::CatalogRow> {
    match state.uploads.catalog().rows().await {
        Ok(rows) => rows,
        Err(e) => {
            error!("Error reading catalog: {}", e);
            Vec::new()
        }
    }
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(pages::index(&catalog_rows(&state).await))
}

async fn payment(State(state): State<AppState>) -> Html<String> {
    Html(pages::payment(&catalog_rows(&state).await))
}

async fn success() -> Html<String> {
    Html(pages::success())
}

async fn ask(
    State(state): State<AppState>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Json<ChatResponse> {
    let request = match body {
        Ok(Json(request)) => request,
        Err(e) => {
            warn!("Unreadable /ask body: {}", e);
            AskRequest::default()
        }
    };
    Json(state.relay.answer(&request.query).await)
}

async fn ask_stream(State(state): State<AppState>, Json(request): Json<AskRequest>) -> Response {
    match state.relay.client().open_stream(&request.query).await {
        Ok(upstream) => (
            [(header::CONTENT_TYPE, "text/event-stream")],
            Body::from_stream(upstream.bytes_stream()),
        )
            .into_response(),
        Err(e) => {
            warn!("Stream passthrough failed: {}", e);
            Json(ChatResponse::text(error_answer(&e))).into_response()
        }
    }
}

async fn read_upload(multipart: &mut Multipart) -> Result<Option<UploadedFile>, String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Server error: {}", e))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| format!("Server error: {}", e))?;
        return Ok(Some(UploadedFile {
            filename,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let file = match read_upload(&mut multipart).await {
        Ok(file) => file,
        Err(message) => {
            warn!("Upload rejected: {}", message);
            return message.into_response();
        }
    };

    match state.uploads.handle(file).await {
        Ok(_) => Redirect::to("/").into_response(),
        Err(e) => {
            match &e {
                UploadError::MissingFile | UploadError::EmptyFilename | UploadError::EmptyFile => {
                    warn!("Upload rejected: {}", e)
                }
                _ => error!("Upload failed: {}", e),
            }
            (StatusCode::OK, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Secret};
    use crate::dify::{DifyClient, ResponseMode};
    use crate::publish::NoopPublisher;
    use crate::test_support::spawn_upstream;
    use serde_json::Value;

    async fn app(dify_router: Router, base: &Path, passthrough: bool) -> String {
        let dify_url = spawn_upstream(dify_router).await;

        let mut config = Config::default();
        config.dify.api_key = Secret::new("app-test");
        config.dify.url = dify_url;
        config.dify.response_mode = ResponseMode::Streaming;
        config.storage.base_dir = base.to_path_buf();
        config.github.user = "alice".into();
        config.github.repo = "gallery".into();

        let state = AppState {
            relay: ChatRelay::new(DifyClient::new(&config.dify), &config.dify),
            uploads: Arc::new(UploadPipeline::new(&config, None, Arc::new(NoopPublisher))),
        };
        let app = router(state, &config.storage.images_dir(), 1024 * 1024, passthrough);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn streaming_dify() -> Router {
        Router::new().route(
            "/v1/chat-messages",
            post(|| async {
                "data: {\"answer\": \"Try this: \"}\n\n\
                 data: {\"answer\": \"https://x.io/lake.png\"}\n\n"
            }),
        )
    }

    fn no_redirects() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn ask_returns_shaped_json() {
        let dir = tempfile::tempdir().unwrap();
        let base = app(streaming_dify(), dir.path(), false).await;

        let resp = reqwest::Client::new()
            .post(format!("{}/ask", base))
            .json(&serde_json::json!({ "query": "lake" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["answer"], "Try this: https://x.io/lake.png");
        assert_eq!(body["image_url"], "https://x.io/lake.png");
        assert_eq!(body["show_payment"], false);
    }

    #[tokio::test]
    async fn upstream_failure_is_still_http_200() {
        let dir = tempfile::tempdir().unwrap();
        let failing = Router::new().route(
            "/v1/chat-messages",
            post(|| async { StatusCode::BAD_GATEWAY }),
        );
        let base = app(failing, dir.path(), false).await;

        let resp = reqwest::Client::new()
            .post(format!("{}/ask", base))
            .json(&serde_json::json!({ "query": "lake" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["answer"], "API error: 502");
        assert_eq!(body["image_url"], Value::Null);
    }

    #[tokio::test]
    async fn passthrough_relays_raw_stream() {
        let dir = tempfile::tempdir().unwrap();
        let base = app(streaming_dify(), dir.path(), true).await;

        let resp = reqwest::Client::new()
            .post(format!("{}/ask/stream", base))
            .json(&serde_json::json!({ "query": "lake" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
        let text = resp.text().await.unwrap();
        assert!(text.starts_with("data: {\"answer\": \"Try this: \"}"));
    }

    #[tokio::test]
    async fn passthrough_route_is_off_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let base = app(streaming_dify(), dir.path(), false).await;

        let resp = reqwest::Client::new()
            .post(format!("{}/ask/stream", base))
            .json(&serde_json::json!({ "query": "lake" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_redirects_and_shows_in_gallery() {
        let dir = tempfile::tempdir().unwrap();
        let base = app(streaming_dify(), dir.path(), false).await;
        let client = no_redirects();

        let form = reqwest::multipart::Form::new().part(
            "image",
            reqwest::multipart::Part::bytes(b"\x89PNG".to_vec()).file_name("Lake.PNG"),
        );
        let resp = client
            .post(format!("{}/upload", base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/");

        let page = client.get(&base).send().await.unwrap().text().await.unwrap();
        assert!(page.contains(
            "https://raw.githubusercontent.com/alice/gallery/main/static/images/lake.png"
        ));
        assert!(page.contains("new art (lake.png)"));

        let image = client
            .get(format!("{}/static/images/lake.png", base))
            .send()
            .await
            .unwrap();
        assert_eq!(image.status(), 200);
        assert_eq!(image.bytes().await.unwrap().as_ref(), b"\x89PNG");
    }

    #[tokio::test]
    async fn upload_without_image_field_returns_plain_error() {
        let dir = tempfile::tempdir().unwrap();
        let base = app(streaming_dify(), dir.path(), false).await;

        let form = reqwest::multipart::Form::new().text("other", "value");
        let resp = no_redirects()
            .post(format!("{}/upload", base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "Error: No image part in request");
        assert!(!dir.path().join("data.csv").exists());
    }

    #[tokio::test]
    async fn static_pages_render() {
        let dir = tempfile::tempdir().unwrap();
        let base = app(streaming_dify(), dir.path(), false).await;
        let client = reqwest::Client::new();

        for (path, needle) in [("/payment", "Checkout"), ("/success", "Payment complete")] {
            let resp = client.get(format!("{}{}", base, path)).send().await.unwrap();
            assert_eq!(resp.status(), 200);
            assert!(resp.text().await.unwrap().contains(needle));
        }
    }
}
