use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::info;

use crate::{ChangeEvent, Error, NotePath, NoteStore, NotesService};

#[derive(Clone)]
struct AppState {
    service: Arc<NotesService>,
}

/// Run the HTTP transport over an already-opened store: JSON graph/search
/// APIs, the live-update SSE endpoint, the checkbox/save mutation endpoints
/// and static file serving. Rendering and authentication live elsewhere.
pub async fn serve(store: NoteStore, bind: SocketAddr) -> anyhow::Result<()> {
    let mut service = NotesService::new(store);
    service.build_index().await?;
    service.start_watching().await?;

    let state = AppState {
        service: Arc::new(service),
    };

    let app = Router::new()
        .route("/api/graph", get(graph_handler))
        .route("/api/local-graph", get(local_graph_handler))
        .route("/api/events", get(events_handler))
        .route("/api/toggle-checkbox", post(toggle_handler))
        .route("/api/note", get(note_raw_handler))
        .route("/api/save-note", post(save_handler))
        .route("/api/search", get(search_handler))
        .route("/api/recent", get(recent_handler))
        .route("/files/*path", get(static_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "notegraph listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    path: String,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    25
}

#[derive(Debug, Deserialize)]
struct ToggleBody {
    note_path: String,
    checkbox_index: usize,
    checked: bool,
}

#[derive(Debug, Deserialize)]
struct SaveBody {
    note_path: String,
    content: String,
}

async fn graph_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.service.graph_snapshot())
}

async fn local_graph_handler(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
) -> axum::response::Response {
    let Ok(path) = note_path_param(&q.path) else {
        return error_json(StatusCode::BAD_REQUEST, "invalid path");
    };
    match state.service.local_graph(&path) {
        Some(local) => axum::Json(local).into_response(),
        None => error_json(StatusCode::NOT_FOUND, "note not found"),
    }
}

async fn events_handler(State(state): State<AppState>) -> impl IntoResponse {
    let keep_alive = state.service.store().config().keep_alive;
    let subscription = state.service.subscribe();

    let greeting = tokio_stream::once(Ok::<_, Infallible>(
        SseEvent::default().event("connected").data("ok"),
    ));
    let changes = BroadcastStream::new(subscription.into_receiver()).map(
        |res| -> Result<SseEvent, Infallible> {
            Ok(match res {
                Ok(ev) => change_to_sse(&ev),
                // Overflow is surfaced, not silently dropped: the client
                // must re-fetch current state.
                Err(BroadcastStreamRecvError::Lagged(_)) => {
                    SseEvent::default().event("resync").data("full")
                }
            })
        },
    );

    Sse::new(greeting.chain(changes))
        .keep_alive(KeepAlive::new().interval(keep_alive).text("keepalive"))
}

fn change_to_sse(ev: &ChangeEvent) -> SseEvent {
    SseEvent::default()
        .event(ev.kind_str())
        .data(format!("/{}", ev.path().as_noext_lossy()))
}

async fn toggle_handler(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<ToggleBody>,
) -> axum::response::Response {
    let Ok(path) = note_path_param(&body.note_path) else {
        return error_json(StatusCode::BAD_REQUEST, "invalid path");
    };
    match state
        .service
        .toggle_checkbox(&path, body.checkbox_index, body.checked)
        .await
    {
        Ok(()) => axum::Json(json!({ "success": true })).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn note_raw_handler(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
) -> axum::response::Response {
    let Ok(path) = note_path_param(&q.path) else {
        return error_json(StatusCode::BAD_REQUEST, "invalid path");
    };
    match state.service.read_note(&path) {
        Ok(content) => axum::Json(json!({ "content": content })).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn save_handler(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<SaveBody>,
) -> axum::response::Response {
    let Ok(path) = note_path_param(&body.note_path) else {
        return error_json(StatusCode::BAD_REQUEST, "invalid path");
    };
    match state.service.save_note(&path, body.content).await {
        Ok(()) => axum::Json(json!({ "success": true })).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn search_handler(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> axum::response::Response {
    match state.service.search(&q.q, q.limit).await {
        Ok(hits) => axum::Json(hits).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn recent_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.service.recent_notes(25))
}

async fn static_handler(
    State(state): State<AppState>,
    UrlPath(raw): UrlPath<String>,
) -> axum::response::Response {
    let store = state.service.store();
    let Ok(rel) = NotePath::try_from(raw.as_str()) else {
        return error_json(StatusCode::NOT_FOUND, "not found");
    };
    let allowed = rel
        .extension()
        .is_some_and(|ext| store.is_static_ext(ext));
    if !allowed || !store.is_indexable_rel(rel.as_path()) {
        return error_json(StatusCode::NOT_FOUND, "not found");
    }

    match std::fs::read(store.to_abs(&rel)) {
        Ok(bytes) => {
            let mime = mime_guess::from_path(rel.as_path()).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response()
        }
        Err(_) => error_json(StatusCode::NOT_FOUND, "not found"),
    }
}

/// The toggle/save path parameters arrive as browsable paths without the
/// `.md` extension and possibly with a leading slash.
fn note_path_param(raw: &str) -> crate::Result<NotePath> {
    let trimmed = raw.trim_start_matches('/');
    let with_ext = if trimmed.ends_with(".md") {
        trimmed.to_string()
    } else {
        format!("{trimmed}.md")
    };
    NotePath::try_from(with_ext.as_str())
}

fn error_response(err: &Error) -> axum::response::Response {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_conflict() {
        StatusCode::CONFLICT
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error_json(status, &err.to_string())
}

fn error_json(status: StatusCode, message: &str) -> axum::response::Response {
    (status, axum::Json(json!({ "error": message }))).into_response()
}
