use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::*;

/// Arguments for running the editor backend
#[derive(Debug, Clone, Parser)]
#[command(name = "opscanvas serve", about = "Serve a topology document to a canvas editor.")]
pub struct ServeArgs {
    /// Path to the topology JSON document that should be served.
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5252)]
    pub port: u16,

    /// Background color for rendered SVG previews.
    #[arg(long = "background-color", default_value = "white")]
    pub background_color: String,

    /// Optional canvas config file (JSON).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

/// The document plus the per-editor view and interaction state.
struct EditSession {
    topology: Topology,
    canvas: Canvas,
    editor: EditorState,
}

struct ServeState {
    source_path: PathBuf,
    background: String,
    session: Mutex<EditSession>,
}

impl ServeState {
    /// Writes `next` to disk and only then makes it the live document.
    async fn commit(
        &self,
        session: &mut EditSession,
        next: Topology,
    ) -> Result<(), (StatusCode, String)> {
        self.persist(&next).await.map_err(internal_error)?;
        session.topology = next;
        Ok(())
    }

    async fn persist(&self, topology: &Topology) -> Result<()> {
        let mut json = topology.to_json()?;
        json.push('\n');
        tokio::fs::write(&self.source_path, json.as_bytes())
            .await
            .with_context(|| format!("failed to write '{}'", self.source_path.display()))?;
        debug!(path = %self.source_path.display(), "topology saved");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FramePayload {
    frame: Frame,
    editor: EditorState,
    gesture: Gesture,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending_source_name: Option<String>,
}

impl FramePayload {
    fn capture(session: &EditSession) -> Self {
        Self {
            frame: session.canvas.frame(&session.topology),
            editor: session.editor.clone(),
            gesture: session.canvas.gesture().clone(),
            pending_source_name: session
                .editor
                .pending_source
                .as_deref()
                .and_then(|id| session.topology.element_name(id))
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct StatePatch {
    mode: Option<InteractionMode>,
    locked: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct NewNodeRequest {
    #[serde(rename = "type", default)]
    service_type: ServiceType,
    name: String,
}

#[derive(Debug, Deserialize)]
struct NewGroupRequest {
    name: String,
    #[serde(default)]
    status: ElementStatus,
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let topology = Topology::load(&args.input)
        .with_context(|| format!("failed to load '{}'", args.input.display()))?;
    let config = CanvasConfig::load(args.config.as_deref())?;

    let state = Arc::new(ServeState {
        source_path: args.input.clone(),
        background: args.background_color.clone(),
        session: Mutex::new(EditSession {
            topology,
            canvas: Canvas::new(config),
            editor: EditorState::new(),
        }),
    });

    let app = router(state).layer(CorsLayer::permissive());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    info!(%addr, input = %args.input.display(), "editor backend started");
    println!("opscanvas server listening on http://{addr}");
    println!("Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}

fn router(state: Arc<ServeState>) -> Router {
    Router::new()
        .route("/api/topology", get(get_topology).put(put_topology))
        .route("/api/frame", get(get_frame))
        .route("/api/svg", get(get_svg))
        .route("/api/events", post(post_events))
        .route("/api/state", put(put_state))
        .route("/api/nodes", post(post_node))
        .route("/api/groups", post(post_group))
        .route("/api/elements/:id", delete(delete_element))
        .route(
            "/api/connections/:id",
            patch(patch_connection).delete(delete_connection),
        )
        .with_state(state)
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn topology_error(err: TopologyError) -> (StatusCode, String) {
    let status = match err {
        TopologyError::UnknownElement(_) | TopologyError::UnknownConnection(_) => StatusCode::NOT_FOUND,
        TopologyError::SelfLoop(_) => StatusCode::BAD_REQUEST,
        TopologyError::Io { .. } | TopologyError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

async fn get_topology(State(state): State<Arc<ServeState>>) -> Json<Topology> {
    let session = state.session.lock().await;
    Json(session.topology.clone())
}

async fn put_topology(
    State(state): State<Arc<ServeState>>,
    Json(topology): Json<Topology>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut session = state.session.lock().await;
    state.persist(&topology).await.map_err(internal_error)?;
    session.topology = topology;
    session.editor.selection = Selection::None;
    session.editor.pending_source = None;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_frame(State(state): State<Arc<ServeState>>) -> Json<FramePayload> {
    let session = state.session.lock().await;
    Json(FramePayload::capture(&session))
}

async fn get_svg(State(state): State<Arc<ServeState>>) -> Result<Response, (StatusCode, String)> {
    let session = state.session.lock().await;
    let frame = session.canvas.frame(&session.topology);
    let svg = render_svg(
        &session.topology,
        &frame,
        &session.editor,
        &state.background,
        session.canvas.config().scrollbar_thickness,
    )
    .map_err(internal_error)?;

    let mut response = Response::new(svg.into());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("image/svg+xml"),
    );
    Ok(response)
}

async fn post_events(
    State(state): State<Arc<ServeState>>,
    Json(events): Json<Vec<PointerEvent>>,
) -> Result<Json<FramePayload>, (StatusCode, String)> {
    let mut guard = state.session.lock().await;
    let mut next = EditSession {
        topology: guard.topology.clone(),
        canvas: guard.canvas.clone(),
        editor: guard.editor.clone(),
    };

    for event in events {
        next.canvas.handle(event, &mut next.editor, &mut next.topology);
    }

    if next.topology != guard.topology {
        state
            .persist(&next.topology)
            .await
            .map_err(internal_error)?;
    }
    *guard = next;
    Ok(Json(FramePayload::capture(&guard)))
}

async fn put_state(
    State(state): State<Arc<ServeState>>,
    Json(patch): Json<StatePatch>,
) -> Json<EditorState> {
    let mut session = state.session.lock().await;
    if let Some(mode) = patch.mode {
        session.editor.set_mode(mode);
    }
    if let Some(locked) = patch.locked {
        session.editor.set_locked(locked);
    }
    Json(session.editor.clone())
}

async fn post_node(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<NewNodeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut session = state.session.lock().await;
    let mut next = session.topology.clone();
    let node = next.add_node(request.service_type, request.name).clone();
    state.commit(&mut session, next).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn post_group(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<NewGroupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut session = state.session.lock().await;
    let mut next = session.topology.clone();
    let group = next.add_group(request.name, request.status).clone();
    state.commit(&mut session, next).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn delete_element(
    State(state): State<Arc<ServeState>>,
    AxumPath(element_id): AxumPath<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut session = state.session.lock().await;
    let mut next = session.topology.clone();
    next.delete_element(&element_id).map_err(topology_error)?;
    state.commit(&mut session, next).await?;
    session.editor.forget(&element_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn patch_connection(
    State(state): State<Arc<ServeState>>,
    AxumPath(connection_id): AxumPath<String>,
    Json(update): Json<ConnectionUpdate>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut session = state.session.lock().await;
    let mut next = session.topology.clone();
    next.update_connection(&connection_id, update)
        .map_err(topology_error)?;
    state.commit(&mut session, next).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_connection(
    State(state): State<Arc<ServeState>>,
    AxumPath(connection_id): AxumPath<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut session = state.session.lock().await;
    let mut next = session.topology.clone();
    next.remove_connection(&connection_id)
        .map_err(topology_error)?;
    state.commit(&mut session, next).await?;
    session.editor.forget(&connection_id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve_state(source_path: PathBuf) -> Arc<ServeState> {
        Arc::new(ServeState {
            source_path,
            background: "white".to_string(),
            session: Mutex::new(EditSession {
                topology: Topology::sample(),
                canvas: Canvas::default(),
                editor: EditorState::new(),
            }),
        })
    }

    #[tokio::test]
    async fn mutations_are_saved_before_they_are_applied() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("topology.json");
        let state = serve_state(path.clone());

        let result = delete_connection(State(state.clone()), AxumPath("c1".to_string())).await;
        assert!(result.is_ok());

        let on_disk = Topology::load(&path).unwrap();
        let session = state.session.lock().await;
        assert_eq!(session.topology, on_disk);
        assert!(session.topology.connection("c1").is_none());
    }

    #[tokio::test]
    async fn failed_writes_leave_the_session_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        // A directory cannot be written as a file.
        let state = serve_state(tmp.path().to_path_buf());
        let before = state.session.lock().await.topology.clone();

        let request = NewNodeRequest {
            service_type: ServiceType::Cache,
            name: "Session Cache".to_string(),
        };
        let Err((status, _)) = post_node(State(state.clone()), Json(request)).await else {
            panic!("write to a directory should fail");
        };
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        assert!(
            delete_element(State(state.clone()), AxumPath("2".to_string()))
                .await
                .is_err()
        );

        let drag = vec![
            PointerEvent::Down(Point::new(500.0, 220.0)),
            PointerEvent::Move(Point::new(700.0, 500.0)),
            PointerEvent::Up,
        ];
        assert!(post_events(State(state.clone()), Json(drag)).await.is_err());

        let session = state.session.lock().await;
        assert_eq!(session.topology, before);
        assert!(session.canvas.gesture().is_idle());
    }
}
