use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::dispatcher::{Dispatcher, RawCall, ToolResponse};
use crate::error::ErrorKind;
use crate::registry::catalog;

// ── Response types ───────────────────────────────────────────────

#[derive(Serialize)]
struct ApiOk<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Serialize)]
struct ApiErr {
    ok: bool,
    error: String,
}

fn ok_json<T: Serialize>(data: T) -> impl IntoResponse {
    Json(ApiOk { ok: true, data })
}

fn err_json(status: StatusCode, msg: String) -> impl IntoResponse {
    (status, Json(ApiErr { ok: false, error: msg }))
}

/// Tool responses go out as the envelope itself. A call that could not be
/// routed is a client error; a target's own failure is still a 200.
fn tool_json(response: &ToolResponse) -> impl IntoResponse {
    let status = match response.error_kind() {
        Some(ErrorKind::UnknownTool) => StatusCode::NOT_FOUND,
        Some(ErrorKind::MalformedArguments) => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    };
    (status, Json(response.to_json()))
}

/// Dispatch off the async runtime: script runs block their caller until
/// they finish or hit the deadline.
async fn run_blocking<F>(dispatcher: Arc<Dispatcher>, f: F) -> axum::response::Response
where
    F: FnOnce(&Dispatcher) -> ToolResponse + Send + 'static,
{
    match tokio::task::spawn_blocking(move || f(&dispatcher)).await {
        Ok(response) => tool_json(&response).into_response(),
        Err(e) => err_json(StatusCode::INTERNAL_SERVER_ERROR, format!("dispatch task failed: {e}")).into_response(),
    }
}

// ── Handlers ─────────────────────────────────────────────────────

async fn get_tools(Extension(dispatcher): Extension<Arc<Dispatcher>>) -> impl IntoResponse {
    ok_json(catalog::to_json_schema(dispatcher.registry()))
}

/// The body is taken as text so that broken JSON still gets the envelope:
/// argument repair parses it and reports `MalformedArguments`.
async fn post_tool(
    Extension(dispatcher): Extension<Arc<Dispatcher>>,
    Path(name): Path<String>,
    body: String,
) -> impl IntoResponse {
    run_blocking(dispatcher, move |d| {
        d.dispatch_raw(RawCall {
            name,
            arguments: Value::String(body),
        })
    })
    .await
}

async fn post_dispatch(Extension(dispatcher): Extension<Arc<Dispatcher>>, body: String) -> impl IntoResponse {
    run_blocking(dispatcher, move |d| d.dispatch_text(&body)).await
}

async fn get_project(Extension(dispatcher): Extension<Arc<Dispatcher>>) -> impl IntoResponse {
    let project = dispatcher.state().with_project(Clone::clone);
    ok_json(project)
}

// ── Server startup ───────────────────────────────────────────────

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/api/tools/{name}", post(post_tool))
        .route("/api/tools", get(get_tools))
        .route("/api/dispatch", post(post_dispatch))
        .route("/api/project", get(get_project))
        .layer(CorsLayer::permissive())
        .layer(Extension(dispatcher))
}

/// Bind `addr` and serve in the background. Returns the bound address (use
/// port 0 for a random one) and the server task.
pub async fn start_api_server(
    dispatcher: Arc<Dispatcher>,
    addr: SocketAddr,
) -> Result<(SocketAddr, JoinHandle<()>), String> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind API server: {e}"))?;
    let bound = listener
        .local_addr()
        .map_err(|e| format!("Failed to get API server address: {e}"))?;

    let app = router(dispatcher);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::error!("API server error: {e}");
        }
    });
    log::info!("API server listening on http://{bound}");
    Ok((bound, handle))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::Project;
    use crate::registry::Registry;
    use crate::settings::AppSettings;
    use crate::state::AppState;

    async fn server() -> SocketAddr {
        let state = Arc::new(AppState::new(Project::with_balls(2), AppSettings::default()));
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(Registry::standard()), state).unwrap());
        let (addr, _) = start_api_server(dispatcher, SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        addr
    }

    #[tokio::test]
    async fn tools_then_call_then_project() {
        let addr = server().await;
        let client = reqwest::Client::new();

        let tools: Value = client
            .get(format!("http://{addr}/api/tools"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(tools["ok"], true);
        assert!(tools["data"].as_array().unwrap().iter().any(|t| t["name"] == "run_script"));

        let created = client
            .post(format!("http://{addr}/api/tools/create_segment"))
            .json(&serde_json::json!({"timelineIndex": 1, "startTime": 0, "endTime": 2, "color": "blue"}))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), reqwest::StatusCode::OK);
        let created: Value = created.json().await.unwrap();
        assert_eq!(created["success"], true);

        let project: Value = client
            .get(format!("http://{addr}/api/project"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(project["data"]["timelines"][1]["segments"][0]["endTime"], 2.0);
    }

    #[tokio::test]
    async fn dispatch_accepts_raw_text_and_reports_unknown_tools() {
        let addr = server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{addr}/api/dispatch"))
            .body("<tool_call>{\"name\": \"run_script\", \"arguments\": {\"code\": \"n = NUM_BALLS\"}}</tool_call>")
            .send()
            .await
            .unwrap();
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["returnedBindings"]["n"], 2);

        let response = client
            .post(format!("http://{addr}/api/tools/send_email"))
            .json(&serde_json::json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn broken_json_body_gets_the_envelope() {
        let addr = server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{addr}/api/tools/create_segment"))
            .header("content-type", "application/json")
            .body("{\"timelineIndex\":")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("MalformedArguments: "), "{body}");
        assert_eq!(body["errorDetails"]["kind"], "MalformedArguments");

        let response = client
            .post(format!("http://{addr}/api/tools/clear_all_timelines"))
            .send()
            .await
            .unwrap();
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], true, "{body}");
    }
}
