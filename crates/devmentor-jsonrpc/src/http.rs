//! HTTP hosting for [`RpcHandler`]s: `GET /`, `GET /health` and `POST /rpc`.

use anyhow::Result;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::ACCEPT};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::protocol::ServiceCard;
use crate::{ERR_INTERNAL, ERR_PARSE, JsonRpcRequest, JsonRpcResponse, RpcHandler, respond};

/// What the root path answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootPolicy {
    /// The service card, to any client.
    Card,
    /// 406 unless the client accepts `text/event-stream`.
    RequireEventStream,
}

#[derive(Clone)]
pub struct RpcService {
    handler: Arc<dyn RpcHandler>,
    card: ServiceCard,
    root: RootPolicy,
}

impl RpcService {
    pub fn new(handler: Arc<dyn RpcHandler>, card: ServiceCard) -> Self {
        Self {
            handler,
            card,
            root: RootPolicy::Card,
        }
    }

    pub fn with_root_policy(mut self, root: RootPolicy) -> Self {
        self.root = root;
        self
    }

    pub fn card(&self) -> &ServiceCard {
        &self.card
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .route("/", get(root))
            .route("/health", get(health))
            .route("/rpc", post(rpc))
            .with_state(Arc::new(self))
            .layer(TraceLayer::new_for_http())
    }
}

/// Serves `service` on an already bound listener until `shutdown` resolves.
pub async fn serve_rpc<F>(
    listener: tokio::net::TcpListener,
    service: RpcService,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("{} listening on http://{addr}", service.card.name);
    axum::serve(listener, service.into_router())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

type ServiceState = Arc<RpcService>;

async fn root(State(service): State<ServiceState>, headers: HeaderMap) -> Response {
    if service.root == RootPolicy::RequireEventStream {
        let accepts_stream = headers
            .get(ACCEPT)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("text/event-stream"));
        if !accepts_stream {
            return (
                StatusCode::NOT_ACCEPTABLE,
                Json(json!({
                    "error": "Not Acceptable: client must accept text/event-stream"
                })),
            )
                .into_response();
        }
    }
    Json(service.card.clone()).into_response()
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn rpc(State(service): State<ServiceState>, body: String) -> Json<JsonRpcResponse> {
    let request = match serde_json::from_str::<JsonRpcRequest>(&body) {
        Ok(request) => request,
        Err(_) => return Json(JsonRpcResponse::error(Value::Null, ERR_PARSE, "Parse error")),
    };
    let id = request.id.clone();
    let method = request.method.clone();
    let handler = Arc::clone(&service.handler);
    match tokio::task::spawn_blocking(move || respond(handler.as_ref(), request)).await {
        Ok(response) => Json(response),
        Err(err) => {
            error!("handler for {method} did not complete: {err}");
            Json(JsonRpcResponse::error(
                id,
                ERR_INTERNAL,
                format!("handler for {method} did not complete"),
            ))
        }
    }
}
