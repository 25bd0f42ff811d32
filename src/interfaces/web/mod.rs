mod handlers;
mod router;

use std::convert::Infallible;

use anyhow::Result;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::orchestrator::Orchestrator;

pub(crate) use router::build_api_router;

pub struct ApiServerConfig {
    pub orchestrator: Orchestrator,
    pub log_tx: broadcast::Sender<String>,
    pub default_owner: String,
    pub provider_id: String,
    pub model_id: String,
    pub api_host: String,
    pub api_port: u16,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) orchestrator: Orchestrator,
    pub(crate) log_tx: broadcast::Sender<String>,
    pub(crate) default_owner: String,
    pub(crate) provider_id: String,
    pub(crate) model_id: String,
    pub(crate) api_port: u16,
}

pub struct ApiServer {
    state: AppState,
    api_host: String,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            state: AppState {
                orchestrator: config.orchestrator,
                log_tx: config.log_tx,
                default_owner: config.default_owner,
                provider_id: config.provider_id,
                model_id: config.model_id,
                api_port: config.api_port,
            },
            api_host: config.api_host,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.api_host, self.state.api_port)
    }

    /// Serves until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.address();
        let app = build_api_router(self.state);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("API Server running at http://{addr}");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;
        info!("API Server shut down");
        Ok(())
    }
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(log) => Ok(Event::default().data(log)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}
