use anyhow::Result;
use console::style;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::engine;
use crate::core::terminal::GuideSection;
use crate::interfaces::web::{ApiServer, ApiServerConfig};

pub(crate) async fn run_serve(
    log_tx: broadcast::Sender<String>,
    api_host: Option<String>,
    api_port: Option<u16>,
) -> Result<()> {
    let engine = engine::boot().await?;
    let api_host = api_host.unwrap_or_else(|| engine.config.api_host.clone());
    let api_port = api_port.unwrap_or(engine.config.api_port);

    let server = ApiServer::new(ApiServerConfig {
        orchestrator: engine.orchestrator,
        log_tx,
        default_owner: engine.config.default_owner.clone(),
        provider_id: engine.provider_id.clone(),
        model_id: engine.model_id.clone(),
        api_host,
        api_port,
    });

    GuideSection::new("Etherflow API")
        .status(
            "Endpoint",
            &format!(
                "{}",
                style(format!("http://{}", server.address())).underlined().cyan()
            ),
        )
        .status("Provider", &format!("{} ({})", engine.provider_id, engine.model_id))
        .blank()
        .status(
            "Press Ctrl+C to stop the server.",
            &format!("{}", style("Ctrl+C").bold().yellow()),
        )
        .print();
    println!();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                signal.cancel();
            }
            Err(e) => warn!("Ctrl+C handler unavailable: {}", e),
        }
    });

    server.run(shutdown).await
}
