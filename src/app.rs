use crate::config::Config;
use crate::labels::ClassLabels;
use crate::ort_service::OrtDetectionService;
use crate::provisioner;
use crate::server::HttpServer;

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    // No model, no traffic: provisioning gates the listener bind below.
    if let Err(e) = provisioner::ensure(&config.model.get_model_path(), &config.model.remote_url)
        .await
    {
        tracing::error!("Failed to provision model artifact: {}", e);
        return Err(Box::new(e));
    }

    let labels = match ClassLabels::load(&config.labels.get_path()) {
        Ok(labels) => labels,
        Err(e) => {
            tracing::error!("Failed to load class labels: {}", e);
            return Err(Box::new(e));
        }
    };

    let model = match OrtDetectionService::new(&config.model) {
        Ok(model) => Arc::new(model),
        Err(e) => {
            tracing::error!("Failed to initialize detection service: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let server = HttpServer::new(model, labels, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
