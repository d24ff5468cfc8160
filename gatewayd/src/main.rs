use clap::Parser;
use gatewayd::{config::Args, telemetry, Application};

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_telemetry()?;

    let args = Args::parse();

    if args.validate {
        gatewayd::Config::bootstrap(&args)?;
        println!("Configuration is valid.");
        return Ok(());
    }

    tracing::debug!(?args, "starting gatewayd");

    Application::new(args).await?.serve(shutdown_signal()).await
}
