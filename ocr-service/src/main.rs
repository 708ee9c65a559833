use clap::Parser;
use ocr_service::{Application, Config, config::Args, telemetry};
use tokio::signal;
use tracing::{debug, info};

/// Resolves on the first of Ctrl+C or SIGTERM, letting in-flight extractions finish.
async fn shutdown_signal() {
    let interrupt = async {
        signal::ctrl_c().await.expect("install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).expect("install SIGTERM handler");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let source = tokio::select! {
        _ = interrupt => "Ctrl+C",
        _ = terminate => "SIGTERM",
    };
    info!(signal = source, "Stopping OCR service");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Values already present in the environment take precedence over .env
    let dotenv_path = dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = Config::load(&args)?;

    if args.validate {
        println!("Configuration OK ({})", args.config);
        return Ok(());
    }

    telemetry::init_telemetry(config.enable_otel_export)?;
    debug!(?args, ?dotenv_path, "Startup arguments");

    Application::new(config).await?.serve(shutdown_signal()).await
}
