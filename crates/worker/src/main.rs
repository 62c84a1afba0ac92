//! `i2v-worker` -- runs one image-to-video job against a local ComfyUI.
//!
//! Reads a job envelope (`JOB_INPUT_PATH`, `./test_input.json`, or stdin),
//! executes it, and prints the result JSON to stdout. Logs go to stderr.
//! Exits with status 1 when the job fails.
//!
//! See [`WorkerConfig::from_env`] for the environment variables.

use i2v_worker::config::WorkerConfig;
use i2v_worker::handler::Orchestrator;
use i2v_worker::runner::{self, JobSource};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::from_env();
    tracing::info!(
        server_address = %config.server_address,
        workflow = %config.workflow_path.display(),
        wait_timeout_secs = config.wait_timeout.as_secs(),
        "Starting i2v-worker",
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let source = JobSource::from_config(&config);
    let envelope = match runner::read_envelope(&source).await {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(error = %e, "Could not load job");
            println!("{}", serde_json::json!({ "error": e.to_string() }));
            std::process::exit(1);
        }
    };

    let orchestrator = Orchestrator::new(config, shutdown);
    let outcome = runner::run_job(&orchestrator, &envelope).await;

    println!("{}", outcome.to_json());
    if outcome.is_failure() {
        std::process::exit(1);
    }
}

/// `RUST_LOG` filter (default `i2v_worker=info,i2v_comfyui=info,i2v_core=info`);
/// `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "i2v_worker=info,i2v_comfyui=info,i2v_core=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), cancelling job");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, cancelling job");
        }
    }
    token.cancel();
}
