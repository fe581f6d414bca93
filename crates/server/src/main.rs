use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use betrace_engine::export::batcher::ExportBatcher;
use betrace_engine::store::FileRuleStore;
use betrace_engine::{Engine, RuleService};
use betrace_server::config::{self, ServerConfig};
use betrace_server::exporter::LogExporter;
use betrace_server::rest::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config_path: PathBuf = std::env::var("BETRACE_CONFIG")
        .unwrap_or_else(|_| "betrace.yml".into())
        .into();
    let config = load_config(&config_path)?;

    let store = Arc::new(FileRuleStore::open(Path::new(&config.rules_dir))?);
    let (engine, violations) = Engine::start(config.engine_config());

    let (export_batch, export_interval) =
        (engine.config().export_batch, engine.config().export_interval);
    tokio::spawn(
        ExportBatcher::new(export_batch, export_interval).run(violations, Arc::new(LogExporter)),
    );

    let service = Arc::new(RuleService::new(engine, store));
    let recovered = service.recover().await?;
    tracing::info!(rules = recovered, "recovered rule set");

    let app = router(AppState {
        service: service.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    tracing::info!(addr = %config.listen, "betrace server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    let flushed = service.engine().flush_traces().await;
    tracing::info!(flushed, "drained trace accumulator on shutdown");
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
    if path.exists() {
        Ok(config::load_from_file(path)?)
    } else {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        Ok(config::load_from_str("rules_dir: ./betrace-rules\n")?)
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("ctrl-c handler");
    }
}
