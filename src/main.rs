use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cloudatlas::config::{Settings, read_query_file};
use cloudatlas::construct::{AttributesMap, ZoneTree};
use cloudatlas::engine::Engine;
use cloudatlas::error::{AtlasError, Result};
use cloudatlas::{sample, server};

fn main() {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = match Settings::load(config_path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("cloudatlas: {e}");
            std::process::exit(2);
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "cannot start async runtime");
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run(settings)) {
        error!(error = %e, "agent stopped");
        std::process::exit(1);
    }
}

async fn run(settings: Settings) -> Result<()> {
    let tree = if settings.sample_hierarchy { sample::hierarchy()? } else { ZoneTree::with_root(AttributesMap::new()) };
    let engine = Arc::new(Engine::new(tree, settings.engine_settings())?);
    info!(zones = engine.tree()?.len(), every_ms = settings.query_interval_ms, "zone tree ready");

    if let Some(path) = &settings.queries_file {
        let root = engine.tree()?.root();
        for definition in read_query_file(path)? {
            match engine.install(root, &definition.name, &definition.queries) {
                Ok(ack) => info!(query = %definition.name, "{ack}"),
                Err(e) => warn!(query = %definition.name, error = %e, "query not installed"),
            }
        }
    }

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .map_err(|e| AtlasError::Config(format!("cannot bind {}: {e}", settings.bind)))?;
    info!(bind = %settings.bind, "listening");
    let served = axum::serve(listener, server::router(Arc::clone(&engine)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    engine.shutdown()?;
    served.map_err(|e| AtlasError::Execution(format!("server error: {e}")))
}
