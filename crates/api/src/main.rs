use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;

use anyhow::Context;
use binsync_api::cli::Config;
use binsync_infra::sink::JsonLinesSink;
use binsync_infra::source::JsonLinesSource;
use binsync_infra::{FileCheckpointStore, StatusSource, SyncManager};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    binsync_observability::init_with(config.log_format);

    let sync_config = config.sync_config();

    let input: Box<dyn BufRead + Send> = match &config.input {
        Some(path) if path.as_os_str() != "-" => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("open input {}", path.display()))?,
        )),
        _ => Box::new(BufReader::new(io::stdin())),
    };
    let source = JsonLinesSource::new(input).with_subscribe(sync_config.source.subscribe_regexes()?);
    let store = FileCheckpointStore::new(&sync_config.data_dir);
    let sink = JsonLinesSink::new(io::stdout());

    let manager = Arc::new(SyncManager::new(sync_config, store, source, sink)?);

    if let Some(addr) = config.stat_addr {
        let app = binsync_api::app::build_app(vec![manager.clone() as Arc<dyn StatusSource>]);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind diagnostics address {addr}"))?;

        tracing::info!("diagnostics listening on {}", listener.local_addr()?);
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(error = %err, "diagnostics server failed");
            }
        });
    }

    let stopper = manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            stopper.shutdown();
        }
    });

    manager.run().await?;
    Ok(())
}
