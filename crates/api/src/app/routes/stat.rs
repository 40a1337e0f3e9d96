//! `/stat`: per-pipeline sync progress.

use std::fmt::Write;

use axum::Json;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use binsync_infra::StatusReport;

use crate::app::StatusSources;
use crate::app::errors::json_error;

/// Collect one report per pipeline.
///
/// `status` may block on the source, so it runs off the async workers. The
/// error names the pipeline whose head query failed.
async fn collect(sources: StatusSources) -> Result<Vec<StatusReport>, String> {
    tokio::task::spawn_blocking(move || {
        sources
            .iter()
            .map(|source| {
                source
                    .status()
                    .map_err(|e| format!("query head position of {}: {e}", source.label()))
            })
            .collect::<Result<Vec<_>, _>>()
    })
    .await
    .map_err(|e| format!("status task failed: {e}"))?
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Render one report as the plain-text block served by `/stat`.
pub fn render(report: &StatusReport, out: &mut String) {
    let stats = &report.stats;
    let _ = writeln!(out, "-----------------------------------------------------------------");
    let _ = writeln!(out, "sync info of {}", report.label);
    let _ = writeln!(out, "state: {}", report.state);
    let _ = writeln!(out, "server_current_binlog: {}", or_dash(report.head_position.as_ref()));
    let _ = writeln!(out, "read_binlog: {}", or_dash(report.read_position.as_ref()));
    let _ = writeln!(out, "synced_binlog: {}", or_dash(report.synced_position.as_ref()));
    let _ = writeln!(out, "saved_at: {}", or_dash(report.saved_at.map(|t| t.to_rfc3339())));
    // Depth includes a reader waiting on a full channel, so it may exceed capacity by one.
    let _ = writeln!(out, "queue: {}/{}", stats.queue_depth, report.queue_capacity);
    let _ = writeln!(out, "insert_num: {}", stats.inserted);
    let _ = writeln!(out, "update_num: {}", stats.updated);
    let _ = writeln!(out, "delete_num: {}", stats.deleted);
    let _ = writeln!(
        out,
        "published: {} items in {} batches ({} failed attempts)",
        stats.published_items, stats.published_batches, stats.publish_failures
    );
}

pub async fn text(Extension(sources): Extension<StatusSources>) -> Response {
    match collect(sources).await {
        Ok(reports) => {
            let mut out = String::new();
            for report in &reports {
                render(report, &mut out);
            }
            out.into_response()
        }
        Err(message) => {
            tracing::warn!(error = %message, "stat request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
    }
}

pub async fn json(Extension(sources): Extension<StatusSources>) -> Response {
    match collect(sources).await {
        Ok(reports) => Json(reports).into_response(),
        Err(message) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "status_error", message),
    }
}
