//! JSON handlers for the status endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde::Serialize;

use crate::web::WebState;

/// `GET /api/config` - the loaded mappings and targets.
pub async fn get_config(State(state): State<Arc<WebState>>) -> Json<crate::config::Config> {
    Json((*state.config).clone())
}

#[derive(Serialize)]
pub struct NodeInfo {
    pub ip: String,
    pub port: u16,
    pub short_name: String,
    pub long_name: String,
    pub universes: Vec<String>,
    pub last_seen_secs: u64,
}

/// `GET /api/nodes` - discovered Art-Net nodes.
pub async fn get_nodes(State(state): State<Arc<WebState>>) -> Json<Vec<NodeInfo>> {
    let nodes = state
        .discovery
        .snapshot()
        .into_iter()
        .map(|n| NodeInfo {
            ip: n.ip.to_string(),
            port: n.port,
            short_name: n.short_name,
            long_name: n.long_name,
            universes: n.universes.iter().map(|u| u.to_string()).collect(),
            last_seen_secs: n.last_seen.elapsed().as_secs(),
        })
        .collect();
    Json(nodes)
}

#[derive(Serialize)]
pub struct SenderInfo {
    pub universe: String,
    pub ip: String,
}

/// `GET /api/senders` - peers actively feeding each universe.
pub async fn get_senders(State(state): State<Arc<WebState>>) -> Json<Vec<SenderInfo>> {
    let senders = state
        .dispatcher
        .sources()
        .into_iter()
        .map(|s| SenderInfo {
            universe: s.universe.to_string(),
            ip: s.ip.to_string(),
        })
        .collect();
    Json(senders)
}

#[derive(Serialize)]
pub struct StatsInfo {
    /// Cumulative frames received per source universe.
    pub frames_by_source: BTreeMap<String, u64>,
}

/// `GET /api/stats` - per-source throughput since startup.
pub async fn get_stats(State(state): State<Arc<WebState>>) -> Json<StatsInfo> {
    let frames_by_source = state
        .dispatcher
        .totals()
        .into_iter()
        .map(|(u, count)| (u.to_string(), count))
        .collect();
    Json(StatsInfo { frames_by_source })
}

/// `GET /` - minimal index linking the API routes.
pub async fn index() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head><title>dmxmap</title></head>
<body>
<h1>dmxmap proxy</h1>
<ul>
<li><a href="/api/config">/api/config</a> - mappings and targets</li>
<li><a href="/api/nodes">/api/nodes</a> - discovered Art-Net nodes</li>
<li><a href="/api/senders">/api/senders</a> - active senders per universe</li>
<li><a href="/api/stats">/api/stats</a> - per-source throughput</li>
</ul>
</body>
</html>
"#,
    )
}
