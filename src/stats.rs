//! Channel statistics: growth and follower graphs.

use crate::error::{GatewayError, Result};
use crate::peers::PeerResolver;
use crate::platform::{ChannelStatsResponse, PeerTarget, PlatformClient, StatsGraph};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsKind {
    Broadcast,
    Megagroup,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Period {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Followers {
    pub current: f64,
    pub previous: f64,
    pub growth_graph: Value,
    pub followers_graph: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatistics {
    pub kind: StatsKind,
    pub period: Period,
    pub followers: Followers,
}

/// Decode a graph into its JSON series, or a structured error payload.
pub fn decode_graph(graph: &StatsGraph) -> Value {
    match graph {
        StatsGraph::Data { json } => match serde_json::from_str::<Value>(json) {
            Ok(data) => {
                if let Some(names) = data.get("names") {
                    debug!("graph series: {names}");
                }
                data
            }
            Err(e) => json!({ "error": format!("invalid graph data: {e}") }),
        },
        StatsGraph::Error { error } => {
            warn!("graph error: {error}");
            json!({ "error": error })
        }
        StatsGraph::Async { token } => json!({ "error": "graph not loaded", "token": token }),
    }
}

/// Fetch the broadcast statistics of a channel, falling back to megagroup
/// statistics when the broadcast request is refused.
pub async fn fetch(client: &dyn PlatformClient, channel_id: &str) -> Result<ChannelStatsResponse> {
    let peer = PeerResolver::new(client)
        .resolve_direct(channel_id)
        .await
        .map_err(|e| {
            warn!(channel = channel_id, "cannot resolve channel for stats: {e}");
            GatewayError::StatsUnavailable(e.to_string())
        })?;
    let target = PeerTarget::Resolved(peer);

    match client.broadcast_stats(&target).await {
        Ok(stats) => Ok(ChannelStatsResponse::Broadcast(stats)),
        Err(e) => {
            warn!(channel = channel_id, "broadcast stats failed, trying megagroup: {e}");
            client
                .megagroup_stats(&target)
                .await
                .map(ChannelStatsResponse::Megagroup)
                .map_err(|e| GatewayError::StatsUnavailable(e.to_string()))
        }
    }
}

/// Assemble the statistics payload for a channel or megagroup.
pub async fn get_stats(client: &dyn PlatformClient, channel_id: &str) -> Result<ChannelStatistics> {
    let stats = fetch(client, channel_id).await?;
    let period = stats.period();
    let audience = stats.audience();

    info!(
        channel = channel_id,
        start = period.min_date,
        end = period.max_date,
        "stats fetched"
    );

    Ok(ChannelStatistics {
        kind: match stats {
            ChannelStatsResponse::Broadcast(_) => StatsKind::Broadcast,
            ChannelStatsResponse::Megagroup(_) => StatsKind::Megagroup,
        },
        period: Period {
            start: period.min_date,
            end: period.max_date,
        },
        followers: Followers {
            current: audience.current,
            previous: audience.previous,
            growth_graph: decode_graph(stats.growth_graph()),
            followers_graph: decode_graph(stats.audience_graph()),
        },
    })
}
