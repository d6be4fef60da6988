use nearcast_common::PostId;
use serde::{Deserialize, Serialize};

/// Observable side effects of a render pass, for telemetry and UX hooks.
/// Emitted only when a popup actually opens, never for one already open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapEvent {
    MarkerOpened { post_id: PostId },
    ClusterOpened { member_count: usize },
}

impl MapEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            MapEvent::MarkerOpened { .. } => "marker_opened",
            MapEvent::ClusterOpened { .. } => "cluster_opened",
        }
    }
}
