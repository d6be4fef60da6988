// Render-layer boundary.
//
// The core never draws anything itself. Everything visible (markers, cluster
// bubbles, popups, their stacking order) goes through RenderSurface, and the
// surface reports nothing back except subscription tokens. Pointer and zoom
// events are fed into MapFeed by whoever owns the surface.

use std::fmt;
use std::str::FromStr;

use nearcast_common::PostId;
use thiserror::Error;

use crate::cluster::ClusterNode;

/// Identity of a popup. Cluster popups are keyed by the cluster's anchor
/// marker (its earliest-created member), since cluster nodes themselves have
/// no identity across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PopupKey {
    Marker(PostId),
    Cluster(PostId),
}

impl PopupKey {
    pub fn is_cluster(&self) -> bool {
        matches!(self, PopupKey::Cluster(_))
    }

    /// The marker id, or the anchor id for a cluster popup.
    pub fn post_id(&self) -> PostId {
        match *self {
            PopupKey::Marker(id) | PopupKey::Cluster(id) => id,
        }
    }
}

impl fmt::Display for PopupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopupKey::Marker(id) => write!(f, "marker:{id}"),
            PopupKey::Cluster(id) => write!(f, "cluster:{id}"),
        }
    }
}

impl FromStr for PopupKey {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| SurfaceError::InvalidKey(s.to_string()))?;
        let id: PostId = id
            .trim()
            .parse()
            .map_err(|_| SurfaceError::InvalidKey(s.to_string()))?;
        match kind.trim() {
            "marker" => Ok(PopupKey::Marker(id)),
            "cluster" => Ok(PopupKey::Cluster(id)),
            _ => Err(SurfaceError::InvalidKey(s.to_string())),
        }
    }
}

/// Handle for a listener registered on the surface. Released exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopupOptions {
    /// Whether opening may pan the viewport to fit the popup. Off by default.
    pub auto_pan: bool,
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("no surface for popup {0}")]
    MissingPopup(PopupKey),

    #[error("invalid popup key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Everything the core needs from a map renderer.
pub trait RenderSurface {
    // --- Markers ---

    /// Place a marker with its bound popup content.
    fn add_marker(&mut self, id: PostId, lat: f64, lng: f64, content: &str);

    fn move_marker(&mut self, id: PostId, lat: f64, lng: f64);

    /// Replace the content bound to a marker's popup.
    fn set_marker_content(&mut self, id: PostId, content: &str);

    /// Remove a marker. Its popup, if open, goes with it.
    fn remove_marker(&mut self, id: PostId);

    /// Current screen grouping, for drawing cluster bubbles. Called once per
    /// render pass with every node, singletons included.
    fn layout_clusters(&mut self, _clusters: &[ClusterNode]) {}

    // --- Popups ---

    /// Open a popup anchored at `lat`/`lng`.
    fn open_popup(
        &mut self,
        key: PopupKey,
        lat: f64,
        lng: f64,
        options: PopupOptions,
    ) -> Result<(), SurfaceError>;

    /// Re-anchor an open popup, e.g. when its cluster's centre shifts.
    fn move_popup(&mut self, key: PopupKey, lat: f64, lng: f64);

    fn set_popup_content(&mut self, key: PopupKey, content: &str) -> Result<(), SurfaceError>;

    fn close_popup(&mut self, key: PopupKey);

    fn set_popup_z_index(&mut self, key: PopupKey, z_index: u64);

    // --- Listeners ---

    fn subscribe_popup_interaction(&mut self, key: PopupKey) -> SubscriptionToken;

    fn subscribe_zoom(&mut self) -> SubscriptionToken;

    fn unsubscribe(&mut self, token: SubscriptionToken);
}
