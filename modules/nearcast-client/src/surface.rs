use std::collections::HashSet;

use tracing::{debug, info};

use nearcast_common::PostId;
use nearcast_map::{ClusterNode, PopupKey, PopupOptions, RenderSurface, SubscriptionToken, SurfaceError};

/// Headless surface that logs every render call. Used by the CLI, where there
/// is no map to draw on.
#[derive(Debug, Default)]
pub struct TracingSurface {
    markers: HashSet<PostId>,
    popups: HashSet<PopupKey>,
    next_token: u64,
}

impl TracingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn open_popup_count(&self) -> usize {
        self.popups.len()
    }
}

impl RenderSurface for TracingSurface {
    fn add_marker(&mut self, id: PostId, lat: f64, lng: f64, content: &str) {
        self.markers.insert(id);
        info!(post_id = id, lat, lng, content, "marker added");
    }

    fn move_marker(&mut self, id: PostId, lat: f64, lng: f64) {
        info!(post_id = id, lat, lng, "marker moved");
    }

    fn set_marker_content(&mut self, id: PostId, content: &str) {
        info!(post_id = id, content, "marker content");
    }

    fn remove_marker(&mut self, id: PostId) {
        self.markers.remove(&id);
        self.popups.remove(&PopupKey::Marker(id));
        info!(post_id = id, "marker removed");
    }

    fn layout_clusters(&mut self, clusters: &[ClusterNode]) {
        for node in clusters.iter().filter(|n| n.is_cluster()) {
            debug!(anchor = node.anchor(), members = node.len(), lat = node.lat, lng = node.lng, "cluster");
        }
    }

    fn open_popup(
        &mut self,
        key: PopupKey,
        lat: f64,
        lng: f64,
        options: PopupOptions,
    ) -> Result<(), SurfaceError> {
        if let PopupKey::Marker(id) = key {
            if !self.markers.contains(&id) {
                return Err(SurfaceError::MissingPopup(key));
            }
        }
        self.popups.insert(key);
        info!(popup = %key, lat, lng, auto_pan = options.auto_pan, "popup opened");
        Ok(())
    }

    fn move_popup(&mut self, key: PopupKey, lat: f64, lng: f64) {
        if self.popups.contains(&key) {
            info!(popup = %key, lat, lng, "popup moved");
        }
    }

    fn set_popup_content(&mut self, key: PopupKey, content: &str) -> Result<(), SurfaceError> {
        if !self.popups.contains(&key) {
            return Err(SurfaceError::MissingPopup(key));
        }
        info!(popup = %key, "popup content:\n{content}");
        Ok(())
    }

    fn close_popup(&mut self, key: PopupKey) {
        self.popups.remove(&key);
        info!(popup = %key, "popup closed");
    }

    fn set_popup_z_index(&mut self, key: PopupKey, z_index: u64) {
        debug!(popup = %key, z_index, "popup z-index");
    }

    fn subscribe_popup_interaction(&mut self, key: PopupKey) -> SubscriptionToken {
        self.next_token += 1;
        debug!(popup = %key, token = self.next_token, "popup listener registered");
        SubscriptionToken(self.next_token)
    }

    fn subscribe_zoom(&mut self) -> SubscriptionToken {
        self.next_token += 1;
        debug!(token = self.next_token, "zoom listener registered");
        SubscriptionToken(self.next_token)
    }

    fn unsubscribe(&mut self, token: SubscriptionToken) {
        debug!(token = token.0, "listener released");
    }
}
