//! The render pass.

use nearcast_common::file_config::PopupConfig;
use nearcast_common::{FileConfig, Post, PostId};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cluster::{ClusterIndex, ClusterNode, Clusterer};
use crate::events::MapEvent;
use crate::grid::GridClusterer;
use crate::popup::{PopupLifecycleManager, SelectionState};
use crate::projection::ZoomContext;
use crate::reconcile::{MarkerReconciler, ReconcileStats};
use crate::surface::{PopupKey, RenderSurface, SubscriptionToken};

const EVENT_CAPACITY: usize = 256;

/// One live map: markers, their grouping, and the popups on top.
///
/// Reconcile → cluster → popup refresh, run to completion on every new post
/// list and every zoom change. Owns all per-map state; nothing is global.
pub struct MapFeed<S, C = GridClusterer>
where
    S: RenderSurface,
    C: Clusterer,
{
    surface: S,
    reconciler: MarkerReconciler,
    /// `None` once disposed.
    index: Option<ClusterIndex<C>>,
    popups: PopupLifecycleManager,
    zoom: ZoomContext,
    zoom_subscription: Option<SubscriptionToken>,
    events: broadcast::Sender<MapEvent>,
}

impl<S: RenderSurface> MapFeed<S, GridClusterer> {
    /// Grid clustering and popup settings from the tuning file.
    pub fn from_config(surface: S, zoom: ZoomContext, config: &FileConfig) -> Self {
        Self::new(
            surface,
            GridClusterer::from_config(&config.clustering),
            zoom,
            &config.popups,
        )
    }
}

impl<S, C> MapFeed<S, C>
where
    S: RenderSurface,
    C: Clusterer,
{
    pub fn new(mut surface: S, clusterer: C, zoom: ZoomContext, popups: &PopupConfig) -> Self {
        let zoom_subscription = surface.subscribe_zoom();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            surface,
            reconciler: MarkerReconciler::new(),
            index: Some(ClusterIndex::new(clusterer)),
            popups: PopupLifecycleManager::new(popups.aggregate_limit, popups.z_index_base),
            zoom,
            zoom_subscription: Some(zoom_subscription),
            events,
        }
    }

    /// Apply a fresh post list and re-derive popups.
    pub fn reconcile_and_render(&mut self, posts: &[Post]) -> ReconcileStats {
        let Some(index) = self.index.as_mut() else {
            warn!(posts = posts.len(), "Render on disposed map ignored");
            return ReconcileStats::default();
        };

        let stats = self.reconciler.reconcile(posts, index, &mut self.surface);
        self.popups.release_removed(&stats.removed_ids, &mut self.surface);
        self.render();
        stats
    }

    /// Re-group for `zoom` and re-derive popups.
    pub fn on_zoom_changed(&mut self, zoom: ZoomContext) {
        if self.index.is_none() {
            return;
        }
        if !zoom.zoom.is_finite() {
            warn!(zoom = zoom.zoom, "Ignoring non-finite zoom");
            return;
        }
        debug!(from = self.zoom.zoom, to = zoom.zoom, "Zoom changed");
        self.zoom = zoom;
        self.render();
    }

    /// Pointer interaction with an open popup: raise it. Returns its new
    /// z-index, or `None` if the popup is not open.
    pub fn on_popup_interaction(&mut self, key: PopupKey) -> Option<u64> {
        self.popups.on_interaction(key, &mut self.surface)
    }

    /// Release every listener, remove every marker, and drop the index.
    /// Idempotent; later calls on the feed are no-ops.
    pub fn dispose(&mut self) {
        if self.index.is_none() {
            return;
        }
        self.popups.dispose(&mut self.surface);
        if let Some(token) = self.zoom_subscription.take() {
            self.surface.unsubscribe(token);
        }
        self.reconciler.clear(&mut self.surface);
        self.index = None;
        info!("Map feed disposed");
    }

    /// Receiver for popup-open events from subsequent passes.
    pub fn subscribe(&self) -> broadcast::Receiver<MapEvent> {
        self.events.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.index.is_none()
    }

    pub fn zoom(&self) -> ZoomContext {
        self.zoom
    }

    pub fn selection(&self) -> SelectionState {
        self.popups.selection()
    }

    pub fn popups(&self) -> &PopupLifecycleManager {
        &self.popups
    }

    pub fn reconciler(&self) -> &MarkerReconciler {
        &self.reconciler
    }

    pub fn marker_ids(&self) -> Vec<PostId> {
        self.reconciler.live_markers().iter().map(|m| m.id()).collect()
    }

    /// Groups from the last render pass.
    pub fn clusters(&self) -> &[ClusterNode] {
        self.index.as_ref().map(|i| i.nodes()).unwrap_or(&[])
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    fn render(&mut self) {
        let Some(index) = self.index.as_mut() else {
            return;
        };
        let nodes = index.clusters_for_zoom(self.zoom);
        self.surface.layout_clusters(nodes);

        let events = self.popups.refresh(&self.reconciler, &*index, &mut self.surface);
        for event in events {
            debug!(event = event.event_type(), "Map event");
            // No receivers is fine.
            let _ = self.events.send(event);
        }
    }
}
