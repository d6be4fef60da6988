// Test doubles for the map core.
//
// RecordingSurface implements RenderSurface in memory: it keeps the visible
// state (markers, open popups, z-indices, live subscriptions) and a flat log of
// every call, so tests can assert both "what is on screen" and "what was
// written to get there".
//
// SharedSurface wraps one behind Arc<Mutex> so a test can inspect it while
// something else owns the feed.
//
// Plus Post constructors with fixed timestamps.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, TimeZone, Utc};

use nearcast_common::{Post, PostId};

use crate::cluster::ClusterNode;
use crate::surface::{PopupKey, PopupOptions, RenderSurface, SubscriptionToken, SurfaceError};

// ---------------------------------------------------------------------------
// Post helpers
// ---------------------------------------------------------------------------

/// Fixed reference time; `post(id, ..)` is created `id` minutes after it.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

pub fn post(id: PostId, lat: f64, lng: f64) -> Post {
    post_at(id, lat, lng, epoch() + Duration::minutes(id))
}

pub fn post_at(id: PostId, lat: f64, lng: f64, created_at: DateTime<Utc>) -> Post {
    Post {
        id,
        user_id: 1,
        message: format!("post {id}"),
        lat,
        lng,
        created_at,
        distance: 0.0,
    }
}

// ---------------------------------------------------------------------------
// RecordingSurface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    AddMarker { id: PostId, lat: f64, lng: f64, content: String },
    MoveMarker { id: PostId, lat: f64, lng: f64 },
    SetMarkerContent { id: PostId, content: String },
    RemoveMarker { id: PostId },
    LayoutClusters { clusters: usize },
    OpenPopup { key: PopupKey, options: PopupOptions },
    MovePopup { key: PopupKey, lat: f64, lng: f64 },
    SetPopupContent { key: PopupKey, content: String },
    ClosePopup { key: PopupKey },
    SetPopupZIndex { key: PopupKey, z_index: u64 },
    SubscribePopup { key: PopupKey, token: SubscriptionToken },
    SubscribeZoom { token: SubscriptionToken },
    Unsubscribe { token: SubscriptionToken },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerState {
    pub lat: f64,
    pub lng: f64,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopupState {
    pub lat: f64,
    pub lng: f64,
    pub content: Option<String>,
    pub z_index: Option<u64>,
    pub auto_pan: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listener {
    Popup(PopupKey),
    Zoom,
}

/// In-memory render surface that records every call.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    calls: Vec<SurfaceCall>,
    markers: HashMap<PostId, MarkerState>,
    popups: HashMap<PopupKey, PopupState>,
    listeners: HashMap<SubscriptionToken, Listener>,
    next_token: u64,
    failing_popups: HashSet<PopupKey>,
    /// Unsubscribe calls for tokens that were not live.
    pub stray_unsubscribes: usize,
    /// Set-content calls against popups that were not open.
    pub orphan_content_writes: usize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open_popup` fail for `key`, as if the surface had lost it.
    pub fn fail_popup(mut self, key: PopupKey) -> Self {
        self.failing_popups.insert(key);
        self
    }

    pub fn calls(&self) -> &[SurfaceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn marker_ids(&self) -> HashSet<PostId> {
        self.markers.keys().copied().collect()
    }

    pub fn marker(&self, id: PostId) -> Option<&MarkerState> {
        self.markers.get(&id)
    }

    pub fn popup(&self, key: PopupKey) -> Option<&PopupState> {
        self.popups.get(&key)
    }

    pub fn is_popup_open(&self, key: PopupKey) -> bool {
        self.popups.contains_key(&key)
    }

    /// Open popup keys, sorted.
    pub fn open_popups(&self) -> Vec<PopupKey> {
        let mut keys: Vec<PopupKey> = self.popups.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn live_listeners(&self) -> Vec<Listener> {
        self.listeners.values().copied().collect()
    }

    /// Marker and popup content writes in the log.
    pub fn content_writes(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    SurfaceCall::SetMarkerContent { .. } | SurfaceCall::SetPopupContent { .. }
                )
            })
            .count()
    }

    pub fn count(&self, pred: impl Fn(&SurfaceCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(*c)).count()
    }

    fn issue_token(&mut self, listener: Listener) -> SubscriptionToken {
        self.next_token += 1;
        let token = SubscriptionToken(self.next_token);
        self.listeners.insert(token, listener);
        token
    }
}

impl RenderSurface for RecordingSurface {
    fn add_marker(&mut self, id: PostId, lat: f64, lng: f64, content: &str) {
        self.calls.push(SurfaceCall::AddMarker {
            id,
            lat,
            lng,
            content: content.to_string(),
        });
        self.markers.insert(
            id,
            MarkerState {
                lat,
                lng,
                content: content.to_string(),
            },
        );
    }

    fn move_marker(&mut self, id: PostId, lat: f64, lng: f64) {
        self.calls.push(SurfaceCall::MoveMarker { id, lat, lng });
        if let Some(m) = self.markers.get_mut(&id) {
            m.lat = lat;
            m.lng = lng;
        }
    }

    fn set_marker_content(&mut self, id: PostId, content: &str) {
        self.calls.push(SurfaceCall::SetMarkerContent {
            id,
            content: content.to_string(),
        });
        if let Some(m) = self.markers.get_mut(&id) {
            m.content = content.to_string();
        }
    }

    fn remove_marker(&mut self, id: PostId) {
        self.calls.push(SurfaceCall::RemoveMarker { id });
        self.markers.remove(&id);
        self.popups.remove(&PopupKey::Marker(id));
    }

    fn layout_clusters(&mut self, clusters: &[ClusterNode]) {
        self.calls.push(SurfaceCall::LayoutClusters {
            clusters: clusters.iter().filter(|n| n.is_cluster()).count(),
        });
    }

    fn open_popup(
        &mut self,
        key: PopupKey,
        lat: f64,
        lng: f64,
        options: PopupOptions,
    ) -> Result<(), SurfaceError> {
        self.calls.push(SurfaceCall::OpenPopup { key, options });
        if self.failing_popups.contains(&key) {
            return Err(SurfaceError::MissingPopup(key));
        }
        self.popups.insert(
            key,
            PopupState {
                lat,
                lng,
                auto_pan: options.auto_pan,
                ..Default::default()
            },
        );
        Ok(())
    }

    fn move_popup(&mut self, key: PopupKey, lat: f64, lng: f64) {
        self.calls.push(SurfaceCall::MovePopup { key, lat, lng });
        if let Some(p) = self.popups.get_mut(&key) {
            p.lat = lat;
            p.lng = lng;
        }
    }

    fn set_popup_content(&mut self, key: PopupKey, content: &str) -> Result<(), SurfaceError> {
        self.calls.push(SurfaceCall::SetPopupContent {
            key,
            content: content.to_string(),
        });
        match self.popups.get_mut(&key) {
            Some(p) => {
                p.content = Some(content.to_string());
                Ok(())
            }
            None => {
                self.orphan_content_writes += 1;
                Err(SurfaceError::MissingPopup(key))
            }
        }
    }

    fn close_popup(&mut self, key: PopupKey) {
        self.calls.push(SurfaceCall::ClosePopup { key });
        self.popups.remove(&key);
    }

    fn set_popup_z_index(&mut self, key: PopupKey, z_index: u64) {
        self.calls.push(SurfaceCall::SetPopupZIndex { key, z_index });
        if let Some(p) = self.popups.get_mut(&key) {
            p.z_index = Some(z_index);
        }
    }

    fn subscribe_popup_interaction(&mut self, key: PopupKey) -> SubscriptionToken {
        let token = self.issue_token(Listener::Popup(key));
        self.calls.push(SurfaceCall::SubscribePopup { key, token });
        token
    }

    fn subscribe_zoom(&mut self) -> SubscriptionToken {
        let token = self.issue_token(Listener::Zoom);
        self.calls.push(SurfaceCall::SubscribeZoom { token });
        token
    }

    fn unsubscribe(&mut self, token: SubscriptionToken) {
        self.calls.push(SurfaceCall::Unsubscribe { token });
        if self.listeners.remove(&token).is_none() {
            self.stray_unsubscribes += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// SharedSurface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SharedSurface(Arc<Mutex<RecordingSurface>>);

impl SharedSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, RecordingSurface> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RenderSurface for SharedSurface {
    fn add_marker(&mut self, id: PostId, lat: f64, lng: f64, content: &str) {
        self.lock().add_marker(id, lat, lng, content);
    }

    fn move_marker(&mut self, id: PostId, lat: f64, lng: f64) {
        self.lock().move_marker(id, lat, lng);
    }

    fn set_marker_content(&mut self, id: PostId, content: &str) {
        self.lock().set_marker_content(id, content);
    }

    fn remove_marker(&mut self, id: PostId) {
        self.lock().remove_marker(id);
    }

    fn layout_clusters(&mut self, clusters: &[ClusterNode]) {
        self.lock().layout_clusters(clusters);
    }

    fn open_popup(
        &mut self,
        key: PopupKey,
        lat: f64,
        lng: f64,
        options: PopupOptions,
    ) -> Result<(), SurfaceError> {
        self.lock().open_popup(key, lat, lng, options)
    }

    fn move_popup(&mut self, key: PopupKey, lat: f64, lng: f64) {
        self.lock().move_popup(key, lat, lng);
    }

    fn set_popup_content(&mut self, key: PopupKey, content: &str) -> Result<(), SurfaceError> {
        self.lock().set_popup_content(key, content)
    }

    fn close_popup(&mut self, key: PopupKey) {
        self.lock().close_popup(key);
    }

    fn set_popup_z_index(&mut self, key: PopupKey, z_index: u64) {
        self.lock().set_popup_z_index(key, z_index);
    }

    fn subscribe_popup_interaction(&mut self, key: PopupKey) -> SubscriptionToken {
        self.lock().subscribe_popup_interaction(key)
    }

    fn subscribe_zoom(&mut self) -> SubscriptionToken {
        self.lock().subscribe_zoom()
    }

    fn unsubscribe(&mut self, token: SubscriptionToken) {
        self.lock().unsubscribe(token);
    }
}
