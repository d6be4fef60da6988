//! Popup visibility policy.
//!
//! Every pass re-derives the full set of popups that should be open from the
//! live markers and the current grouping, then diffs it against what is open:
//!
//! 1. the representative (earliest-created live marker) gets its own popup, or
//!    its cluster's aggregate popup if it is absorbed into one;
//! 2. every individually visible marker gets its own popup;
//! 3. every visible cluster gets one aggregate popup, keyed by its anchor.
//!
//! Popups already open are never reopened. Each open popup owns one
//! interaction subscription, released when the popup closes.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use nearcast_common::PostId;
use tracing::{debug, warn};

use crate::cluster::{ClusterMembership, VisibleGroup};
use crate::events::MapEvent;
use crate::reconcile::{Marker, MarkerReconciler};
use crate::surface::{PopupKey, PopupOptions, RenderSurface, SubscriptionToken};

// ---------------------------------------------------------------------------
// Selection state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionState {
    #[default]
    NoSelection,
    /// A representative exists but nothing could be shown for it.
    RepresentativeChosen { representative: PostId },
    ClusterAggregateOpen {
        representative: PostId,
        anchor: PostId,
        member_count: usize,
    },
    SoloOpen { representative: PostId },
}

impl SelectionState {
    pub fn representative(&self) -> Option<PostId> {
        match *self {
            SelectionState::NoSelection => None,
            SelectionState::RepresentativeChosen { representative }
            | SelectionState::ClusterAggregateOpen { representative, .. }
            | SelectionState::SoloOpen { representative } => Some(representative),
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate content
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateEntry {
    pub post_id: PostId,
    pub created_at: DateTime<Utc>,
    pub message: String,
}

/// Body of a cluster popup: the most recent member posts, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateBody {
    pub member_count: usize,
    pub entries: Vec<AggregateEntry>,
}

impl AggregateBody {
    /// Ties on `created_at` go to the higher id.
    pub fn from_markers<'a>(markers: impl IntoIterator<Item = &'a Marker>, limit: usize) -> Self {
        let mut entries: Vec<AggregateEntry> = markers
            .into_iter()
            .map(|m| AggregateEntry {
                post_id: m.id(),
                created_at: m.post().created_at,
                message: m.content().to_string(),
            })
            .collect();
        let member_count = entries.len();

        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.post_id.cmp(&a.post_id))
        });
        entries.truncate(limit);

        Self { member_count, entries }
    }
}

impl fmt::Display for AggregateBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} posts", self.member_count)?;
        for entry in &self.entries {
            write!(f, "\n- {}", entry.message)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Z-order
// ---------------------------------------------------------------------------

/// Monotonic z-index source. Values are never reused.
#[derive(Debug, Clone)]
pub struct ZOrder {
    next: u64,
}

impl ZOrder {
    pub fn new(base: u64) -> Self {
        Self { next: base }
    }

    pub fn bump(&mut self) -> u64 {
        let z = self.next;
        self.next = self.next.saturating_add(1);
        z
    }

    pub fn peek(&self) -> u64 {
        self.next
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct OpenPopup {
    lat: f64,
    lng: f64,
    z_index: u64,
    token: SubscriptionToken,
    /// Last content written, cluster popups only.
    content: Option<String>,
}

struct Wanted {
    key: PopupKey,
    lat: f64,
    lng: f64,
    body: Option<AggregateBody>,
}

pub struct PopupLifecycleManager {
    open: HashMap<PopupKey, OpenPopup>,
    selection: SelectionState,
    z_order: ZOrder,
    aggregate_limit: usize,
}

impl PopupLifecycleManager {
    pub fn new(aggregate_limit: usize, z_index_base: u64) -> Self {
        Self {
            open: HashMap::new(),
            selection: SelectionState::NoSelection,
            z_order: ZOrder::new(z_index_base),
            aggregate_limit,
        }
    }

    /// Re-derive visible popups and apply the difference to the surface.
    /// Returns an event for every popup that was newly opened.
    pub fn refresh<M, S>(
        &mut self,
        reconciler: &MarkerReconciler,
        membership: &M,
        surface: &mut S,
    ) -> Vec<MapEvent>
    where
        M: ClusterMembership,
        S: RenderSurface,
    {
        let live = reconciler.live_markers();
        let wanted = self.select(&live, reconciler, membership);

        let keep: HashSet<PopupKey> = wanted.iter().map(|w| w.key).collect();
        let stale: Vec<PopupKey> = self
            .open
            .keys()
            .filter(|k| !keep.contains(k))
            .copied()
            .collect();
        for key in stale {
            self.close(key, surface);
        }

        let mut events = Vec::new();
        for w in wanted {
            if let Some(event) = self.apply(w, surface) {
                events.push(event);
            }
        }
        events
    }

    /// Pointer interaction on a popup. Bumps it above every other popup if it
    /// is open; returns the new z-index.
    pub fn on_interaction<S: RenderSurface>(&mut self, key: PopupKey, surface: &mut S) -> Option<u64> {
        let popup = self.open.get_mut(&key)?;
        popup.z_index = self.z_order.bump();
        surface.set_popup_z_index(key, popup.z_index);
        debug!(popup = %key, z_index = popup.z_index, "Popup raised");
        Some(popup.z_index)
    }

    /// Forget popups whose markers the surface already removed. Their
    /// subscriptions are released without a close call.
    pub fn release_removed<S: RenderSurface>(&mut self, removed: &[PostId], surface: &mut S) {
        for id in removed {
            if let Some(popup) = self.open.remove(&PopupKey::Marker(*id)) {
                surface.unsubscribe(popup.token);
                debug!(post_id = id, "Released popup of removed marker");
            }
        }
    }

    /// Close everything and release every subscription.
    pub fn dispose<S: RenderSurface>(&mut self, surface: &mut S) {
        let keys: Vec<PopupKey> = self.open.keys().copied().collect();
        for key in keys {
            self.close(key, surface);
        }
        self.selection = SelectionState::NoSelection;
    }

    pub fn selection(&self) -> SelectionState {
        self.selection
    }

    pub fn is_open(&self, key: PopupKey) -> bool {
        self.open.contains_key(&key)
    }

    pub fn z_index_of(&self, key: PopupKey) -> Option<u64> {
        self.open.get(&key).map(|p| p.z_index)
    }

    /// Open popup keys, sorted.
    pub fn open_keys(&self) -> Vec<PopupKey> {
        let mut keys: Vec<PopupKey> = self.open.keys().copied().collect();
        keys.sort();
        keys
    }

    fn select<M: ClusterMembership>(
        &mut self,
        live: &[&Marker],
        reconciler: &MarkerReconciler,
        membership: &M,
    ) -> Vec<Wanted> {
        let mut wanted: Vec<Wanted> = Vec::new();
        let mut claimed: HashSet<PopupKey> = HashSet::new();

        let Some(representative) = live.first() else {
            self.selection = SelectionState::NoSelection;
            return wanted;
        };
        let rep_id = representative.id();
        self.selection = SelectionState::RepresentativeChosen { representative: rep_id };

        // Representative.
        match membership.visible_group_of(rep_id) {
            VisibleGroup::Cluster(node) => {
                let anchor = node.anchor();
                match self.aggregate_for(anchor, reconciler, membership) {
                    Some(body) => {
                        self.selection = SelectionState::ClusterAggregateOpen {
                            representative: rep_id,
                            anchor,
                            member_count: body.member_count,
                        };
                        claimed.insert(PopupKey::Cluster(anchor));
                        wanted.push(Wanted {
                            key: PopupKey::Cluster(anchor),
                            lat: node.lat,
                            lng: node.lng,
                            body: Some(body),
                        });
                    }
                    None => debug!(post_id = rep_id, anchor, "Representative cluster vanished"),
                }
            }
            VisibleGroup::Solo(_) => {
                self.selection = SelectionState::SoloOpen { representative: rep_id };
                claimed.insert(PopupKey::Marker(rep_id));
                wanted.push(Wanted {
                    key: PopupKey::Marker(rep_id),
                    lat: representative.lat(),
                    lng: representative.lng(),
                    body: None,
                });
            }
        }

        // Individually visible markers.
        for marker in live {
            let key = PopupKey::Marker(marker.id());
            if matches!(membership.visible_group_of(marker.id()), VisibleGroup::Solo(_))
                && claimed.insert(key)
            {
                wanted.push(Wanted {
                    key,
                    lat: marker.lat(),
                    lng: marker.lng(),
                    body: None,
                });
            }
        }

        // Every other visible cluster.
        for node in membership.visible_clusters() {
            let key = PopupKey::Cluster(node.anchor());
            if claimed.contains(&key) {
                continue;
            }
            if let Some(body) = self.aggregate_for(node.anchor(), reconciler, membership) {
                claimed.insert(key);
                wanted.push(Wanted {
                    key,
                    lat: node.lat,
                    lng: node.lng,
                    body: Some(body),
                });
            }
        }

        wanted
    }

    fn aggregate_for<M: ClusterMembership>(
        &self,
        anchor: PostId,
        reconciler: &MarkerReconciler,
        membership: &M,
    ) -> Option<AggregateBody> {
        let members = membership.all_members_of(anchor)?;
        let markers: Vec<&Marker> = members.iter().filter_map(|id| reconciler.get(*id)).collect();
        if markers.len() < 2 {
            return None;
        }
        Some(AggregateBody::from_markers(markers, self.aggregate_limit))
    }

    fn apply<S: RenderSurface>(&mut self, wanted: Wanted, surface: &mut S) -> Option<MapEvent> {
        let Wanted { key, lat, lng, body } = wanted;
        let content = body.as_ref().map(|b| b.to_string());

        if let Some(popup) = self.open.get_mut(&key) {
            // Cluster centres shift as members come and go under the same anchor.
            if popup.lat != lat || popup.lng != lng {
                surface.move_popup(key, lat, lng);
                popup.lat = lat;
                popup.lng = lng;
                debug!(popup = %key, lat, lng, "Popup moved");
            }
            if let Some(content) = content {
                if popup.content.as_deref() != Some(content.as_str()) {
                    match surface.set_popup_content(key, &content) {
                        Ok(()) => popup.content = Some(content),
                        Err(e) => warn!(popup = %key, error = %e, "Failed to update popup content"),
                    }
                }
            }
            return None;
        }

        if let Err(e) = surface.open_popup(key, lat, lng, PopupOptions { auto_pan: false }) {
            warn!(popup = %key, error = %e, "Popup surface unavailable, nothing shown");
            return None;
        }
        if let Some(content) = &content {
            if let Err(e) = surface.set_popup_content(key, content) {
                warn!(popup = %key, error = %e, "Popup surface lost its content, closing");
                surface.close_popup(key);
                return None;
            }
        }

        let z_index = self.z_order.bump();
        surface.set_popup_z_index(key, z_index);
        let token = surface.subscribe_popup_interaction(key);
        self.open.insert(
            key,
            OpenPopup {
                lat,
                lng,
                z_index,
                token,
                content,
            },
        );
        debug!(popup = %key, z_index, "Popup opened");

        Some(match body {
            Some(body) => MapEvent::ClusterOpened { member_count: body.member_count },
            None => MapEvent::MarkerOpened { post_id: key.post_id() },
        })
    }

    fn close<S: RenderSurface>(&mut self, key: PopupKey, surface: &mut S) {
        if let Some(popup) = self.open.remove(&key) {
            surface.unsubscribe(popup.token);
            surface.close_popup(key);
            debug!(popup = %key, "Popup closed");
        }
    }
}
