//! Post list → marker table diffing.
//!
//! Markers are created once per post id and then only mutated in place, so
//! anything attached to a surviving marker (its open popup in particular) is
//! left alone across fetches.

use std::collections::{HashMap, HashSet};

use nearcast_common::{Post, PostId};
use tracing::{debug, warn};

use crate::cluster::{ClusterIndex, ClusterPoint, Clusterer};
use crate::surface::RenderSurface;

/// A rendered post. Owned by [`MarkerReconciler`].
#[derive(Debug, Clone)]
pub struct Marker {
    post: Post,
    content: String,
    created_seq: u64,
}

impl Marker {
    pub fn id(&self) -> PostId {
        self.post.id
    }

    /// The post this marker was last reconciled against.
    pub fn post(&self) -> &Post {
        &self.post
    }

    /// Content currently bound to the marker's popup.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_seq(&self) -> u64 {
        self.created_seq
    }

    pub fn lat(&self) -> f64 {
        self.post.lat
    }

    pub fn lng(&self) -> f64 {
        self.post.lng
    }

    fn cluster_point(&self) -> ClusterPoint {
        ClusterPoint {
            id: self.post.id,
            lat: self.post.lat,
            lng: self.post.lng,
            order: self.created_seq,
        }
    }
}

/// Counters for one reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub moved: usize,
    pub content_writes: usize,
    pub removed: usize,
    /// Posts not materialized: bad coordinates or a repeated id.
    pub skipped: usize,
    pub removed_ids: Vec<PostId>,
}

#[derive(Default)]
pub struct MarkerReconciler {
    markers: HashMap<PostId, Marker>,
    next_seq: u64,
}

impl MarkerReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the marker table in line with `posts`.
    ///
    /// New ids are created and attached to the surface and the index; known
    /// ids are moved if their coordinates changed and get a content write only
    /// when the text differs; missing ids are detached and dropped.
    pub fn reconcile<S, C>(
        &mut self,
        posts: &[Post],
        index: &mut ClusterIndex<C>,
        surface: &mut S,
    ) -> ReconcileStats
    where
        S: RenderSurface,
        C: Clusterer,
    {
        let mut stats = ReconcileStats::default();
        let mut incoming: HashSet<PostId> = HashSet::with_capacity(posts.len());

        for post in posts {
            if !post.has_valid_coordinates() {
                warn!(post_id = post.id, lat = post.lat, lng = post.lng, "Skipping post with invalid coordinates");
                stats.skipped += 1;
                continue;
            }
            if !incoming.insert(post.id) {
                warn!(post_id = post.id, "Skipping repeated post id in fetch result");
                stats.skipped += 1;
                continue;
            }

            match self.markers.get_mut(&post.id) {
                None => {
                    let marker = Marker {
                        post: post.clone(),
                        content: post.popup_text(),
                        created_seq: self.next_seq,
                    };
                    self.next_seq += 1;

                    surface.add_marker(marker.id(), marker.lat(), marker.lng(), &marker.content);
                    index.attach(marker.cluster_point());
                    debug!(post_id = post.id, "Marker created");
                    self.markers.insert(post.id, marker);
                    stats.created += 1;
                }
                Some(marker) => {
                    if marker.post.lat != post.lat || marker.post.lng != post.lng {
                        surface.move_marker(post.id, post.lat, post.lng);
                        stats.moved += 1;
                    }

                    let content = post.popup_text();
                    if content != marker.content {
                        surface.set_marker_content(post.id, &content);
                        marker.content = content;
                        stats.content_writes += 1;
                    }

                    marker.post = post.clone();
                    index.attach(marker.cluster_point());
                }
            }
        }

        let stale: Vec<PostId> = self
            .markers
            .keys()
            .filter(|id| !incoming.contains(id))
            .copied()
            .collect();
        for id in stale {
            surface.remove_marker(id);
            index.detach(id);
            self.markers.remove(&id);
            debug!(post_id = id, "Marker removed");
            stats.removed += 1;
            stats.removed_ids.push(id);
        }

        debug!(
            created = stats.created,
            moved = stats.moved,
            content_writes = stats.content_writes,
            removed = stats.removed,
            skipped = stats.skipped,
            live = self.markers.len(),
            "Reconcile pass complete"
        );
        stats
    }

    /// Live markers, earliest-created first.
    pub fn live_markers(&self) -> Vec<&Marker> {
        let mut live: Vec<&Marker> = self.markers.values().collect();
        live.sort_by_key(|m| m.created_seq);
        live
    }

    pub fn get(&self, id: PostId) -> Option<&Marker> {
        self.markers.get(&id)
    }

    pub fn ids(&self) -> HashSet<PostId> {
        self.markers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Remove every marker from the surface and empty the table.
    pub fn clear<S: RenderSurface>(&mut self, surface: &mut S) {
        for id in self.markers.keys() {
            surface.remove_marker(*id);
        }
        self.markers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridClusterer;
    use crate::testing::{post, RecordingSurface, SurfaceCall};

    fn setup() -> (MarkerReconciler, ClusterIndex<GridClusterer>, RecordingSurface) {
        (
            MarkerReconciler::new(),
            ClusterIndex::new(GridClusterer::default()),
            RecordingSurface::new(),
        )
    }

    #[test]
    fn table_tracks_latest_post_ids() {
        let (mut rec, mut idx, mut surface) = setup();

        rec.reconcile(&[post(1, 35.68, 139.76), post(2, 35.69, 139.77)], &mut idx, &mut surface);
        assert_eq!(rec.ids(), HashSet::from([1, 2]));

        rec.reconcile(&[post(2, 35.69, 139.77), post(3, 35.70, 139.78)], &mut idx, &mut surface);
        assert_eq!(rec.ids(), HashSet::from([2, 3]));
        assert!(!idx.contains(1));
        assert!(idx.contains(3));

        rec.reconcile(&[], &mut idx, &mut surface);
        assert!(rec.is_empty());
        assert!(idx.is_empty());
    }

    #[test]
    fn identical_list_produces_no_writes() {
        let (mut rec, mut idx, mut surface) = setup();
        let posts = [post(1, 35.68, 139.76), post(2, 35.69, 139.77)];

        rec.reconcile(&posts, &mut idx, &mut surface);
        surface.clear_calls();

        let stats = rec.reconcile(&posts, &mut idx, &mut surface);
        assert_eq!(stats.content_writes, 0);
        assert_eq!(stats.created, 0);
        assert_eq!(stats.moved, 0);
        assert!(surface.calls().is_empty(), "got {:?}", surface.calls());
    }

    #[test]
    fn changed_message_is_updated_in_place() {
        let (mut rec, mut idx, mut surface) = setup();
        rec.reconcile(&[post(1, 35.68, 139.76)], &mut idx, &mut surface);
        surface.clear_calls();

        let mut updated = post(1, 35.68, 139.76);
        updated.message = "updated".to_string();
        let stats = rec.reconcile(&[updated], &mut idx, &mut surface);

        assert_eq!(stats.content_writes, 1);
        assert_eq!(rec.get(1).unwrap().content(), "updated");
        assert_eq!(
            surface.calls(),
            &[SurfaceCall::SetMarkerContent { id: 1, content: "updated".to_string() }]
        );
    }

    #[test]
    fn moved_post_keeps_its_marker() {
        let (mut rec, mut idx, mut surface) = setup();
        rec.reconcile(&[post(1, 35.68, 139.76)], &mut idx, &mut surface);
        let seq = rec.get(1).unwrap().created_seq();
        surface.clear_calls();

        let stats = rec.reconcile(&[post(1, 35.70, 139.80)], &mut idx, &mut surface);
        assert_eq!(stats.moved, 1);
        assert_eq!(stats.created, 0);
        assert_eq!(rec.get(1).unwrap().created_seq(), seq);
        assert_eq!(surface.calls(), &[SurfaceCall::MoveMarker { id: 1, lat: 35.70, lng: 139.80 }]);
    }

    #[test]
    fn invalid_coordinates_are_not_materialized() {
        let (mut rec, mut idx, mut surface) = setup();
        let stats = rec.reconcile(
            &[post(1, f64::NAN, 139.76), post(2, 35.68, 139.76)],
            &mut idx,
            &mut surface,
        );
        assert_eq!(stats.skipped, 1);
        assert_eq!(rec.ids(), HashSet::from([2]));
    }

    #[test]
    fn repeated_id_keeps_first_occurrence() {
        let (mut rec, mut idx, mut surface) = setup();
        let mut dup = post(1, 35.68, 139.76);
        dup.message = "second".to_string();

        let stats = rec.reconcile(&[post(1, 35.68, 139.76), dup], &mut idx, &mut surface);
        assert_eq!(stats.skipped, 1);
        assert_eq!(rec.len(), 1);
        assert_ne!(rec.get(1).unwrap().content(), "second");
    }

    #[test]
    fn live_markers_are_in_creation_order() {
        let (mut rec, mut idx, mut surface) = setup();
        rec.reconcile(&[post(5, 35.68, 139.76)], &mut idx, &mut surface);
        // Upstream order flips; creation order must not.
        rec.reconcile(&[post(9, 35.69, 139.77), post(5, 35.68, 139.76)], &mut idx, &mut surface);

        let ids: Vec<PostId> = rec.live_markers().iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec![5, 9]);
    }

    #[test]
    fn readded_id_is_a_new_marker() {
        let (mut rec, mut idx, mut surface) = setup();
        rec.reconcile(&[post(1, 35.68, 139.76)], &mut idx, &mut surface);
        let first = rec.get(1).unwrap().created_seq();
        rec.reconcile(&[], &mut idx, &mut surface);
        rec.reconcile(&[post(1, 35.68, 139.76)], &mut idx, &mut surface);
        assert!(rec.get(1).unwrap().created_seq() > first);
    }

    #[test]
    fn clear_detaches_everything() {
        let (mut rec, mut idx, mut surface) = setup();
        rec.reconcile(&[post(1, 35.68, 139.76), post(2, 35.69, 139.77)], &mut idx, &mut surface);
        rec.clear(&mut surface);
        assert!(rec.is_empty());
        assert!(surface.marker_ids().is_empty());
    }
}
