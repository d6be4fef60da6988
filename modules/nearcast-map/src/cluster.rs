//! Screen-space clustering over the live marker set.
//!
//! `ClusterIndex` owns the indexed points and the groups computed for the
//! current zoom. The grouping algorithm sits behind [`Clusterer`]; consumers
//! that only need to ask "what is this marker shown as" go through the narrow
//! [`ClusterMembership`] view.

use std::collections::{HashMap, HashSet};

use nearcast_common::PostId;
use tracing::debug;

use crate::projection::ZoomContext;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A marker as the clusterer sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterPoint {
    pub id: PostId,
    pub lat: f64,
    pub lng: f64,
    /// Marker creation sequence. Points are grouped in this order.
    pub order: u64,
}

/// One visual group at the current zoom. Members are in creation order, so
/// the first member is the group's anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterNode {
    members: Vec<PostId>,
    pub lat: f64,
    pub lng: f64,
}

impl ClusterNode {
    fn from_points(points: &[&ClusterPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        Some(Self {
            members: points.iter().map(|p| p.id).collect(),
            lat: points.iter().map(|p| p.lat).sum::<f64>() / n,
            lng: points.iter().map(|p| p.lng).sum::<f64>() / n,
        })
    }

    pub fn anchor(&self) -> PostId {
        self.members[0]
    }

    pub fn members(&self) -> &[PostId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Nodes are never empty; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// True for a real cluster (two or more members).
    pub fn is_cluster(&self) -> bool {
        self.members.len() >= 2
    }
}

/// How a marker is currently shown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VisibleGroup<'a> {
    /// Shown on its own.
    Solo(PostId),
    /// Absorbed into a cluster of two or more.
    Cluster(&'a ClusterNode),
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// A clustering algorithm. Given points in creation order, returns groups of
/// ids; every point must appear in exactly one group.
pub trait Clusterer {
    fn group(&self, points: &[ClusterPoint], zoom: &ZoomContext) -> Vec<Vec<PostId>>;
}

/// Read-only membership queries, the only view the popup policy gets.
pub trait ClusterMembership {
    /// The cluster containing `id` if it has two or more members, otherwise
    /// the marker itself.
    fn visible_group_of(&self, id: PostId) -> VisibleGroup<'_>;

    /// Members of the cluster anchored at `anchor`, or `None` if no such
    /// cluster exists any more.
    fn all_members_of(&self, anchor: PostId) -> Option<&[PostId]>;

    /// Every current cluster with two or more members.
    fn visible_clusters(&self) -> Vec<&ClusterNode>;
}

// ---------------------------------------------------------------------------
// ClusterIndex
// ---------------------------------------------------------------------------

pub struct ClusterIndex<C: Clusterer> {
    clusterer: C,
    points: HashMap<PostId, ClusterPoint>,
    zoom: Option<ZoomContext>,
    nodes: Vec<ClusterNode>,
    node_of: HashMap<PostId, usize>,
    dirty: bool,
}

impl<C: Clusterer> ClusterIndex<C> {
    pub fn new(clusterer: C) -> Self {
        Self {
            clusterer,
            points: HashMap::new(),
            zoom: None,
            nodes: Vec::new(),
            node_of: HashMap::new(),
            dirty: true,
        }
    }

    /// Add or reposition a single point.
    pub fn attach(&mut self, point: ClusterPoint) {
        if self.points.insert(point.id, point) != Some(point) {
            self.dirty = true;
        }
    }

    pub fn detach(&mut self, id: PostId) {
        if self.points.remove(&id).is_some() {
            self.dirty = true;
        }
    }

    /// Replace the whole point set.
    pub fn rebuild(&mut self, points: impl IntoIterator<Item = ClusterPoint>) {
        self.points = points.into_iter().map(|p| (p.id, p)).collect();
        self.dirty = true;
    }

    /// Group the indexed points for `zoom`. Recomputes only when the point set
    /// or the zoom changed since the last call.
    pub fn clusters_for_zoom(&mut self, zoom: ZoomContext) -> &[ClusterNode] {
        if self.dirty || self.zoom != Some(zoom) {
            self.recompute(zoom);
        }
        &self.nodes
    }

    /// Groups from the last `clusters_for_zoom` call.
    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn contains(&self, id: PostId) -> bool {
        self.points.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.nodes.clear();
        self.node_of.clear();
        self.dirty = true;
    }

    fn recompute(&mut self, zoom: ZoomContext) {
        let mut ordered: Vec<ClusterPoint> = self.points.values().copied().collect();
        ordered.sort_by_key(|p| (p.order, p.id));

        let groups = self.clusterer.group(&ordered, &zoom);

        self.nodes.clear();
        self.node_of.clear();
        let mut seen: HashSet<PostId> = HashSet::new();
        for group in groups {
            // First group to claim an id keeps it; unknown ids are dropped.
            let mut members: Vec<&ClusterPoint> = group
                .iter()
                .filter(|id| seen.insert(**id))
                .filter_map(|id| self.points.get(id))
                .collect();
            members.sort_by_key(|p| (p.order, p.id));

            let Some(node) = ClusterNode::from_points(&members) else {
                continue;
            };
            let idx = self.nodes.len();
            for id in node.members() {
                self.node_of.insert(*id, idx);
            }
            self.nodes.push(node);
        }

        // Points the clusterer left out are shown on their own.
        for p in ordered.iter().filter(|p| !seen.contains(&p.id)) {
            self.node_of.insert(p.id, self.nodes.len());
            self.nodes.push(ClusterNode {
                members: vec![p.id],
                lat: p.lat,
                lng: p.lng,
            });
        }

        self.zoom = Some(zoom);
        self.dirty = false;
        debug!(
            zoom = zoom.zoom,
            points = self.points.len(),
            groups = self.nodes.len(),
            clusters = self.nodes.iter().filter(|n| n.is_cluster()).count(),
            "Clusters recomputed"
        );
    }
}

impl<C: Clusterer> ClusterMembership for ClusterIndex<C> {
    fn visible_group_of(&self, id: PostId) -> VisibleGroup<'_> {
        match self.node_of.get(&id).map(|&i| &self.nodes[i]) {
            Some(node) if node.is_cluster() => VisibleGroup::Cluster(node),
            _ => VisibleGroup::Solo(id),
        }
    }

    fn all_members_of(&self, anchor: PostId) -> Option<&[PostId]> {
        let node = &self.nodes[*self.node_of.get(&anchor)?];
        (node.anchor() == anchor).then(|| node.members())
    }

    fn visible_clusters(&self) -> Vec<&ClusterNode> {
        self.nodes.iter().filter(|n| n.is_cluster()).collect()
    }
}
