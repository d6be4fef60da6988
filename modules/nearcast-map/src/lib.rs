//! Map-side core of the nearby feed.
//!
//! Turns successive post lists into a stable set of markers, clusters them in
//! screen space for the current zoom, and decides which popups are open.
//! Everything here is synchronous except the motion gate's debounce timer.
//!
//! The render layer is reached only through [`RenderSurface`]; the clustering
//! algorithm only through [`Clusterer`].

pub mod cluster;
pub mod engine;
pub mod events;
pub mod grid;
pub mod motion;
pub mod popup;
pub mod projection;
pub mod reconcile;
pub mod surface;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use cluster::{ClusterIndex, ClusterMembership, ClusterNode, ClusterPoint, Clusterer, VisibleGroup};
pub use engine::MapFeed;
pub use events::MapEvent;
pub use grid::GridClusterer;
pub use motion::{GateDecision, GeoMotionGate, ViewerMotionSample};
pub use popup::{AggregateBody, AggregateEntry, PopupLifecycleManager, SelectionState, ZOrder};
pub use projection::{project, ScreenPoint, ZoomContext};
pub use reconcile::{Marker, MarkerReconciler, ReconcileStats};
pub use surface::{PopupKey, PopupOptions, RenderSurface, SubscriptionToken, SurfaceError};
