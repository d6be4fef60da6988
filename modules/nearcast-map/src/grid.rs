//! Greedy grid clustering in projected pixel space.
//!
//! Points are visited in creation order. Each point joins the nearest existing
//! group whose anchor lies strictly within `radius_px`, or starts a new group.
//! Anchors are bucketed in a grid of `radius_px` cells so only the 3x3
//! neighbourhood is searched.

use std::collections::HashMap;

use nearcast_common::file_config::ClusteringConfig;
use nearcast_common::PostId;

use crate::cluster::{ClusterPoint, Clusterer};
use crate::projection::{project, ScreenPoint, ZoomContext};

#[derive(Debug, Clone)]
pub struct GridClusterer {
    radius_px: f64,
    tile_size: f64,
}

impl GridClusterer {
    pub fn new(radius_px: f64, tile_size: f64) -> Self {
        Self { radius_px, tile_size }
    }

    pub fn from_config(config: &ClusteringConfig) -> Self {
        Self::new(config.radius_px, config.tile_size)
    }

    fn cell_of(&self, p: &ScreenPoint) -> (i64, i64) {
        (
            (p.x / self.radius_px).floor() as i64,
            (p.y / self.radius_px).floor() as i64,
        )
    }
}

impl Default for GridClusterer {
    fn default() -> Self {
        Self::from_config(&ClusteringConfig::default())
    }
}

struct Group {
    anchor: ScreenPoint,
    members: Vec<PostId>,
}

impl Clusterer for GridClusterer {
    fn group(&self, points: &[ClusterPoint], zoom: &ZoomContext) -> Vec<Vec<PostId>> {
        if self.radius_px.is_nan() || self.radius_px <= 0.0 {
            return points.iter().map(|p| vec![p.id]).collect();
        }

        let mut groups: Vec<Group> = Vec::new();
        let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();

        for point in points {
            let at = project(point.lat, point.lng, zoom.zoom, self.tile_size);
            let (cx, cy) = self.cell_of(&at);

            // Nearest anchor wins; on a tie, the older group.
            let mut best: Option<(f64, usize)> = None;
            for dx in -1..=1 {
                for dy in -1..=1 {
                    let Some(candidates) = grid.get(&(cx + dx, cy + dy)) else {
                        continue;
                    };
                    for &gi in candidates {
                        let d = groups[gi].anchor.distance_to(&at);
                        if d >= self.radius_px {
                            continue;
                        }
                        let better = match best {
                            None => true,
                            Some((bd, bi)) => d < bd || (d == bd && gi < bi),
                        };
                        if better {
                            best = Some((d, gi));
                        }
                    }
                }
            }

            match best {
                Some((_, gi)) => groups[gi].members.push(point.id),
                None => {
                    grid.entry((cx, cy)).or_default().push(groups.len());
                    groups.push(Group {
                        anchor: at,
                        members: vec![point.id],
                    });
                }
            }
        }

        groups.into_iter().map(|g| g.members).collect()
    }
}
