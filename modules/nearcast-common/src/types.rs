use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NearcastError;

// --- Geo ---

/// Mean Earth radius used for every distance in the system.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Maximum length of a post message, in Unicode code points.
pub const MAX_MESSAGE_CHARS: usize = 280;

/// Haversine great-circle distance between two lat/lng points in meters.
pub fn haversine_meters(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_METERS * c
}

/// True when the pair is a usable WGS84 coordinate.
pub fn is_valid_coordinate(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

// --- Posts ---

pub type PostId = i64;

/// A geo-tagged post as returned by the backend. Read-only to the map core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub user_id: i64,
    pub message: String,
    pub lat: f64,
    pub lng: f64,
    pub created_at: DateTime<Utc>,
    /// Meters from the viewer at fetch time.
    #[serde(default)]
    pub distance: f64,
}

impl Post {
    pub fn has_valid_coordinates(&self) -> bool {
        is_valid_coordinate(self.lat, self.lng)
    }

    pub fn message_chars(&self) -> usize {
        self.message.chars().count()
    }

    /// Reject posts the backend should never have sent. Coordinates are
    /// checked later, at reconcile time.
    pub fn validate(&self) -> Result<(), NearcastError> {
        let chars = self.message_chars();
        if chars > MAX_MESSAGE_CHARS {
            return Err(NearcastError::Validation(format!(
                "post {} message has {chars} chars, max {MAX_MESSAGE_CHARS}",
                self.id
            )));
        }
        Ok(())
    }

    /// Popup text bound to this post's marker.
    pub fn popup_text(&self) -> String {
        self.message.clone()
    }
}
