// Post fetching behind one trait.
//
// PostFetcher is the only way the driver reaches the backend, so tests can
// swap in a scripted fetcher with controlled latency.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use nearcast_common::file_config::FetchConfig;
use nearcast_common::{Config, NearcastError, Post};

#[async_trait]
pub trait PostFetcher: Send + Sync {
    /// Posts within `radius_meters` of the given point.
    async fn fetch_posts_near(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: f64,
    ) -> Result<Vec<Post>, NearcastError>;
}

#[async_trait]
impl<T: PostFetcher + ?Sized> PostFetcher for Arc<T> {
    async fn fetch_posts_near(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: f64,
    ) -> Result<Vec<Post>, NearcastError> {
        (**self).fetch_posts_near(lat, lng, radius_meters).await
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// `GET {api}/posts/nearby?lat=..&lng=..&radius=..`, JSON array of posts.
pub struct HttpPostFetcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPostFetcher {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, NearcastError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NearcastError::Fetch(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &Config, fetch: &FetchConfig) -> Result<Self, NearcastError> {
        Self::new(
            &config.api_url,
            config.api_token.clone(),
            Duration::from_secs(fetch.timeout_secs),
        )
    }

    pub fn nearby_url(&self) -> String {
        format!("{}/posts/nearby", self.base_url)
    }
}

#[async_trait]
impl PostFetcher for HttpPostFetcher {
    async fn fetch_posts_near(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: f64,
    ) -> Result<Vec<Post>, NearcastError> {
        let mut request = self
            .client
            .get(self.nearby_url())
            .query(&[("lat", lat), ("lng", lng), ("radius", radius_meters)]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| NearcastError::Fetch(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NearcastError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let entries: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| NearcastError::Fetch(format!("Invalid posts payload: {e}")))?;
        let posts = parse_posts(entries);
        debug!(lat, lng, radius_meters, count = posts.len(), "Fetched nearby posts");
        Ok(posts)
    }
}

/// Decode each entry on its own. Entries that fail to decode or validate are
/// logged and left out; the rest of the response still applies.
pub fn parse_posts(entries: Vec<Value>) -> Vec<Post> {
    let total = entries.len();
    let posts: Vec<Post> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let id = entry.get("id").cloned();
            let decoded = serde_json::from_value::<Post>(entry)
                .map_err(|e| NearcastError::Validation(e.to_string()))
                .and_then(|post| post.validate().map(|()| post));
            match decoded {
                Ok(post) => Some(post),
                Err(e) => {
                    warn!(index, id = ?id, error = %e, "Skipping malformed post");
                    None
                }
            }
        })
        .collect();
    if posts.len() < total {
        debug!(total, kept = posts.len(), "Dropped malformed posts from payload");
    }
    posts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use nearcast_common::file_config::PopupConfig;
    use nearcast_common::MAX_MESSAGE_CHARS;
    use nearcast_map::testing::RecordingSurface;
    use nearcast_map::{GridClusterer, MapFeed, ZoomContext};

    fn entry(id: i64) -> Value {
        json!({
            "id": id,
            "userId": 1,
            "message": format!("post {id}"),
            "lat": 35.68,
            "lng": 139.76,
            "createdAt": "2024-05-01T12:00:00Z"
        })
    }

    #[test]
    fn malformed_entry_is_skipped_and_the_rest_applies() {
        let mut missing_lat = entry(2);
        missing_lat.as_object_mut().unwrap().remove("lat");

        let posts = parse_posts(vec![entry(1), missing_lat]);
        assert_eq!(posts.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1]);

        let mut feed = MapFeed::new(
            RecordingSurface::new(),
            GridClusterer::default(),
            ZoomContext::new(12.0),
            &PopupConfig::default(),
        );
        let stats = feed.reconcile_and_render(&posts);
        assert_eq!(stats.created, 1);
        assert_eq!(feed.marker_ids(), vec![1]);
    }

    #[test]
    fn overlong_message_is_skipped() {
        let mut long = entry(2);
        long["message"] = json!("x".repeat(MAX_MESSAGE_CHARS + 1));
        let posts = parse_posts(vec![entry(1), long, json!("not an object")]);
        assert_eq!(posts.len(), 1);
    }

    #[test]
    fn nearby_url_ignores_trailing_slash() {
        let fetcher = HttpPostFetcher::new("http://localhost:3000/api/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(fetcher.nearby_url(), "http://localhost:3000/api/posts/nearby");
    }

    #[test]
    fn from_config_uses_token_and_url() {
        let config = Config {
            api_url: "https://nearcast.test".to_string(),
            api_token: Some("secret".to_string()),
            config_path: None,
        };
        let fetcher = HttpPostFetcher::from_config(&config, &FetchConfig::default()).unwrap();
        assert_eq!(fetcher.nearby_url(), "https://nearcast.test/posts/nearby");
        assert_eq!(fetcher.token.as_deref(), Some("secret"));
    }
}
