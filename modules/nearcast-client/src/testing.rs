// Scripted PostFetcher for driver tests.
//
// Responses are handed out in call order, each after its own simulated
// latency, so tests can force fetches to complete out of order.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use nearcast_common::{NearcastError, Post};

use crate::fetcher::PostFetcher;

#[derive(Debug, Clone, PartialEq)]
pub struct FetchCall {
    pub lat: f64,
    pub lng: f64,
    pub radius_meters: f64,
}

/// Returns `Err` once the script runs out.
#[derive(Default)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<(Duration, Result<Vec<Post>, String>)>>,
    calls: Mutex<Vec<FetchCall>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, after: Duration, posts: Vec<Post>) -> Self {
        self.push(after, Ok(posts))
    }

    pub fn fail(self, after: Duration, message: &str) -> Self {
        self.push(after, Err(message.to_string()))
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn push(self, after: Duration, response: Result<Vec<Post>, String>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back((after, response));
        }
        self
    }
}

#[async_trait]
impl PostFetcher for ScriptedFetcher {
    async fn fetch_posts_near(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: f64,
    ) -> Result<Vec<Post>, NearcastError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(FetchCall { lat, lng, radius_meters });
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let Some((after, response)) = next else {
            return Err(NearcastError::Fetch("no scripted response".to_string()));
        };

        tokio::time::sleep(after).await;
        response.map_err(NearcastError::Fetch)
    }
}
