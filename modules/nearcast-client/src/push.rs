//! Out-of-band "a post was created" notifications.
//!
//! Any transport (websocket, SSE, a test) publishes into the hub; the driver
//! only cares that a signal arrived and refetches. Payloads are carried for
//! logging but never interpreted.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushSignal {
    PostCreated {
        #[serde(default)]
        payload: serde_json::Value,
    },
}

#[derive(Clone)]
pub struct PushHub {
    tx: broadcast::Sender<PushSignal>,
}

impl PushHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a signal. Returns how many subscribers received it.
    pub fn notify(&self, signal: PushSignal) -> usize {
        self.tx.send(signal).unwrap_or(0)
    }

    pub fn post_created(&self, payload: serde_json::Value) -> usize {
        self.notify(PushSignal::PostCreated { payload })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushSignal> {
        self.tx.subscribe()
    }
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new()
    }
}
