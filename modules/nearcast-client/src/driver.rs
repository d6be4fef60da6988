//! Event loop tying viewer input, the motion gate, fetches and the map
//! together.
//!
//! Everything that touches the map runs on this loop, one event at a time.
//! The only concurrent work is the fetches themselves, which complete in any
//! order; the request sequence decides which results are still fresh.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use nearcast_common::file_config::{FetchConfig, MotionConfig};
use nearcast_common::{NearcastError, Post};
use nearcast_map::{GateDecision, GeoMotionGate, MapFeed, PopupKey, RenderSurface, ZoomContext};

use crate::fetcher::PostFetcher;
use crate::push::PushSignal;
use crate::sequence::RequestSequence;

/// Input from whoever owns the viewport.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerCommand {
    /// The viewer's position changed.
    Move { lat: f64, lng: f64 },
    Zoom(f64),
    /// Pointer interaction with an open popup.
    Touch(PopupKey),
    /// Fetch now around the last accepted position.
    Refresh,
    Shutdown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub moves_suppressed: u64,
    pub fetches_issued: u64,
    pub fetches_applied: u64,
    /// Completed after a newer fetch was already applied.
    pub fetches_stale: u64,
    pub fetches_failed: u64,
    pub push_signals: u64,
}

struct FetchOutcome {
    seq: u64,
    result: Result<Vec<Post>, NearcastError>,
}

#[derive(TypedBuilder)]
pub struct FeedDriver<S, F>
where
    S: RenderSurface,
    F: PostFetcher,
{
    feed: MapFeed<S>,
    fetcher: Arc<F>,
    #[builder(default)]
    motion: MotionConfig,
    #[builder(default)]
    fetch: FetchConfig,
    #[builder(default, setter(skip))]
    gate: GeoMotionGate,
    #[builder(default, setter(skip))]
    sequence: RequestSequence,
    #[builder(default, setter(skip))]
    stats: DriverStats,
}

impl<S, F> FeedDriver<S, F>
where
    S: RenderSurface,
    F: PostFetcher + 'static,
{
    /// Process input until `Shutdown` or until the command channel closes,
    /// then dispose the map. Fetches still in flight are dropped.
    pub async fn run(
        &mut self,
        mut commands: mpsc::Receiver<ViewerCommand>,
        mut push: broadcast::Receiver<PushSignal>,
    ) -> DriverStats {
        let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel::<()>();
        let mut in_flight: FuturesUnordered<BoxFuture<'static, FetchOutcome>> = FuturesUnordered::new();
        let mut push_open = true;

        info!("Feed driver started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(ViewerCommand::Shutdown) => break,
                    Some(ViewerCommand::Move { lat, lng }) => self.on_move(lat, lng, &refresh_tx),
                    Some(ViewerCommand::Zoom(zoom)) => self.feed.on_zoom_changed(ZoomContext::new(zoom)),
                    Some(ViewerCommand::Touch(key)) => {
                        if self.feed.on_popup_interaction(key).is_none() {
                            debug!(popup = %key, "Interaction with closed popup ignored");
                        }
                    }
                    Some(ViewerCommand::Refresh) => self.issue_fetch(&in_flight),
                },
                Some(()) = refresh_rx.recv() => self.issue_fetch(&in_flight),
                signal = push.recv(), if push_open => match signal {
                    Ok(PushSignal::PostCreated { payload }) => {
                        debug!(%payload, "Post created upstream");
                        self.stats.push_signals += 1;
                        self.issue_fetch(&in_flight);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Push receiver lagged, refetching once");
                        self.stats.push_signals += 1;
                        self.issue_fetch(&in_flight);
                    }
                    Err(RecvError::Closed) => {
                        debug!("Push channel closed");
                        push_open = false;
                    }
                },
                Some(outcome) = in_flight.next(), if !in_flight.is_empty() => self.apply(outcome),
            }
        }

        self.shutdown();
        info!(stats = ?self.stats, "Feed driver stopped");
        self.stats.clone()
    }

    /// Cancel the pending refresh and dispose the map.
    pub fn shutdown(&mut self) {
        self.gate.reset();
        self.feed.dispose();
    }

    pub fn feed(&self) -> &MapFeed<S> {
        &self.feed
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    fn on_move(&mut self, lat: f64, lng: f64, refresh_tx: &mpsc::UnboundedSender<()>) {
        let tx = refresh_tx.clone();
        let decision = self.gate.evaluate(
            lat,
            lng,
            move || {
                let _ = tx.send(());
            },
            self.motion.threshold_meters,
            self.motion.debounce(),
        );
        if decision == GateDecision::Suppressed {
            self.stats.moves_suppressed += 1;
        }
    }

    fn issue_fetch(&mut self, in_flight: &FuturesUnordered<BoxFuture<'static, FetchOutcome>>) {
        let Some(sample) = self.gate.last_sample() else {
            debug!("No viewer position yet, fetch skipped");
            return;
        };

        let seq = self.sequence.issue();
        self.stats.fetches_issued += 1;
        let fetcher = Arc::clone(&self.fetcher);
        let radius = self.fetch.radius_meters;
        debug!(seq, lat = sample.lat, lng = sample.lng, radius, "Fetch issued");

        in_flight.push(
            async move {
                let result = fetcher.fetch_posts_near(sample.lat, sample.lng, radius).await;
                FetchOutcome { seq, result }
            }
            .boxed(),
        );
    }

    fn apply(&mut self, outcome: FetchOutcome) {
        let FetchOutcome { seq, result } = outcome;
        match result {
            Ok(posts) => {
                if !self.sequence.try_apply(seq) {
                    debug!(
                        seq,
                        latest_issued = self.sequence.latest_issued(),
                        latest_applied = ?self.sequence.latest_applied(),
                        "Stale fetch discarded"
                    );
                    self.stats.fetches_stale += 1;
                    return;
                }
                let stats = self.feed.reconcile_and_render(&posts);
                self.stats.fetches_applied += 1;
                info!(
                    seq,
                    posts = posts.len(),
                    created = stats.created,
                    removed = stats.removed,
                    "Feed updated"
                );
            }
            Err(e) => {
                self.stats.fetches_failed += 1;
                warn!(seq, error = %e, "Fetch failed, keeping current markers");
            }
        }
    }
}
