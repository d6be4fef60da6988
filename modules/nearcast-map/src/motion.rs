//! Distance gate + debounce in front of the fetch pipeline.
//!
//! A viewer position only counts once it is at least `threshold_meters` from
//! the last accepted one. Each accepted position (re)arms a single timer; the
//! trigger fires once the viewer has been quiet for the debounce period.

use std::time::Duration;

use nearcast_common::{haversine_meters, is_valid_coordinate};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// The last position that passed the gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewerMotionSample {
    pub lat: f64,
    pub lng: f64,
    /// Count of accepted samples since construction; never reused.
    pub timestamp_logical: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Sample stored and a fresh debounce timer armed.
    Accepted,
    /// Too close to the last accepted sample; nothing changed.
    Suppressed,
}

#[derive(Default)]
pub struct GeoMotionGate {
    last: Option<ViewerMotionSample>,
    accepted: u64,
    pending: Option<JoinHandle<()>>,
}

impl GeoMotionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a new viewer position.
    ///
    /// Accepts when there is no prior sample or the distance to it is at least
    /// `threshold_meters` (inclusive). Accepting cancels any pending timer and
    /// arms a new one that calls `trigger` after `debounce`. Must be called
    /// from within a tokio runtime for the timer to be armed.
    pub fn evaluate<F>(
        &mut self,
        lat: f64,
        lng: f64,
        trigger: F,
        threshold_meters: f64,
        debounce: Duration,
    ) -> GateDecision
    where
        F: FnOnce() + Send + 'static,
    {
        if !is_valid_coordinate(lat, lng) {
            warn!(lat, lng, "Ignoring invalid viewer position");
            return GateDecision::Suppressed;
        }

        if let Some(last) = self.last {
            let moved = haversine_meters(last.lat, last.lng, lat, lng);
            if moved < threshold_meters {
                trace!(moved, threshold_meters, "Motion below threshold");
                return GateDecision::Suppressed;
            }
        }

        self.accepted += 1;
        self.last = Some(ViewerMotionSample {
            lat,
            lng,
            timestamp_logical: self.accepted,
        });
        self.arm(trigger, debounce);
        debug!(lat, lng, sample = self.accepted, "Motion accepted, refresh armed");
        GateDecision::Accepted
    }

    /// Forget the last sample and cancel any pending trigger.
    pub fn reset(&mut self) {
        self.cancel_pending();
        self.last = None;
    }

    pub fn last_sample(&self) -> Option<ViewerMotionSample> {
        self.last
    }

    /// True while an armed trigger has not yet fired.
    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn arm<F>(&mut self, trigger: F, debounce: Duration)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel_pending();

        let Ok(handle) = Handle::try_current() else {
            warn!("No async runtime, debounced refresh dropped");
            return;
        };
        self.pending = Some(handle.spawn(async move {
            tokio::time::sleep(debounce).await;
            trigger();
        }));
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

impl Drop for GeoMotionGate {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use nearcast_common::EARTH_RADIUS_METERS;

    const DEBOUNCE: Duration = Duration::from_millis(500);
    const ORIGIN: (f64, f64) = (35.6812, 139.7671);

    /// A point `meters` due north of ORIGIN.
    fn north_of_origin(meters: f64) -> (f64, f64) {
        (ORIGIN.0 + (meters / EARTH_RADIUS_METERS).to_degrees(), ORIGIN.1)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let make = move || {
            let c = Arc::clone(&c);
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (count, make)
    }

    async fn settle() {
        tokio::time::sleep(DEBOUNCE * 2).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn first_sample_always_accepted() {
        let (count, trigger) = counter();
        let mut gate = GeoMotionGate::new();

        let decision = gate.evaluate(ORIGIN.0, ORIGIN.1, trigger(), 1_000_000.0, DEBOUNCE);
        assert_eq!(decision, GateDecision::Accepted);
        assert_eq!(gate.last_sample().unwrap().timestamp_logical, 1);

        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn below_threshold_is_suppressed() {
        let (count, trigger) = counter();
        let mut gate = GeoMotionGate::new();
        let near = north_of_origin(49.0);

        gate.evaluate(ORIGIN.0, ORIGIN.1, trigger(), 50.0, DEBOUNCE);
        let decision = gate.evaluate(near.0, near.1, trigger(), 50.0, DEBOUNCE);

        assert_eq!(decision, GateDecision::Suppressed);
        assert_eq!(gate.last_sample().unwrap().lat, ORIGIN.0);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "only the first sample fires");
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_is_inclusive() {
        let mut gate = GeoMotionGate::new();
        let far = north_of_origin(50.0);
        let exact = haversine_meters(ORIGIN.0, ORIGIN.1, far.0, far.1);
        assert!((exact - 50.0).abs() < 1e-6, "helper should place the point 50m away, got {exact}");

        gate.evaluate(ORIGIN.0, ORIGIN.1, || {}, exact, DEBOUNCE);
        let decision = gate.evaluate(far.0, far.1, || {}, exact, DEBOUNCE);
        assert_eq!(decision, GateDecision::Accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn fifty_meters_passes_a_fifty_meter_gate() {
        let mut gate = GeoMotionGate::new();
        let far = north_of_origin(50.001);

        gate.evaluate(ORIGIN.0, ORIGIN.1, || {}, 50.0, DEBOUNCE);
        assert_eq!(gate.evaluate(far.0, far.1, || {}, 50.0, DEBOUNCE), GateDecision::Accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn suppressed_sample_does_not_extend_pending_timer() {
        let (count, trigger) = counter();
        let mut gate = GeoMotionGate::new();
        let near = north_of_origin(10.0);

        gate.evaluate(ORIGIN.0, ORIGIN.1, trigger(), 50.0, DEBOUNCE);
        tokio::time::sleep(Duration::from_millis(400)).await;
        gate.evaluate(near.0, near.1, trigger(), 50.0, DEBOUNCE);

        // Original deadline is 500ms after the first call.
        tokio::time::sleep(Duration::from_millis(150)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_qualifying_moves_coalesce_into_one_trigger() {
        let (count, trigger) = counter();
        let mut gate = GeoMotionGate::new();

        for step in 0..3 {
            let p = north_of_origin(step as f64 * 100.0);
            let decision = gate.evaluate(p.0, p.1, trigger(), 50.0, DEBOUNCE);
            assert_eq!(decision, GateDecision::Accepted);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(gate.has_pending());

        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!gate.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_latest_trigger_fires() {
        let fired = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut gate = GeoMotionGate::new();

        for step in 0..3u32 {
            let p = north_of_origin(step as f64 * 100.0);
            let fired = Arc::clone(&fired);
            gate.evaluate(p.0, p.1, move || fired.lock().unwrap().push(step), 50.0, DEBOUNCE);
        }

        settle().await;
        assert_eq!(*fired.lock().unwrap(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_threshold_accepts_everything() {
        let mut gate = GeoMotionGate::new();
        for _ in 0..3 {
            assert_eq!(
                gate.evaluate(ORIGIN.0, ORIGIN.1, || {}, 0.0, DEBOUNCE),
                GateDecision::Accepted
            );
        }
        assert_eq!(gate.last_sample().unwrap().timestamp_logical, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_cancels_pending_and_forgets_history() {
        let (count, trigger) = counter();
        let mut gate = GeoMotionGate::new();

        gate.evaluate(ORIGIN.0, ORIGIN.1, trigger(), 50.0, DEBOUNCE);
        gate.reset();
        assert!(gate.last_sample().is_none());
        assert!(!gate.has_pending());

        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Same spot again: no history, so it is accepted.
        let decision = gate.evaluate(ORIGIN.0, ORIGIN.1, trigger(), 50.0, DEBOUNCE);
        assert_eq!(decision, GateDecision::Accepted);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_position_is_ignored() {
        let mut gate = GeoMotionGate::new();
        assert_eq!(
            gate.evaluate(f64::NAN, 0.0, || {}, 50.0, DEBOUNCE),
            GateDecision::Suppressed
        );
        assert!(gate.last_sample().is_none());
    }

    #[test]
    fn evaluate_without_runtime_does_not_panic() {
        let mut gate = GeoMotionGate::new();
        let decision = gate.evaluate(ORIGIN.0, ORIGIN.1, || {}, 50.0, DEBOUNCE);
        assert_eq!(decision, GateDecision::Accepted);
        assert!(!gate.has_pending());
    }
}
