//! The tracker actor: the single-owner task that drives `receiver_mlat`,
//! cohort rotation/firing, and the resolve pipeline. Grounded on the
//! reference server's `start_uwb_hub` (an owned task looped on a channel,
//! never crashing on a single bad input) and `run_engine_tick` (state
//! owned by one task, no internal locking).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::aircraft::AircraftTracker;
use crate::blacklist::read_blacklist;
use crate::clock::ClockTracker;
use crate::cohort::Cohort;
use crate::config::TrackerConfig;
use crate::decode::Decoder;
use crate::group::MessageGroup;
use crate::observation::Observation;
use crate::output::{OutputHandler, ResultForwarder, SolveOutput};
use crate::pseudorange::{ClusterPositions, PseudorangeRecorder};
use crate::receiver::{ReceiverArena, ReceiverId};
use crate::resolve::{resolve_group, Collaborators, GateOutcome};
use crate::solver::Solver;
use crate::stats::Stats;

/// Inbound events driving the tracker's single event loop. A cohort timer
/// posts `CohortFired` back into this same channel rather than calling
/// back into the tracker directly, so the tracker never crosses a thread
/// boundary.
pub enum TrackerEvent {
    Observation {
        receiver: ReceiverId,
        local_ts: f64,
        message: Vec<u8>,
        wall_ts: f64,
    },
    CohortFired(u64),
    ReloadBlacklist,
    ReopenPseudoranges,
}

fn wall_clock_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// The multilateration tracker. Owns the pending-message map, in-flight
/// cohorts, and every external collaborator for the lifetime of the
/// actor task it is moved into.
pub struct MlatTracker {
    config: TrackerConfig,
    arena: ReceiverArena,
    decoder: Box<dyn Decoder>,
    clock_tracker: Box<dyn ClockTracker>,
    solver: Box<dyn Solver>,
    aircraft_tracker: Box<dyn AircraftTracker>,
    output_handlers: Vec<Box<dyn OutputHandler>>,
    forwarder: Box<dyn ResultForwarder>,
    pseudorange: Option<PseudorangeRecorder>,
    blacklist_path: Option<PathBuf>,
    blacklist: std::collections::HashSet<String>,
    stats: Stats,

    /// Message bytes -> (owning cohort id, index into that cohort's groups).
    pending: HashMap<Vec<u8>, (u64, usize)>,
    cohorts: HashMap<u64, Cohort>,
    /// `None` until the first observation opens the first cohort.
    current_cohort_id: Option<u64>,
    next_cohort_id: u64,

    event_tx: mpsc::Sender<TrackerEvent>,
    event_rx: mpsc::Receiver<TrackerEvent>,
    clock: Box<dyn Fn() -> f64 + Send>,
}

#[allow(clippy::too_many_arguments)]
impl MlatTracker {
    pub fn new(
        config: TrackerConfig,
        arena: ReceiverArena,
        decoder: Box<dyn Decoder>,
        clock_tracker: Box<dyn ClockTracker>,
        solver: Box<dyn Solver>,
        aircraft_tracker: Box<dyn AircraftTracker>,
        output_handlers: Vec<Box<dyn OutputHandler>>,
        forwarder: Box<dyn ResultForwarder>,
        pseudorange_path: Option<PathBuf>,
        blacklist_path: Option<PathBuf>,
    ) -> (Self, mpsc::Sender<TrackerEvent>) {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let blacklist = read_blacklist(blacklist_path.as_deref());

        let tracker = Self {
            config,
            arena,
            decoder,
            clock_tracker,
            solver,
            aircraft_tracker,
            output_handlers,
            forwarder,
            pseudorange: pseudorange_path.map(PseudorangeRecorder::new),
            blacklist_path,
            blacklist,
            stats: Stats::default(),
            pending: HashMap::new(),
            cohorts: HashMap::new(),
            current_cohort_id: None,
            next_cohort_id: 0,
            event_tx: event_tx.clone(),
            event_rx,
            clock: Box::new(wall_clock_now),
        };
        (tracker, event_tx)
    }

    /// Override the clock used for resolve-time `now` values; used by
    /// tests driving `tokio::time::{pause, advance}` instead of the wall
    /// clock.
    pub fn with_clock(mut self, clock: Box<dyn Fn() -> f64 + Send>) -> Self {
        self.clock = clock;
        self
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// The current blacklist set, reloaded whenever a `ReloadBlacklist`
    /// event is handled. Connection-handling code outside this crate is
    /// expected to consult this before accepting a receiver.
    pub fn blacklist(&self) -> &std::collections::HashSet<String> {
        &self.blacklist
    }

    /// Drives the tracker's event loop until every `Sender` handed out by
    /// `new` is dropped. Meant to be the body of the one task this value
    /// is moved into.
    pub async fn run(mut self) {
        info!("mlat tracker started");
        if let Some(pr) = self.pseudorange.as_mut() {
            pr.reopen().await;
        }
        while let Some(event) = self.event_rx.recv().await {
            self.handle_event(event).await;
        }
        info!("mlat tracker event channel closed, stopping");
    }

    async fn handle_event(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::Observation {
                receiver,
                local_ts,
                message,
                wall_ts,
            } => self.receiver_mlat(receiver, local_ts, message, wall_ts),
            TrackerEvent::CohortFired(id) => self.fire_cohort(id).await,
            TrackerEvent::ReloadBlacklist => {
                self.blacklist = read_blacklist(self.blacklist_path.as_deref());
                info!("blacklist reloaded: {} entries", self.blacklist.len());
            }
            TrackerEvent::ReopenPseudoranges => {
                if let Some(pr) = self.pseudorange.as_mut() {
                    pr.reopen().await;
                    info!("pseudorange log reopened");
                }
            }
        }
    }

    /// Pair up one observed copy of a raw message with its `MessageGroup`,
    /// opening a new cohort first if the current one is due to rotate.
    fn receiver_mlat(&mut self, receiver: ReceiverId, local_ts: f64, message: Vec<u8>, wall_ts: f64) {
        self.stats.mlat_msgs += 1;

        let (cohort_id, index) = match self.pending.get(&message).copied() {
            Some(loc) => loc,
            None => {
                let should_rotate = match self.current_cohort_id {
                    None => true,
                    Some(id) => self
                        .cohorts
                        .get(&id)
                        .map(|c| c.should_rotate(wall_ts, &self.config))
                        .unwrap_or(true),
                };
                if should_rotate {
                    self.open_new_cohort(wall_ts);
                }

                let current = self.current_cohort_id.expect("just opened if absent");
                let cohort = self
                    .cohorts
                    .get_mut(&current)
                    .expect("current cohort was just created or already existed");
                let index = cohort.groups.len();
                cohort.push(MessageGroup::new(message.clone(), wall_ts));
                self.pending.insert(message.clone(), (current, index));
                (current, index)
            }
        };

        let Some(cohort) = self.cohorts.get_mut(&cohort_id) else {
            debug!("observation for a message whose cohort already fired, dropping");
            return;
        };
        let Some(group) = cohort.groups.get_mut(index) else {
            return;
        };
        group.record(
            Observation {
                receiver,
                local_ts,
                wall_ts,
            },
            self.config.max_group,
        );
    }

    fn open_new_cohort(&mut self, now: f64) {
        let id = self.next_cohort_id;
        self.next_cohort_id += 1;
        self.current_cohort_id = Some(id);
        self.cohorts.insert(id, Cohort::new(id, now));

        let tx = self.event_tx.clone();
        let delay = self.config.mlat_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TrackerEvent::CohortFired(id)).await;
        });
    }

    /// Resolve every group in a fired cohort, in insertion order, then
    /// drop the cohort. Timers fire at most once; a missing id here means
    /// this cohort was already taken, which should not happen but is
    /// tolerated rather than panicking.
    async fn fire_cohort(&mut self, id: u64) {
        let Some(cohort) = self.cohorts.remove(&id) else {
            return;
        };
        for group in cohort.groups {
            self.pending.remove(&group.message);
            self.on_resolve(group).await;
        }
    }

    async fn on_resolve(&mut self, group: MessageGroup) {
        let now = (self.clock)();
        let collab = Collaborators {
            decoder: self.decoder.as_ref(),
            clock_tracker: self.clock_tracker.as_ref(),
            solver: self.solver.as_ref(),
            arena: &self.arena,
        };

        let receivers = group.receivers.clone();
        let (outcome, resolved) = resolve_group(
            &group,
            now,
            &self.config,
            &collab,
            self.aircraft_tracker.as_mut(),
            &mut self.stats,
        );
        debug!(?outcome, "resolve outcome");

        let Some(resolved) = resolved else {
            return;
        };

        let cluster_receivers: Vec<ReceiverId> =
            resolved.cluster.rows.iter().map(|r| r.receiver).collect();
        let output = SolveOutput {
            cluster_wall_ts: resolved.cluster_wall_ts,
            address: resolved.address,
            ecef: resolved.ecef,
            ecef_cov: resolved.ecef_cov,
            cluster_receivers: &cluster_receivers,
            distinct: resolved.distinct,
            dof: resolved.dof,
            kalman: resolved.kalman_accepted,
            error_m: resolved.error,
        };

        for handler in &mut self.output_handlers {
            if let Err(e) = handler.handle(&output) {
                warn!("output handler failed: {e}");
            }
        }
        self.forwarder.forward_results(&receivers, &output);

        if let Some(pr) = self.pseudorange.as_mut() {
            if pr.is_enabled() {
                let positions: Vec<[f64; 3]> = resolved
                    .cluster
                    .rows
                    .iter()
                    .map(|row| {
                        self.arena
                            .get(row.receiver)
                            .map(|r| r.position)
                            .unwrap_or([0.0, 0.0, 0.0])
                    })
                    .collect();
                let cluster_positions = ClusterPositions {
                    cluster: &resolved.cluster,
                    positions,
                };
                pr.record(
                    resolved.address,
                    resolved.cluster_wall_ts,
                    resolved.ecef,
                    Some(resolved.ecef_cov),
                    resolved.dof,
                    &cluster_positions,
                    resolved.altitude,
                    resolved.altitude_error,
                )
                .await;
            }
        }

        match outcome {
            GateOutcome::Resolved { distinct, dof } => {
                debug!(distinct, dof, "resolved fix dispatched");
            }
            _ => unreachable!("resolved solve implies GateOutcome::Resolved"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodedMessage;
    use crate::testutil::{
        FakeAircraftTracker, FakeDecoder, FixedSolver, IdentityClockTracker, RecordingForwarder,
    };

    fn make_tracker() -> MlatTracker {
        let (tracker, _tx) = MlatTracker::new(
            TrackerConfig::default(),
            ReceiverArena::new(),
            Box::new(FakeDecoder::default()),
            Box::new(IdentityClockTracker::default()),
            Box::new(FixedSolver::default()),
            Box::new(FakeAircraftTracker::default()),
            Vec::new(),
            Box::new(RecordingForwarder::default()),
            None,
            None,
        );
        tracker
    }

    #[tokio::test]
    async fn first_observation_opens_a_cohort() {
        let mut tracker = make_tracker();
        assert!(tracker.current_cohort_id.is_none());
        tracker.receiver_mlat(1, 0.0, vec![1, 2, 3], 1000.0);
        assert_eq!(tracker.current_cohort_id, Some(0));
        assert_eq!(tracker.cohorts.len(), 1);
    }

    #[tokio::test]
    async fn cohort_rolls_over_past_max_groups() {
        // Boundary scenario 5: feeding more than `cohort_max_groups` distinct
        // messages in a burst opens a second cohort.
        let mut tracker = make_tracker();
        let max_groups = tracker.config.cohort_max_groups;
        for i in 0..=(max_groups as u32 + 1) {
            tracker.receiver_mlat(1, 0.0, i.to_le_bytes().to_vec(), 1000.0);
        }
        assert_eq!(tracker.next_cohort_id, 2);
    }

    #[tokio::test]
    async fn cohort_rolls_over_past_max_age() {
        // Boundary scenario 6: two distinct messages far enough apart in
        // wall time land in different cohorts.
        let mut tracker = make_tracker();
        tracker.receiver_mlat(1, 0.0, vec![1], 1000.0);
        assert_eq!(tracker.next_cohort_id, 1);

        let max_age = tracker.config.cohort_max_age.as_secs_f64();
        tracker.receiver_mlat(1, 0.0, vec![2], 1000.0 + max_age + 0.001);
        assert_eq!(tracker.next_cohort_id, 2);
    }

    #[tokio::test]
    async fn repeated_copies_of_the_same_message_join_one_group() {
        let mut tracker = make_tracker();
        tracker.receiver_mlat(1, 0.0, vec![0xAA], 1000.0);
        tracker.receiver_mlat(2, 0.0, vec![0xAA], 1000.0);
        assert_eq!(tracker.cohorts.len(), 1);
        let cohort = tracker.cohorts.values().next().unwrap();
        assert_eq!(cohort.groups.len(), 1);
        assert_eq!(cohort.groups[0].copies.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn full_cycle_resolves_through_the_cohort_timer() {
        let decoder = FakeDecoder::with(
            vec![0xAA],
            DecodedMessage {
                address: Some(0x1234),
                ..Default::default()
            },
        );
        let mut arena = ReceiverArena::new();
        for (id, x) in [(1u32, 0.0), (2, 2000.0), (3, 4000.0), (4, 6000.0)] {
            arena.insert(id, [x, 0.0, 0.0]);
        }
        let mut aircraft = FakeAircraftTracker::with_known(0x1234);
        {
            let (ac, _) = aircraft.get_mut(0x1234).unwrap();
            ac.altitude = Some(10_000.0);
            ac.last_altitude_time = Some(0.0);
        }

        let (mut tracker, _tx) = MlatTracker::new(
            TrackerConfig::default(),
            arena,
            Box::new(decoder),
            Box::new(IdentityClockTracker::default()),
            Box::new(FixedSolver::default()),
            Box::new(aircraft),
            Vec::new(),
            Box::new(RecordingForwarder::default()),
            None,
            None,
        );

        for receiver in [1, 2, 3, 4] {
            tracker.receiver_mlat(receiver, 0.0, vec![0xAA], 0.0);
        }
        assert_eq!(tracker.pending.len(), 1);

        tokio::time::advance(tracker.config.mlat_delay + std::time::Duration::from_millis(1))
            .await;
        let event = tracker
            .event_rx
            .recv()
            .await
            .expect("cohort timer fires exactly once");
        tracker.handle_event(event).await;

        assert!(tracker.pending.is_empty());
        assert_eq!(tracker.stats().solve_used, 1);
    }
}
