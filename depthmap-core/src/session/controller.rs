//! Session controller actor
//!
//! One task owns the inbound buffer and every live stream handle. Adapters
//! are producers on a per-session channel; the actor is the single consumer
//! and the only place aggregation passes run.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::depth::{AggregateView, Aggregator};
use crate::venues::{
    now_millis, DepthEntry, FeedError, FeedEvent, StreamHandle, TimeWindow, VenueId, VenueRegistry,
};

use super::{FeedStats, ProcessingMode, SessionConfig, SessionSnapshot, SessionStatus};

#[derive(Debug)]
enum Command {
    Reconnect,
    SetVenues(Vec<VenueId>),
    SetWindow(TimeWindow),
    Shutdown,
}

/// State shared between the actor and its handle. The view is published by
/// swapping the `Arc`, so readers always hold a complete, consistent pass
/// result.
struct Shared {
    status: RwLock<SessionStatus>,
    error: RwLock<Option<String>>,
    view: RwLock<Arc<AggregateView>>,
    stats: DashMap<VenueId, FeedStats>,
}

impl Shared {
    fn new() -> Self {
        Self {
            status: RwLock::new(SessionStatus::Connecting),
            error: RwLock::new(None),
            view: RwLock::new(Arc::new(AggregateView::default())),
            stats: DashMap::new(),
        }
    }
}

enum LoopExit {
    Reconnect,
    Shutdown,
}

enum ConnectOutcome {
    Open(mpsc::UnboundedReceiver<FeedEvent>, mpsc::UnboundedSender<FeedEvent>),
    Failed,
}

/// Handle to a running session.
///
/// Dropping the handle closes the command channel, which shuts the session
/// down and with it every live stream task.
pub struct SessionHandle {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn status(&self) -> SessionStatus {
        *self.shared.status.read()
    }

    pub fn error(&self) -> Option<String> {
        self.shared.error.read().clone()
    }

    /// Most recently published view. Cheap: clones an `Arc`.
    pub fn view(&self) -> Arc<AggregateView> {
        self.shared.view.read().clone()
    }

    /// The full read-and-react surface in one consistent value.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            view: self.view(),
            status: self.status(),
            error: self.error(),
        }
    }

    pub fn feed_stats(&self) -> Vec<(VenueId, FeedStats)> {
        self.shared
            .stats
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Tear down every live adapter handle, clear status/error, and
    /// reconnect from scratch.
    pub fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Replace the selected venue set. Always a full teardown and reconnect.
    pub fn set_venues(&self, venues: Vec<VenueId>) {
        let _ = self.commands.send(Command::SetVenues(venues));
    }

    /// Change the aggregation window. A per-pass policy: takes effect on the
    /// next pass with no teardown.
    pub fn set_window(&self, window: TimeWindow) {
        let _ = self.commands.send(Command::SetWindow(window));
    }

    /// Shut the session down and wait for the actor to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        let _ = self.task.await;
    }
}

/// The session state machine: `Connecting → Open → Error`, with reconnect
/// re-entering `Connecting` after full teardown.
pub struct SessionController {
    config: SessionConfig,
    registry: Arc<VenueRegistry>,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    aggregator: Aggregator,
    /// Windowed working set, pruned on every pass.
    entries: Vec<DepthEntry>,
    /// Staging buffer for batched mode, cleared on every drain.
    pending: Vec<DepthEntry>,
    handles: Vec<StreamHandle>,
    session_id: Uuid,
}

impl SessionController {
    /// Spawn a session over the given venue registry.
    pub fn spawn(config: SessionConfig, registry: Arc<VenueRegistry>) -> SessionHandle {
        let shared = Arc::new(Shared::new());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let mut aggregator = Aggregator::new(config.window);
        aggregator.detect_zones = config.detect_zones;
        aggregator.zone_config = config.zone_config;

        let controller = Self {
            config,
            registry,
            shared: shared.clone(),
            commands: command_rx,
            aggregator,
            entries: Vec::new(),
            pending: Vec::new(),
            handles: Vec::new(),
            session_id: Uuid::new_v4(),
        };

        let task = tokio::spawn(controller.run());

        SessionHandle {
            shared,
            commands: command_tx,
            task,
        }
    }

    async fn run(mut self) {
        loop {
            match self.connect().await {
                ConnectOutcome::Open(feed_rx, feed_tx) => {
                    match self.run_open(feed_rx, feed_tx).await {
                        LoopExit::Reconnect => continue,
                        LoopExit::Shutdown => break,
                    }
                }
                ConnectOutcome::Failed => match self.wait_in_error().await {
                    LoopExit::Reconnect => continue,
                    LoopExit::Shutdown => break,
                },
            }
        }

        self.close_streams();
        self.set_status(SessionStatus::Closed);
        info!(session = %self.session_id, "session closed");
    }

    /// Enter `Connecting`: sequential snapshot fetches, one immediate pass
    /// when anything came back, then live streams for every selected venue.
    async fn connect(&mut self) -> ConnectOutcome {
        self.session_id = Uuid::new_v4();
        self.close_streams();
        self.entries.clear();
        self.pending.clear();
        *self.shared.error.write() = None;
        self.set_status(SessionStatus::Connecting);
        info!(
            session = %self.session_id,
            venues = ?self.config.venues,
            symbol = %self.config.symbol,
            "connecting"
        );

        let venues = self.config.venues.clone();
        let mut combined: Vec<DepthEntry> = Vec::new();
        for venue in &venues {
            let Some(adapter) = self.registry.get(venue) else {
                warn!(venue = %venue, "no adapter registered for venue");
                *self.shared.error.write() = Some(format!("{venue}: no adapter registered"));
                continue;
            };

            match adapter
                .fetch_snapshot(&self.config.symbol, self.config.snapshot_limit)
                .await
            {
                Ok(entries) => {
                    debug!(venue = %venue, count = entries.len(), "snapshot fetched");
                    self.record_batch(venue, entries.len());
                    combined.extend(entries);
                }
                Err(err) => {
                    // An empty result with a surfaced status, never fatal.
                    warn!(venue = %venue, error = %err, "snapshot fetch failed");
                    self.record_transport_error(venue);
                    *self.shared.error.write() = Some(format!("{venue}: {err}"));
                }
            }
        }

        if combined.is_empty() {
            let message = FeedError::EmptyResult.to_string();
            error!(session = %self.session_id, "{message}");
            *self.shared.error.write() = Some(message);
            self.set_status(SessionStatus::Error);
            return ConnectOutcome::Failed;
        }

        self.entries = combined;
        self.run_pass();

        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        for venue in &venues {
            if let Some(adapter) = self.registry.get(venue) {
                let handle = adapter.open_stream(&self.config.symbol, feed_tx.clone());
                self.handles.push(handle);
            }
        }

        self.set_status(SessionStatus::Open);
        info!(session = %self.session_id, streams = self.handles.len(), "session open");
        ConnectOutcome::Open(feed_rx, feed_tx)
    }

    /// Main loop while streams are live.
    ///
    /// `_feed_tx` keeps the channel open so `recv` pends rather than ending
    /// when every stream task has died.
    async fn run_open(
        &mut self,
        mut feed_rx: mpsc::UnboundedReceiver<FeedEvent>,
        _feed_tx: mpsc::UnboundedSender<FeedEvent>,
    ) -> LoopExit {
        let mut drain = tokio::time::interval(self.config.batch_interval);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Reconnect) => {
                            info!(session = %self.session_id, "reconnect requested");
                            self.close_streams();
                            return LoopExit::Reconnect;
                        }
                        Some(Command::SetVenues(venues)) => {
                            info!(session = %self.session_id, ?venues, "venue selection changed");
                            self.config.venues = venues;
                            self.close_streams();
                            return LoopExit::Reconnect;
                        }
                        Some(Command::SetWindow(window)) => {
                            info!(session = %self.session_id, %window, "window changed");
                            self.aggregator.window = window;
                            self.run_pass();
                        }
                        Some(Command::Shutdown) | None => {
                            self.close_streams();
                            return LoopExit::Shutdown;
                        }
                    }
                }

                event = feed_rx.recv() => {
                    match event {
                        Some(FeedEvent::Entries { venue, entries }) => {
                            self.record_batch(&venue, entries.len());
                            match self.config.mode {
                                ProcessingMode::RealTime => {
                                    self.entries.extend(entries);
                                    self.run_pass();
                                }
                                ProcessingMode::Batched => {
                                    self.pending.extend(entries);
                                }
                            }
                        }
                        Some(FeedEvent::TransportError { venue, message }) => {
                            // Sibling streams stay up; only an explicit
                            // reconnect tears the session down.
                            warn!(venue = %venue, "stream error: {message}");
                            self.record_transport_error(&venue);
                            *self.shared.error.write() = Some(format!("{venue}: {message}"));
                            self.set_status(SessionStatus::Error);
                        }
                        None => {}
                    }
                }

                _ = drain.tick(), if self.config.mode == ProcessingMode::Batched => {
                    // Drain the staging buffer into the working set; it is
                    // cleared whether or not it held anything.
                    self.entries.append(&mut self.pending);
                    self.run_pass();
                }
            }
        }
    }

    /// Idle in `Error` until a command arrives.
    async fn wait_in_error(&mut self) -> LoopExit {
        loop {
            match self.commands.recv().await {
                Some(Command::Reconnect) => return LoopExit::Reconnect,
                Some(Command::SetVenues(venues)) => {
                    self.config.venues = venues;
                    return LoopExit::Reconnect;
                }
                Some(Command::SetWindow(window)) => {
                    self.aggregator.window = window;
                }
                Some(Command::Shutdown) | None => return LoopExit::Shutdown,
            }
        }
    }

    /// One full aggregation pass over a snapshot of the buffer.
    fn run_pass(&mut self) {
        let now = now_millis();
        let window_ms = self.aggregator.window.millis();
        // Entries aging out of the window are dropped for good.
        self.entries.retain(|e| now - e.timestamp < window_ms);

        let snapshot = self.entries.clone();
        let view = self.aggregator.aggregate(&snapshot, now);
        debug!(
            session = %self.session_id,
            bids = view.bids.len(),
            asks = view.asks.len(),
            zones = view.pressure_zones.len(),
            "pass complete"
        );
        *self.shared.view.write() = Arc::new(view);
    }

    fn close_streams(&mut self) {
        for handle in self.handles.drain(..) {
            debug!(venue = %handle.venue(), "closing stream");
            handle.close();
        }
    }

    fn set_status(&self, status: SessionStatus) {
        let mut current = self.shared.status.write();
        if *current != status {
            info!(session = %self.session_id, %status, "status changed");
            *current = status;
        }
    }

    fn record_batch(&self, venue: &VenueId, count: usize) {
        let mut stats = self.shared.stats.entry(venue.clone()).or_default();
        stats.batches_received += 1;
        stats.entries_received += count as u64;
        stats.last_event_ms = Some(now_millis());
    }

    fn record_transport_error(&self, venue: &VenueId) {
        let mut stats = self.shared.stats.entry(venue.clone()).or_default();
        stats.transport_errors += 1;
        stats.last_event_ms = Some(now_millis());
    }
}
