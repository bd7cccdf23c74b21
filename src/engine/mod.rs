mod conflict;
mod error;
mod lifecycle;
mod queries;
mod store;

pub use error::BookingError;
pub use store::BookingStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::directory::UserDirectory;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedDaySchedule = Arc<RwLock<DaySchedule>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL and batches appends for group commit: block for the first
/// append, drain whatever else is already queued, then fsync once for all.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::warn!(error = %e, batch = batch.len(), "wal flush failed");
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if result.is_err() {
        // Every sender in the batch hears failure, so none of it may reach disk later.
        if let Err(e) = wal.rollback() {
            tracing::error!(error = %e, "wal rollback failed");
        }
    }
    result
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// The booking core. Every write goes WAL first, then memory, then
/// subscribers, all while holding the write lock of the affected
/// (resource, date) schedule.
pub struct Engine {
    pub(super) store: BookingStore,
    /// Mutations hold this shared, before any schedule lock; compaction holds
    /// it exclusively so no append can land in the log being replaced.
    pub(super) write_gate: RwLock<()>,
    /// Serializes resource creation so name uniqueness holds.
    pub(super) catalog_lock: Mutex<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) directory: Arc<dyn UserDirectory>,
    pub(super) clock: Arc<dyn Clock>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer. Needs a tokio runtime.
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        directory: Arc<dyn UserDirectory>,
    ) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = BookingStore::from_events(&events);
        tracing::info!(
            path = %wal_path.display(),
            events = events.len(),
            resources = store.resource_count(),
            bookings = store.booking_count(),
            "replayed booking log"
        );

        Ok(Self {
            store,
            write_gate: RwLock::new(()),
            catalog_lock: Mutex::new(()),
            wal_tx,
            notify,
            directory,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> chrono::NaiveDateTime {
        self.clock.now()
    }

    pub fn today(&self) -> chrono::NaiveDate {
        self.clock.today()
    }

    async fn wal_append(&self, event: &Event) -> Result<(), BookingError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| BookingError::StorageUnavailable("log writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::StorageUnavailable("log writer dropped response".into()))?
            .map_err(|e| BookingError::StorageUnavailable(e.to_string()))
    }

    /// WAL-append, apply to the locked schedule, notify.
    pub(super) async fn persist_and_apply(
        &self,
        day: &mut DaySchedule,
        event: &Event,
    ) -> Result<(), BookingError> {
        self.wal_append(event).await?;
        self.store.apply_to_day(day, event);
        self.notify.send(day.resource_id, event);
        Ok(())
    }

    /// Caller holds `catalog_lock`.
    pub(super) async fn persist_catalog(&self, event: &Event) -> Result<(), BookingError> {
        self.wal_append(event).await?;
        self.store.apply_catalog_event(event);
        self.notify.send(event.resource_id(), event);
        Ok(())
    }

    /// Lookup booking → schedule and take its write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &BookingId,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<DaySchedule>, BookingError> {
        let key = self
            .store
            .day_key_for(booking_id)
            .ok_or_else(|| BookingError::booking_not_found(*booking_id))?;
        let day = self
            .store
            .day(&key)
            .ok_or_else(|| BookingError::booking_not_found(*booking_id))?;
        Ok(day.write_owned().await)
    }

    /// Rewrite the WAL as the minimal event set for the current state.
    pub async fn compact_wal(&self) -> Result<(), BookingError> {
        let _exclusive = self.write_gate.write().await;
        let mut resources = self.store.resources();
        resources.sort_by_key(|r| r.id);
        let mut events: Vec<Event> = resources
            .into_iter()
            .map(|r| Event::ResourceCreated {
                id: r.id,
                name: r.name,
                kind: r.kind,
                capacity: r.capacity,
            })
            .collect();

        // Status is folded into the request record; no separate change events.
        for day in self.store.days_matching(None) {
            let guard = day.read().await;
            events.extend(guard.bookings.iter().map(|b| Event::BookingRequested {
                booking: b.clone(),
            }));
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| BookingError::StorageUnavailable("log writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::StorageUnavailable("log writer dropped response".into()))?
            .map_err(|e| BookingError::StorageUnavailable(e.to_string()))?;
        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        tracing::info!(events = count, "compacted booking log");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
