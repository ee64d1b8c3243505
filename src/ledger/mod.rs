mod store;

pub use store::InMemoryStore;

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::WAL_CHANNEL_CAPACITY;
use crate::model::*;
use crate::storage::{BookingStore, StoreError};
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(crate) enum WalCommand {
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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so buffered bytes don't leak into the
    // next batch.
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
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
        WalCommand::Append { event, response } => {
            commit_batch(wal, &mut vec![(event, response)]);
        }
    }
}

/// Durable booking store: an `InMemoryStore` rebuilt from, and kept in step
/// with, an append-only WAL.
///
/// Every write is appended and fsynced before it becomes visible to readers.
pub struct Ledger {
    store: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Writers hold it shared; compaction holds it exclusively so no append
    /// can slip between the snapshot and the file swap.
    compaction_gate: RwLock<()>,
    /// Held from the linkability check until the link is applied, so a
    /// booking gains at most one next link.
    link_lock: Mutex<()>,
}

impl Ledger {
    /// Replay the WAL at `wal_path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(WAL_CHANNEL_CAPACITY);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = InMemoryStore::new();
        for event in &events {
            if let Err(e) = store.apply_event(event) {
                warn!("replay: skipping inconsistent event: {e}");
            }
        }
        info!("ledger replayed {} events, {} bookings", events.len(), store.len());
        metrics::gauge!(crate::observability::BOOKINGS_STORED).set(store.len() as f64);

        Ok(Self {
            store,
            wal_tx,
            compaction_gate: RwLock::new(()),
            link_lock: Mutex::new(()),
        })
    }

    pub fn booking_count(&self) -> usize {
        self.store.len()
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    /// WAL-append, then apply to the in-memory state.
    async fn persist_and_apply(&self, event: &Event) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.read().await;
        self.wal_append(event).await?;
        self.store.apply_event(event)?;
        metrics::gauge!(crate::observability::BOOKINGS_STORED).set(self.store.len() as f64);
        Ok(())
    }

    /// Rewrite the WAL as one `BookingCreated` per booking, links included.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.write().await;
        let events: Vec<Event> = self
            .store
            .all_bookings()
            .into_iter()
            .map(|booking| Event::BookingCreated { booking })
            .collect();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
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

#[async_trait]
impl BookingStore for Ledger {
    async fn find_by_guest_and_unit(
        &self,
        guest_name: &str,
        unit_id: &str,
    ) -> Result<Vec<Booking>, StoreError> {
        Ok(self.store.guest_unit_bookings(guest_name, unit_id))
    }

    async fn find_by_guest(&self, guest_name: &str) -> Result<Vec<Booking>, StoreError> {
        Ok(self.store.guest_bookings(guest_name))
    }

    async fn find_by_unit_overlapping(
        &self,
        unit_id: &str,
        stay: &Stay,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Booking>, StoreError> {
        Ok(self.store.unit_overlapping(unit_id, stay, exclude))
    }

    async fn create_booking(&self, fields: NewBooking) -> Result<Booking, StoreError> {
        let booking = fields.into_booking(Ulid::new());
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(&event).await?;
        Ok(booking)
    }

    async fn update_next_link(&self, id: Ulid, next_booking_id: Ulid) -> Result<(), StoreError> {
        let _link = self.link_lock.lock().await;
        self.store.check_linkable(&id)?;
        let event = Event::BookingLinked { id, next_booking_id };
        self.persist_and_apply(&event).await
    }

    async fn find_by_id(&self, id: Ulid) -> Result<Option<Booking>, StoreError> {
        Ok(self.store.get(&id))
    }

    /// One WAL record covers the new booking and the link on `previous`.
    async fn create_linked_booking(
        &self,
        mut fields: NewBooking,
        previous: Ulid,
    ) -> Result<Booking, StoreError> {
        let _link = self.link_lock.lock().await;
        self.store.check_linkable(&previous)?;
        fields.previous_booking_id = Some(previous);
        let booking = fields.into_booking(Ulid::new());
        let event = Event::BookingExtended {
            booking: booking.clone(),
        };
        self.persist_and_apply(&event).await?;
        Ok(booking)
    }
}
