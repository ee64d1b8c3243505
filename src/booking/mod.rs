mod chain;
mod conflict;
mod error;

pub use chain::{link_extension, walk_chain};
pub use conflict::{evaluate_extension, evaluate_new_booking, validate_request, OverlapPolicy, Outcome};
pub use error::{BookingError, ConflictKind};

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::storage::BookingStore;

/// Async mutexes keyed by guest and unit. Writers touching the same guest or
/// unit run one at a time; everything else proceeds in parallel.
///
/// An entry lives only while some writer holds or waits on it.
#[derive(Default)]
struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    /// Acquire in sorted order to prevent deadlocks.
    async fn acquire(&self, mut keys: Vec<String>) -> KeyedGuards<'_> {
        keys.sort();
        keys.dedup();
        let mut guards = KeyedGuards {
            locks: &self.locks,
            held: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            let lock = self.locks.entry(key.clone()).or_default().value().clone();
            guards.held.push((key, lock.lock_owned().await));
        }
        guards
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Releases its locks on drop and removes entries nobody else references.
struct KeyedGuards<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    held: Vec<(String, OwnedMutexGuard<()>)>,
}

impl Drop for KeyedGuards<'_> {
    fn drop(&mut self) {
        for (key, guard) in self.held.drain(..) {
            drop(guard);
            // Waiters hold a clone, so a count of one means the map's is the last.
            self.locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

fn guest_key(guest_name: &str) -> String {
    format!("guest:{guest_name}")
}

fn unit_key(unit_id: &str) -> String {
    format!("unit:{unit_id}")
}

/// Creation and extension of bookings over any `BookingStore`.
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    policy: OverlapPolicy,
    locks: KeyedLocks,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>, policy: OverlapPolicy) -> Self {
        Self {
            store,
            policy,
            locks: KeyedLocks::default(),
        }
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }

    pub async fn create_booking(&self, req: BookingRequest) -> Result<Booking, BookingError> {
        let proposal = validate_request(&req)?;
        let _guards = self
            .locks
            .acquire(vec![guest_key(&proposal.guest_name), unit_key(&proposal.unit_id)])
            .await;

        if let Outcome::Rejected(kind) =
            evaluate_new_booking(&*self.store, &proposal, self.policy).await?
        {
            debug!(
                "booking rejected for guest {:?} on unit {:?}: {}",
                proposal.guest_name,
                proposal.unit_id,
                kind.label()
            );
            return Err(BookingError::Rejected(kind));
        }

        let booking = self.store.create_booking(proposal.into_new_booking()).await?;
        info!(
            "booking {} created: unit {:?} from {} for {} nights",
            booking.id, booking.unit_id, booking.check_in_date, booking.number_of_nights
        );
        Ok(booking)
    }

    pub async fn extend_booking(&self, req: ExtendRequest) -> Result<Booking, BookingError> {
        let proposal = validate_request(&req.booking)?;
        let target: Ulid = req
            .booking_id
            .trim()
            .parse()
            .map_err(|_| BookingError::InvalidInput("bookingId is not a valid id"))?;

        let existing = self
            .store
            .find_by_id(target)
            .await?
            .ok_or(BookingError::NotFound(target))?;

        let _guards = self
            .locks
            .acquire(vec![
                guest_key(&proposal.guest_name),
                unit_key(&proposal.unit_id),
                guest_key(&existing.guest_name),
                unit_key(&existing.unit_id),
            ])
            .await;

        // Re-read under the locks: another extension may have won the race.
        let existing = self
            .store
            .find_by_id(target)
            .await?
            .ok_or(BookingError::NotFound(target))?;
        if existing.chain_state() == ChainState::Linked {
            return Err(BookingError::AlreadyExtended(target));
        }

        if let Outcome::Rejected(kind) =
            evaluate_extension(&*self.store, &proposal, target, self.policy).await?
        {
            debug!("extension of {target} rejected: {}", kind.label());
            return Err(BookingError::Rejected(kind));
        }

        let booking = link_extension(&*self.store, proposal, &existing).await?;
        info!(
            "booking {target} extended by {} (chain root {})",
            booking.id,
            booking.root_id()
        );
        Ok(booking)
    }

    /// `None` for unknown or malformed ids.
    pub async fn get_booking(&self, id: &str) -> Result<Option<Booking>, BookingError> {
        let Ok(id) = id.trim().parse::<Ulid>() else {
            return Ok(None);
        };
        Ok(self.store.find_by_id(id).await?)
    }

    /// The chain containing `id`, root first. Empty for unknown or malformed ids.
    pub async fn booking_chain(&self, id: &str) -> Result<Vec<Booking>, BookingError> {
        let Ok(id) = id.trim().parse::<Ulid>() else {
            return Ok(Vec::new());
        };
        Ok(walk_chain(&*self.store, id).await?)
    }
}
