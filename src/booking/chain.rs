use tracing::warn;
use ulid::Ulid;

use crate::limits::MAX_CHAIN_LEN;
use crate::model::*;
use crate::storage::{BookingStore, StoreError};

/// Record `proposal` as the extension of `existing`.
///
/// The new booking points back at `existing` and inherits its chain root
/// (`existing` itself when it has none). The forward link on `existing` is
/// written by the same store call.
pub async fn link_extension<S: BookingStore + ?Sized>(
    store: &S,
    proposal: Proposal,
    existing: &Booking,
) -> Result<Booking, StoreError> {
    let fields = NewBooking {
        guest_name: proposal.guest_name,
        unit_id: proposal.unit_id,
        stay: proposal.stay,
        first_booking_id: Some(existing.root_id()),
        previous_booking_id: Some(existing.id),
    };
    store.create_linked_booking(fields, existing.id).await
}

/// The full chain containing `id`, root first. Empty if `id` is unknown.
pub async fn walk_chain<S: BookingStore + ?Sized>(
    store: &S,
    id: Ulid,
) -> Result<Vec<Booking>, StoreError> {
    let Some(start) = store.find_by_id(id).await? else {
        return Ok(Vec::new());
    };
    let root = match store.find_by_id(start.root_id()).await? {
        Some(root) => root,
        None => {
            warn!("chain root {} of booking {id} missing", start.root_id());
            start
        }
    };

    let mut chain = vec![root];
    while let Some(next_id) = chain.last().and_then(|b| b.next_booking_id) {
        if chain.len() >= MAX_CHAIN_LEN {
            warn!("chain of booking {id} exceeds {MAX_CHAIN_LEN} entries, truncating");
            break;
        }
        match store.find_by_id(next_id).await? {
            Some(next) => chain.push(next),
            None => {
                warn!("dangling next link to {next_id} in chain of booking {id}");
                break;
            }
        }
    }
    Ok(chain)
}
