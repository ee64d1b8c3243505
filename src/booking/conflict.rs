use std::str::FromStr;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::storage::{BookingStore, StoreError};

use super::error::{BookingError, ConflictKind};

/// Which boundary rule decides that two stays on a unit collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Closed interval: a checkout day touching another check-in conflicts.
    #[default]
    Inclusive,
    /// Half-open interval: the checkout day is free for the next guest.
    CheckoutDayFree,
}

impl OverlapPolicy {
    pub fn conflicts(self, a: &Stay, b: &Stay) -> bool {
        match self {
            OverlapPolicy::Inclusive => a.overlaps(b),
            OverlapPolicy::CheckoutDayFree => a.overlaps_nights(b),
        }
    }
}

impl FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inclusive" => Ok(OverlapPolicy::Inclusive),
            "checkout-day-free" | "checkout_day_free" => Ok(OverlapPolicy::CheckoutDayFree),
            other => Err(format!("unknown overlap policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Admitted,
    Rejected(ConflictKind),
}

/// Turn a raw request into a `Proposal`, or say what is wrong with it.
pub fn validate_request(req: &BookingRequest) -> Result<Proposal, BookingError> {
    if req.guest_name.is_empty() {
        return Err(BookingError::InvalidInput("guestName must not be empty"));
    }
    if req.guest_name.len() > MAX_GUEST_NAME_LEN {
        return Err(BookingError::InvalidInput("guestName too long"));
    }
    if req.unit_id.is_empty() {
        return Err(BookingError::InvalidInput("unitID must not be empty"));
    }
    if req.unit_id.len() > MAX_UNIT_ID_LEN {
        return Err(BookingError::InvalidInput("unitID too long"));
    }
    if req.number_of_nights <= 0 {
        return Err(BookingError::InvalidInput("numberOfNights must be positive"));
    }
    if req.number_of_nights > MAX_NIGHTS {
        return Err(BookingError::InvalidInput("numberOfNights too large"));
    }
    let check_in = parse_check_in(&req.check_in_date)
        .ok_or(BookingError::InvalidInput("checkInDate is not a valid date"))?;
    let stay = Stay::new(check_in, req.number_of_nights as u32)
        .ok_or(BookingError::InvalidInput("check-out date out of range"))?;

    Ok(Proposal {
        guest_name: req.guest_name.clone(),
        unit_id: req.unit_id.clone(),
        stay,
    })
}

/// Admissibility of a brand-new booking. First failing check wins:
/// duplicate guest/unit pair, then guest already booked anywhere, then unit
/// occupied.
pub async fn evaluate_new_booking<S: BookingStore + ?Sized>(
    store: &S,
    proposal: &Proposal,
    policy: OverlapPolicy,
) -> Result<Outcome, StoreError> {
    let same_pair = store
        .find_by_guest_and_unit(&proposal.guest_name, &proposal.unit_id)
        .await?;
    if !same_pair.is_empty() {
        return Ok(Outcome::Rejected(ConflictKind::DuplicateGuestUnit));
    }

    let same_guest = store.find_by_guest(&proposal.guest_name).await?;
    if !same_guest.is_empty() {
        return Ok(Outcome::Rejected(ConflictKind::GuestAlreadyBooked));
    }

    unit_availability(store, proposal, None, policy).await
}

/// Admissibility of an extension of `extending`: only unit availability,
/// with the extended booking left out of the comparison.
pub async fn evaluate_extension<S: BookingStore + ?Sized>(
    store: &S,
    proposal: &Proposal,
    extending: Ulid,
    policy: OverlapPolicy,
) -> Result<Outcome, StoreError> {
    unit_availability(store, proposal, Some(extending), policy).await
}

async fn unit_availability<S: BookingStore + ?Sized>(
    store: &S,
    proposal: &Proposal,
    exclude: Option<Ulid>,
    policy: OverlapPolicy,
) -> Result<Outcome, StoreError> {
    let candidates = store
        .find_by_unit_overlapping(&proposal.unit_id, &proposal.stay, exclude)
        .await?;
    let occupied = candidates
        .iter()
        .any(|b| policy.conflicts(&b.stay(), &proposal.stay));
    if occupied {
        return Ok(Outcome::Rejected(ConflictKind::UnitOccupied));
    }
    Ok(Outcome::Admitted)
}
