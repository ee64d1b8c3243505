use chrono::{DateTime, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A stay on a unit: `nights` nights starting on `check_in`.
///
/// The occupied range is `[check_in, check_out)` in nights; `check_out` is the
/// departure day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub nights: u32,
}

impl Stay {
    /// Returns `None` for zero nights or a checkout date past the calendar.
    pub fn new(check_in: NaiveDate, nights: u32) -> Option<Self> {
        if nights == 0 {
            return None;
        }
        check_in.checked_add_days(Days::new(nights as u64))?;
        Some(Self { check_in, nights })
    }

    pub fn check_out(&self) -> NaiveDate {
        self.check_in
            .checked_add_days(Days::new(self.nights as u64))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Closed-interval test on `[check_in, check_out]`: a checkout on the same
    /// day as the other stay's check-in counts.
    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in <= other.check_out() && other.check_in <= self.check_out()
    }

    /// Half-open test on `[check_in, check_out)`: the checkout day is free.
    pub fn overlaps_nights(&self, other: &Stay) -> bool {
        self.check_in < other.check_out() && other.check_in < self.check_out()
    }
}

/// A recorded reservation. Field names on the wire follow the public API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    #[serde(rename = "guestName")]
    pub guest_name: String,
    #[serde(rename = "unitID")]
    pub unit_id: String,
    #[serde(rename = "checkInDate")]
    pub check_in_date: NaiveDate,
    #[serde(rename = "numberOfNights")]
    pub number_of_nights: u32,
    #[serde(rename = "firstBookingId")]
    pub first_booking_id: Option<Ulid>,
    #[serde(rename = "previousBookingId")]
    pub previous_booking_id: Option<Ulid>,
    #[serde(rename = "nextBookingId")]
    pub next_booking_id: Option<Ulid>,
}

impl Booking {
    pub fn stay(&self) -> Stay {
        Stay {
            check_in: self.check_in_date,
            nights: self.number_of_nights,
        }
    }

    /// Id of the chain root; a booking without a recorded root is its own.
    pub fn root_id(&self) -> Ulid {
        self.first_booking_id.unwrap_or(self.id)
    }

    pub fn chain_state(&self) -> ChainState {
        match self.next_booking_id {
            Some(_) => ChainState::Linked,
            None => ChainState::Leaf,
        }
    }
}

/// Position of a booking in its extension chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// Current tail; may be extended.
    Leaf,
    /// Already extended. Terminal.
    Linked,
}

/// Fields for a booking about to be stored. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub guest_name: String,
    pub unit_id: String,
    pub stay: Stay,
    /// `None` makes the new booking the root of its own chain.
    pub first_booking_id: Option<Ulid>,
    pub previous_booking_id: Option<Ulid>,
}

impl NewBooking {
    pub fn into_booking(self, id: Ulid) -> Booking {
        Booking {
            id,
            guest_name: self.guest_name,
            unit_id: self.unit_id,
            check_in_date: self.stay.check_in,
            number_of_nights: self.stay.nights,
            first_booking_id: Some(self.first_booking_id.unwrap_or(id)),
            previous_booking_id: self.previous_booking_id,
            next_booking_id: None,
        }
    }
}

// ── Request types ────────────────────────────────────────────────

/// Body of a create request, as received. Validated into a `Proposal`.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    #[serde(rename = "guestName")]
    pub guest_name: String,
    #[serde(rename = "unitID")]
    pub unit_id: String,
    #[serde(rename = "checkInDate")]
    pub check_in_date: String,
    #[serde(rename = "numberOfNights")]
    pub number_of_nights: i64,
}

/// Body of an extend request: the new stay plus the booking it extends.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtendRequest {
    #[serde(flatten)]
    pub booking: BookingRequest,
    #[serde(rename = "bookingId")]
    pub booking_id: String,
}

/// A validated stay request, ready for conflict evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub guest_name: String,
    pub unit_id: String,
    pub stay: Stay,
}

impl Proposal {
    pub fn into_new_booking(self) -> NewBooking {
        NewBooking {
            guest_name: self.guest_name,
            unit_id: self.unit_id,
            stay: self.stay,
            first_booking_id: None,
            previous_booking_id: None,
        }
    }
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (date part taken as-is).
pub fn parse_check_in(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.date_naive())
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated {
        booking: Booking,
    },
    BookingLinked {
        id: Ulid,
        next_booking_id: Ulid,
    },
    /// New booking plus the forward link on `booking.previous_booking_id`,
    /// in a single record.
    BookingExtended {
        booking: Booking,
    },
}
