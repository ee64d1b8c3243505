use ulid::Ulid;

use crate::storage::StoreError;

/// Why a proposal was refused. Expected business outcome, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    DuplicateGuestUnit,
    GuestAlreadyBooked,
    UnitOccupied,
}

impl ConflictKind {
    /// Client-facing reason text.
    pub fn reason(&self) -> &'static str {
        match self {
            ConflictKind::DuplicateGuestUnit => {
                "The given guest name cannot book the same unit multiple times"
            }
            ConflictKind::GuestAlreadyBooked => {
                "The same guest cannot be in multiple units at the same time"
            }
            ConflictKind::UnitOccupied => "For the given check-in date, the unit is already occupied",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConflictKind::DuplicateGuestUnit => "duplicate_guest_unit",
            ConflictKind::GuestAlreadyBooked => "guest_already_booked",
            ConflictKind::UnitOccupied => "unit_occupied",
        }
    }
}

#[derive(Debug)]
pub enum BookingError {
    InvalidInput(&'static str),
    Rejected(ConflictKind),
    /// Extension target does not exist.
    NotFound(Ulid),
    /// Extension target is not the tail of its chain.
    AlreadyExtended(Ulid),
    Store(StoreError),
}

impl BookingError {
    /// True for errors caused by the request rather than the service.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, BookingError::Store(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            BookingError::InvalidInput(_) => "invalid_input",
            BookingError::Rejected(kind) => kind.label(),
            BookingError::NotFound(_) => "not_found",
            BookingError::AlreadyExtended(_) => "already_extended",
            BookingError::Store(_) => "internal",
        }
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            BookingError::Rejected(kind) => f.write_str(kind.reason()),
            BookingError::NotFound(id) => write!(f, "booking not found: {id}"),
            BookingError::AlreadyExtended(id) => {
                write!(f, "booking {id} has already been extended; extend the latest booking in its chain")
            }
            BookingError::Store(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => BookingError::NotFound(id),
            StoreError::AlreadyLinked(id) => BookingError::AlreadyExtended(id),
            other => BookingError::Store(other),
        }
    }
}
