use async_trait::async_trait;
use ulid::Ulid;

use crate::model::{Booking, NewBooking, Stay};

#[derive(Debug)]
pub enum StoreError {
    NotFound(Ulid),
    /// `next_booking_id` is already set on this booking.
    AlreadyLinked(Ulid),
    WalError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "booking not found: {id}"),
            StoreError::AlreadyLinked(id) => write!(f, "booking {id} already has a next link"),
            StoreError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Everything the booking core needs from persistence.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_by_guest_and_unit(
        &self,
        guest_name: &str,
        unit_id: &str,
    ) -> Result<Vec<Booking>, StoreError>;

    async fn find_by_guest(&self, guest_name: &str) -> Result<Vec<Booking>, StoreError>;

    /// Bookings on `unit_id` whose closed range `[check_in, check_out]`
    /// intersects `stay`, minus `exclude`. Callers needing a narrower rule
    /// filter the result.
    async fn find_by_unit_overlapping(
        &self,
        unit_id: &str,
        stay: &Stay,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Booking>, StoreError>;

    async fn create_booking(&self, fields: NewBooking) -> Result<Booking, StoreError>;

    async fn update_next_link(&self, id: Ulid, next_booking_id: Ulid) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Ulid) -> Result<Option<Booking>, StoreError>;

    /// Create `fields` and point `previous`'s next link at it.
    ///
    /// The default is two separate writes; a crash between them leaves the new
    /// booking without a forward link from `previous`. Stores that can commit
    /// both at once should override this.
    async fn create_linked_booking(
        &self,
        fields: NewBooking,
        previous: Ulid,
    ) -> Result<Booking, StoreError> {
        let booking = self.create_booking(fields).await?;
        self.update_next_link(previous, booking.id).await?;
        Ok(booking)
    }
}
