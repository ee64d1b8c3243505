use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;
use crate::storage::{BookingStore, StoreError};

#[derive(Debug, Clone, Copy)]
struct UnitEntry {
    check_in: NaiveDate,
    check_out: NaiveDate,
    id: Ulid,
}

/// Indexed in-memory booking set.
///
/// Serves as the ledger's working state and, on its own, as a non-durable
/// `BookingStore`.
pub struct InMemoryStore {
    bookings: DashMap<Ulid, Booking>,
    by_guest: DashMap<String, Vec<Ulid>>,
    /// Per unit, sorted by `check_in`.
    by_unit: DashMap<String, Vec<UnitEntry>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
            by_guest: DashMap::new(),
            by_unit: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    pub fn get(&self, id: &Ulid) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    /// Every booking, oldest id first.
    pub fn all_bookings(&self) -> Vec<Booking> {
        let mut all: Vec<Booking> = self.bookings.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|b| b.id);
        all
    }

    /// Insert or replace a booking and index it.
    pub fn insert(&self, booking: Booking) {
        let id = booking.id;
        let stay = booking.stay();
        let guest = booking.guest_name.clone();
        let unit = booking.unit_id.clone();
        if self.bookings.insert(id, booking).is_some() {
            return;
        }

        self.by_guest.entry(guest).or_default().push(id);

        let entry = UnitEntry {
            check_in: stay.check_in,
            check_out: stay.check_out(),
            id,
        };
        let mut unit_entries = self.by_unit.entry(unit).or_default();
        let pos = unit_entries.partition_point(|e| e.check_in <= entry.check_in);
        unit_entries.insert(pos, entry);
    }

    /// Fails if the booking is missing or was already extended.
    pub fn check_linkable(&self, id: &Ulid) -> Result<(), StoreError> {
        let booking = self.bookings.get(id).ok_or(StoreError::NotFound(*id))?;
        if booking.next_booking_id.is_some() {
            return Err(StoreError::AlreadyLinked(*id));
        }
        Ok(())
    }

    pub fn link_next(&self, id: Ulid, next_booking_id: Ulid) -> Result<(), StoreError> {
        let mut booking = self.bookings.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if booking.next_booking_id.is_some() {
            return Err(StoreError::AlreadyLinked(id));
        }
        booking.next_booking_id = Some(next_booking_id);
        Ok(())
    }

    fn collect(&self, ids: impl IntoIterator<Item = Ulid>) -> Vec<Booking> {
        let mut found: Vec<Booking> = ids.into_iter().filter_map(|id| self.get(&id)).collect();
        found.sort_by_key(|b| b.id);
        found
    }

    pub fn guest_bookings(&self, guest_name: &str) -> Vec<Booking> {
        let ids = self
            .by_guest
            .get(guest_name)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        self.collect(ids)
    }

    pub fn guest_unit_bookings(&self, guest_name: &str, unit_id: &str) -> Vec<Booking> {
        self.guest_bookings(guest_name)
            .into_iter()
            .filter(|b| b.unit_id == unit_id)
            .collect()
    }

    /// Bookings on `unit_id` whose closed range touches `stay`.
    /// Binary search skips entries checking in after `stay`'s checkout.
    pub fn unit_overlapping(&self, unit_id: &str, stay: &Stay, exclude: Option<Ulid>) -> Vec<Booking> {
        let query_out = stay.check_out();
        let ids: Vec<Ulid> = match self.by_unit.get(unit_id) {
            Some(entries) => {
                let right_bound = entries.partition_point(|e| e.check_in <= query_out);
                entries[..right_bound]
                    .iter()
                    .filter(|e| e.check_out >= stay.check_in)
                    .filter(|e| Some(e.id) != exclude)
                    .map(|e| e.id)
                    .collect()
            }
            None => Vec::new(),
        };
        self.collect(ids)
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, event: &Event) -> Result<(), StoreError> {
        match event {
            Event::BookingCreated { booking } => {
                self.insert(booking.clone());
                Ok(())
            }
            Event::BookingLinked { id, next_booking_id } => self.link_next(*id, *next_booking_id),
            Event::BookingExtended { booking } => {
                // Nothing is inserted unless the link can be made.
                if let Some(prev) = booking.previous_booking_id {
                    self.check_linkable(&prev)?;
                }
                self.insert(booking.clone());
                match booking.previous_booking_id {
                    Some(prev) => self.link_next(prev, booking.id),
                    None => Ok(()),
                }
            }
        }
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn find_by_guest_and_unit(
        &self,
        guest_name: &str,
        unit_id: &str,
    ) -> Result<Vec<Booking>, StoreError> {
        Ok(self.guest_unit_bookings(guest_name, unit_id))
    }

    async fn find_by_guest(&self, guest_name: &str) -> Result<Vec<Booking>, StoreError> {
        Ok(self.guest_bookings(guest_name))
    }

    async fn find_by_unit_overlapping(
        &self,
        unit_id: &str,
        stay: &Stay,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Booking>, StoreError> {
        Ok(self.unit_overlapping(unit_id, stay, exclude))
    }

    async fn create_booking(&self, fields: NewBooking) -> Result<Booking, StoreError> {
        let booking = fields.into_booking(Ulid::new());
        self.insert(booking.clone());
        Ok(booking)
    }

    async fn update_next_link(&self, id: Ulid, next_booking_id: Ulid) -> Result<(), StoreError> {
        self.link_next(id, next_booking_id)
    }

    async fn find_by_id(&self, id: Ulid) -> Result<Option<Booking>, StoreError> {
        Ok(self.get(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn fields(guest: &str, unit: &str, check_in: u32, nights: u32) -> NewBooking {
        NewBooking {
            guest_name: guest.into(),
            unit_id: unit.into(),
            stay: Stay::new(day(check_in), nights).unwrap(),
            first_booking_id: None,
            previous_booking_id: None,
        }
    }

    #[tokio::test]
    async fn guest_and_unit_lookups() {
        let store = InMemoryStore::new();
        let a1 = store.create_booking(fields("A", "1", 1, 3)).await.unwrap();
        store.create_booking(fields("B", "2", 1, 3)).await.unwrap();

        assert_eq!(store.find_by_guest("A").await.unwrap(), vec![a1.clone()]);
        assert_eq!(store.find_by_guest_and_unit("A", "1").await.unwrap(), vec![a1]);
        assert!(store.find_by_guest_and_unit("A", "2").await.unwrap().is_empty());
        assert!(store.find_by_guest("a").await.unwrap().is_empty()); // exact match
    }

    #[tokio::test]
    async fn unit_overlapping_is_closed_interval() {
        let store = InMemoryStore::new();
        // [1, 4] on unit 1
        let b = store.create_booking(fields("A", "1", 1, 3)).await.unwrap();

        let touching = Stay::new(day(4), 2).unwrap();
        let hits = store.find_by_unit_overlapping("1", &touching, None).await.unwrap();
        assert_eq!(hits, vec![b.clone()]);

        let before = Stay::new(day(10), 2).unwrap();
        assert!(store.find_by_unit_overlapping("1", &before, None).await.unwrap().is_empty());

        let other_unit = store.find_by_unit_overlapping("2", &touching, None).await.unwrap();
        assert!(other_unit.is_empty());

        let excluded = store.find_by_unit_overlapping("1", &touching, Some(b.id)).await.unwrap();
        assert!(excluded.is_empty());
    }

    #[tokio::test]
    async fn unit_index_stays_sorted() {
        let store = InMemoryStore::new();
        store.create_booking(fields("C", "1", 20, 2)).await.unwrap();
        store.create_booking(fields("A", "1", 1, 2)).await.unwrap();
        store.create_booking(fields("B", "1", 10, 2)).await.unwrap();

        let wide = Stay::new(day(1), 25).unwrap();
        let hits = store.unit_overlapping("1", &wide, None);
        assert_eq!(hits.len(), 3);

        // Only the middle booking touches [9, 12]
        let mid = Stay::new(day(9), 3).unwrap();
        let hits = store.unit_overlapping("1", &mid, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].guest_name, "B");
    }

    #[tokio::test]
    async fn link_next_only_once() {
        let store = InMemoryStore::new();
        let b = store.create_booking(fields("A", "1", 1, 2)).await.unwrap();
        let next = Ulid::new();

        store.update_next_link(b.id, next).await.unwrap();
        assert_eq!(store.get(&b.id).unwrap().next_booking_id, Some(next));

        let again = store.update_next_link(b.id, Ulid::new()).await;
        assert!(matches!(again, Err(StoreError::AlreadyLinked(_))));

        let missing = store.update_next_link(Ulid::new(), next).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn default_create_linked_sets_both_links() {
        let store = InMemoryStore::new();
        let root = store.create_booking(fields("A", "1", 1, 2)).await.unwrap();

        let mut ext = fields("A", "1", 5, 2);
        ext.previous_booking_id = Some(root.id);
        ext.first_booking_id = Some(root.id);
        let created = store.create_linked_booking(ext, root.id).await.unwrap();

        assert_eq!(created.previous_booking_id, Some(root.id));
        assert_eq!(created.first_booking_id, Some(root.id));
        assert_eq!(store.get(&root.id).unwrap().next_booking_id, Some(created.id));
    }

    #[test]
    fn apply_extended_event_links_previous() {
        let store = InMemoryStore::new();
        let root = fields("A", "1", 1, 2).into_booking(Ulid::new());
        store.apply_event(&Event::BookingCreated { booking: root.clone() }).unwrap();

        let mut ext = fields("A", "1", 5, 2);
        ext.previous_booking_id = Some(root.id);
        ext.first_booking_id = Some(root.id);
        let ext = ext.into_booking(Ulid::new());
        store.apply_event(&Event::BookingExtended { booking: ext.clone() }).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&root.id).unwrap().next_booking_id, Some(ext.id));
    }

    #[test]
    fn extended_event_on_linked_booking_inserts_nothing() {
        let store = InMemoryStore::new();
        let root = fields("A", "1", 1, 2).into_booking(Ulid::new());
        store.apply_event(&Event::BookingCreated { booking: root.clone() }).unwrap();

        let extension = |check_in| {
            let mut ext = fields("A", "1", check_in, 2);
            ext.previous_booking_id = Some(root.id);
            ext.first_booking_id = Some(root.id);
            ext.into_booking(Ulid::new())
        };
        let first = extension(5);
        store.apply_event(&Event::BookingExtended { booking: first.clone() }).unwrap();

        let second = extension(10);
        let result = store.apply_event(&Event::BookingExtended { booking: second.clone() });
        assert!(matches!(result, Err(StoreError::AlreadyLinked(id)) if id == root.id));
        assert_eq!(store.len(), 2);
        assert!(store.get(&second.id).is_none());
        assert!(store.guest_bookings("A").iter().all(|b| b.id != second.id));
        assert_eq!(store.get(&root.id).unwrap().next_booking_id, Some(first.id));
    }

    #[test]
    fn reinsert_does_not_duplicate_index() {
        let store = InMemoryStore::new();
        let b = fields("A", "1", 1, 2).into_booking(Ulid::new());
        store.insert(b.clone());
        store.insert(b.clone());
        assert_eq!(store.guest_bookings("A").len(), 1);
        assert_eq!(store.unit_overlapping("1", &b.stay(), None).len(), 1);
    }
}
