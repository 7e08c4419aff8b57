// Calendar / availability index for one property

use chrono::NaiveDate;
use uuid::Uuid;

use crate::pricing::models::DateRange;

/// Booked stays of a single property
///
/// Built from the property's active bookings; ranges are half-open so a
/// check-out day can be the next guest's check-in day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityIndex {
    property_id: Uuid,
    booked: Vec<DateRange>,
}

impl AvailabilityIndex {
    pub fn new(property_id: Uuid, mut booked: Vec<DateRange>) -> Self {
        booked.sort_by_key(|range| (range.check_in, range.check_out));
        Self {
            property_id,
            booked,
        }
    }

    pub fn property_id(&self) -> Uuid {
        self.property_id
    }

    pub fn booked(&self) -> &[DateRange] {
        &self.booked
    }

    /// Check whether `[check_in, check_out)` is free
    pub fn is_free(&self, stay: &DateRange) -> bool {
        self.first_conflict(stay).is_none()
    }

    /// First booked range that overlaps `stay`, if any
    pub fn first_conflict(&self, stay: &DateRange) -> Option<&DateRange> {
        self.booked
            .iter()
            .take_while(|range| range.check_in < stay.check_out)
            .find(|range| range.overlaps(stay))
    }

    /// Whether the night starting on `date` is taken
    pub fn is_night_booked(&self, date: NaiveDate) -> bool {
        self.booked
            .iter()
            .any(|range| range.check_in <= date && date < range.check_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(from: (i32, u32, u32), to: (i32, u32, u32)) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(from.0, from.1, from.2).unwrap(),
            NaiveDate::from_ymd_opt(to.0, to.1, to.2).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_index_is_free() {
        let index = AvailabilityIndex::new(Uuid::nil(), vec![]);
        assert!(index.is_free(&range((2025, 6, 1), (2025, 6, 5))));
    }

    #[test]
    fn test_back_to_back_stays_are_free() {
        let index = AvailabilityIndex::new(Uuid::nil(), vec![range((2025, 6, 1), (2025, 6, 5))]);
        assert!(index.is_free(&range((2025, 6, 5), (2025, 6, 8))));
        assert!(index.is_free(&range((2025, 5, 28), (2025, 6, 1))));
    }

    #[test]
    fn test_overlapping_stay_conflicts() {
        let booked = range((2025, 6, 10), (2025, 6, 12));
        let index = AvailabilityIndex::new(
            Uuid::nil(),
            vec![booked, range((2025, 6, 1), (2025, 6, 5))],
        );
        let stay = range((2025, 6, 4), (2025, 6, 11));
        assert!(!index.is_free(&stay));
        // Sorted, so the earliest booking is reported
        assert_eq!(index.first_conflict(&stay), Some(&range((2025, 6, 1), (2025, 6, 5))));
    }

    #[test]
    fn test_night_lookup() {
        let index = AvailabilityIndex::new(Uuid::nil(), vec![range((2025, 6, 1), (2025, 6, 3))]);
        assert!(index.is_night_booked(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()));
        assert!(!index.is_night_booked(NaiveDate::from_ymd_opt(2025, 6, 3).unwrap()));
    }
}
