use crate::bookings::{error::BookingError, models::BookingStatus};

/// Authority over booking status transitions
pub struct StatusMachine;

impl StatusMachine {
    /// Check if a status transition is valid
    ///
    /// # Valid Transitions
    /// - PendingPayment → Confirmed, Cancelled
    /// - Confirmed → InStay, Cancelled
    /// - InStay → Completed, Cancelled, Disputed
    /// - Disputed → Completed, Cancelled (admin resolution)
    /// - Completed, Cancelled → nothing
    ///
    /// Same-status moves are rejected, so a repeated completion trigger
    /// fails instead of settling twice.
    pub fn is_valid_transition(from: BookingStatus, to: BookingStatus) -> bool {
        match (from, to) {
            // From PendingPayment
            (BookingStatus::PendingPayment, BookingStatus::Confirmed) => true,
            (BookingStatus::PendingPayment, BookingStatus::Cancelled) => true,

            // From Confirmed
            (BookingStatus::Confirmed, BookingStatus::InStay) => true,
            (BookingStatus::Confirmed, BookingStatus::Cancelled) => true,

            // From InStay
            (BookingStatus::InStay, BookingStatus::Completed) => true,
            (BookingStatus::InStay, BookingStatus::Cancelled) => true,
            (BookingStatus::InStay, BookingStatus::Disputed) => true,

            // From Disputed
            (BookingStatus::Disputed, BookingStatus::Completed) => true,
            (BookingStatus::Disputed, BookingStatus::Cancelled) => true,

            // Terminal
            (BookingStatus::Completed, _) => false,
            (BookingStatus::Cancelled, _) => false,

            _ => false,
        }
    }

    /// Attempt to transition from one status to another
    pub fn transition(from: BookingStatus, to: BookingStatus) -> Result<BookingStatus, BookingError> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(BookingError::InvalidTransition { from, to })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Happy path
    #[test]
    fn test_pending_payment_to_confirmed() {
        assert!(StatusMachine::is_valid_transition(
            BookingStatus::PendingPayment,
            BookingStatus::Confirmed
        ));
    }

    #[test]
    fn test_confirmed_to_in_stay() {
        assert!(StatusMachine::is_valid_transition(
            BookingStatus::Confirmed,
            BookingStatus::InStay
        ));
    }

    #[test]
    fn test_in_stay_to_completed() {
        assert!(StatusMachine::is_valid_transition(
            BookingStatus::InStay,
            BookingStatus::Completed
        ));
    }

    // Cancellation
    #[test]
    fn test_cancel_from_pending_confirmed_and_in_stay() {
        for from in [
            BookingStatus::PendingPayment,
            BookingStatus::Confirmed,
            BookingStatus::InStay,
        ] {
            assert!(StatusMachine::is_valid_transition(from, BookingStatus::Cancelled));
        }
    }

    // Disputes
    #[test]
    fn test_in_stay_to_disputed() {
        assert!(StatusMachine::is_valid_transition(
            BookingStatus::InStay,
            BookingStatus::Disputed
        ));
    }

    #[test]
    fn test_disputed_resolution() {
        assert!(StatusMachine::is_valid_transition(
            BookingStatus::Disputed,
            BookingStatus::Completed
        ));
        assert!(StatusMachine::is_valid_transition(
            BookingStatus::Disputed,
            BookingStatus::Cancelled
        ));
        assert!(!StatusMachine::is_valid_transition(
            BookingStatus::Disputed,
            BookingStatus::InStay
        ));
    }

    #[test]
    fn test_confirmed_cannot_be_disputed() {
        assert!(!StatusMachine::is_valid_transition(
            BookingStatus::Confirmed,
            BookingStatus::Disputed
        ));
    }

    // Terminal states
    #[test]
    fn test_completed_is_terminal() {
        for to in BookingStatus::ALL {
            assert!(!StatusMachine::is_valid_transition(BookingStatus::Completed, to));
        }
    }

    #[test]
    fn test_cancelled_is_terminal() {
        for to in BookingStatus::ALL {
            assert!(!StatusMachine::is_valid_transition(BookingStatus::Cancelled, to));
        }
    }

    // Skips and backward moves
    #[test]
    fn test_pending_payment_to_completed() {
        assert!(!StatusMachine::is_valid_transition(
            BookingStatus::PendingPayment,
            BookingStatus::Completed
        ));
    }

    #[test]
    fn test_confirmed_to_completed() {
        assert!(!StatusMachine::is_valid_transition(
            BookingStatus::Confirmed,
            BookingStatus::Completed
        ));
    }

    #[test]
    fn test_in_stay_to_confirmed() {
        assert!(!StatusMachine::is_valid_transition(
            BookingStatus::InStay,
            BookingStatus::Confirmed
        ));
    }

    // Same status is not a transition
    #[test]
    fn test_completed_to_completed_rejected() {
        let result = StatusMachine::transition(BookingStatus::Completed, BookingStatus::Completed);
        assert!(matches!(
            result,
            Err(BookingError::InvalidTransition {
                from: BookingStatus::Completed,
                to: BookingStatus::Completed
            })
        ));
    }

    #[test]
    fn test_transition_valid() {
        let result = StatusMachine::transition(BookingStatus::Confirmed, BookingStatus::InStay);
        assert_eq!(result.unwrap(), BookingStatus::InStay);
    }
}
