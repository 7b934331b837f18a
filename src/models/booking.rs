use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Reservation lifecycle. Transitions are constrained by [`BookingStatus::can_transition_to`];
/// every persisted status change goes through the conditional-update guard in
/// `db::queries::transition_booking_status`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Closed transition table. `Cancelled` and `Completed` are terminal.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }
}

/// Lifecycle of the realtor's share of a booking's proceeds, independent of
/// booking status. Only progresses once the booking is confirmed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Released,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub property_id: String,
    pub guest_id: String,
    /// Guest email for receipts; not exposed in list responses elsewhere.
    pub guest_email: Option<String>,
    pub realtor_id: String,
    /// Check-in / check-out as Unix timestamps (midnight, property-local).
    pub check_in: i64,
    pub check_out: i64,
    pub status: BookingStatus,
    pub payout_status: PayoutStatus,
    /// When the escrow hold lapses and the payout becomes eligible.
    /// Set by the reconciler when the charge confirms.
    pub payout_release_at: Option<i64>,
    /// Realtor's share in minor currency units (cents/kobo).
    pub realtor_payout_minor: i64,
    /// ISO 4217, lowercase (e.g. "usd", "ngn").
    pub currency: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Data required to create a new booking (reservation flow itself is outside
/// this core; fixtures and the dev seed use this).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBooking {
    pub property_id: String,
    pub guest_id: String,
    pub guest_email: Option<String>,
    pub realtor_id: String,
    pub check_in: i64,
    pub check_out: i64,
    pub realtor_payout_minor: i64,
    pub currency: String,
}

/// Auxiliary fields applied atomically as part of a guarded status
/// transition, so a confirm and its payout-release date land in one update.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionExtras {
    pub payout_release_at: Option<i64>,
    pub payout_status: Option<PayoutStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use BookingStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Cancelled));

        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
        ] {
            let s = status.as_ref().to_string();
            assert_eq!(s.parse::<BookingStatus>().unwrap(), status);
        }
        assert_eq!(BookingStatus::Pending.as_ref(), "pending");
        assert_eq!(PayoutStatus::Released.as_ref(), "released");
    }
}
