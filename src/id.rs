//! Prefixed ID generation for Villapay entities.
//!
//! All IDs use a `vp_` brand prefix to guarantee collision avoidance with
//! gateway identifiers (Stripe's `pi_`, `tr_`, `acct_`, Paystack's numeric
//! ids and `TRF_` codes).
//!
//! Format: `vp_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &[
    "vp_bkg_",
    "vp_pay_",
    "vp_rfq_",
    "vp_rfe_",
    "vp_rlt_",
    "vp_aud_",
];

/// Validate that a string is a valid Villapay prefixed ID.
///
/// Cheap format check to reject garbage before hitting the database.
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs in Villapay.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Booking,
    Payment,
    RefundRequest,
    RefundEntry,
    Realtor,
    AuditLog,
}

impl EntityType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Booking => "vp_bkg",
            Self::Payment => "vp_pay",
            Self::RefundRequest => "vp_rfq",
            Self::RefundEntry => "vp_rfe",
            Self::Realtor => "vp_rlt",
            Self::AuditLog => "vp_aud",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
