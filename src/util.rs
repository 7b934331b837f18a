//! Shared utility functions for the Villapay core.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{ActorType, AuditAction, AuditLog};

pub const SECONDS_PER_HOUR: i64 = 3600;

/// Render a minor-unit amount as a major-unit string with two decimals,
/// e.g. 150 -> "1.50", -2500 -> "-25.00". Presentation only; all arithmetic
/// stays in minor units.
pub fn format_major(minor: i64, divisor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs() as i64;
    format!("{}{}.{:02}", sign, abs / divisor, abs % divisor)
}

/// Builder for audit log entries.
///
/// # Example
/// ```ignore
/// AuditLogBuilder::new(&audit_conn, state.audit_log_enabled)
///     .actor(ActorType::Gateway, None)
///     .action(AuditAction::ConfirmBooking)
///     .entity("booking", &booking.id)
///     .details(&serde_json::json!({ "event_id": event_id }))
///     .save()?;
/// ```
pub struct AuditLogBuilder<'a> {
    conn: &'a Connection,
    enabled: bool,
    actor_type: ActorType,
    actor_id: Option<&'a str>,
    action: AuditAction,
    entity_type: &'a str,
    entity_id: &'a str,
    details: Option<&'a serde_json::Value>,
}

impl<'a> AuditLogBuilder<'a> {
    pub fn new(conn: &'a Connection, enabled: bool) -> Self {
        Self {
            conn,
            enabled,
            actor_type: ActorType::System,
            actor_id: None,
            action: AuditAction::ConfirmBooking, // Placeholder, should always be set
            entity_type: "",
            entity_id: "",
            details: None,
        }
    }

    pub fn actor(mut self, actor_type: ActorType, actor_id: Option<&'a str>) -> Self {
        self.actor_type = actor_type;
        self.actor_id = actor_id;
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = action;
        self
    }

    pub fn entity(mut self, entity_type: &'a str, entity_id: &'a str) -> Self {
        self.entity_type = entity_type;
        self.entity_id = entity_id;
        self
    }

    pub fn details(mut self, details: &'a serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn save(self) -> Result<AuditLog> {
        queries::create_audit_log(
            self.conn,
            self.enabled,
            self.actor_type,
            self.actor_id,
            self.action.as_ref(),
            self.entity_type,
            self.entity_id,
            self.details,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_major() {
        assert_eq!(format_major(150, 100), "1.50");
        assert_eq!(format_major(0, 100), "0.00");
        assert_eq!(format_major(5, 100), "0.05");
        assert_eq!(format_major(100000, 100), "1000.00");
        assert_eq!(format_major(-2500, 100), "-25.00");
        assert_eq!(format_major(99, 100), "0.99");
    }
}
