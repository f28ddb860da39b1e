//! Table state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a physical table.
///
/// ```text
/// FREE ──► OCCUPIED ──► PENDING_COLLECTION ──► PAID ──► FREE
///  │                                                     ▲
///  └──► GROUPED ──────────── group closed ───────────────┘
///
/// FREE ◄──► RESERVED / MAINTENANCE   (administrative)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableState {
    #[default]
    Free,
    Occupied,
    PendingCollection,
    Paid,
    Reserved,
    Maintenance,
    /// Member of an open table group; the group carries the bill.
    Grouped,
}

impl TableState {
    /// Returns true if a bill is running on the table itself.
    pub fn has_open_bill(&self) -> bool {
        matches!(self, TableState::Occupied | TableState::PendingCollection)
    }

    /// Returns true if orders may be attached (directly or through a group).
    pub fn accepts_orders(&self) -> bool {
        matches!(
            self,
            TableState::Free
                | TableState::Occupied
                | TableState::PendingCollection
                | TableState::Grouped
        )
    }

    /// Returns true if an administrator may change the availability.
    pub fn is_administrative(&self) -> bool {
        matches!(
            self,
            TableState::Free | TableState::Reserved | TableState::Maintenance
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TableState::Free => "FREE",
            TableState::Occupied => "OCCUPIED",
            TableState::PendingCollection => "PENDING_COLLECTION",
            TableState::Paid => "PAID",
            TableState::Reserved => "RESERVED",
            TableState::Maintenance => "MAINTENANCE",
            TableState::Grouped => "GROUPED",
        }
    }

    /// Every state, in display order.
    pub fn all() -> [TableState; 7] {
        [
            TableState::Free,
            TableState::Occupied,
            TableState::PendingCollection,
            TableState::Paid,
            TableState::Reserved,
            TableState::Maintenance,
            TableState::Grouped,
        ]
    }
}

impl std::fmt::Display for TableState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_free() {
        assert_eq!(TableState::default(), TableState::Free);
    }

    #[test]
    fn reserved_and_maintenance_reject_orders() {
        assert!(!TableState::Reserved.accepts_orders());
        assert!(!TableState::Maintenance.accepts_orders());
        assert!(!TableState::Paid.accepts_orders());
        assert!(TableState::Free.accepts_orders());
        assert!(TableState::Grouped.accepts_orders());
    }

    #[test]
    fn open_bill_states() {
        assert!(TableState::Occupied.has_open_bill());
        assert!(TableState::PendingCollection.has_open_bill());
        assert!(!TableState::Grouped.has_open_bill());
        assert!(!TableState::Free.has_open_bill());
    }

    #[test]
    fn serializes_upper_snake_case() {
        let json = serde_json::to_string(&TableState::PendingCollection).unwrap();
        assert_eq!(json, "\"PENDING_COLLECTION\"");
        for state in TableState::all() {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }
}
