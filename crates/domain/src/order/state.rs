//! Order state machine.

use serde::{Deserialize, Serialize};

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// RECEIVED ──► IN_PREPARATION ──► READY ──► DELIVERED
///     │               │              │          │
///     └───────────────┴──────────────┴──────────┴──► PENDING_PAYMENT | PAID | CANCELLED
/// ```
///
/// New items on a READY or DELIVERED order send it back to RECEIVED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    #[default]
    Received,
    InPreparation,
    Ready,
    Delivered,
    /// Bill marked "pay later"; still open.
    PendingPayment,
    Paid,
    Cancelled,
}

impl OrderState {
    /// Returns true if the order still contributes to its target's total.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Paid | OrderState::Cancelled)
    }

    /// Returns true if the kitchen still has work on the order.
    pub fn is_in_kitchen(&self) -> bool {
        matches!(self, OrderState::Received | OrderState::InPreparation)
    }

    /// Position along the kitchen track, None outside of it.
    pub fn kitchen_rank(&self) -> Option<u8> {
        match self {
            OrderState::Received => Some(0),
            OrderState::InPreparation => Some(1),
            OrderState::Ready => Some(2),
            OrderState::Delivered => Some(3),
            _ => None,
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Received => "RECEIVED",
            OrderState::InPreparation => "IN_PREPARATION",
            OrderState::Ready => "READY",
            OrderState::Delivered => "DELIVERED",
            OrderState::PendingPayment => "PENDING_PAYMENT",
            OrderState::Paid => "PAID",
            OrderState::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_received() {
        assert_eq!(OrderState::default(), OrderState::Received);
    }

    #[test]
    fn test_open_states() {
        assert!(OrderState::Received.is_open());
        assert!(OrderState::InPreparation.is_open());
        assert!(OrderState::Ready.is_open());
        assert!(OrderState::Delivered.is_open());
        assert!(OrderState::PendingPayment.is_open());
        assert!(!OrderState::Paid.is_open());
        assert!(!OrderState::Cancelled.is_open());
    }

    #[test]
    fn test_kitchen_states() {
        assert!(OrderState::Received.is_in_kitchen());
        assert!(OrderState::InPreparation.is_in_kitchen());
        assert!(!OrderState::Ready.is_in_kitchen());
        assert!(!OrderState::PendingPayment.is_in_kitchen());
    }

    #[test]
    fn test_kitchen_rank_is_ordered() {
        assert!(OrderState::Received.kitchen_rank() < OrderState::Ready.kitchen_rank());
        assert_eq!(OrderState::Paid.kitchen_rank(), None);
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&OrderState::InPreparation).unwrap();
        assert_eq!(json, "\"IN_PREPARATION\"");
        let back: OrderState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OrderState::InPreparation);
    }
}
