//! Bill targets and outcomes shared by orders, groups and deferred payments.

use common::AggregateId;
use serde::{Deserialize, Serialize};

/// What a running bill is attached to: a single table or a table group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum BillRef {
    Table(AggregateId),
    Group(AggregateId),
}

impl BillRef {
    /// Returns the id of the table or group.
    pub fn id(&self) -> AggregateId {
        match self {
            BillRef::Table(id) | BillRef::Group(id) => *id,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, BillRef::Group(_))
    }
}

impl std::fmt::Display for BillRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillRef::Table(id) => write!(f, "table:{id}"),
            BillRef::Group(id) => write!(f, "group:{id}"),
        }
    }
}

/// How a bill was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillOutcome {
    Paid,
    Cancelled,
}

impl BillOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillOutcome::Paid => "PAID",
            BillOutcome::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for BillOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bill_ref_serializes_with_kind() {
        let id = AggregateId::new();
        let json = serde_json::to_value(BillRef::Group(id)).unwrap();
        assert_eq!(json["kind"], "group");
        assert_eq!(json["id"], id.to_string());

        let back: BillRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, BillRef::Group(id));
        assert!(back.is_group());
    }

    #[test]
    fn outcome_uses_upper_case_names() {
        assert_eq!(
            serde_json::to_string(&BillOutcome::Cancelled).unwrap(),
            "\"CANCELLED\""
        );
        assert_eq!(BillOutcome::Paid.to_string(), "PAID");
    }
}
