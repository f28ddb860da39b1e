use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deterministic table identifiers.
const TABLE_NAMESPACE: Uuid = Uuid::from_u128(0x6d65_7361_2d74_6162_6c65_2d6e_732d_7631);

/// Unique identifier for an aggregate instance (table, order, group or
/// deferred payment record).
///
/// Wraps a UUID so aggregate IDs can't be mixed up with other UUID-based
/// identifiers such as product or server references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

impl AggregateId {
    /// Creates a new random aggregate ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an aggregate ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Derives the stable ID of a physical table from its natural key.
    ///
    /// The same `(restaurant, branch, number)` always yields the same ID, which
    /// makes table registration unique without a secondary index.
    pub fn for_table(scope: &TenantScope, number: TableNumber) -> Self {
        let name = format!("{}/{}/{}", scope.restaurant_id, scope.branch_id, number.0);
        Self(Uuid::new_v5(&TABLE_NAMESPACE, name.as_bytes()))
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<AggregateId> for Uuid {
    fn from(id: AggregateId) -> Self {
        id.0
    }
}

/// Restaurant and branch that own a table, group or bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    pub restaurant_id: i64,
    pub branch_id: i64,
}

impl TenantScope {
    pub fn new(restaurant_id: i64, branch_id: i64) -> Self {
        Self {
            restaurant_id,
            branch_id,
        }
    }
}

impl std::fmt::Display for TenantScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.restaurant_id, self.branch_id)
    }
}

/// Number painted on a physical table, unique within a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableNumber(pub u32);

impl std::fmt::Display for TableNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_id_new_creates_unique_ids() {
        let id1 = AggregateId::new();
        let id2 = AggregateId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn table_id_is_stable_for_the_same_natural_key() {
        let scope = TenantScope::new(1, 2);
        let a = AggregateId::for_table(&scope, TableNumber(5));
        let b = AggregateId::for_table(&scope, TableNumber(5));
        assert_eq!(a, b);
    }

    #[test]
    fn table_id_differs_across_branches_and_numbers() {
        let id = AggregateId::for_table(&TenantScope::new(1, 2), TableNumber(5));
        assert_ne!(
            id,
            AggregateId::for_table(&TenantScope::new(1, 3), TableNumber(5))
        );
        assert_ne!(
            id,
            AggregateId::for_table(&TenantScope::new(1, 2), TableNumber(6))
        );
    }

    #[test]
    fn aggregate_id_serializes_as_plain_uuid() {
        let id = AggregateId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }

    #[test]
    fn table_number_display() {
        assert_eq!(TableNumber(12).to_string(), "#12");
    }
}
