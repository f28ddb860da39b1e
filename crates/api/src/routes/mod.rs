//! HTTP handlers, grouped by who calls them.

pub mod health;
pub mod kitchen;
pub mod metrics;
pub mod ops;
pub mod tables;
pub mod waiter;

use common::AggregateId;

use crate::error::ApiError;

fn parse_aggregate_id(id: &str) -> Result<AggregateId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(AggregateId::from(uuid))
}
