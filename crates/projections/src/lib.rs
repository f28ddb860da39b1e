//! Read models over the table and order streams.
//!
//! - [`Projection`] trait for processing events into read models
//! - [`ReadModel`] trait for query access to denormalized data
//! - [`ProjectionProcessor`] for feeding events from the store to projections
//! - Views: the Kitchen Feed, the table floor board and the bill history

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition, decode};
pub use read_model::ReadModel;
pub use views::{
    BillHistoryView, ClosedBill, GroupSummary, HistoryFilter, KitchenFeedView, KitchenOrder,
    TableFloorView, TableStats, TableSummary,
};
