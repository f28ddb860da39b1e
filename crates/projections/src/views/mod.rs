//! Read model views.

pub mod bill_history;
pub mod kitchen_feed;
pub mod table_floor;

pub use bill_history::{BillHistoryView, ClosedBill, HistoryFilter};
pub use kitchen_feed::{KitchenFeedView, KitchenOrder};
pub use table_floor::{GroupSummary, TableFloorView, TableStats, TableSummary};
