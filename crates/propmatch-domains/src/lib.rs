pub mod geo;
pub mod grouping;
pub mod snapshots;
pub mod store;

pub use grouping::resolver::{resolve_listing, Resolution};
pub use snapshots::rebuild_snapshot;
