pub mod item_ctx;
pub mod item_flow;
pub mod item_tracker;

pub use item_ctx::ItemCtx;
pub use item_flow::{Collaborators, ItemFlow};
pub use item_tracker::{BatchEvent, ItemTracker};
