//! Repository layer: entity-scoped database operations.
//!
//! Free functions over a borrowed connection, one sub-module per entity.
//! All public functions are re-exported here.

mod failure;
mod keyword;
mod queue_item;
mod record;

pub use failure::*;
pub use keyword::*;
pub use queue_item::*;
pub use record::*;
