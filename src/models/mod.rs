//! Core data model: trees, detections, records, keywords, queue items.

pub mod detection;
pub mod enums;
pub mod failure;
pub mod keyword;
pub mod queue_item;
pub mod record;
pub mod tree;

pub use detection::*;
pub use enums::*;
pub use failure::*;
pub use keyword::*;
pub use queue_item::*;
pub use record::*;
pub use tree::*;
