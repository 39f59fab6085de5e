pub mod box_store;

pub use box_store::{BoxId, BoxStore, CacheBox, Placement, SealedBoxes};
