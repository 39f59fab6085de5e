pub mod segmented_lru;

pub use segmented_lru::{QueuePosition, Segment, SegmentedEvictionQueue};
