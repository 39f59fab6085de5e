pub mod ghost_cache;
pub mod intrusive_list;
pub mod slot_arena;

pub use ghost_cache::GhostCache;
pub use intrusive_list::IntrusiveList;
pub use slot_arena::{SlotArena, SlotId};
