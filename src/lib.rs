//! flashbox: a log-structured flash cache simulator.
//!
//! Objects are packed by size class into fixed-capacity append-only boxes.
//! Sealed boxes live in a segmented hot/cold LRU, and a family of admission
//! policies decides which misses are worth spending flash writes on.
//!
//! Start from [`builder::EngineBuilder`] and feed requests to
//! [`engine::CacheEngine::request`].

pub mod admission;
pub mod builder;
pub mod ds;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod prelude;
pub mod size_class;
pub mod store;
pub mod trace;
