//! questlog-core: save/load persistence for a text-adventure session.
//!
//! A session is an ordered stack of interactive state frames plus a world
//! of cross-referencing entities. This crate turns both into a versioned,
//! self-describing JSON envelope and back, preserving shared references
//! and cycles, upgrading old saves, and degrading gracefully when part of
//! a save cannot be rebuilt.

pub mod config;
pub mod demo;
pub mod deserializer;
pub mod entity;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod migrate;
pub mod name_generator;
pub mod record;
pub mod registry;
pub mod rng;
pub mod serializer;
pub mod stack_codec;
pub mod storage;
pub mod store;
pub mod types;
pub mod world;

pub use config::StoreConfig;
pub use error::{PersistError, PersistResult};
pub use frame::{FrameState, StateStack};
pub use store::{LoadedSession, SaveStore};
pub use world::World;
