// src/storage/mod.rs
//! Result store implementations and file-backed catalog/cost collaborators.

pub mod file;
pub mod files;
pub mod memory;

pub use file::JsonFileStore;
pub use files::{JsonCatalogSource, JsonCostModelSource};
pub use memory::{MemoryResultStore, StoreState};
