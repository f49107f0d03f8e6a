//! Database schema and initialization
//!
//! Owns the SQLite schema shared by Lumo services: curricula, content
//! items, position checkpoints, and the settings key-value store.

pub mod init;

pub use init::init_database;
