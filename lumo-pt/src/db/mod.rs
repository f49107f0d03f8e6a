//! Database access layer
//!
//! Typed access to the settings key-value store. Curriculum and
//! checkpoint access live behind their store ports (`curriculum`,
//! `cache`).

pub mod settings;
