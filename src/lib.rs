//! taskmark library
//!
//! Reconciles checklist lines in markdown documents with a normalized task store.
//! This module exports the core components for testing and integration.

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod identity;
pub mod index;
pub mod logging;
pub mod outline;
pub mod parser;
pub mod record;
pub mod render;
pub mod store;
pub mod types;
pub mod vault;
