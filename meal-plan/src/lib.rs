//! Deterministic weekly meal planning with shareable, synchronized overrides.

pub mod config;
pub mod display;
pub mod error;
pub mod plan;
pub mod share;
pub mod sync;
pub mod web;

pub use error::{Error, Result};
