//! Core types and traits for shoal
//!
//! This crate contains the fundamental types and error handling used throughout
//! the shoal project. It provides:
//!
//! - Common error types with [`Error`] and [`Result`]
//! - Configuration primitives like [`MemoryModel`], [`CounterKind`],
//!   [`BackOffKind`] and [`BitReversal`]
//!
//! # Example
//!
//! ```
//! use shoal_core::{MemoryModel, CounterKind};
//!
//! let model = MemoryModel::default();
//! assert_eq!(model, MemoryModel::RelaxedOrdering);
//! let counter = CounterKind::default();
//! assert_eq!(counter, CounterKind::Padded);
//! ```

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
