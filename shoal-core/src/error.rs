//! Error types for shoal
//!
//! This module defines the error types used throughout shoal.
//!
//! Hot-path outcomes ("key not found", "key already exists") are reported as
//! boolean results by the collection operations, never as errors. Only
//! construction-time misconfiguration and resource exhaustion reach the
//! caller through [`Error`].

use thiserror::Error;

/// The main error type for shoal operations
#[derive(Error, Debug)]
pub enum Error {
    /// The reclamation scheme cannot provide the number of guards an
    /// operation or constructor requires on this thread
    #[error("SMR guard budget exhausted: {needed} guards needed, {available} available")]
    GuardExhausted {
        /// Guards the failed operation required
        needed: usize,
        /// Guards the reclamation scheme could provide
        available: usize,
    },

    /// The dummy node pool cannot satisfy a bucket initialization
    #[error("bucket pool exhausted: all {0} dummy nodes in use")]
    BucketsExhausted(usize),

    /// An invalid combination of construction options was detected
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// A specialized Result type for shoal operations
pub type Result<T> = std::result::Result<T, Error>;
