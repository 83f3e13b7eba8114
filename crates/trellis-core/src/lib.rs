//! # trellis-core
//!
//! Core abstractions shared across the trellis provisioning toolkit.
//!
//! This crate provides the foundational types used by every trellis component:
//!
//! - **Identifiers**: Strongly-typed, ULID-backed IDs for deployment runs
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization shared by every binary
//!
//! ## Crate Boundary
//!
//! `trellis-core` holds only cross-cutting primitives. Provisioning logic
//! lives in `trellis-provision`; user-facing surfaces live in `trellis-cli`.
//!
//! ## Example
//!
//! ```rust
//! use trellis_core::prelude::*;
//!
//! let deployment = DeploymentId::generate();
//! println!("run {deployment}");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use trellis_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::DeploymentId;
    pub use crate::observability::{LogFormat, init_logging};
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use id::DeploymentId;
pub use observability::{LogFormat, init_logging};
