//! # Sabre Platform
//!
//! Core types shared by the sabre record-builder crates.
//!
//! This crate provides the unified error type (`SabreError`, `SabreResult`)
//! that member crates convert their own errors into at the API boundary.
//!
//! # Examples
//!
//! ```
//! use sabre_platform::{SabreError, SabreResult};
//!
//! fn example_function() -> SabreResult<String> {
//!     Ok("Hello, sabre!".to_string())
//! }
//!
//! # fn main() -> SabreResult<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, sabre!");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;

pub use error::{SabreError, SabreResult};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
