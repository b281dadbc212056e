//! Core abstractions shared by every primitive
//!
//! This module holds the error type, the cancellation value types,
//! scheduler configuration and the logging setup.

mod config;
mod error;
pub mod logging;
mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;
