//! # Heapwalk Utilities
//!
//! Shared logging infrastructure for the Heapwalk workspace, built on
//! `tracing`.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{
    init_logging, init_logging_with, init_logging_with_level, LogFormat, LogLevel, LoggingConfig, LoggingError,
    LoggingGuard,
};
pub use tracing::{debug, error, info, trace, warn};
