//! Error types for camera injection.
//!
//! This module provides the error handling for the freelook injection engine.
//! All errors implement the `std::error::Error` trait and include structured
//! context for debugging and recovery guidance.
//!
//! ## Error Categories
//!
//! - **IPC Errors**: Failed read/write/status calls on the emulator channel
//! - **Title Errors**: Unsupported game/version combinations
//! - **Device Errors**: Input device open/read failures
//! - **Discovery Errors**: No usable input device could be located
//! - **Parse Errors**: Malformed event records or sysfs metadata
//! - **Config Errors**: Invalid chain or settings construction
//!
//! ## Recovery and Retry
//!
//! Errors provide a method to determine if they are recoverable:
//!
//! ```rust
//! use freelook::InjectorError;
//!
//! let error = InjectorError::ipc_failed("status", "emulator not reachable");
//! if error.is_retryable() {
//!     println!("Can retry this operation");
//! }
//! ```
//!
//! Note that pointer-chain resolution failures are deliberately *not* errors:
//! they are signaled through chain validity flags so the tick loop can skip a
//! frame and retry, without unwinding.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for injection operations.
pub type Result<T, E = InjectorError> = std::result::Result<T, E>;

/// Main error type for injection operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum InjectorError {
    #[error("IPC {op} failed: {reason}")]
    Ipc {
        op: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported title: {title_id} version {version}")]
    UnsupportedTitle { title_id: String, version: String },

    #[error("Input device error: {path}")]
    Device {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Device discovery failed: {reason}")]
    Discovery { reason: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Background task failed: {context}")]
    TaskFailure { context: String },
}

impl InjectorError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Transport and device faults are transient by design: the state machine
    /// collapses toward `Unconnected` or the reader backs off and reopens.
    /// Title and configuration faults are stable until the inputs change.
    pub fn is_retryable(&self) -> bool {
        match self {
            InjectorError::Ipc { .. } => true,
            InjectorError::Device { .. } => true,
            InjectorError::Discovery { .. } => true,
            InjectorError::Timeout { .. } => true,
            InjectorError::UnsupportedTitle { .. } => false,
            InjectorError::Parse { .. } => false,
            InjectorError::Config { .. } => false,
            InjectorError::TaskFailure { .. } => false,
        }
    }

    /// Helper constructor for IPC call failures.
    pub fn ipc_failed(op: impl Into<String>, reason: impl Into<String>) -> Self {
        InjectorError::Ipc { op: op.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for IPC call failures with an underlying source.
    pub fn ipc_failed_with_source(
        op: impl Into<String>,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        InjectorError::Ipc { op: op.into(), reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for unsupported `(title, version)` combinations.
    pub fn unsupported_title(title_id: impl Into<String>, version: impl Into<String>) -> Self {
        InjectorError::UnsupportedTitle { title_id: title_id.into(), version: version.into() }
    }

    /// Helper constructor for input device errors with path context.
    pub fn device_error(path: PathBuf, source: std::io::Error) -> Self {
        InjectorError::Device { path, source }
    }

    /// Helper constructor for device discovery failures.
    pub fn discovery_failed(reason: impl Into<String>) -> Self {
        InjectorError::Discovery { reason: reason.into() }
    }

    /// Helper constructor for parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        InjectorError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(reason: impl Into<String>) -> Self {
        InjectorError::Config { reason: reason.into() }
    }

    /// Helper constructor for background task failures.
    pub fn task_failure(context: impl Into<String>) -> Self {
        InjectorError::TaskFailure { context: context.into() }
    }
}

impl From<std::io::Error> for InjectorError {
    fn from(err: std::io::Error) -> Self {
        InjectorError::Device { path: PathBuf::from("<unknown>"), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[cfg(test)]
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_constructors_work_for_all_generated_variants(
            reason in ".*",
            op in "\\w+",
            duration_ms in 1u64..60000u64
          ) {
            // Test From<std::io::Error> conversion
            let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, reason.clone());
            let converted: InjectorError = io_err.into();
            match converted {
              InjectorError::Device { source, .. } => {
                prop_assert_eq!(source.to_string(), reason.clone());
              }
              _ => prop_assert!(false, "Expected Device error from io::Error conversion"),
            }

            // All variants should be constructible and display correctly
            let ipc_err = InjectorError::ipc_failed(op.clone(), reason.clone());
            let discovery_err = InjectorError::discovery_failed(reason.clone());
            let timeout_err = InjectorError::Timeout { duration: Duration::from_millis(duration_ms) };

            prop_assert!(!ipc_err.to_string().is_empty());
            prop_assert!(!discovery_err.to_string().is_empty());
            prop_assert!(!timeout_err.to_string().is_empty());
          }

          #[test]
          fn error_messages_contain_their_context(
            reason in ".*",
            title_id in "[A-Z0-9]{6}",
            version in "[0-9]\\.[0-9]",
            details in ".*"
          ) {
            let ipc_error = InjectorError::ipc_failed("read", reason.clone());
            let title_error = InjectorError::unsupported_title(title_id.clone(), version.clone());
            let parse_error = InjectorError::parse_error("input event", details.clone());

            prop_assert!(ipc_error.to_string().contains(&reason));

            let title_msg = title_error.to_string();
            prop_assert!(title_msg.contains(&title_id));
            prop_assert!(title_msg.contains(&version));

            prop_assert!(parse_error.to_string().contains(&details));
          }

          #[test]
          fn error_source_chaining_preserves_information(
            base_message in ".*",
            intermediate_reasons in prop::collection::vec(".*", 1..4)
          ) {
            let mut current_error: Box<dyn std::error::Error + Send + Sync> =
              Box::new(std::io::Error::other(base_message.clone()));

            for (i, reason) in intermediate_reasons.iter().enumerate() {
              current_error = Box::new(InjectorError::Ipc {
                op: "read".to_string(),
                reason: format!("Level {}: {}", i, reason),
                source: Some(current_error),
              });
            }

            let top_error = InjectorError::Ipc {
              op: "read".to_string(),
              reason: "Top level".to_string(),
              source: Some(current_error),
            };

            let mut traversed_count = 0;
            let mut current = std::error::Error::source(&top_error);
            let mut found_base_message = false;

            while let Some(source) = current {
              traversed_count += 1;
              if source.to_string().contains(&base_message) {
                found_base_message = true;
              }
              current = std::error::Error::source(source);
              if traversed_count > 10 {
                break;
              }
            }

            prop_assert_eq!(traversed_count, 1 + intermediate_reasons.len());
            prop_assert!(found_base_message, "Base message '{}' not found in chain", base_message);
          }
        }
    }

    #[test]
    fn error_constructors_validation() {
        let device_error = InjectorError::device_error(
            PathBuf::from("/dev/input/event3"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "test"),
        );
        assert!(matches!(device_error, InjectorError::Device { .. }));

        let ipc_error = InjectorError::ipc_failed("write", "test");
        assert!(matches!(ipc_error, InjectorError::Ipc { .. }));

        let title_error = InjectorError::unsupported_title("GZ2E01", "2.0");
        assert!(matches!(title_error, InjectorError::UnsupportedTitle { .. }));
    }

    #[test]
    fn error_traits_validation() {
        // Compile-time check: InjectorError must be Send + Sync + 'static
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<InjectorError>();

        let error = InjectorError::ipc_failed("status", "test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retryable_classification() {
        assert!(InjectorError::ipc_failed("read", "gone").is_retryable());
        assert!(
            InjectorError::device_error(
                PathBuf::from("/dev/input/event0"),
                std::io::Error::other("unplugged"),
            )
            .is_retryable()
        );
        assert!(InjectorError::discovery_failed("no pointer device").is_retryable());

        assert!(!InjectorError::unsupported_title("GZ2E01", "2.0").is_retryable());
        assert!(!InjectorError::config_error("empty offset list").is_retryable());
        assert!(!InjectorError::parse_error("sysfs", "bad hex").is_retryable());
    }
}
