//! Per-title game drivers
//!
//! A game driver binds one camera model to the pointer chains that locate
//! that title's live orientation fields. Drivers are keyed by
//! `(title id, title version)` and constructed through [`create_driver`];
//! an unsupported combination refuses to construct rather than injecting
//! against wrong offsets.

mod twilight;

pub use twilight::TwilightDriver;

use crate::ipc::MemoryIpc;
use crate::{InjectorError, Result};

/// Trait for per-title camera injection
///
/// `update_camera` must be a pure function of current orientation and scaled
/// deltas: read the live fields, add `delta * sensitivity`, write them back
/// in the order they were read. If the driver's chains do not verify this
/// tick, the call is a no-op — the camera is left untouched, not zeroed.
///
/// Axis inversion is the caller's concern (applied to the raw delta sign
/// before the driver sees it); sensitivity is the driver's. The two are
/// orthogonal and must not be conflated.
#[async_trait::async_trait]
pub trait GameDriver: Send + std::fmt::Debug {
    /// Apply one tick's accumulated motion to the title's camera.
    async fn update_camera(&mut self, ipc: &mut dyn MemoryIpc, dx: f32, dy: f32) -> Result<()>;

    /// Replace the sensitivity multiplier.
    fn set_sensitivity(&mut self, sensitivity: f32);

    /// Title id this driver was built for.
    fn title_id(&self) -> &str;

    /// Title version this driver was built for.
    fn title_version(&self) -> &str;
}

/// Construct the driver registered for `(title_id, title_version)`.
///
/// Returns [`InjectorError::UnsupportedTitle`] — a distinguishable outcome,
/// never a default no-op driver — when no driver recognizes the pair.
pub fn create_driver(
    title_id: &str,
    title_version: &str,
    sensitivity: f32,
) -> Result<Box<dyn GameDriver>> {
    match title_id {
        TwilightDriver::TITLE_ID => {
            Ok(Box::new(TwilightDriver::new(title_version, sensitivity)?))
        }
        _ => Err(InjectorError::unsupported_title(title_id, title_version)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_title_is_a_distinguishable_failure() {
        let err = create_driver("RMCE01", "1.0", 1.0).unwrap_err();
        assert!(matches!(err, InjectorError::UnsupportedTitle { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn known_title_with_wrong_version_refuses_construction() {
        let err = create_driver(TwilightDriver::TITLE_ID, "9.9", 1.0).unwrap_err();
        assert!(matches!(err, InjectorError::UnsupportedTitle { .. }));
    }

    #[test]
    fn known_title_and_version_constructs() {
        let driver = create_driver(TwilightDriver::TITLE_ID, "1.0", 1.0).unwrap();
        assert_eq!(driver.title_id(), TwilightDriver::TITLE_ID);
        assert_eq!(driver.title_version(), "1.0");
    }
}
