//! Twilight Princess (GameCube) camera driver
//!
//! The worked example of the driver contract. The camera structure is heap
//! allocated by the guest and reached through a six-hop pointer walk from a
//! stable base. Its horizontal angle is stored as two coupled fields (the
//! live yaw and the follow-target yaw) that the game engine itself updates
//! non-atomically; both branch from a shared chain prefix, as does the
//! independent vertical angle.

use tracing::{debug, trace};

use super::GameDriver;
use crate::chain::{self, PointerChain};
use crate::ipc::MemoryIpc;
use crate::{InjectorError, Result};

/// Stable anchor into the guest's camera subsystem.
const CAMERA_BASE: u32 = 0x00AF_804C;

/// Hops shared by every camera field.
const PREFIX_OFFSETS: [u32; 5] = [0x1EB8, 0x84, 0x34, 0x5B8, 0xC];

/// Final offsets branching off the shared prefix.
const YAW_OFFSET: u32 = 0x30;
const YAW_TARGET_OFFSET: u32 = 0x34;
const PITCH_OFFSET: u32 = 0x84C;

/// Disc revisions these offsets are known to match.
const SUPPORTED_VERSIONS: [&str; 1] = ["1.0"];

/// Camera driver for Twilight Princess.
#[derive(Debug)]
pub struct TwilightDriver {
    version: String,
    yaw: PointerChain,
    yaw_target: PointerChain,
    pitch: PointerChain,
    sensitivity: f32,
}

impl TwilightDriver {
    /// Six-character GameCube game code (NTSC-U).
    pub const TITLE_ID: &'static str = "GZ2E01";

    /// Build the driver, refusing any disc revision the offsets were not
    /// taken from.
    pub fn new(title_version: &str, sensitivity: f32) -> Result<Self> {
        if !SUPPORTED_VERSIONS.contains(&title_version) {
            return Err(InjectorError::unsupported_title(Self::TITLE_ID, title_version));
        }

        // Offset lists are compile-time constants; construction cannot fail
        // past the version gate.
        let prefix = PointerChain::new(CAMERA_BASE, PREFIX_OFFSETS)?;
        Ok(Self {
            version: title_version.to_string(),
            yaw: prefix.extended(&[YAW_OFFSET]),
            yaw_target: prefix.extended(&[YAW_TARGET_OFFSET]),
            pitch: prefix.extended(&[PITCH_OFFSET]),
            sensitivity,
        })
    }
}

#[async_trait::async_trait]
impl GameDriver for TwilightDriver {
    async fn update_camera(&mut self, ipc: &mut dyn MemoryIpc, dx: f32, dy: f32) -> Result<()> {
        // Chains are re-resolved on every call: the guest relocates the
        // camera structure across area loads and cutscenes.
        let yaw = self.yaw.resolve(ipc).await;
        let yaw_target = self.yaw_target.resolve(ipc).await;
        let pitch = self.pitch.resolve(ipc).await;

        if !chain::verify(&[&yaw, &yaw_target, &pitch]) {
            debug!("camera chains did not verify, skipping this tick");
            return Ok(());
        }
        let (Some(yaw_addr), Some(yaw_target_addr), Some(pitch_addr)) =
            (yaw.address(), yaw_target.address(), pitch.address())
        else {
            return Ok(());
        };

        let dx = dx * self.sensitivity;
        let dy = dy * self.sensitivity;

        // Read all fields first, then write back in the same order they were
        // read. A concurrent guest read of one field but not the other is
        // only ever transiently inconsistent, matching how the game engine
        // updates these fields itself.
        let yaw_value = ipc.read_f32(yaw_addr).await?;
        let yaw_target_value = ipc.read_f32(yaw_target_addr).await?;
        let pitch_value = ipc.read_f32(pitch_addr).await?;

        trace!(
            yaw = yaw_value,
            pitch = pitch_value,
            dx,
            dy,
            "applying camera delta"
        );

        // Both horizontal components take the same scaled delta; the
        // vertical field is governed independently. No clamping: wrap and
        // range are the guest's concern.
        ipc.write_f32(yaw_addr, yaw_value + dx).await?;
        ipc.write_f32(yaw_target_addr, yaw_target_value + dx).await?;
        ipc.write_f32(pitch_addr, pitch_value + dy).await?;

        Ok(())
    }

    fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity;
    }

    fn title_id(&self) -> &str {
        Self::TITLE_ID
    }

    fn title_version(&self) -> &str {
        &self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockIpc;

    /// Lay out a consistent camera structure in the simulated memory image
    /// and return the three terminal field addresses.
    fn build_camera_image(ipc: &MockIpc) -> (u32, u32, u32) {
        ipc.poke_u32(CAMERA_BASE, 0x80A0_0000);
        ipc.poke_u32(0x80A0_0000 + 0x1EB8, 0x80B0_0000);
        ipc.poke_u32(0x80B0_0000 + 0x84, 0x80C0_0000);
        ipc.poke_u32(0x80C0_0000 + 0x34, 0x80D0_0000);
        ipc.poke_u32(0x80D0_0000 + 0x5B8, 0x80E0_0000);
        // Shared prefix terminal: one more dereference reaches the camera
        // structure all three fields live in.
        ipc.poke_u32(0x80E0_0000 + 0xC, 0x80F0_0000);

        let yaw = 0x80F0_0000 + YAW_OFFSET;
        let yaw_target = 0x80F0_0000 + YAW_TARGET_OFFSET;
        let pitch = 0x80F0_0000 + PITCH_OFFSET;
        ipc.poke_f32(yaw, 1.25);
        ipc.poke_f32(yaw_target, 1.25);
        ipc.poke_f32(pitch, -0.5);
        (yaw, yaw_target, pitch)
    }

    #[tokio::test]
    async fn applies_documented_delta_to_orientation_fields() {
        let mut ipc = MockIpc::new();
        let (yaw, yaw_target, pitch) = build_camera_image(&ipc);

        let mut driver = TwilightDriver::new("1.0", 1.0).unwrap();
        driver.update_camera(&mut ipc, 5.0, -3.0).await.unwrap();

        assert!((ipc.peek_f32(yaw).unwrap() - 6.25).abs() < 1e-5);
        assert!((ipc.peek_f32(yaw_target).unwrap() - 6.25).abs() < 1e-5);
        assert!((ipc.peek_f32(pitch).unwrap() - (-3.5)).abs() < 1e-5);
    }

    #[tokio::test]
    async fn zero_delta_leaves_memory_unchanged() {
        let mut ipc = MockIpc::new();
        let (yaw, yaw_target, pitch) = build_camera_image(&ipc);

        let mut driver = TwilightDriver::new("1.0", 0.87).unwrap();
        driver.update_camera(&mut ipc, 0.0, 0.0).await.unwrap();

        assert_eq!(ipc.peek_f32(yaw), Some(1.25));
        assert_eq!(ipc.peek_f32(yaw_target), Some(1.25));
        assert_eq!(ipc.peek_f32(pitch), Some(-0.5));
    }

    #[tokio::test]
    async fn sensitivity_scaling_is_linear() {
        let mut ipc_a = MockIpc::new();
        let (yaw_a, _, pitch_a) = build_camera_image(&ipc_a);
        let mut ipc_b = MockIpc::new();
        let (yaw_b, _, pitch_b) = build_camera_image(&ipc_b);

        // (dx, dy) at modifier m == (dx*k, dy*k) at modifier m/k
        let mut driver_a = TwilightDriver::new("1.0", 0.8).unwrap();
        driver_a.update_camera(&mut ipc_a, 10.0, 6.0).await.unwrap();

        let mut driver_b = TwilightDriver::new("1.0", 0.8 / 4.0).unwrap();
        driver_b.update_camera(&mut ipc_b, 40.0, 24.0).await.unwrap();

        let yaw_delta_a = ipc_a.peek_f32(yaw_a).unwrap() - 1.25;
        let yaw_delta_b = ipc_b.peek_f32(yaw_b).unwrap() - 1.25;
        assert!((yaw_delta_a - yaw_delta_b).abs() < 1e-5);

        let pitch_delta_a = ipc_a.peek_f32(pitch_a).unwrap() + 0.5;
        let pitch_delta_b = ipc_b.peek_f32(pitch_b).unwrap() + 0.5;
        assert!((pitch_delta_a - pitch_delta_b).abs() < 1e-5);
    }

    #[tokio::test]
    async fn unverified_chain_is_a_no_op_not_a_zeroing() {
        let mut ipc = MockIpc::new();
        let (yaw, _, _) = build_camera_image(&ipc);
        // Guest tore down the structure mid-walk.
        ipc.poke_u32(0x80C0_0000 + 0x34, 0);

        let mut driver = TwilightDriver::new("1.0", 1.0).unwrap();
        driver.update_camera(&mut ipc, 5.0, 5.0).await.unwrap();

        assert_eq!(ipc.write_count(), 0);
        assert_eq!(ipc.peek_f32(yaw), Some(1.25));
    }

    #[tokio::test]
    async fn write_failure_mid_update_surfaces_after_partial_write() {
        let mut ipc = MockIpc::new();
        let (yaw, yaw_target, pitch) = build_camera_image(&ipc);
        // First write lands, the rest fail, as when the emulator dies
        // between fields.
        ipc.fail_writes_after(1);

        let mut driver = TwilightDriver::new("1.0", 1.0).unwrap();
        let err = driver.update_camera(&mut ipc, 5.0, -3.0).await.unwrap_err();
        assert!(matches!(err, InjectorError::Ipc { .. }));

        // Yaw was already written; the remaining fields stayed untouched,
        // the same transient inconsistency a concurrent guest read can see.
        assert_eq!(ipc.write_count(), 1);
        assert!((ipc.peek_f32(yaw).unwrap() - 6.25).abs() < 1e-5);
        assert_eq!(ipc.peek_f32(yaw_target), Some(1.25));
        assert_eq!(ipc.peek_f32(pitch), Some(-0.5));
    }

    #[test]
    fn refuses_unknown_revision() {
        let err = TwilightDriver::new("2.0", 1.0).unwrap_err();
        assert!(matches!(err, InjectorError::UnsupportedTitle { .. }));
    }
}
