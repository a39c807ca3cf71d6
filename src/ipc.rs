//! Memory-IPC trait for the emulator channel
//!
//! The transport itself (socket, pipe, shared memory) is an external
//! collaborator; this trait is the seam the engine and game drivers are
//! written against. Implementations expose typed reads and writes at
//! absolute addresses inside the emulated console memory space, plus the
//! status and title-identity queries the state machine polls every tick.

use crate::Result;

/// Emulator status as reported by the IPC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmuStatus {
    /// A title is running.
    Running,
    /// Emulation is paused; the guest memory image is still valid.
    Paused,
    /// The guest has been shut down or is mid-reset; resolved titles and
    /// addresses must be discarded.
    Shutdown,
}

/// Trait for the emulator memory-IPC channel
///
/// All calls are synchronous per call and may fail. The handle is
/// single-owner: only the tick task touches it, so implementations need no
/// internal locking. Every failure must be mapped by the caller to the
/// state machine's disconnect path, never propagated as a crash.
///
/// Addresses are 32-bit: the emulated console memory space is, regardless
/// of the host.
#[async_trait::async_trait]
pub trait MemoryIpc: Send + 'static {
    /// Read a 32-bit unsigned value (a guest pointer) at `addr`.
    async fn read_u32(&mut self, addr: u32) -> Result<u32>;

    /// Read a 32-bit float at `addr`.
    async fn read_f32(&mut self, addr: u32) -> Result<f32>;

    /// Write a 32-bit float at `addr`.
    async fn write_f32(&mut self, addr: u32, value: f32) -> Result<()>;

    /// Query emulator status.
    ///
    /// An `Err` here means the channel itself is down (emulator gone), as
    /// opposed to `Ok(EmuStatus::Shutdown)` which means the channel is alive
    /// but no guest is running.
    async fn status(&mut self) -> Result<EmuStatus>;

    /// Identity of the running title (e.g. a six-character game code).
    async fn title_id(&mut self) -> Result<String>;

    /// Version string of the running title.
    async fn title_version(&mut self) -> Result<String>;
}
