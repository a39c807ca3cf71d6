//! Test support: a scriptable in-memory IPC channel
//!
//! [`MockIpc`] simulates the emulator side of the memory-IPC boundary with a
//! sparse 32-bit memory image, failure injection, and a controllable status,
//! so the resolver, drivers, and state machine can be exercised without an
//! emulator. It is compiled unconditionally so integration tests under
//! `tests/` can use it; it has no place in production wiring.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::ipc::{EmuStatus, MemoryIpc};
use crate::{InjectorError, Result};

#[derive(Debug)]
struct MockState {
    memory: HashMap<u32, u32>,
    status: EmuStatus,
    channel_down: bool,
    fail_reads: bool,
    writes_before_failure: Option<usize>,
    title_id: String,
    title_version: String,
    reads: usize,
    writes: usize,
}

/// Scriptable [`MemoryIpc`] implementation over a simulated memory image.
///
/// Clones share state, so a test can keep one handle as a controller while
/// the engine owns another: flipping status or failure flags mid-run is how
/// disconnects and shutdowns are scripted.
#[derive(Debug, Clone)]
pub struct MockIpc {
    state: Arc<Mutex<MockState>>,
}

impl MockIpc {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                memory: HashMap::new(),
                status: EmuStatus::Running,
                channel_down: false,
                fail_reads: false,
                writes_before_failure: None,
                title_id: "GZ2E01".to_string(),
                title_version: "1.0".to_string(),
                reads: 0,
                writes: 0,
            })),
        }
    }

    /// A second handle onto the same simulated emulator.
    pub fn handle(&self) -> Self {
        self.clone()
    }

    /// Place a guest pointer (or raw word) at `addr`.
    pub fn poke_u32(&self, addr: u32, value: u32) {
        self.state.lock().unwrap().memory.insert(addr, value);
    }

    /// Place a float at `addr`.
    pub fn poke_f32(&self, addr: u32, value: f32) {
        self.poke_u32(addr, value.to_bits());
    }

    /// Read back a word without going through the IPC surface.
    pub fn peek_u32(&self, addr: u32) -> Option<u32> {
        self.state.lock().unwrap().memory.get(&addr).copied()
    }

    /// Read back a float without going through the IPC surface.
    pub fn peek_f32(&self, addr: u32) -> Option<f32> {
        self.peek_u32(addr).map(f32::from_bits)
    }

    pub fn set_status(&self, status: EmuStatus) {
        self.state.lock().unwrap().status = status;
    }

    /// Make every IPC call fail, as if the emulator process died.
    pub fn set_channel_down(&self, down: bool) {
        self.state.lock().unwrap().channel_down = down;
    }

    pub fn fail_reads(&self) {
        self.state.lock().unwrap().fail_reads = true;
    }

    pub fn restore_reads(&self) {
        self.state.lock().unwrap().fail_reads = false;
    }

    /// Let `successes` more writes land, then fail every write after them.
    /// `fail_writes_after(0)` fails writes immediately.
    pub fn fail_writes_after(&self, successes: usize) {
        self.state.lock().unwrap().writes_before_failure = Some(successes);
    }

    pub fn set_title(&self, id: impl Into<String>, version: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.title_id = id.into();
        state.title_version = version.into();
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    /// Seed a consistent camera image matching the Twilight Princess pointer
    /// layout. Returns the yaw, yaw-target, and pitch field addresses.
    pub fn seed_camera_image(&self) -> (u32, u32, u32) {
        self.poke_u32(0x00AF_804C, 0x80A0_0000);
        self.poke_u32(0x80A0_0000 + 0x1EB8, 0x80B0_0000);
        self.poke_u32(0x80B0_0000 + 0x84, 0x80C0_0000);
        self.poke_u32(0x80C0_0000 + 0x34, 0x80D0_0000);
        self.poke_u32(0x80D0_0000 + 0x5B8, 0x80E0_0000);
        self.poke_u32(0x80E0_0000 + 0xC, 0x80F0_0000);

        let yaw = 0x80F0_0000 + 0x30;
        let yaw_target = 0x80F0_0000 + 0x34;
        let pitch = 0x80F0_0000 + 0x84C;
        self.poke_f32(yaw, 1.25);
        self.poke_f32(yaw_target, 1.25);
        self.poke_f32(pitch, -0.5);
        (yaw, yaw_target, pitch)
    }
}

impl Default for MockIpc {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MemoryIpc for MockIpc {
    async fn read_u32(&mut self, addr: u32) -> Result<u32> {
        let mut state = self.state.lock().unwrap();
        if state.channel_down || state.fail_reads {
            return Err(InjectorError::ipc_failed("read", "simulated read failure"));
        }
        state.reads += 1;
        state
            .memory
            .get(&addr)
            .copied()
            .ok_or_else(|| InjectorError::ipc_failed("read", format!("unmapped address {addr:#x}")))
    }

    async fn read_f32(&mut self, addr: u32) -> Result<f32> {
        self.read_u32(addr).await.map(f32::from_bits)
    }

    async fn write_f32(&mut self, addr: u32, value: f32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.channel_down {
            return Err(InjectorError::ipc_failed("write", "simulated write failure"));
        }
        if let Some(remaining) = state.writes_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(InjectorError::ipc_failed("write", "simulated write failure"));
            }
            *remaining -= 1;
        }
        state.writes += 1;
        state.memory.insert(addr, value.to_bits());
        Ok(())
    }

    async fn status(&mut self) -> Result<EmuStatus> {
        let state = self.state.lock().unwrap();
        if state.channel_down {
            return Err(InjectorError::ipc_failed("status", "emulator not reachable"));
        }
        Ok(state.status)
    }

    async fn title_id(&mut self) -> Result<String> {
        let state = self.state.lock().unwrap();
        if state.channel_down {
            return Err(InjectorError::ipc_failed("get_title_id", "emulator not reachable"));
        }
        Ok(state.title_id.clone())
    }

    async fn title_version(&mut self) -> Result<String> {
        let state = self.state.lock().unwrap();
        if state.channel_down {
            return Err(InjectorError::ipc_failed("get_title_version", "emulator not reachable"));
        }
        Ok(state.title_version.clone())
    }
}
