//! Raw input capture
//!
//! Mouse motion is read straight from the input device layer rather than a
//! windowing toolkit, so it keeps arriving while an emulator window owns
//! focus. Discovered devices each get a blocking reader worker; motion
//! lands in a shared accumulator that the injection tick drains, and hotkey
//! presses are forwarded over a channel.

pub mod discovery;
pub mod event;
mod reader;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Settings;
use discovery::DiscoveredDevices;

/// How long to wait for reader workers to exit before giving up on them.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the hotkey notification channel.
const HOTKEY_CHANNEL_CAPACITY: usize = 16;

/// A hotkey press observed on a raw device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The configured injection-toggle key was pressed.
    Toggle,
    /// A remapped mouse button was pressed while remap was active; carries
    /// the keycode the button is mapped to.
    MouseButton(u16),
}

/// Integer motion counts gathered between injection ticks.
///
/// Readers add from blocking worker threads; the tick task drains. Draining
/// is atomic with respect to adds: a delta is counted exactly once.
#[derive(Debug, Default)]
pub struct MotionAccumulator {
    deltas: Mutex<(i32, i32)>,
}

impl MotionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one motion sample into the pending deltas.
    pub fn add(&self, dx: i32, dy: i32) {
        let mut pending = match self.deltas.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        pending.0 = pending.0.wrapping_add(dx);
        pending.1 = pending.1.wrapping_add(dy);
    }

    /// Take everything accumulated so far, leaving zero behind.
    pub fn drain(&self) -> (i32, i32) {
        let mut pending = match self.deltas.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *pending)
    }
}

/// Owner of the reader workers and their shared state.
pub struct InputCapture {
    accumulator: Arc<MotionAccumulator>,
    remap_active: Arc<AtomicBool>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl InputCapture {
    /// Discover devices on the standard paths and start capture.
    pub fn start(settings: watch::Receiver<Settings>) -> (Self, mpsc::Receiver<HotkeyEvent>) {
        Self::start_with_devices(discovery::discover(), settings)
    }

    /// Start capture over an explicit device set (tests use fixture files).
    pub fn start_with_devices(
        devices: DiscoveredDevices,
        settings: watch::Receiver<Settings>,
    ) -> (Self, mpsc::Receiver<HotkeyEvent>) {
        let accumulator = Arc::new(MotionAccumulator::new());
        let remap_active = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::channel(HOTKEY_CHANNEL_CAPACITY);

        let mut workers = Vec::new();
        if let Some(path) = devices.pointer {
            workers.push(reader::spawn_pointer_worker(
                path,
                Arc::clone(&accumulator),
                Arc::clone(&remap_active),
                settings.clone(),
                event_tx.clone(),
                cancel.clone(),
            ));
        }
        if let Some(path) = devices.keyboard {
            workers.push(reader::spawn_keyboard_worker(
                path,
                settings,
                event_tx,
                cancel.clone(),
            ));
        }
        info!(workers = workers.len(), "input capture started");

        (Self { accumulator, remap_active, cancel, workers }, event_rx)
    }

    /// Shared accumulator handle for the injection tick.
    pub fn accumulator(&self) -> Arc<MotionAccumulator> {
        Arc::clone(&self.accumulator)
    }

    /// Enable or disable mouse-button remap forwarding.
    pub fn set_remap_active(&self, active: bool) {
        self.remap_active.store(active, Ordering::Relaxed);
    }

    /// Shared remap flag, for wiring into whatever drives the injection
    /// toggle.
    pub fn remap_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.remap_active)
    }

    /// Stop the workers, waiting a bounded time for each to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for worker in self.workers {
            if tokio::time::timeout(WORKER_JOIN_TIMEOUT, worker).await.is_err() {
                warn!("input worker did not stop in time, detaching");
            }
        }
    }
}
