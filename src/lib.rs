//! Mouse-driven camera control for emulated titles.
//!
//! Freelook steers in-game cameras by writing orientation fields directly
//! into a running emulator's guest memory over an IPC channel, fed by raw
//! mouse motion captured at the input device layer.
//!
//! # Features
//!
//! - **Out-of-process**: no code runs inside the emulator; everything goes
//!   through typed memory reads and writes
//! - **Per-title drivers**: pointer-chain layouts and scaling live in one
//!   driver per supported game
//! - **Crash-tolerant**: emulator exits and title changes demote the state
//!   machine instead of erroring out, and it reconnects by itself
//! - **Raw capture**: motion keeps flowing while the emulator window owns
//!   keyboard and mouse focus
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use freelook::{Injector, Settings};
//! use freelook::test_utils::MockIpc;
//!
//! #[tokio::main]
//! async fn main() -> freelook::Result<()> {
//!     let mut handle = Injector::start(MockIpc::new(), Settings::default(), None);
//!
//!     handle.set_sensitivity(0.006);
//!     handle.toggle_injection().await?;
//!     println!("state: {:?}", handle.status().state);
//!
//!     handle.stop().await;
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod chain;
pub mod config;
mod error;
pub mod ipc;
pub mod test_utils;

// Injection pipeline
pub mod drivers;
pub mod engine;
pub mod input;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// Core exports
pub use chain::{PointerChain, ResolvedChain};
pub use config::{DEFAULT_SENSITIVITY, HotkeyTable, Settings, SettingsPublisher};
pub use drivers::GameDriver;
pub use engine::{Engine, EngineChannels, FaultHook, InjectionState, StatusSnapshot};
pub use error::*;
pub use input::{HotkeyEvent, InputCapture, MotionAccumulator};
pub use ipc::{EmuStatus, MemoryIpc};

/// How long shutdown waits for each spawned task before detaching it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the user-facing remapped-button channel.
const BUTTON_CHANNEL_CAPACITY: usize = 16;

/// Unified entry point: wires input capture, settings, and the injection
/// engine together over one IPC channel.
///
/// Front ends that need different wiring (their own capture source, no
/// hotkeys) can assemble the pieces directly; this factory is the common
/// case.
pub struct Injector;

impl Injector {
    /// Start the full pipeline with devices discovered on standard paths.
    ///
    /// Must be called within a tokio runtime. `on_fault` receives every
    /// contained error; without it, recoverable faults go to the log and
    /// only an unrecoverable engine fault is fatal.
    pub fn start<I>(ipc: I, settings: Settings, on_fault: Option<FaultHook>) -> InjectorHandle
    where
        I: MemoryIpc,
    {
        Self::start_with_devices(ipc, settings, input::discovery::discover(), on_fault)
    }

    /// Same as [`Injector::start`] but over an explicit device set.
    pub fn start_with_devices<I>(
        ipc: I,
        settings: Settings,
        devices: input::discovery::DiscoveredDevices,
        on_fault: Option<FaultHook>,
    ) -> InjectorHandle
    where
        I: MemoryIpc,
    {
        // Missing devices degrade capture, they do not stop the pipeline;
        // report the gap and carry on.
        let report = |error: InjectorError| match &on_fault {
            Some(hook) => hook(&error),
            None => warn!(error = %error, "starting with degraded capture"),
        };
        if devices.pointer.is_none() {
            report(InjectorError::discovery_failed("no usable pointer device"));
        }
        if devices.keyboard.is_none() {
            report(InjectorError::discovery_failed("no usable keyboard device"));
        }

        let (publisher, settings_rx) = SettingsPublisher::new(settings);
        let (capture, events) = InputCapture::start_with_devices(devices, settings_rx);
        Self::assemble(ipc, publisher, capture, events, on_fault)
    }

    fn assemble<I>(
        ipc: I,
        publisher: SettingsPublisher,
        capture: InputCapture,
        events: mpsc::Receiver<HotkeyEvent>,
        on_fault: Option<FaultHook>,
    ) -> InjectorHandle
    where
        I: MemoryIpc,
    {
        let (toggle_tx, toggle_rx) = mpsc::channel(4);
        let (button_tx, button_rx) = mpsc::channel(BUTTON_CHANNEL_CAPACITY);

        let channels = Engine::spawn(
            ipc,
            capture.accumulator(),
            capture.remap_handle(),
            publisher.subscribe(),
            toggle_rx,
            on_fault,
        );

        let router = tokio::spawn(route_hotkeys(events, toggle_tx.clone(), button_tx));

        InjectorHandle {
            publisher,
            toggle_tx,
            button_rx: Some(button_rx),
            status: channels.status,
            cancel: channels.cancel,
            engine_task: channels.task,
            router_task: router,
            capture,
        }
    }
}

/// Forward device hotkeys: the toggle key drives the engine, remapped mouse
/// buttons go to the front end.
async fn route_hotkeys(
    mut events: mpsc::Receiver<HotkeyEvent>,
    toggles: mpsc::Sender<()>,
    buttons: mpsc::Sender<u16>,
) {
    while let Some(event) = events.recv().await {
        match event {
            HotkeyEvent::Toggle => {
                if toggles.send(()).await.is_err() {
                    debug!("engine gone, dropping toggle press");
                }
            }
            HotkeyEvent::MouseButton(code) => {
                if buttons.try_send(code).is_err() {
                    debug!(code, "button receiver behind, dropping press");
                }
            }
        }
    }
    debug!("hotkey router stopped");
}

/// Running pipeline handle. Dropping it without [`InjectorHandle::stop`]
/// leaves the tasks running detached until the runtime shuts down.
pub struct InjectorHandle {
    publisher: SettingsPublisher,
    toggle_tx: mpsc::Sender<()>,
    button_rx: Option<mpsc::Receiver<u16>>,
    status: tokio::sync::watch::Receiver<StatusSnapshot>,
    cancel: CancellationToken,
    engine_task: JoinHandle<Result<()>>,
    router_task: JoinHandle<()>,
    capture: InputCapture,
}

impl InjectorHandle {
    /// Latest state snapshot.
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    /// Stream of state snapshots, starting from the current one.
    pub fn status_updates(&self) -> WatchStream<StatusSnapshot> {
        WatchStream::new(self.status.clone())
    }

    /// Request an injection toggle, same as pressing the hotkey.
    pub async fn toggle_injection(&self) -> Result<()> {
        self.toggle_tx
            .send(())
            .await
            .map_err(|_| InjectorError::task_failure("injection engine is not running"))
    }

    /// Receiver for remapped mouse-button presses. Takeable once.
    pub fn take_button_events(&mut self) -> Option<mpsc::Receiver<u16>> {
        self.button_rx.take()
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> Settings {
        self.publisher.current()
    }

    pub fn set_sensitivity(&self, sensitivity: f32) {
        self.publisher.set_sensitivity(sensitivity);
    }

    pub fn set_invert_x(&self, invert: bool) {
        self.publisher.set_invert_x(invert);
    }

    pub fn set_invert_y(&self, invert: bool) {
        self.publisher.set_invert_y(invert);
    }

    pub fn set_hide_cursor(&self, hide: bool) {
        self.publisher.set_hide_cursor(hide);
    }

    pub fn set_toggle_key(&self, keycode: Option<u16>) {
        self.publisher.set_toggle_key(keycode);
    }

    pub fn set_mouse_button_keys(&self, button_1: Option<u16>, button_2: Option<u16>) {
        self.publisher.set_mouse_button_keys(button_1, button_2);
    }

    /// Stop everything, waiting a bounded time for each task.
    pub async fn stop(self) {
        self.cancel.cancel();
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.engine_task).await {
            Ok(Ok(Err(e))) => warn!(error = %e, "engine had already failed"),
            Ok(Err(_)) => warn!("engine task panicked"),
            Err(_) => warn!("engine task did not stop in time, detaching"),
            Ok(Ok(Ok(()))) => {}
        }
        // Capture teardown drops the hotkey senders, which ends the router.
        self.capture.shutdown().await;
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.router_task).await.is_err() {
            warn!("hotkey router did not stop in time, detaching");
        }
    }
}
