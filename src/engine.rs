//! Injection state machine and tick loop
//!
//! One task owns the IPC channel and everything derived from it. Each tick
//! it queries the emulator first, reconciles its state against the answer,
//! and only then injects pending motion. Every IPC failure is contained
//! here: the machine demotes itself and keeps ticking, reconnecting on a
//! slower cadence until the emulator answers again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::InjectorError;
use crate::config::Settings;
use crate::drivers::{self, GameDriver};
use crate::input::MotionAccumulator;
use crate::ipc::{EmuStatus, MemoryIpc};

/// Tick cadence while the emulator answers.
const TICK_CONNECTED: Duration = Duration::from_millis(5);
/// Reconnect poll cadence while it does not.
const TICK_DISCONNECTED: Duration = Duration::from_millis(500);

/// Where the machine currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionState {
    /// The emulator is not answering over IPC.
    Unconnected,
    /// The emulator answers but no driver is active (no title, or an
    /// unsupported one).
    Connected,
    /// A driver is active; injection is switched off.
    Ready,
    /// A driver is active and drained motion is being applied.
    Injecting,
}

/// Published once per tick (and on toggle) over a watch channel, so a front
/// end refreshes without polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: InjectionState,
    pub emu_status: Option<EmuStatus>,
    pub title_id: Option<String>,
    pub title_version: Option<String>,
}

impl StatusSnapshot {
    /// Whether the emulator is answering over IPC.
    pub fn connected(&self) -> bool {
        self.state != InjectionState::Unconnected
    }

    /// Whether drained motion is currently being applied.
    pub fn injecting(&self) -> bool {
        self.state == InjectionState::Injecting
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: InjectionState::Unconnected,
            emu_status: None,
            title_id: None,
            title_version: None,
        }
    }
}

/// Called with every contained fault. Transport, configuration, and device
/// faults are contained whether or not a hook is registered; only a fault
/// outside those classes is fatal without one, surfaced unmodified through
/// the task.
pub type FaultHook = Box<dyn Fn(&InjectorError) + Send + Sync>;

/// Result of spawning the engine task.
pub struct EngineChannels {
    /// Receiver for state snapshots.
    pub status: watch::Receiver<StatusSnapshot>,
    /// Cancellation token for graceful shutdown.
    pub cancel: CancellationToken,
    /// The tick task itself, for a bounded join on shutdown. Resolves to an
    /// error only when an unrecoverable fault surfaced with no hook
    /// registered to take it.
    pub task: JoinHandle<crate::Result<()>>,
}

/// Engine spawns and manages the injection tick task.
pub struct Engine;

impl Engine {
    /// Spawn the tick task over the given IPC channel.
    ///
    /// Toggle requests arrive on `toggles`; pressing them together with the
    /// hotkey path is the caller's wiring. `remap_active` is flipped when
    /// injection starts and stops.
    pub fn spawn<I>(
        ipc: I,
        accumulator: Arc<MotionAccumulator>,
        remap_active: Arc<AtomicBool>,
        settings: watch::Receiver<Settings>,
        toggles: mpsc::Receiver<()>,
        on_fault: Option<FaultHook>,
    ) -> EngineChannels
    where
        I: MemoryIpc,
    {
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
        let cancel = CancellationToken::new();

        let core = EngineCore {
            ipc,
            accumulator,
            remap_active,
            settings,
            on_fault,
            status_tx,
            driver: None,
            injecting: false,
            refused_title: None,
            snapshot: StatusSnapshot::default(),
        };

        let cancel_tick = cancel.clone();
        let task = tokio::spawn(tick_task(core, toggles, cancel_tick));

        EngineChannels { status: status_rx, cancel, task }
    }
}

async fn tick_task<I>(
    mut core: EngineCore<I>,
    mut toggles: mpsc::Receiver<()>,
    cancel: CancellationToken,
) -> crate::Result<()>
where
    I: MemoryIpc,
{
    info!("injection engine started");
    let result = tick_loop(&mut core, &mut toggles, &cancel).await;

    core.remap_active.store(false, Ordering::Relaxed);
    match &result {
        Ok(()) => info!("injection engine stopped"),
        Err(e) => tracing::error!(error = %e, "injection engine failed"),
    }
    result
}

async fn tick_loop<I>(
    core: &mut EngineCore<I>,
    toggles: &mut mpsc::Receiver<()>,
    cancel: &CancellationToken,
) -> crate::Result<()>
where
    I: MemoryIpc,
{
    // First contact attempt happens immediately, not after a full
    // disconnected interval.
    core.tick().await?;

    loop {
        let interval = if core.snapshot.state == InjectionState::Unconnected {
            TICK_DISCONNECTED
        } else {
            TICK_CONNECTED
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("injection engine cancelled");
                return Ok(());
            }
            request = toggles.recv() => match request {
                Some(()) => core.handle_toggle(),
                None => {
                    debug!("control channel closed, shutting down");
                    return Ok(());
                }
            },
            _ = tokio::time::sleep(interval) => core.tick().await?,
        }
    }
}

struct EngineCore<I> {
    ipc: I,
    accumulator: Arc<MotionAccumulator>,
    remap_active: Arc<AtomicBool>,
    settings: watch::Receiver<Settings>,
    on_fault: Option<FaultHook>,
    status_tx: watch::Sender<StatusSnapshot>,
    driver: Option<Box<dyn GameDriver>>,
    injecting: bool,
    /// Last (title, version) pair refused by the driver registry; faulted
    /// once, then skipped until the pair changes.
    refused_title: Option<(String, String)>,
    snapshot: StatusSnapshot,
}

impl<I> EngineCore<I>
where
    I: MemoryIpc,
{
    /// One pass of the machine: status first, then title and driver
    /// reconciliation, then injection. Errors escaping the tick body are
    /// routed through [`EngineCore::fault`]; an `Err` return means one fell
    /// outside the recoverable classes with no hook to take it.
    async fn tick(&mut self) -> crate::Result<()> {
        let status = match self.ipc.status().await {
            Ok(status) => status,
            Err(e) => {
                if self.snapshot.state != InjectionState::Unconnected {
                    warn!(error = %e, "lost the emulator, reconnecting on slow cadence");
                }
                self.deactivate();
                self.publish(StatusSnapshot::default());
                return self.fault(e);
            }
        };

        // A stopped title demotes an active driver; a paused one does not,
        // injection into paused memory is harmless and keeps the camera
        // responsive the instant the guest resumes.
        if status == EmuStatus::Shutdown {
            if self.driver.is_some() {
                info!("title shut down, dropping driver");
            }
            self.deactivate();
            self.publish(StatusSnapshot {
                state: InjectionState::Connected,
                emu_status: Some(status),
                ..StatusSnapshot::default()
            });
            return Ok(());
        }

        let (title_id, title_version) = match self.read_title().await {
            Ok(pair) => pair,
            Err(e) => {
                self.deactivate();
                self.publish(StatusSnapshot {
                    state: InjectionState::Connected,
                    emu_status: Some(status),
                    ..StatusSnapshot::default()
                });
                return self.fault(e);
            }
        };

        self.reconcile_driver(&title_id, &title_version)?;

        let settings = self.settings.borrow().clone();
        if let Some(driver) = self.driver.as_mut() {
            driver.set_sensitivity(settings.sensitivity);
        }

        let state = match (&self.driver, self.injecting) {
            (Some(_), true) => InjectionState::Injecting,
            (Some(_), false) => InjectionState::Ready,
            (None, _) => InjectionState::Connected,
        };
        self.publish(StatusSnapshot {
            state,
            emu_status: Some(status),
            title_id: Some(title_id),
            title_version: Some(title_version),
        });

        if state == InjectionState::Injecting {
            self.inject(&settings).await?;
        }
        Ok(())
    }

    async fn read_title(&mut self) -> crate::Result<(String, String)> {
        let id = self.ipc.title_id().await?;
        let version = self.ipc.title_version().await?;
        Ok((id, version))
    }

    /// Create or replace the driver to match what is running. Replacement
    /// on a title change does not demote the machine or reset the toggle.
    fn reconcile_driver(&mut self, title_id: &str, title_version: &str) -> crate::Result<()> {
        if let Some(driver) = &self.driver
            && driver.title_id() == title_id
            && driver.title_version() == title_version
        {
            return Ok(());
        }

        let pair = (title_id.to_string(), title_version.to_string());
        if self.refused_title.as_ref() == Some(&pair) {
            return Ok(());
        }

        let sensitivity = self.settings.borrow().sensitivity;
        match drivers::create_driver(title_id, title_version, sensitivity) {
            Ok(driver) => {
                info!(title_id, title_version, "driver active");
                self.driver = Some(driver);
                self.refused_title = None;
                Ok(())
            }
            Err(e) => {
                self.refused_title = Some(pair);
                self.deactivate();
                self.fault(e)
            }
        }
    }

    async fn inject(&mut self, settings: &Settings) -> crate::Result<()> {
        let (raw_dx, raw_dy) = self.accumulator.drain();
        if raw_dx == 0 && raw_dy == 0 {
            return Ok(());
        }

        // Inversion negates the raw delta before any scaling.
        let mut dx = raw_dx as f32;
        let mut dy = raw_dy as f32;
        if settings.invert_x {
            dx = -dx;
        }
        if settings.invert_y {
            dy = -dy;
        }
        trace!(raw_dx, raw_dy, "injecting drained motion");

        let result = match self.driver.as_mut() {
            Some(driver) => driver.update_camera(&mut self.ipc, dx, dy).await,
            None => return Ok(()),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(error = %e, "camera update failed, motion lost for this tick");
                self.fault(e)
            }
        }
    }

    /// Flip injection on or off. Entering injection discards whatever
    /// motion piled up while it was off, so the camera never jumps.
    fn handle_toggle(&mut self) {
        if self.driver.is_none() {
            debug!("toggle ignored, no active driver");
            return;
        }

        self.injecting = !self.injecting;
        if self.injecting {
            let (dx, dy) = self.accumulator.drain();
            trace!(dx, dy, "discarded motion backlog");
            self.remap_active.store(true, Ordering::Relaxed);
            info!("injection enabled");
        } else {
            self.remap_active.store(false, Ordering::Relaxed);
            info!("injection disabled");
        }

        // Publish immediately so front ends flip without waiting a tick.
        let mut next = self.snapshot.clone();
        next.state =
            if self.injecting { InjectionState::Injecting } else { InjectionState::Ready };
        self.publish(next);
    }

    /// Drop the driver and everything that only makes sense with one.
    fn deactivate(&mut self) {
        self.driver = None;
        self.injecting = false;
        self.remap_active.store(false, Ordering::Relaxed);
    }

    /// Publish unconditionally: the watch wakeup doubles as the per-tick
    /// update notification front ends refresh on.
    fn publish(&mut self, next: StatusSnapshot) {
        if next.state != self.snapshot.state {
            debug!(from = ?self.snapshot.state, to = ?next.state, "state change");
        }
        self.snapshot = next.clone();
        self.status_tx.send_replace(next);
    }

    /// Route a fault out of the tick body. Recoverable fault classes
    /// (transport, configuration, device) are always contained: a registered
    /// hook hears about them, the log does otherwise, and the loop keeps
    /// ticking either way. Anything outside those classes is fatal without a
    /// hook and surfaces through the task unmodified.
    fn fault(&self, error: InjectorError) -> crate::Result<()> {
        if let Some(hook) = &self.on_fault {
            hook(&error);
            return Ok(());
        }
        match &error {
            InjectorError::Ipc { .. }
            | InjectorError::UnsupportedTitle { .. }
            | InjectorError::Device { .. }
            | InjectorError::Discovery { .. }
            | InjectorError::Timeout { .. } => {
                warn!(error = %error, "fault contained, no hook registered");
                Ok(())
            }
            _ => Err(error),
        }
    }
}
