//! Blocking device readers
//!
//! One worker per device, running on the blocking thread pool. Devices are
//! opened non-blocking and polled on a short interval so workers can notice
//! cancellation promptly; a read error other than "no data yet" is treated
//! as transient, logged, and answered by reopening the same path after a
//! backoff. Workers never escalate device trouble to the engine.

use std::fs::File;
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::Settings;
use crate::input::MotionAccumulator;
use crate::input::event::{EVENT_SIZE, RawEvent, REL_X, REL_Y};
use crate::input::HotkeyEvent;

/// Sleep between empty polls of a non-blocking device.
const POLL_INTERVAL: Duration = Duration::from_millis(2);
/// Sleep before reopening a device after a read or open failure.
const REOPEN_BACKOFF: Duration = Duration::from_millis(500);

/// Spawn the pointer worker: accumulates relative motion, and while remap
/// is active forwards remapped mouse-button presses as hotkey events.
pub(crate) fn spawn_pointer_worker(
    path: PathBuf,
    accumulator: Arc<MotionAccumulator>,
    remap_active: Arc<AtomicBool>,
    settings: watch::Receiver<Settings>,
    events: mpsc::Sender<HotkeyEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        run_worker(&path, &cancel, |ev| {
            if let Some((code, delta)) = ev.relative_motion() {
                match code {
                    REL_X => accumulator.add(delta, 0),
                    REL_Y => accumulator.add(0, delta),
                    _ => {}
                }
            } else if remap_active.load(Ordering::Relaxed)
                && let Some(code) = ev.key_press()
            {
                let hotkeys = settings.borrow().hotkeys.clone();
                if hotkeys.mouse_button_1 == Some(code) || hotkeys.mouse_button_2 == Some(code) {
                    send_event(&events, HotkeyEvent::MouseButton(code));
                }
            }
        });
        debug!(path = %path.display(), "pointer worker stopped");
    })
}

/// Spawn the keyboard worker: watches for the configured toggle key.
pub(crate) fn spawn_keyboard_worker(
    path: PathBuf,
    settings: watch::Receiver<Settings>,
    events: mpsc::Sender<HotkeyEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        run_worker(&path, &cancel, |ev| {
            if let Some(code) = ev.key_press()
                && settings.borrow().hotkeys.toggle == Some(code)
            {
                send_event(&events, HotkeyEvent::Toggle);
            }
        });
        debug!(path = %path.display(), "keyboard worker stopped");
    })
}

fn send_event(events: &mpsc::Sender<HotkeyEvent>, event: HotkeyEvent) {
    // Hotkey presses are edge events; if the channel is full the engine is
    // behind and dropping the press is the right call.
    if let Err(e) = events.try_send(event) {
        debug!(error = %e, "hotkey event dropped");
    }
}

/// Open-read-reopen loop shared by both workers. Returns only on
/// cancellation.
fn run_worker(path: &Path, cancel: &CancellationToken, mut handle_event: impl FnMut(RawEvent)) {
    let mut backlog = Vec::with_capacity(EVENT_SIZE * 4);

    'reopen: while !cancel.is_cancelled() {
        let mut file = match open_nonblocking(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot open input device, retrying");
                if sleep_cancellable(cancel, REOPEN_BACKOFF) {
                    break;
                }
                continue;
            }
        };
        debug!(path = %path.display(), "input device open");
        backlog.clear();

        let mut buf = [0u8; EVENT_SIZE * 8];
        loop {
            if cancel.is_cancelled() {
                break 'reopen;
            }
            match file.read(&mut buf) {
                Ok(0) => {
                    // Real device fds never return 0; fixture files do at
                    // end of data. Hold position and wait for more.
                    if sleep_cancellable(cancel, POLL_INTERVAL) {
                        break 'reopen;
                    }
                }
                Ok(n) => {
                    backlog.extend_from_slice(&buf[..n]);
                    drain_records(&mut backlog, &mut handle_event);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if sleep_cancellable(cancel, POLL_INTERVAL) {
                        break 'reopen;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "input read failed, reopening");
                    if sleep_cancellable(cancel, REOPEN_BACKOFF) {
                        break 'reopen;
                    }
                    continue 'reopen;
                }
            }
        }
    }
}

/// Decode every complete record in the backlog, keeping any tail bytes of a
/// partially read record for the next pass.
fn drain_records(backlog: &mut Vec<u8>, handle_event: &mut impl FnMut(RawEvent)) {
    let mut consumed = 0;
    while backlog.len() - consumed >= EVENT_SIZE {
        let record = &backlog[consumed..consumed + EVENT_SIZE];
        match RawEvent::parse(record) {
            Ok(ev) => handle_event(ev),
            Err(e) => trace!(error = %e, "discarding undecodable input record"),
        }
        consumed += EVENT_SIZE;
    }
    backlog.drain(..consumed);
}

fn open_nonblocking(path: &Path) -> std::io::Result<File> {
    std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

/// Sleep in short slices so cancellation is seen quickly. Returns true if
/// cancelled.
fn sleep_cancellable(cancel: &CancellationToken, total: Duration) -> bool {
    let slice = Duration::from_millis(10).min(total);
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if cancel.is_cancelled() {
            return true;
        }
        let nap = slice.min(remaining);
        std::thread::sleep(nap);
        remaining -= nap;
    }
    cancel.is_cancelled()
}
