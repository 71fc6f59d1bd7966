//! Lifetime of the three adapters: staged start-up, re-arm after an
//! Explorer restart, bounded shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::{llhook, notify, rawinput, WheelContext, WheelError};
use crate::pump::PumpWorker;
use crate::tray;

const NOTIFY_SETUP_DELAY: Duration = Duration::from_millis(900);
const NOTIFY_SETUP_RETRY: Duration = Duration::from_millis(700);
const HOOK_SETUP_DELAY: Duration = Duration::from_millis(1500);
const REARM_NOTIFY_DELAY: Duration = Duration::from_millis(1200);
const REARM_HOOK_DELAY: Duration = Duration::from_millis(1500);
const HOOK_JOIN_TIMEOUT: Duration = Duration::from_millis(1200);

struct Shared {
    ctx: Arc<WheelContext>,
    hook: Mutex<Option<PumpWorker>>,
    stopped: AtomicBool,
}

// Hook and window procedures get no user pointer.
static ACTIVE: OnceCell<Arc<Shared>> = OnceCell::new();

pub(super) fn context() -> Option<&'static WheelContext> {
    ACTIVE.get().map(|s| s.ctx.as_ref())
}

pub struct WheelSubsystem {
    shared: Arc<Shared>,
}

impl WheelSubsystem {
    /// Starts all adapters in the background. Only one subsystem may exist
    /// per process.
    pub fn start(ctx: Arc<WheelContext>) -> Result<Self, WheelError> {
        let shared = Arc::new(Shared {
            ctx,
            hook: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });
        ACTIVE
            .set(shared.clone())
            .map_err(|_| WheelError::setup("subsystem", "already started"))?;

        let setup = shared.clone();
        thread::Builder::new()
            .name("wheel-setup".into())
            .spawn(move || {
                let started = Instant::now();
                thread::sleep(NOTIFY_SETUP_DELAY);
                if let Some(hwnd) = wait_for_tray(&setup) {
                    arm_tray_adapters(&setup, hwnd);
                }
                let elapsed = started.elapsed();
                if elapsed < HOOK_SETUP_DELAY {
                    thread::sleep(HOOK_SETUP_DELAY - elapsed);
                }
                ensure_hook(&setup);
            })
            .map_err(|e| WheelError::setup("subsystem", e))?;

        Ok(Self { shared })
    }

    pub fn context(&self) -> &Arc<WheelContext> {
        &self.shared.ctx
    }

    /// Stops the hook worker. The tray-window adapters die with the window.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        if let Some(worker) = self.shared.hook.lock().take() {
            worker.stop(HOOK_JOIN_TIMEOUT);
        }
    }
}

fn wait_for_tray(shared: &Shared) -> Option<isize> {
    loop {
        if shared.stopped.load(Ordering::Acquire) {
            return None;
        }
        if let Some(hwnd) = shared.ctx.tray.get() {
            return Some(hwnd);
        }
        info!("wheel-setup tray-hwnd-missing retry");
        thread::sleep(NOTIFY_SETUP_RETRY);
    }
}

fn arm_tray_adapters(shared: &Shared, hwnd: isize) {
    let uids = shared.ctx.geometry.uid_candidates();
    info!(
        "wheel-setup tray-hwnd={hwnd:#x} tray-uid-candidates={:?} preferred={:?}",
        uids.try_order(),
        uids.preferred(),
    );

    if let Err(e) = notify::install(hwnd) {
        error!("wheel-handlers install-failed error={e}");
    }
    match tray::request_notify_version() {
        Ok(()) => info!("wheel-notify-version set v4"),
        Err(e) => warn!("wheel-notify-version set-failed error={e:#}"),
    }
    if let Err(e) = rawinput::register(hwnd) {
        error!("wheel-rawinput register-failed error={e}");
    }
}

fn ensure_hook(shared: &Shared) {
    if shared.stopped.load(Ordering::Acquire) {
        return;
    }
    let mut hook = shared.hook.lock();
    if hook.as_ref().is_some_and(PumpWorker::is_running) {
        info!("wheel-llhook already-running");
        return;
    }
    match llhook::start() {
        Ok(worker) => *hook = Some(worker),
        Err(e) => error!("wheel-llhook install-failed error={e:#}"),
    }
}

/// After "TaskbarCreated": the shell forgot our version request and raw
/// input registration may be stale.
pub(super) fn schedule_rearm() {
    let Some(shared) = ACTIVE.get().cloned() else {
        return;
    };
    let spawned = thread::Builder::new()
        .name("wheel-rearm".into())
        .spawn(move || {
            thread::sleep(REARM_NOTIFY_DELAY);
            if shared.stopped.load(Ordering::Acquire) {
                return;
            }
            if let Some(hwnd) = shared.ctx.tray.get() {
                arm_tray_adapters(&shared, hwnd);
            }
            thread::sleep(REARM_HOOK_DELAY - REARM_NOTIFY_DELAY);
            ensure_hook(&shared);
        });
    if let Err(e) = spawned {
        warn!("wheel-rearm spawn-failed error={e}");
    }
}
