//! Worker threads that own a Win32 message queue.
//!
//! Low-level hooks and thread hotkeys are bound to the thread that installed
//! them and are only serviced while that thread pumps messages, so each one
//! gets a dedicated worker with an explicit start/stop contract.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver};
use tracing::{info, warn};
use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW, TranslateMessage, MSG,
    PM_NOREMOVE, WM_QUIT,
};

const READY_TIMEOUT: Duration = Duration::from_secs(2);

/// Thread-confined resource living on a pump worker.
pub trait PumpHandler {
    /// Every message pulled from the queue, before dispatch.
    fn on_message(&mut self, _msg: &MSG) {}

    /// Runs on the worker thread after the loop ends.
    fn teardown(self: Box<Self>);
}

pub struct PumpWorker {
    name: &'static str,
    thread_id: u32,
    done_rx: Receiver<()>,
    join: JoinHandle<()>,
}

impl PumpWorker {
    /// Spawns the worker and waits until `setup` has run on it.
    ///
    /// `setup` executes on the new thread; an error from it is returned here
    /// and the thread exits without pumping.
    pub fn spawn<F>(name: &'static str, setup: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn PumpHandler>> + Send + 'static,
    {
        let (ready_tx, ready_rx) = bounded::<Result<u32>>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut msg = MSG::default();
                // Force queue creation so PostThreadMessageW cannot miss us.
                unsafe {
                    let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
                }
                let thread_id = unsafe { GetCurrentThreadId() };

                let mut handler = match setup() {
                    Ok(h) => h,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(thread_id));

                loop {
                    let r = unsafe { GetMessageW(&mut msg, None, 0, 0) };
                    if r.0 <= 0 {
                        break;
                    }
                    handler.on_message(&msg);
                    unsafe {
                        let _ = TranslateMessage(&msg);
                        DispatchMessageW(&msg);
                    }
                }

                handler.teardown();
                let _ = done_tx.send(());
            })
            .with_context(|| format!("spawn {name}"))?;

        let thread_id = ready_rx
            .recv_timeout(READY_TIMEOUT)
            .map_err(|_| anyhow!("{name} did not signal readiness"))??;

        info!("{name} started thread_id={thread_id}");
        Ok(Self {
            name,
            thread_id,
            done_rx,
            join,
        })
    }

    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Posts `WM_QUIT` to the worker and waits up to `timeout` for it to
    /// finish its teardown. Returns `false` if it did not exit in time; the
    /// thread is then left detached.
    pub fn stop(self, timeout: Duration) -> bool {
        let posted = unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
        match posted {
            Ok(()) => info!("{} stop-posted thread_id={}", self.name, self.thread_id),
            Err(e) => warn!("{} stop-post-failed error={e}", self.name),
        }

        if self.done_rx.recv_timeout(timeout).is_ok() {
            let _ = self.join.join();
            true
        } else {
            warn!("{} did not exit within {:?}", self.name, timeout);
            false
        }
    }
}
