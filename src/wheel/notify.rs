//! Interception of the tray window's callback and "TaskbarCreated"
//! messages by subclassing its window procedure.

use std::sync::atomic::{AtomicIsize, Ordering};

use tracing::info;
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{CallWindowProcW, GWLP_WNDPROC, WM_INPUT, WNDPROC};

use super::{os, rawinput, subsystem, NotifyOutcome, WheelError};
use crate::tray;

static ORIG_PROC: AtomicIsize = AtomicIsize::new(0);

#[cfg(target_pointer_width = "64")]
unsafe fn current_wndproc(hwnd: HWND) -> isize {
    windows::Win32::UI::WindowsAndMessaging::GetWindowLongPtrW(hwnd, GWLP_WNDPROC)
}

#[cfg(target_pointer_width = "32")]
unsafe fn current_wndproc(hwnd: HWND) -> isize {
    windows::Win32::UI::WindowsAndMessaging::GetWindowLongW(hwnd, GWLP_WNDPROC) as isize
}

#[cfg(target_pointer_width = "64")]
unsafe fn swap_wndproc(hwnd: HWND, proc_ptr: isize) -> isize {
    windows::Win32::UI::WindowsAndMessaging::SetWindowLongPtrW(hwnd, GWLP_WNDPROC, proc_ptr)
}

#[cfg(target_pointer_width = "32")]
unsafe fn swap_wndproc(hwnd: HWND, proc_ptr: isize) -> isize {
    windows::Win32::UI::WindowsAndMessaging::SetWindowLongW(hwnd, GWLP_WNDPROC, proc_ptr as i32) as isize
}

/// Publishes the previous procedure into `slot` before swapping, so a
/// message arriving mid-install is still chained. Returns false (with
/// `slot` cleared) when either step fails.
fn chain_then_swap(
    slot: &AtomicIsize,
    read: impl FnOnce() -> isize,
    swap: impl FnOnce() -> isize,
) -> bool {
    let prev = read();
    if prev == 0 {
        return false;
    }
    slot.store(prev, Ordering::Release);
    if swap() == 0 {
        slot.store(0, Ordering::Release);
        return false;
    }
    true
}

fn is_installed() -> bool {
    ORIG_PROC.load(Ordering::Acquire) != 0
}

/// Installs the interceptor once; the previous procedure keeps receiving
/// everything that is not consumed here.
pub(super) fn install(hwnd: isize) -> Result<(), WheelError> {
    if is_installed() {
        info!("wheel-handlers already-installed");
        return Ok(());
    }

    #[allow(clippy::fn_to_numeric_cast)]
    let installed = chain_then_swap(
        &ORIG_PROC,
        || unsafe { current_wndproc(HWND(hwnd)) },
        || unsafe { swap_wndproc(HWND(hwnd), subclass_proc as isize) },
    );
    if !installed {
        return Err(WheelError::setup(
            "notify",
            windows::core::Error::from_win32(),
        ));
    }
    info!("wheel-handlers installed hwnd={hwnd:#x}");
    Ok(())
}

unsafe fn call_orig(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    // SAFETY: ORIG_PROC holds the WNDPROC returned by SetWindowLongPtrW.
    let orig: WNDPROC = std::mem::transmute(ORIG_PROC.load(Ordering::Acquire));
    CallWindowProcW(orig, hwnd, msg, wparam, lparam)
}

unsafe extern "system" fn subclass_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if let Some(ctx) = subsystem::context() {
        if msg == tray::WM_TRAYICON {
            let outcome = ctx.on_notify(wparam.0 as u32, lparam.0 as u32, os::cursor_pos());
            if outcome == NotifyOutcome::Consumed {
                return LRESULT(0);
            }
        } else if msg == WM_INPUT {
            ctx.on_raw_input(os::cursor_pos(), || rawinput::read_record(lparam));
            // DefWindowProc still has to see WM_INPUT to release the record.
        } else if msg == tray::taskbar_created_message() {
            ctx.on_taskbar_recreated();
            let r = call_orig(hwnd, msg, wparam, lparam);
            subsystem::schedule_rearm();
            return r;
        }
    }
    call_orig(hwnd, msg, wparam, lparam)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_proc_is_published_before_the_swap() {
        let slot = AtomicIsize::new(0);
        let ok = chain_then_swap(
            &slot,
            || 0x1000,
            || {
                assert_eq!(slot.load(Ordering::Acquire), 0x1000);
                0x1000
            },
        );
        assert!(ok);
        assert_eq!(slot.load(Ordering::Acquire), 0x1000);
    }

    #[test]
    fn failed_swap_clears_the_slot() {
        let slot = AtomicIsize::new(0);
        assert!(!chain_then_swap(&slot, || 0x1000, || 0));
        assert_eq!(slot.load(Ordering::Acquire), 0);

        let mut swapped = false;
        assert!(!chain_then_swap(&slot, || 0, || {
            swapped = true;
            1
        }));
        assert!(!swapped);
    }
}
