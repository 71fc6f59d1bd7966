//! Global low-level mouse hook on its own message-pump worker.

use anyhow::{Context, Result};
use tracing::{error, info};
use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, SetWindowsHookExW, UnhookWindowsHookEx, HC_ACTION, HHOOK, MSLLHOOKSTRUCT,
    WH_MOUSE_LL, WM_MOUSEWHEEL,
};

use super::{subsystem, WheelError};
use crate::pump::{PumpHandler, PumpWorker};

struct MouseHook {
    hook: HHOOK,
}

impl PumpHandler for MouseHook {
    fn teardown(self: Box<Self>) {
        // Same thread that installed it.
        match unsafe { UnhookWindowsHookEx(self.hook) } {
            Ok(()) => info!("wheel-llhook removed"),
            Err(e) => error!("wheel-llhook remove-failed error={e}"),
        }
    }
}

pub(super) fn start() -> Result<PumpWorker> {
    PumpWorker::spawn("wheel-hook-thread", || {
        let hinst = unsafe { GetModuleHandleW(None) }.context("GetModuleHandleW")?;
        let hook = unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(hook_proc), HINSTANCE(hinst.0), 0) }
            .map_err(|e| WheelError::setup("llhook", format!("winerr={e}")))?;
        info!("wheel-llhook installed");
        Ok(Box::new(MouseHook { hook }) as Box<dyn PumpHandler>)
    })
}

unsafe extern "system" fn hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code == HC_ACTION as i32 && w_param.0 as u32 == WM_MOUSEWHEEL {
        if let Some(ctx) = subsystem::context() {
            let info = &*(l_param.0 as *const MSLLHOOKSTRUCT);
            ctx.on_hook_wheel(info.pt.x, info.pt.y, info.mouseData);
        }
    }
    // Always pass the event on, wheel or not.
    CallNextHookEx(HHOOK(0), n_code, w_param, l_param)
}
