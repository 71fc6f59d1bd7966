//! Win+Alt+S opens the slider from anywhere.

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use tracing::{info, warn};
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    RegisterHotKey, UnregisterHotKey, MOD_ALT, MOD_NOREPEAT, MOD_WIN,
};
use windows::Win32::UI::WindowsAndMessaging::{MSG, WM_HOTKEY};

use crate::controller::UiCmd;
use crate::pump::{PumpHandler, PumpWorker};

const HOTKEY_ID: i32 = 0x5344;
const VK_S: u32 = b'S' as u32;
pub const HOTKEY_LABEL: &str = "Win+Alt+S";

struct SliderHotkey {
    tx: Sender<UiCmd>,
}

impl PumpHandler for SliderHotkey {
    fn on_message(&mut self, msg: &MSG) {
        // Thread hotkeys arrive with a null window.
        if msg.message == WM_HOTKEY && msg.wParam.0 as i32 == HOTKEY_ID {
            info!("hotkey pressed");
            let _ = self.tx.send(UiCmd::OpenSlider);
        }
    }

    fn teardown(self: Box<Self>) {
        if let Err(e) = unsafe { UnregisterHotKey(HWND(0), HOTKEY_ID) } {
            warn!("hotkey unregister-failed error={e}");
        }
    }
}

/// Starts the hotkey worker. Failure is reported and the app runs without
/// the shortcut.
pub fn start(tx: Sender<UiCmd>) -> Result<PumpWorker> {
    PumpWorker::spawn("hotkey-thread", move || {
        unsafe { RegisterHotKey(HWND(0), HOTKEY_ID, MOD_WIN | MOD_ALT | MOD_NOREPEAT, VK_S) }
            .with_context(|| format!("RegisterHotKey {HOTKEY_LABEL}"))?;
        info!("hotkey registered {HOTKEY_LABEL}");
        Ok(Box::new(SliderHotkey { tx }) as Box<dyn PumpHandler>)
    })
}
