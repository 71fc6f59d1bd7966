//! Direct OS queries used by the wheel adapters.

use std::mem::size_of;

use libloading::Library;
use tracing::{info, warn};
use windows::core::GUID;
use windows::Win32::Foundation::{HWND, POINT, RECT};
use windows::Win32::System::ProcessStatus::{
    GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS, PROCESS_MEMORY_COUNTERS_EX,
};
use windows::Win32::System::Threading::GetCurrentProcess;
use windows::Win32::UI::WindowsAndMessaging::GetCursorPos;

use super::geometry::{IconRectQuery, Rect};

type HRESULT = i32;

#[repr(C)]
struct NotifyIconIdentifier {
    cb_size: u32,
    hwnd: HWND,
    uid: u32,
    guid_item: GUID,
}

type PfnShellNotifyIconGetRect =
    unsafe extern "system" fn(*const NotifyIconIdentifier, *mut RECT) -> HRESULT;

/// `Shell_NotifyIconGetRect`, resolved at runtime since it only exists on
/// Windows 7 and later.
pub struct ShellIconRect {
    api: Option<(Library, PfnShellNotifyIconGetRect)>,
}

impl ShellIconRect {
    pub fn load() -> Self {
        let api = unsafe {
            Library::new("shell32.dll").ok().and_then(|lib| {
                let f = lib
                    .get::<PfnShellNotifyIconGetRect>(b"Shell_NotifyIconGetRect\0")
                    .ok()
                    .map(|s| *s)?;
                Some((lib, f))
            })
        };
        match api {
            Some(_) => info!("wheel-hit-test Shell_NotifyIconGetRect resolved"),
            None => warn!("wheel-hit-test Shell_NotifyIconGetRect unavailable"),
        }
        Self { api }
    }
}

impl IconRectQuery for ShellIconRect {
    fn is_available(&self) -> bool {
        self.api.is_some()
    }

    fn icon_rect(&self, hwnd: isize, uid: u32) -> Option<Rect> {
        let (_, get_rect) = self.api.as_ref()?;
        let nii = NotifyIconIdentifier {
            cb_size: size_of::<NotifyIconIdentifier>() as u32,
            hwnd: HWND(hwnd),
            uid,
            guid_item: GUID::zeroed(),
        };
        let mut rect = RECT::default();
        let hr = unsafe { get_rect(&nii, &mut rect) };
        (hr == 0).then(|| Rect::new(rect.left, rect.top, rect.right, rect.bottom))
    }
}

pub fn cursor_pos() -> Option<(i32, i32)> {
    let mut pt = POINT::default();
    unsafe { GetCursorPos(&mut pt) }.ok()?;
    Some((pt.x, pt.y))
}

pub fn private_mb() -> f64 {
    let mut counters = PROCESS_MEMORY_COUNTERS_EX {
        cb: size_of::<PROCESS_MEMORY_COUNTERS_EX>() as u32,
        ..Default::default()
    };
    let ok = unsafe {
        GetProcessMemoryInfo(
            GetCurrentProcess(),
            &mut counters as *mut PROCESS_MEMORY_COUNTERS_EX as *mut PROCESS_MEMORY_COUNTERS,
            counters.cb,
        )
    };
    match ok {
        Ok(()) => counters.PrivateUsage as f64 / (1024.0 * 1024.0),
        Err(_) => 0.0,
    }
}
