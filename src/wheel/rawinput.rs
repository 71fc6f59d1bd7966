//! Raw mouse input delivered to the tray window regardless of focus.

use std::ffi::c_void;
use std::mem::size_of;

use tracing::info;
use windows::Win32::Foundation::{HWND, LPARAM};
use windows::Win32::UI::Input::{
    GetRawInputData, RegisterRawInputDevices, HRAWINPUT, RAWINPUTDEVICE, RAWINPUTHEADER,
    RIDEV_INPUTSINK, RID_INPUT,
};

use super::WheelError;

const HID_USAGE_PAGE_GENERIC: u16 = 0x01;
const HID_USAGE_GENERIC_MOUSE: u16 = 0x02;

pub(super) fn register(hwnd: isize) -> Result<(), WheelError> {
    let rid = RAWINPUTDEVICE {
        usUsagePage: HID_USAGE_PAGE_GENERIC,
        usUsage: HID_USAGE_GENERIC_MOUSE,
        dwFlags: RIDEV_INPUTSINK,
        hwndTarget: HWND(hwnd),
    };
    unsafe { RegisterRawInputDevices(&[rid], size_of::<RAWINPUTDEVICE>() as u32) }
        .map_err(|e| WheelError::setup("rawinput", format!("hwnd={hwnd:#x} winerr={e}")))?;
    info!("wheel-rawinput registered hwnd={hwnd:#x}");
    Ok(())
}

/// Copies the `WM_INPUT` record: one call for the size, one for the data.
pub(super) fn read_record(lparam: LPARAM) -> Option<Vec<u8>> {
    let handle = HRAWINPUT(lparam.0);
    let header_size = size_of::<RAWINPUTHEADER>() as u32;

    let mut size = 0u32;
    let r = unsafe { GetRawInputData(handle, RID_INPUT, None, &mut size, header_size) };
    if r == u32::MAX || size == 0 {
        return None;
    }

    let mut buf = vec![0u8; size as usize];
    let written = unsafe {
        GetRawInputData(
            handle,
            RID_INPUT,
            Some(buf.as_mut_ptr() as *mut c_void),
            &mut size,
            header_size,
        )
    };
    if written == u32::MAX {
        return None;
    }
    buf.truncate(written as usize);
    Some(buf)
}
