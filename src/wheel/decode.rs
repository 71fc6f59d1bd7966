//! Wheel delta decoders, one per event source.
//!
//! Every decoder returns a signed delta in OS wheel units (120 per notch) or
//! `0` when the payload carries no usable wheel signal. None of them guess.

use std::mem::size_of;

pub const WHEEL_DELTA: i32 = 120;

pub const WM_MOUSEFIRST: u32 = 0x0200;
pub const WM_MOUSELAST: u32 = 0x020E;
pub const WM_MOUSEWHEEL: u32 = 0x020A;

const RIM_TYPEMOUSE: u32 = 0;
const RI_MOUSE_WHEEL: u16 = 0x0400;

#[inline]
pub fn signed_word(value: u32) -> i32 {
    (value & 0xFFFF) as u16 as i16 as i32
}

#[inline]
fn high_word(value: u32) -> i32 {
    signed_word(value >> 16)
}

#[inline]
fn is_notch_multiple(delta: i32) -> bool {
    delta != 0 && delta % WHEEL_DELTA == 0
}

/// Mouse message carried by a tray callback.
///
/// Legacy shells put the whole message in lParam; NOTIFYICON_VERSION_4 puts
/// it in the low word and the icon id in the high word.
pub fn notify_event_code(raw_lparam: u32) -> u32 {
    if (WM_MOUSEFIRST..=WM_MOUSELAST).contains(&raw_lparam) {
        return raw_lparam;
    }
    raw_lparam & 0xFFFF
}

pub fn is_mouse_message(code: u32) -> bool {
    (WM_MOUSEFIRST..=WM_MOUSELAST).contains(&code)
}

/// Shell-notify decoder.
///
/// Depending on shell version the callback's wParam either keeps the
/// standard `HIWORD = delta` layout or carries anchor coordinates, so the
/// high word of each field is only trusted when it is a whole number of
/// notches. wParam is tried first, then lParam.
pub fn notify_wheel_delta(raw_wparam: u32, raw_lparam: u32) -> i32 {
    let primary = high_word(raw_wparam);
    if is_notch_multiple(primary) {
        return primary;
    }

    let secondary = high_word(raw_lparam);
    if is_notch_multiple(secondary) {
        return secondary;
    }
    0
}

/// Anchor coordinates packed into a version-4 callback wParam.
pub fn notify_anchor(raw_wparam: u32) -> (i32, i32) {
    (signed_word(raw_wparam), signed_word(raw_wparam >> 16))
}

/// Low-level hook decoder: `MSLLHOOKSTRUCT::mouseData` keeps the delta in
/// its high word.
pub fn hook_wheel_delta(mouse_data: u32) -> i32 {
    high_word(mouse_data)
}

/// `RAWINPUTHEADER` as laid out by the OS for the running pointer width.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct RawInputHeader {
    pub dw_type: u32,
    pub dw_size: u32,
    pub h_device: usize,
    pub w_param: usize,
}

/// Leading part of `RAWMOUSE`. The button union is 4-byte aligned, hence
/// the explicit padding after `us_flags`.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct RawMouse {
    pub us_flags: u16,
    pub _align: u16,
    pub us_button_flags: u16,
    pub us_button_data: u16,
    pub ul_raw_buttons: u32,
    pub l_last_x: i32,
    pub l_last_y: i32,
    pub ul_extra_information: u32,
}

pub const RAW_INPUT_HEADER_SIZE: usize = size_of::<RawInputHeader>();

/// Raw-input decoder over the bytes returned by `GetRawInputData`.
///
/// The record must be a mouse record whose button flags report a wheel
/// movement; anything else (short buffer, keyboard/HID record, plain
/// motion) yields `0`.
pub fn raw_input_wheel_delta(record: &[u8]) -> i32 {
    let mouse_end = RAW_INPUT_HEADER_SIZE + size_of::<RawMouse>();
    if record.len() < mouse_end {
        return 0;
    }

    // SAFETY: length checked above; both structs are plain old data.
    let header: RawInputHeader =
        unsafe { std::ptr::read_unaligned(record.as_ptr() as *const RawInputHeader) };
    if header.dw_type != RIM_TYPEMOUSE {
        return 0;
    }

    let mouse: RawMouse = unsafe {
        std::ptr::read_unaligned(record[RAW_INPUT_HEADER_SIZE..].as_ptr() as *const RawMouse)
    };
    if mouse.us_button_flags & RI_MOUSE_WHEEL == 0 {
        return 0;
    }
    mouse.us_button_data as i16 as i32
}
