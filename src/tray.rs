#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::mem::{size_of, zeroed};
use std::ptr::addr_of_mut;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::Sender;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{error, info, warn};
use widestring::U16CString;

use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, POINT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::{
    CreateBitmap, CreateDIBSection, DeleteObject, BITMAPINFO, BITMAPV5HEADER, BI_BITFIELDS,
    DIB_RGB_COLORS, HBITMAP, HDC, HGDIOBJ,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Shell::{
    Shell_NotifyIconW, NIF_ICON, NIF_MESSAGE, NIF_TIP, NIM_ADD, NIM_DELETE, NIM_SETVERSION,
    NOTIFYICONDATAW, NOTIFYICON_VERSION_4,
};
use windows::Win32::UI::WindowsAndMessaging::{
    AppendMenuW, CreateIconIndirect, CreatePopupMenu, CreateWindowExW, DefWindowProcW,
    DestroyIcon, DestroyMenu, DestroyWindow, DispatchMessageW, GetCursorPos, GetMessageW,
    PostMessageW, PostQuitMessage, RegisterClassW, RegisterWindowMessageW, SetForegroundWindow,
    TrackPopupMenu, TranslateMessage, HICON, HMENU, ICONINFO, MENU_ITEM_FLAGS, MF_CHECKED,
    MF_GRAYED, MF_SEPARATOR, MF_STRING, MSG, TPM_BOTTOMALIGN, TPM_RETURNCMD, TPM_RIGHTALIGN,
    TPM_RIGHTBUTTON, WM_CLOSE, WM_CONTEXTMENU, WM_DESTROY, WM_LBUTTONUP, WM_RBUTTONUP, WM_USER,
    WNDCLASSW, WS_OVERLAPPED,
};

use crate::controller::{UiCmd, ViewState};
use crate::hotkey::HOTKEY_LABEL;
use crate::settings::Theme;
use crate::theme;
use crate::wheel::decode::notify_event_code;
use crate::wheel::TrayWindow;

/// Fixed identifier of our notification icon.
pub const TRAY_ICON_UID: u32 = 1;
pub const WM_TRAYICON: u32 = WM_USER + 0x42;
const TOOLTIP: &str = "HDR SDR Brightness";
const ICON_SIZE: u32 = 32;

const ID_OPEN_SLIDER: u32 = 1001;
const ID_APPLY_NOW: u32 = 1002;
const ID_AUTO: u32 = 1003;
const ID_STARTUP: u32 = 1004;
const ID_THEME_LIGHT: u32 = 1005;
const ID_THEME_DARK: u32 = 1006;
const ID_HOTKEY_INFO: u32 = 1007;
const ID_EDIT_SCHEDULE: u32 = 1008;
const ID_QUIT: u32 = 1009;

struct TrayState {
    tx_ui: Sender<UiCmd>,
    nid: NOTIFYICONDATAW,
    view: Option<ViewState>,
}

static TRAY_STATE: OnceCell<Mutex<TrayState>> = OnceCell::new();
static TASKBAR_CREATED: OnceCell<u32> = OnceCell::new();
/// Version-4 shells send WM_CONTEXTMENU after WM_RBUTTONUP.
static NOTIFY_V4: AtomicBool = AtomicBool::new(false);

/// Message id Explorer broadcasts after it restarts.
pub fn taskbar_created_message() -> u32 {
    *TASKBAR_CREATED.get_or_init(|| unsafe { RegisterWindowMessageW(w!("TaskbarCreated")) })
}

/// Asks the shell for version-4 callbacks (event code in the low word of
/// lParam, anchor point in wParam).
pub fn request_notify_version() -> Result<()> {
    let lock = TRAY_STATE.get().ok_or_else(|| anyhow!("tray not created"))?;
    let mut nid = lock.lock().nid;
    nid.Anonymous.uVersion = NOTIFYICON_VERSION_4;
    if !unsafe { Shell_NotifyIconW(NIM_SETVERSION, &mut nid) }.as_bool() {
        NOTIFY_V4.store(false, Ordering::Release);
        bail!("NIM_SETVERSION rejected");
    }
    NOTIFY_V4.store(true, Ordering::Release);
    Ok(())
}

/// Keeps the menu's checkmarks in step with the controller.
pub fn update_menu_state(view: ViewState) {
    if let Some(lock) = TRAY_STATE.get() {
        lock.lock().view = Some(view);
    }
}

/// Removes the icon and ends the tray thread.
pub fn remove_icon() {
    let Some(lock) = TRAY_STATE.get() else {
        return;
    };
    let hwnd = lock.lock().nid.hWnd;
    if let Err(e) = unsafe { PostMessageW(hwnd, WM_CLOSE, WPARAM(0), LPARAM(0)) } {
        warn!("tray close-post-failed error={e}");
    }
}

fn add_icon(nid: &mut NOTIFYICONDATAW) -> bool {
    unsafe { Shell_NotifyIconW(NIM_ADD, nid) }.as_bool()
}

fn send(cmd: UiCmd) {
    if let Some(lock) = TRAY_STATE.get() {
        let _ = lock.lock().tx_ui.send(cmd);
    }
}

unsafe fn create_sun_icon() -> Result<HICON> {
    let mut hdr: BITMAPV5HEADER = zeroed();
    hdr.bV5Size = size_of::<BITMAPV5HEADER>() as u32;
    hdr.bV5Width = ICON_SIZE as i32;
    // Negative height: top-down rows.
    hdr.bV5Height = -(ICON_SIZE as i32);
    hdr.bV5Planes = 1;
    hdr.bV5BitCount = 32;
    hdr.bV5Compression = BI_BITFIELDS;
    hdr.bV5RedMask = 0x00FF_0000;
    hdr.bV5GreenMask = 0x0000_FF00;
    hdr.bV5BlueMask = 0x0000_00FF;
    hdr.bV5AlphaMask = 0xFF00_0000;

    let mut bits: *mut std::ffi::c_void = std::ptr::null_mut();
    let color = CreateDIBSection(
        HDC(0),
        &hdr as *const _ as *const BITMAPINFO,
        DIB_RGB_COLORS,
        &mut bits,
        None,
        0,
    )
    .context("CreateDIBSection")?;
    if bits.is_null() {
        let _ = DeleteObject(HGDIOBJ(color.0));
        bail!("CreateDIBSection returned no pixels");
    }
    let pixels = theme::sun_icon_argb(ICON_SIZE, theme::SUN);
    std::ptr::copy_nonoverlapping(pixels.as_ptr(), bits as *mut u32, pixels.len());

    let mask = CreateBitmap(ICON_SIZE as i32, ICON_SIZE as i32, 1, 1, None);
    let info = ICONINFO {
        fIcon: true.into(),
        xHotspot: 0,
        yHotspot: 0,
        hbmMask: HBITMAP(mask.0),
        hbmColor: HBITMAP(color.0),
    };
    let icon = CreateIconIndirect(&info);
    // The icon keeps its own copies.
    let _ = DeleteObject(HGDIOBJ(color.0));
    let _ = DeleteObject(HGDIOBJ(mask.0));
    icon.context("CreateIconIndirect")
}

unsafe fn append(menu: HMENU, flags: MENU_ITEM_FLAGS, id: u32, label: &str) {
    let label = U16CString::from_str_truncate(label);
    let _ = AppendMenuW(menu, flags, id as usize, PCWSTR(label.as_ptr()));
}

fn checked(on: bool) -> MENU_ITEM_FLAGS {
    if on {
        MF_STRING | MF_CHECKED
    } else {
        MF_STRING
    }
}

unsafe fn show_menu(hwnd: HWND) {
    let view = TRAY_STATE.get().and_then(|l| l.lock().view);
    let auto = view.is_some_and(|v| v.auto_enabled);
    let startup = view.is_some_and(|v| v.startup_enabled);
    let theme = view.map(|v| v.theme).unwrap_or_default();

    let mut pt = POINT::default();
    if GetCursorPos(&mut pt).is_err() {
        return;
    }
    let menu = match CreatePopupMenu() {
        Ok(h) => h,
        Err(e) => {
            warn!("tray menu-create-failed error={e}");
            return;
        }
    };

    append(menu, MF_STRING, ID_OPEN_SLIDER, "Open slider");
    append(menu, MF_STRING, ID_APPLY_NOW, "Apply now");
    append(menu, checked(auto), ID_AUTO, "Auto schedule");
    append(menu, checked(startup), ID_STARTUP, "Start with Windows");
    append(menu, MF_SEPARATOR, 0, "");
    append(menu, checked(theme == Theme::Light), ID_THEME_LIGHT, "Light theme");
    append(menu, checked(theme == Theme::Dark), ID_THEME_DARK, "Dark theme");
    append(menu, MF_STRING | MF_GRAYED, ID_HOTKEY_INFO, &format!("Hotkey: {HOTKEY_LABEL}"));
    append(menu, MF_STRING, ID_EDIT_SCHEDULE, "Edit schedule...");
    append(menu, MF_SEPARATOR, 0, "");
    append(menu, MF_STRING, ID_QUIT, "Quit");

    // Without this the menu does not close when clicking elsewhere.
    let _ = SetForegroundWindow(hwnd);
    let sel = TrackPopupMenu(
        menu,
        TPM_RIGHTALIGN | TPM_BOTTOMALIGN | TPM_RIGHTBUTTON | TPM_RETURNCMD,
        pt.x,
        pt.y,
        0,
        hwnd,
        None::<*const RECT>,
    );
    let _ = DestroyMenu(menu);

    let cmd = match sel.0 as u32 {
        ID_OPEN_SLIDER => UiCmd::OpenSlider,
        ID_APPLY_NOW => UiCmd::ApplyNow,
        ID_AUTO => UiCmd::ToggleAuto,
        ID_STARTUP => UiCmd::ToggleStartup,
        ID_THEME_LIGHT => UiCmd::SetTheme(Theme::Light),
        ID_THEME_DARK => UiCmd::SetTheme(Theme::Dark),
        ID_EDIT_SCHEDULE => UiCmd::EditSchedule,
        ID_QUIT => UiCmd::Quit,
        _ => return,
    };
    send(cmd);
}

unsafe extern "system" fn wnd_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    match msg {
        WM_TRAYICON => {
            match notify_event_code(lparam.0 as u32) {
                WM_LBUTTONUP => send(UiCmd::OpenSlider),
                WM_CONTEXTMENU => show_menu(hwnd),
                WM_RBUTTONUP if !NOTIFY_V4.load(Ordering::Acquire) => show_menu(hwnd),
                _ => {}
            }
            LRESULT(0)
        }

        WM_CLOSE => {
            let _ = DestroyWindow(hwnd);
            LRESULT(0)
        }

        WM_DESTROY => {
            if let Some(lock) = TRAY_STATE.get() {
                let mut nid = lock.lock().nid;
                let _ = Shell_NotifyIconW(NIM_DELETE, &mut nid);
            }
            PostQuitMessage(0);
            LRESULT(0)
        }

        _ if msg == taskbar_created_message() => {
            if let Some(lock) = TRAY_STATE.get() {
                let mut nid = lock.lock().nid;
                let ok = add_icon(&mut nid);
                info!("tray icon re-added ok={ok}");
            }
            send(UiCmd::TaskbarRecreated);
            LRESULT(0)
        }

        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

unsafe fn create_window() -> Result<HWND> {
    let hinst = HINSTANCE(GetModuleHandleW(None).context("GetModuleHandleW")?.0);
    let class_name = w!("HdrSdrBrightness.TrayWindow");
    let wc = WNDCLASSW {
        lpfnWndProc: Some(wnd_proc),
        hInstance: hinst,
        lpszClassName: class_name,
        ..zeroed()
    };
    let _ = RegisterClassW(&wc);

    let hwnd = CreateWindowExW(
        Default::default(),
        class_name,
        w!("HDR SDR Brightness Tray"),
        WS_OVERLAPPED,
        0,
        0,
        0,
        0,
        None,
        None,
        hinst,
        None,
    );
    if hwnd.0 == 0 {
        return Err(windows::core::Error::from_win32()).context("CreateWindowExW");
    }
    Ok(hwnd)
}

/// Spawns the tray thread: hidden owner window, icon, menu, message loop.
/// The window handle is published through `tray` once the icon is added.
pub fn spawn(tx_ui: Sender<UiCmd>, tray: TrayWindow) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("tray".into())
        .spawn(move || unsafe {
            let hwnd = match create_window() {
                Ok(h) => h,
                Err(e) => {
                    error!("tray window-failed error={e:#}");
                    return;
                }
            };
            let icon = match create_sun_icon() {
                Ok(i) => i,
                Err(e) => {
                    warn!("tray icon-failed error={e:#}");
                    HICON(0)
                }
            };

            let mut nid: NOTIFYICONDATAW = zeroed();
            nid.cbSize = size_of::<NOTIFYICONDATAW>() as u32;
            nid.hWnd = hwnd;
            nid.uID = TRAY_ICON_UID;
            nid.uFlags = NIF_MESSAGE | NIF_ICON | NIF_TIP;
            nid.uCallbackMessage = WM_TRAYICON;
            nid.hIcon = icon;

            let tip = U16CString::from_str_truncate(TOOLTIP);
            let tip = tip.as_slice();
            let n = tip.len().min(nid.szTip.len() - 1);
            nid.szTip[..n].copy_from_slice(&tip[..n]);

            if !add_icon(&mut nid) {
                warn!("tray NIM_ADD failed, waiting for TaskbarCreated");
            }
            if TRAY_STATE
                .set(Mutex::new(TrayState {
                    tx_ui,
                    nid,
                    view: None,
                }))
                .is_err()
            {
                error!("tray already running");
                let _ = DestroyWindow(hwnd);
                return;
            }
            tray.set(hwnd.0);
            info!("tray created hwnd={:#x} uid={TRAY_ICON_UID}", hwnd.0);

            let mut msg = MSG::default();
            while GetMessageW(addr_of_mut!(msg), None, 0, 0).into() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }

            tray.clear();
            if icon.0 != 0 {
                let _ = DestroyIcon(icon);
            }
            info!("tray stopped");
        })
        .context("spawn tray thread")?;
    Ok(handle)
}
