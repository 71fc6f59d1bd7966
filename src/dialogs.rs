//! Blocking message boxes for the few things the user must see.

#[cfg(windows)]
mod imp {
    use widestring::U16CString;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging::{
        MessageBoxW, IDYES, MB_ICONERROR, MB_ICONINFORMATION, MB_ICONQUESTION, MB_OK,
        MB_SETFOREGROUND, MB_TOPMOST, MB_YESNO, MESSAGEBOX_STYLE,
    };

    fn show(title: &str, text: &str, style: MESSAGEBOX_STYLE) -> bool {
        let title_w = U16CString::from_str_truncate(title);
        let text_w = U16CString::from_str_truncate(text);
        unsafe {
            MessageBoxW(
                HWND(0),
                PCWSTR(text_w.as_ptr()),
                PCWSTR(title_w.as_ptr()),
                style | MB_TOPMOST | MB_SETFOREGROUND,
            ) == IDYES
        }
    }

    pub fn info(title: &str, text: &str) {
        show(title, text, MB_OK | MB_ICONINFORMATION);
    }

    pub fn error(title: &str, text: &str) {
        show(title, text, MB_OK | MB_ICONERROR);
    }

    pub fn confirm(title: &str, text: &str) -> bool {
        show(title, text, MB_YESNO | MB_ICONQUESTION)
    }
}

#[cfg(not(windows))]
mod imp {
    use tracing::{error as log_error, info as log_info};

    pub fn info(title: &str, text: &str) {
        log_info!("{title}: {text}");
    }

    pub fn error(title: &str, text: &str) {
        log_error!("{title}: {text}");
    }

    pub fn confirm(title: &str, text: &str) -> bool {
        log_info!("{title}: {text} (no dialog support, declined)");
        false
    }
}

pub use imp::{confirm, error, info};
