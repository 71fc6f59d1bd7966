#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
#![cfg_attr(not(windows), allow(dead_code))]

mod brightness;
mod controller;
mod dialogs;
mod helper_download;
#[cfg(windows)]
mod hotkey;
mod logging;
mod paths;
mod popup;
#[cfg(windows)]
mod pump;
mod schedule;
mod settings;
mod startup;
mod theme;
#[cfg(windows)]
mod tray;
mod wheel;

use anyhow::Result;

#[cfg(windows)]
use app::run;

#[cfg(windows)]
mod app {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use crossbeam_channel::{unbounded, Receiver};
    use tracing::{error, info, warn};

    use crate::brightness::SdrWhiteTool;
    use crate::controller::{Controller, Frontend, Notice, UiCmd, UiScheduler, ViewState};
    use crate::paths::AppDirs;
    use crate::popup::{PopupApp, PopupHandle, OFFSCREEN_POS, SLIDER_SIZE};
    use crate::pump::PumpWorker;
    use crate::settings::SettingsStore;
    use crate::startup::{self, ShellShortcut};
    use crate::wheel::os::ShellIconRect;
    use crate::wheel::{self, TrayWindow, WheelContext, WheelSubsystem};
    use crate::{dialogs, hotkey, logging, tray};

    const HOTKEY_STOP_TIMEOUT: Duration = Duration::from_millis(1200);

    /// Tray menu, popup window and the OS workers, as the controller sees them.
    struct AppFrontend {
        popup: PopupHandle,
        wheel: Arc<WheelContext>,
        subsystem: Option<WheelSubsystem>,
        hotkey: Option<PumpWorker>,
    }

    impl AppFrontend {
        fn icon_rect(&self) -> Option<wheel::geometry::Rect> {
            self.wheel.geometry.rect().map(|r| r.rect)
        }
    }

    impl Frontend for AppFrontend {
        fn state_changed(&mut self, view: ViewState) {
            tray::update_menu_state(view);
            self.popup.set_view(view);
        }

        fn show_slider(&mut self, percent: u8) {
            self.popup.show_slider(percent, self.icon_rect());
        }

        fn hide_popup(&mut self) {
            self.popup.hide();
        }

        fn show_schedule_editor(&mut self, text: String) {
            self.popup.show_editor(text, self.icon_rect());
        }

        fn schedule_rejected(&mut self, error: String) {
            self.popup.reject(error);
        }

        fn notify(&mut self, notice: Notice) {
            // Message boxes block; keep them off the controller thread.
            let spawned = thread::Builder::new().name("notice".into()).spawn(move || match notice {
                Notice::Info { title, text } => dialogs::info(&title, &text),
                Notice::Error { title, text } => dialogs::error(&title, &text),
            });
            if let Err(e) = spawned {
                warn!("notice spawn-failed error={e}");
            }
        }

        fn shutdown(&mut self) {
            if let Some(subsystem) = self.subsystem.take() {
                subsystem.stop();
            }
            if let Some(worker) = self.hotkey.take() {
                worker.stop(HOTKEY_STOP_TIMEOUT);
            }
            tray::remove_icon();
            self.popup.close();
        }
    }

    fn start_controller(ctl: Controller, rx_ui: Receiver<UiCmd>, debug: bool) -> bool {
        let spawned = thread::Builder::new()
            .name("controller".into())
            .spawn(move || ctl.run(rx_ui, debug));
        match spawned {
            Ok(_) => true,
            Err(e) => {
                error!("controller spawn-failed error={e}");
                false
            }
        }
    }

    pub fn run() -> Result<()> {
        let debug = logging::debug_requested(std::env::args().skip(1));
        let dirs = AppDirs::discover();
        let _log_guard = logging::init(debug, &dirs.log_dirs());
        info!(
            "app start version={} debug={debug} app_dir={} data_dir={}",
            env!("CARGO_PKG_VERSION"),
            dirs.app_dir.display(),
            dirs.data_dir.display(),
        );

        let store = SettingsStore::in_dir(&dirs.data_dir);
        let settings = store.load();

        let (tx_ui, rx_ui) = unbounded::<UiCmd>();
        let tray_window = TrayWindow::default();
        let wheel_ctx = Arc::new(WheelContext::new(
            tray_window.clone(),
            Box::new(ShellIconRect::load()),
            tray::TRAY_ICON_UID,
            Box::new(UiScheduler(tx_ui.clone())),
            wheel::private_mb,
        ));

        let subsystem = match WheelSubsystem::start(wheel_ctx.clone()) {
            Ok(s) => Some(s),
            Err(e) => {
                error!("wheel subsystem-failed error={e}");
                None
            }
        };
        tray::spawn(tx_ui.clone(), tray_window)?;
        let hotkey = match hotkey::start(tx_ui.clone()) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("hotkey unavailable error={e:#}");
                None
            }
        };

        let exe = std::env::current_exe().context("current_exe")?;
        let link = startup::default_link_path()
            .unwrap_or_else(|| dirs.data_dir.join(startup::LINK_NAME));
        let shortcut = ShellShortcut::new(link, exe);
        let sink = SdrWhiteTool::new(dirs.clone());

        let native_options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_title("HDR SDR Brightness")
                .with_inner_size(SLIDER_SIZE)
                .with_position(OFFSCREEN_POS)
                .with_decorations(false)
                .with_always_on_top()
                .with_resizable(false)
                .with_taskbar(false)
                .with_active(false),
            ..Default::default()
        };

        let tx_app = tx_ui.clone();
        let run = eframe::run_native(
            "HDR SDR Brightness",
            native_options,
            Box::new(move |cc| {
                let (app, popup) = PopupApp::new(&cc.egui_ctx, tx_app);
                let frontend = AppFrontend {
                    popup: popup.clone(),
                    wheel: wheel_ctx.clone(),
                    subsystem,
                    hotkey,
                };
                let ctl = Controller::new(
                    settings,
                    store,
                    Box::new(sink),
                    Box::new(shortcut),
                    Box::new(frontend),
                    wheel_ctx,
                );
                if !start_controller(ctl, rx_ui, debug) {
                    // Nothing would ever close the window otherwise.
                    popup.close();
                }
                Box::new(app)
            }),
        );

        // Window gone by some other path: let the controller tear down.
        let _ = tx_ui.send(UiCmd::Quit);
        info!("app exit");
        run.map_err(|e| anyhow::anyhow!("eframe failed: {e}"))
    }
}

#[cfg(windows)]
fn main() -> Result<()> {
    run()
}

#[cfg(not(windows))]
fn main() -> Result<()> {
    anyhow::bail!("HDR SDR Brightness needs Windows (HDR SDR white level, tray icon)")
}
