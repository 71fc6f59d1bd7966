//! Borderless popup next to the tray icon: brightness slider, or the
//! schedule editor.
//!
//! The window is a view. Every change goes to the controller as a
//! [`UiCmd`]; the controller drives the popup back through [`PopupHandle`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use egui::{pos2, vec2, Color32, Key, Painter, Pos2, Sense, Stroke, ViewportCommand};
use parking_lot::Mutex;
use tracing::info;

use crate::controller::{UiCmd, ViewState};
use crate::schedule::ScheduleEdit;
use crate::settings::Theme;
use crate::theme::{palette, Palette};
use crate::wheel::geometry::Rect;

pub const TRACK_WIDTH: f32 = 176.0;
pub const TRACK_HEIGHT: f32 = 22.0;
pub const TRACK_INSET: f32 = 7.0;
const THUMB_RING: f32 = 7.0;
const THUMB_FILL: f32 = 4.0;
const TRACK_STROKE: f32 = 4.0;

pub const SLIDER_SIZE: [f32; 2] = [250.0, 40.0];
pub const EDITOR_SIZE: [f32; 2] = [300.0, 104.0];

/// Gap between the icon and the popup.
const ICON_GAP: i32 = 2;
/// Minimum distance from the screen edge.
const SCREEN_MARGIN: i32 = 6;
/// Focus loss right after showing is the tray click itself.
const FOCUS_GRACE: Duration = Duration::from_millis(350);
/// Parking spot for the "hidden" popup. A window hidden with
/// `Visible(false)` stops receiving frames, so it never sees the command
/// that would show it again; the popup stays visible and moves off screen.
pub const OFFSCREEN_POS: (f32, f32) = (-32000.0, -32000.0);

/// Thumb position for a 0..=100 value.
pub fn value_to_x(value: u8, left: f32, right: f32) -> f32 {
    left + (right - left) * f32::from(value.min(100)) / 100.0
}

/// Nearest 0..=100 value for a pointer x, clamped to the track.
pub fn x_to_value(x: f32, left: f32, right: f32) -> u8 {
    if right <= left {
        return 0;
    }
    ((x - left) / (right - left) * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Top-left corner of a popup of `size` (physical pixels).
///
/// Above the icon and right-aligned to it; below it when the taskbar sits
/// at the top. Without an icon rectangle the popup goes into the work-area
/// corner next to the taskbar.
pub fn popup_origin(icon: Option<Rect>, work: Rect, screen: Rect, size: (i32, i32)) -> (i32, i32) {
    let (w, h) = size;
    let (x, y) = match icon {
        Some(icon) => {
            let taskbar_on_top = icon.bottom <= work.top;
            let y = if taskbar_on_top {
                icon.bottom + ICON_GAP
            } else {
                icon.top - h - ICON_GAP
            };
            (icon.right - w, y)
        }
        None => {
            let x = if work.left > screen.left {
                work.left + SCREEN_MARGIN
            } else {
                work.right - w - SCREEN_MARGIN
            };
            let y = if work.top > screen.top {
                work.top + SCREEN_MARGIN
            } else {
                work.bottom - h - SCREEN_MARGIN
            };
            (x, y)
        }
    };
    (
        clamp_span(x, screen.left, screen.right, w),
        clamp_span(y, screen.top, screen.bottom, h),
    )
}

fn clamp_span(v: i32, lo: i32, hi: i32, len: i32) -> i32 {
    let min = lo + SCREEN_MARGIN;
    let max = (hi - len - SCREEN_MARGIN).max(min);
    v.clamp(min, max)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PopupMode {
    Hidden,
    Slider,
    Editor,
}

struct PopupShared {
    mode: PopupMode,
    generation: u64,
    shown_at: Instant,
    value: u8,
    theme: Theme,
    editor_text: String,
    editor_error: Option<String>,
    quitting: bool,
}

impl PopupShared {
    fn new() -> Self {
        Self {
            mode: PopupMode::Hidden,
            generation: 0,
            shown_at: Instant::now(),
            value: 0,
            theme: Theme::default(),
            editor_text: String::new(),
            editor_error: None,
            quitting: false,
        }
    }
}

fn hide_viewport(ctx: &egui::Context, shared: &Mutex<PopupShared>) {
    shared.lock().mode = PopupMode::Hidden;
    ctx.send_viewport_cmd(ViewportCommand::OuterPosition(pos2(OFFSCREEN_POS.0, OFFSCREEN_POS.1)));
}

/// Thread-safe remote for the popup window.
#[derive(Clone)]
pub struct PopupHandle {
    ctx: egui::Context,
    shared: Arc<Mutex<PopupShared>>,
}

impl PopupHandle {
    pub fn show_slider(&self, percent: u8, icon: Option<Rect>) {
        {
            let mut st = self.shared.lock();
            st.value = percent;
        }
        self.show(PopupMode::Slider, SLIDER_SIZE, icon);
    }

    pub fn show_editor(&self, text: String, icon: Option<Rect>) {
        {
            let mut st = self.shared.lock();
            st.editor_text = text;
            st.editor_error = None;
        }
        self.show(PopupMode::Editor, EDITOR_SIZE, icon);
    }

    pub fn reject(&self, error: String) {
        self.shared.lock().editor_error = Some(error);
        self.ctx.request_repaint();
    }

    pub fn hide(&self) {
        hide_viewport(&self.ctx, &self.shared);
    }

    pub fn set_view(&self, view: ViewState) {
        {
            let mut st = self.shared.lock();
            st.value = view.percent;
            st.theme = view.theme;
        }
        self.ctx.request_repaint();
    }

    pub fn close(&self) {
        self.shared.lock().quitting = true;
        self.ctx.send_viewport_cmd(ViewportCommand::Close);
    }

    fn show(&self, mode: PopupMode, size: [f32; 2], icon: Option<Rect>) {
        {
            let mut st = self.shared.lock();
            st.mode = mode;
            st.generation += 1;
            st.shown_at = Instant::now();
        }

        let ppp = self.ctx.native_pixels_per_point().unwrap_or(1.0);
        let physical = ((size[0] * ppp).round() as i32, (size[1] * ppp).round() as i32);
        self.ctx.send_viewport_cmd(ViewportCommand::InnerSize(vec2(size[0], size[1])));
        if let Some((x, y)) = placement(icon, physical) {
            info!("popup show mode={mode:?} x={x} y={y} icon={icon:?}");
            self.ctx.send_viewport_cmd(ViewportCommand::OuterPosition(pos2(
                x as f32 / ppp,
                y as f32 / ppp,
            )));
        }
        self.ctx.send_viewport_cmd(ViewportCommand::Visible(true));
        self.ctx.send_viewport_cmd(ViewportCommand::Focus);
        self.ctx.request_repaint();
    }
}

#[cfg(windows)]
fn placement(icon: Option<Rect>, size: (i32, i32)) -> Option<(i32, i32)> {
    use std::mem::size_of;
    use windows::Win32::Foundation::{POINT, RECT};
    use windows::Win32::Graphics::Gdi::{
        GetMonitorInfoW, MonitorFromPoint, MONITORINFO, MONITOR_DEFAULTTONEAREST,
    };

    let (x, y) = match icon {
        Some(r) => ((r.left + r.right) / 2, (r.top + r.bottom) / 2),
        None => crate::wheel::os::cursor_pos()?,
    };
    let mut mi = MONITORINFO {
        cbSize: size_of::<MONITORINFO>() as u32,
        ..Default::default()
    };
    let ok = unsafe {
        let mon = MonitorFromPoint(POINT { x, y }, MONITOR_DEFAULTTONEAREST);
        GetMonitorInfoW(mon, &mut mi)
    };
    if !ok.as_bool() {
        return None;
    }
    let rect = |r: RECT| Rect::new(r.left, r.top, r.right, r.bottom);
    Some(popup_origin(icon, rect(mi.rcWork), rect(mi.rcMonitor), size))
}

#[cfg(not(windows))]
fn placement(_icon: Option<Rect>, _size: (i32, i32)) -> Option<(i32, i32)> {
    None
}

pub struct PopupApp {
    shared: Arc<Mutex<PopupShared>>,
    tx_ui: Sender<UiCmd>,
    seen_generation: u64,
    editor_text: String,
    focus_editor: bool,
    dragging: bool,
    visuals_for: Option<Theme>,
}

impl PopupApp {
    /// Builds the app and the handle the controller side uses to drive it.
    pub fn new(ctx: &egui::Context, tx_ui: Sender<UiCmd>) -> (Self, PopupHandle) {
        let shared = Arc::new(Mutex::new(PopupShared::new()));
        let handle = PopupHandle {
            ctx: ctx.clone(),
            shared: shared.clone(),
        };
        let app = Self {
            shared,
            tx_ui,
            seen_generation: 0,
            editor_text: String::new(),
            focus_editor: false,
            dragging: false,
            visuals_for: None,
        };
        (app, handle)
    }

    fn send(&self, cmd: UiCmd) {
        let _ = self.tx_ui.send(cmd);
    }

    fn slider_ui(&mut self, ui: &mut egui::Ui, pal: &Palette) {
        let mut value = self.shared.lock().value;

        ui.horizontal_centered(|ui| {
            let (glyph, _) = ui.allocate_exact_size(vec2(TRACK_HEIGHT, TRACK_HEIGHT), Sense::hover());
            paint_sun(ui.painter(), glyph.center(), TRACK_HEIGHT / 2.0, pal.icon);

            let (rect, resp) =
                ui.allocate_exact_size(vec2(TRACK_WIDTH, TRACK_HEIGHT), Sense::click_and_drag());
            let left = rect.left() + TRACK_INSET;
            let right = rect.right() - TRACK_INSET;

            if resp.is_pointer_button_down_on() {
                if let Some(pos) = resp.interact_pointer_pos() {
                    self.dragging = true;
                    let v = x_to_value(pos.x, left, right);
                    if v != value {
                        value = v;
                        self.shared.lock().value = v;
                        self.send(UiCmd::SliderChanged(v));
                    }
                }
            }
            if self.dragging && ui.input(|i| i.pointer.any_released()) {
                self.dragging = false;
                self.send(UiCmd::SliderReleased);
            }

            let y = rect.center().y;
            let thumb = value_to_x(value, left, right);
            let painter = ui.painter();
            painter.line_segment(
                [pos2(left, y), pos2(right, y)],
                Stroke::new(TRACK_STROKE, pal.track_inactive),
            );
            painter.line_segment(
                [pos2(left, y), pos2(thumb, y)],
                Stroke::new(TRACK_STROKE, pal.track_active),
            );
            painter.circle_filled(pos2(thumb, y), THUMB_RING, pal.thumb_ring);
            painter.circle_filled(pos2(thumb, y), THUMB_FILL, pal.thumb_fill);

            ui.label(egui::RichText::new(format!("{value}%")).color(pal.icon));
        });
    }

    fn editor_ui(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.label("Day start, night start, day %, night %");
        let edit = ui.add(
            egui::TextEdit::singleline(&mut self.editor_text)
                .hint_text("08:00,20:00,40,25")
                .desired_width(f32::INFINITY),
        );
        if std::mem::take(&mut self.focus_editor) {
            edit.request_focus();
        }
        let enter = edit.lost_focus() && ctx.input(|i| i.key_pressed(Key::Enter));

        let mut save = enter;
        ui.horizontal(|ui| {
            save |= ui.button("Save").clicked();
            if ui.button("Cancel").clicked() {
                hide_viewport(ctx, &self.shared);
            }
        });

        if save {
            match ScheduleEdit::parse(&self.editor_text) {
                Ok(_) => {
                    self.shared.lock().editor_error = None;
                    self.send(UiCmd::ScheduleSubmitted(self.editor_text.clone()));
                }
                Err(e) => self.shared.lock().editor_error = Some(e.to_string()),
            }
        }

        let error = self.shared.lock().editor_error.clone();
        if let Some(err) = error {
            ui.colored_label(Color32::from_rgb(0xE0, 0x5A, 0x4F), err);
        }
    }
}

impl eframe::App for PopupApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let (mode, generation, shown_at, theme, quitting) = {
            let st = self.shared.lock();
            (st.mode, st.generation, st.shown_at, st.theme, st.quitting)
        };

        if ctx.input(|i| i.viewport().close_requested()) && !quitting {
            ctx.send_viewport_cmd(ViewportCommand::CancelClose);
            hide_viewport(ctx, &self.shared);
            return;
        }

        if self.visuals_for != Some(theme) {
            ctx.set_visuals(match theme {
                Theme::Light => egui::Visuals::light(),
                Theme::Dark => egui::Visuals::dark(),
            });
            self.visuals_for = Some(theme);
        }

        if mode == PopupMode::Hidden {
            self.dragging = false;
            return;
        }

        if generation != self.seen_generation {
            self.seen_generation = generation;
            self.editor_text = self.shared.lock().editor_text.clone();
            self.focus_editor = mode == PopupMode::Editor;
            self.dragging = false;
        }

        let escape = ctx.input(|i| i.key_pressed(Key::Escape));
        let lost_focus = ctx.input(|i| i.viewport().focused) == Some(false)
            && shown_at.elapsed() >= FOCUS_GRACE
            && !self.dragging;
        if escape || lost_focus {
            info!("popup hide escape={escape} focus_lost={lost_focus}");
            hide_viewport(ctx, &self.shared);
            return;
        }

        let pal = palette(theme);
        let frame = egui::Frame::none()
            .fill(pal.panel)
            .stroke(Stroke::new(1.0, pal.border))
            .inner_margin(8.0);
        egui::CentralPanel::default().frame(frame).show(ctx, |ui| match mode {
            PopupMode::Slider => self.slider_ui(ui, pal),
            PopupMode::Editor => self.editor_ui(ui, ctx),
            PopupMode::Hidden => {}
        });

        // Focus changes arrive without input events.
        ctx.request_repaint_after(Duration::from_millis(100));
    }

    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        palette(self.shared.lock().theme).window.to_normalized_gamma_f32()
    }
}

fn paint_sun(painter: &Painter, center: Pos2, radius: f32, color: Color32) {
    painter.circle_filled(center, radius * 0.42, color);
    let stroke = Stroke::new((radius * 0.16).max(1.0), color);
    for k in 0..8 {
        let a = k as f32 * std::f32::consts::FRAC_PI_4;
        let dir = vec2(a.cos(), a.sin());
        painter.line_segment([center + dir * radius * 0.62, center + dir * radius * 0.92], stroke);
    }
}
