//! The UI-owned execution context.
//!
//! One thread owns the settings and is the only place the brightness helper
//! is invoked from. The tray, the hotkey, the popup and the wheel coalescer
//! all talk to it through [`UiCmd`].

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{never, select, tick, Receiver, Sender};
use tracing::{info, warn};

use crate::brightness::BrightnessSink;
use crate::schedule::{self, ScheduleEdit};
use crate::settings::{Settings, SettingsStore, Theme};
use crate::startup::StartupShortcut;
use crate::wheel::coalescer::{step_percent, FlushScheduler};
use crate::wheel::WheelContext;

pub const SCHEDULE_TICK: Duration = Duration::from_secs(60);
pub const MEMORY_TICK: Duration = Duration::from_secs(15);
const STARTUP_TITLE: &str = "Start with Windows";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCmd {
    OpenSlider,
    SliderChanged(u8),
    SliderReleased,
    HidePopup,
    ApplyNow,
    ToggleAuto,
    ToggleStartup,
    SetTheme(Theme),
    EditSchedule,
    ScheduleSubmitted(String),
    FlushWheel,
    TaskbarRecreated,
    Quit,
}

/// Posts wheel flushes onto the controller queue.
pub struct UiScheduler(pub Sender<UiCmd>);

impl FlushScheduler for UiScheduler {
    fn schedule_flush(&self) {
        if self.0.send(UiCmd::FlushWheel).is_err() {
            warn!("wheel-flush controller gone");
        }
    }
}

/// What the tray menu and popup render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    pub percent: u8,
    pub auto_enabled: bool,
    pub startup_enabled: bool,
    pub theme: Theme,
}

/// One-off message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info { title: String, text: String },
    Error { title: String, text: String },
}

/// Everything the controller drives but does not own.
pub trait Frontend: Send {
    fn state_changed(&mut self, view: ViewState);
    fn show_slider(&mut self, percent: u8);
    fn hide_popup(&mut self);
    fn show_schedule_editor(&mut self, text: String);
    fn schedule_rejected(&mut self, error: String);
    fn notify(&mut self, notice: Notice);
    fn shutdown(&mut self);
}

pub struct Controller {
    settings: Settings,
    last_applied: Option<u8>,
    store: SettingsStore,
    sink: Box<dyn BrightnessSink>,
    startup: Box<dyn StartupShortcut>,
    frontend: Box<dyn Frontend>,
    wheel: Arc<WheelContext>,
    clock: fn() -> u32,
}

impl Controller {
    pub fn new(
        settings: Settings,
        store: SettingsStore,
        sink: Box<dyn BrightnessSink>,
        startup: Box<dyn StartupShortcut>,
        frontend: Box<dyn Frontend>,
        wheel: Arc<WheelContext>,
    ) -> Self {
        Self {
            settings,
            last_applied: None,
            store,
            sink,
            startup,
            frontend,
            wheel,
            clock: schedule::current_minutes,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn last_applied(&self) -> Option<u8> {
        self.last_applied
    }

    /// Brightness the user currently expects: the schedule target in auto
    /// mode, the manual value otherwise.
    pub fn current_percent(&self) -> u8 {
        if self.settings.auto_enabled {
            schedule::target_at(&self.settings, (self.clock)())
        } else {
            self.settings.manual
        }
    }

    pub fn view(&self) -> ViewState {
        ViewState {
            percent: self.settings.manual,
            auto_enabled: self.settings.auto_enabled,
            startup_enabled: self.startup.is_enabled(),
            theme: self.settings.theme,
        }
    }

    /// Blocks until `Quit` or until every sender is gone.
    pub fn run(mut self, rx: Receiver<UiCmd>, debug: bool) {
        self.startup_apply();
        let schedule_tick = tick(SCHEDULE_TICK);
        let memory_tick = if debug { tick(MEMORY_TICK) } else { never() };

        loop {
            let flow = select! {
                recv(rx) -> msg => match msg {
                    Ok(cmd) => self.handle(cmd),
                    Err(_) => ControlFlow::Break(()),
                },
                recv(schedule_tick) -> _ => {
                    self.schedule_tick();
                    ControlFlow::Continue(())
                }
                recv(memory_tick) -> _ => {
                    self.log_memory();
                    ControlFlow::Continue(())
                }
            };
            if flow.is_break() {
                break;
            }
        }
        info!("controller stopped");
    }

    pub fn startup_apply(&mut self) {
        let percent = self.current_percent();
        info!(
            "controller startup-apply percent={percent} auto={}",
            self.settings.auto_enabled
        );
        self.apply(percent, false);
        self.publish();
    }

    pub fn handle(&mut self, cmd: UiCmd) -> ControlFlow<()> {
        match cmd {
            UiCmd::OpenSlider => self.frontend.show_slider(self.settings.manual),
            UiCmd::SliderChanged(percent) => self.slider_changed(percent),
            UiCmd::SliderReleased => self.slider_released(),
            UiCmd::HidePopup => self.frontend.hide_popup(),
            UiCmd::ApplyNow => {
                let percent = self.settings.manual;
                if self.apply(percent, true) {
                    self.save();
                }
            }
            UiCmd::ToggleAuto => {
                self.settings.auto_enabled = !self.settings.auto_enabled;
                self.save();
                if self.settings.auto_enabled {
                    let target = self.current_percent();
                    self.apply(target, true);
                }
                self.publish();
            }
            UiCmd::ToggleStartup => self.toggle_startup(),
            UiCmd::SetTheme(theme) => {
                self.settings.theme = theme;
                self.save();
                self.publish();
            }
            UiCmd::EditSchedule => {
                let text = ScheduleEdit::from_settings(&self.settings).to_text();
                self.frontend.show_schedule_editor(text);
            }
            UiCmd::ScheduleSubmitted(text) => self.schedule_submitted(&text),
            UiCmd::FlushWheel => self.flush_wheel(),
            UiCmd::TaskbarRecreated => {
                info!("controller taskbar-recreated");
                self.publish();
            }
            UiCmd::Quit => {
                info!("controller quit");
                self.frontend.shutdown();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn apply(&mut self, percent: u8, interactive: bool) -> bool {
        let ok = self.sink.apply(percent, interactive);
        if ok {
            self.last_applied = Some(percent);
        }
        ok
    }

    fn save(&self) {
        if let Err(e) = self.store.save(&self.settings) {
            warn!("settings save-failed error={e:#}");
        }
    }

    fn publish(&mut self) {
        let view = self.view();
        self.frontend.state_changed(view);
    }

    fn toggle_startup(&mut self) {
        let want = !self.startup.is_enabled();
        let notice = match self.startup.set_enabled(want) {
            Ok(()) => {
                info!("startup toggled enabled={want}");
                Notice::Info {
                    title: STARTUP_TITLE.into(),
                    text: format!("Start with Windows {}", if want { "enabled" } else { "disabled" }),
                }
            }
            Err(e) => {
                warn!("startup toggle-failed enabled={want} error={e:#}");
                Notice::Error {
                    title: STARTUP_TITLE.into(),
                    text: format!("Could not change the startup setting:\n{e:#}"),
                }
            }
        };
        self.frontend.notify(notice);
        self.publish();
    }

    fn slider_changed(&mut self, percent: u8) {
        let percent = percent.min(100);
        if self.last_applied == Some(percent) && self.settings.manual == percent {
            return;
        }
        self.settings.manual = percent;
        self.apply(percent, false);
    }

    fn slider_released(&mut self) {
        let percent = self.settings.manual;
        if self.last_applied != Some(percent) {
            self.apply(percent, true);
        }
        self.settings.auto_enabled = false;
        self.save();
        self.frontend.hide_popup();
        self.publish();
    }

    fn schedule_submitted(&mut self, text: &str) {
        match ScheduleEdit::parse(text) {
            Ok(edit) => {
                info!("schedule updated value={}", edit.to_text());
                edit.apply_to(&mut self.settings);
                self.save();
                self.frontend.hide_popup();
                if self.settings.auto_enabled {
                    let target = self.current_percent();
                    self.apply(target, false);
                }
                self.publish();
            }
            Err(e) => {
                warn!("schedule rejected error={e}");
                self.frontend.schedule_rejected(e.to_string());
            }
        }
    }

    fn schedule_tick(&mut self) {
        if !self.settings.auto_enabled {
            return;
        }
        let target = self.current_percent();
        if self.last_applied != Some(target) {
            info!("schedule tick-apply percent={target}");
            self.apply(target, false);
            self.publish();
        }
    }

    /// Drains the coalescer and turns the sum into one brightness step from
    /// the manual value.
    pub fn flush_wheel(&mut self) {
        let delta = self.wheel.coalescer.drain();
        if delta == 0 {
            return;
        }
        let current = self.settings.manual;
        let Some(target) = step_percent(current, delta) else {
            return;
        };

        self.settings.manual = target;
        self.settings.auto_enabled = false;
        let ok = self.apply(target, false);
        self.save();
        info!("wheel-apply delta={delta} from={current} to={target} ok={ok}");
        self.publish();
    }

    fn log_memory(&self) {
        let stats = self.wheel.coalescer.stats();
        info!(
            "memory private_mb={:.1} wheel_enqueued={} wheel_flushed={} llhook_events={}",
            crate::wheel::private_mb(),
            stats.enqueued,
            stats.flushed,
            self.wheel
                .hook
                .events
                .load(std::sync::atomic::Ordering::Relaxed),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wheel::coalescer::WheelSource;
    use crate::wheel::geometry::{IconRectQuery, Rect};
    use crate::wheel::TrayWindow;
    use parking_lot::Mutex;

    struct NoShell;

    impl IconRectQuery for NoShell {
        fn is_available(&self) -> bool {
            false
        }

        fn icon_rect(&self, _hwnd: isize, _uid: u32) -> Option<Rect> {
            None
        }
    }

    struct NoFlush;

    impl FlushScheduler for NoFlush {
        fn schedule_flush(&self) {}
    }

    #[derive(Clone, Default)]
    struct Applied(Arc<Mutex<Vec<(u8, bool)>>>);

    struct FakeSink {
        applied: Applied,
        ok: bool,
    }

    impl BrightnessSink for FakeSink {
        fn apply(&mut self, percent: u8, interactive: bool) -> bool {
            self.applied.0.lock().push((percent, interactive));
            self.ok
        }
    }

    struct FakeStartup(bool);

    impl StartupShortcut for FakeStartup {
        fn is_enabled(&self) -> bool {
            self.0
        }

        fn set_enabled(&mut self, enabled: bool) -> anyhow::Result<()> {
            self.0 = enabled;
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        State(ViewState),
        Slider(u8),
        Hide,
        Editor(String),
        Rejected(String),
        Notice(Notice),
        Shutdown,
    }

    #[derive(Clone, Default)]
    struct Events(Arc<Mutex<Vec<Event>>>);

    impl Events {
        fn take(&self) -> Vec<Event> {
            std::mem::take(&mut *self.0.lock())
        }
    }

    struct FakeFrontend(Events);

    impl Frontend for FakeFrontend {
        fn state_changed(&mut self, view: ViewState) {
            self.0 .0.lock().push(Event::State(view));
        }
        fn show_slider(&mut self, percent: u8) {
            self.0 .0.lock().push(Event::Slider(percent));
        }
        fn hide_popup(&mut self) {
            self.0 .0.lock().push(Event::Hide);
        }
        fn show_schedule_editor(&mut self, text: String) {
            self.0 .0.lock().push(Event::Editor(text));
        }
        fn schedule_rejected(&mut self, error: String) {
            self.0 .0.lock().push(Event::Rejected(error));
        }
        fn notify(&mut self, notice: Notice) {
            self.0 .0.lock().push(Event::Notice(notice));
        }
        fn shutdown(&mut self) {
            self.0 .0.lock().push(Event::Shutdown);
        }
    }

    struct Harness {
        ctl: Controller,
        applied: Applied,
        events: Events,
        _dir: tempfile::TempDir,
    }

    fn harness(settings: Settings) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let applied = Applied::default();
        let events = Events::default();
        let wheel = Arc::new(WheelContext::new(
            TrayWindow::default(),
            Box::new(NoShell),
            1,
            Box::new(NoFlush),
            || 0.0,
        ));
        let mut ctl = Controller::new(
            settings,
            SettingsStore::in_dir(dir.path()),
            Box::new(FakeSink {
                applied: applied.clone(),
                ok: true,
            }),
            Box::new(FakeStartup(false)),
            Box::new(FakeFrontend(events.clone())),
            wheel,
        );
        // Noon: day mode under the default schedule.
        ctl.clock = || 12 * 60;
        Harness {
            ctl,
            applied,
            events,
            _dir: dir,
        }
    }

    fn manual(percent: u8) -> Settings {
        Settings {
            manual: percent,
            auto_enabled: false,
            ..Settings::default()
        }
    }

    #[test]
    fn startup_applies_schedule_or_manual() {
        let mut h = harness(Settings::default());
        h.ctl.startup_apply();
        assert_eq!(*h.applied.0.lock(), vec![(40, false)]);

        let mut h = harness(manual(61));
        h.ctl.startup_apply();
        assert_eq!(*h.applied.0.lock(), vec![(61, false)]);
        assert_eq!(h.ctl.last_applied(), Some(61));
    }

    #[test]
    fn two_scroll_ups_from_69_reach_73() {
        let mut h = harness(manual(69));
        h.ctl.wheel.coalescer.enqueue(120, WheelSource::LowLevelHook);
        h.ctl.flush_wheel();
        h.ctl.wheel.coalescer.enqueue(120, WheelSource::Notify);
        h.ctl.flush_wheel();
        assert_eq!(h.ctl.settings().manual, 73);
        assert_eq!(*h.applied.0.lock(), vec![(71, false), (73, false)]);
    }

    #[test]
    fn wheel_overrides_auto_mode_and_persists() {
        let mut h = harness(Settings::default());
        h.ctl.wheel.coalescer.enqueue(-240, WheelSource::RawInput);
        h.ctl.flush_wheel();
        assert_eq!(h.ctl.settings().manual, 31);
        assert!(!h.ctl.settings().auto_enabled);
        let saved = h.ctl.store.load();
        assert_eq!(saved.manual, 31);
        assert!(!saved.auto_enabled);
    }

    #[test]
    fn wheel_steps_from_manual_while_auto_is_on() {
        // Noon targets 40 in auto mode; the step starts from manual 35.
        let mut h = harness(Settings::default());
        h.ctl.wheel.coalescer.enqueue(120, WheelSource::Notify);
        h.ctl.flush_wheel();
        assert_eq!(h.ctl.settings().manual, 37);
        assert_eq!(*h.applied.0.lock(), vec![(37, false)]);
    }

    #[test]
    fn slider_opens_at_manual_value() {
        let mut h = harness(Settings::default());
        let _ = h.ctl.handle(UiCmd::OpenSlider);
        assert_eq!(h.events.take(), vec![Event::Slider(35)]);
    }

    #[test]
    fn wheel_at_limit_does_not_invoke_helper() {
        let mut h = harness(manual(100));
        h.ctl.wheel.coalescer.enqueue(120, WheelSource::LowLevelHook);
        h.ctl.flush_wheel();
        assert!(h.applied.0.lock().is_empty());
        assert!(h.events.take().is_empty());
    }

    #[test]
    fn empty_flush_is_a_no_op() {
        let mut h = harness(manual(50));
        h.ctl.flush_wheel();
        assert!(h.applied.0.lock().is_empty());
    }

    #[test]
    fn slider_drag_then_release() {
        let mut h = harness(Settings::default());
        let _ = h.ctl.handle(UiCmd::SliderChanged(50));
        let _ = h.ctl.handle(UiCmd::SliderChanged(50));
        let _ = h.ctl.handle(UiCmd::SliderChanged(52));
        let _ = h.ctl.handle(UiCmd::SliderReleased);
        assert_eq!(*h.applied.0.lock(), vec![(50, false), (52, false)]);
        assert!(!h.ctl.settings().auto_enabled);
        let events = h.events.take();
        assert_eq!(events[0], Event::Hide);
        assert!(matches!(events[1], Event::State(ViewState { percent: 52, .. })));
    }

    #[test]
    fn schedule_tick_only_applies_on_change() {
        let mut h = harness(Settings::default());
        h.ctl.startup_apply();
        h.ctl.schedule_tick();
        assert_eq!(h.applied.0.lock().len(), 1);
        h.ctl.clock = || 21 * 60;
        h.ctl.schedule_tick();
        assert_eq!(h.applied.0.lock().last(), Some(&(25, false)));
    }

    #[test]
    fn schedule_editor_flow() {
        let mut h = harness(Settings::default());
        let _ = h.ctl.handle(UiCmd::EditSchedule);
        assert_eq!(
            h.events.take(),
            vec![Event::Editor("08:00,20:00,40,25".into())]
        );

        let _ = h.ctl.handle(UiCmd::ScheduleSubmitted("nonsense".into()));
        assert!(matches!(h.events.take()[..], [Event::Rejected(_)]));

        let _ = h.ctl.handle(UiCmd::ScheduleSubmitted("06:00,18:00,60,20".into()));
        assert_eq!(h.ctl.settings().day, 60);
        assert_eq!(h.applied.0.lock().last(), Some(&(60, false)));
        assert_eq!(h.events.take()[0], Event::Hide);
    }

    #[test]
    fn toggles_publish_state() {
        let mut h = harness(manual(30));
        let _ = h.ctl.handle(UiCmd::ToggleStartup);
        let _ = h.ctl.handle(UiCmd::SetTheme(Theme::Light));
        let events = h.events.take();
        assert!(matches!(
            events[..],
            [
                Event::Notice(Notice::Info { .. }),
                Event::State(ViewState { startup_enabled: true, .. }),
                Event::State(ViewState { theme: Theme::Light, .. }),
            ]
        ));

        let _ = h.ctl.handle(UiCmd::ToggleAuto);
        assert!(h.ctl.settings().auto_enabled);
        assert_eq!(h.applied.0.lock().last(), Some(&(40, true)));
    }

    #[test]
    fn startup_toggle_failure_reports_error() {
        struct BrokenStartup;

        impl StartupShortcut for BrokenStartup {
            fn is_enabled(&self) -> bool {
                false
            }

            fn set_enabled(&mut self, _enabled: bool) -> anyhow::Result<()> {
                anyhow::bail!("access denied")
            }
        }

        let mut h = harness(manual(30));
        h.ctl.startup = Box::new(BrokenStartup);
        let _ = h.ctl.handle(UiCmd::ToggleStartup);
        let events = h.events.take();
        match &events[0] {
            Event::Notice(Notice::Error { text, .. }) => assert!(text.contains("access denied")),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(events[1], Event::State(ViewState { startup_enabled: false, .. })));
    }

    #[test]
    fn apply_now_applies_manual_interactively_and_saves() {
        let mut h = harness(Settings {
            manual: 10,
            ..Settings::default()
        });
        let _ = h.ctl.handle(UiCmd::ApplyNow);
        assert_eq!(*h.applied.0.lock(), vec![(10, true)]);
        assert_eq!(h.ctl.store.load().manual, 10);
    }

    #[test]
    fn quit_shuts_frontend_down() {
        let mut h = harness(manual(10));
        assert!(h.ctl.handle(UiCmd::Quit).is_break());
        assert_eq!(h.events.take(), vec![Event::Shutdown]);
    }

    #[test]
    fn run_stops_when_senders_drop() {
        let h = harness(manual(10));
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(UiCmd::OpenSlider).unwrap();
        drop(tx);
        h.ctl.run(rx, false);
        let events = h.events.take();
        assert_eq!(events.last(), Some(&Event::Slider(10)));
    }

    #[test]
    fn scheduler_posts_flush() {
        let (tx, rx) = crossbeam_channel::unbounded();
        UiScheduler(tx).schedule_flush();
        assert_eq!(rx.try_recv(), Ok(UiCmd::FlushWheel));
    }
}
