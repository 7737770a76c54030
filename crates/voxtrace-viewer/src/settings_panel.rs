//! Keyboard settings surface and window-title telemetry.
//!
//! | key               | effect                           |
//! |-------------------|----------------------------------|
//! | Space             | toggle accumulation              |
//! | ArrowUp/ArrowDown | ray bounces ±1                   |
//! | PageUp/PageDown   | traversal depth cap ±50          |
//! | Escape            | quit                             |
//!
//! Values are passed to the tracer as entered, negative ones included.

use std::time::Duration;

use voxtrace_engine::input::Key;
use voxtrace_engine::time::{FrameReport, FrameStats};

use crate::session::Session;

pub const DEPTH_STEP: i32 = 50;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PanelAction {
    None,
    Changed,
    Exit,
}

pub struct SettingsPanel {
    title: String,
    stats: FrameStats,
}

impl SettingsPanel {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            stats: FrameStats::default(),
        }
    }

    /// Applies this frame's key presses in arrival order.
    pub fn apply_keys(&mut self, keys: &[Key], session: &mut Session) -> PanelAction {
        let mut action = PanelAction::None;

        for key in keys {
            match key {
                Key::Escape => return PanelAction::Exit,
                Key::Space => {
                    let settings = session.settings_mut();
                    settings.accumulate = !settings.accumulate;
                    log::info!("accumulation {}", on_off(settings.accumulate));
                }
                Key::ArrowUp => session.render_state_mut().ray_bounces += 1,
                Key::ArrowDown => session.render_state_mut().ray_bounces -= 1,
                Key::PageUp => session.render_state_mut().max_traversal_depth += DEPTH_STEP,
                Key::PageDown => session.render_state_mut().max_traversal_depth -= DEPTH_STEP,
                _ => continue,
            }
            action = PanelAction::Changed;
        }

        if action == PanelAction::Changed {
            let state = session.render_state();
            log::debug!(
                "ray bounces {}, traversal depth {}",
                state.ray_bounces,
                state.max_traversal_depth
            );
        }
        action
    }

    /// Feeds one frame time; returns a new window title twice per second.
    pub fn record_frame(&mut self, elapsed: Duration, session: &Session) -> Option<String> {
        let report = self.stats.record(elapsed)?;
        let samples = session.accumulated_samples();

        log::debug!(
            "{:.2} ms/frame, {:.1} fps, {} samples",
            report.ms_per_frame,
            report.fps,
            samples
        );
        Some(self.title_for(&report, session))
    }

    pub fn title_for(&self, report: &FrameReport, session: &Session) -> String {
        let state = session.render_state();
        format!(
            "{} | {:.2} ms/frame | {:.0} fps | {} samples | bounces {} | depth {} | accumulate {}",
            self.title,
            report.ms_per_frame,
            report.fps,
            session.accumulated_samples(),
            state.ray_bounces,
            state.max_traversal_depth,
            on_off(session.settings().accumulate),
        )
    }
}

fn on_off(v: bool) -> &'static str {
    if v { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{RenderState, Settings};

    fn session() -> Session {
        Session::new(RenderState::new(3, 300), Settings::default())
    }

    #[test]
    fn keys_adjust_render_state() {
        let mut panel = SettingsPanel::new("voxtrace");
        let mut s = session();

        let action = panel.apply_keys(
            &[Key::ArrowUp, Key::ArrowUp, Key::PageDown, Key::Space],
            &mut s,
        );
        assert_eq!(action, PanelAction::Changed);
        assert_eq!(s.render_state().ray_bounces, 5);
        assert_eq!(s.render_state().max_traversal_depth, 250);
        assert!(!s.settings().accumulate);
    }

    #[test]
    fn values_pass_through_unvalidated() {
        let mut panel = SettingsPanel::new("voxtrace");
        let mut s = session();

        let downs = [Key::ArrowDown; 5];
        panel.apply_keys(&downs, &mut s);
        panel.apply_keys(&[Key::PageDown; 7], &mut s);

        assert_eq!(s.render_state().ray_bounces, -2);
        assert_eq!(s.render_state().max_traversal_depth, -50);
    }

    #[test]
    fn escape_exits_and_other_keys_are_ignored() {
        let mut panel = SettingsPanel::new("voxtrace");
        let mut s = session();

        assert_eq!(panel.apply_keys(&[Key::Tab, Key::Home], &mut s), PanelAction::None);
        assert_eq!(
            panel.apply_keys(&[Key::Escape, Key::ArrowUp], &mut s),
            PanelAction::Exit
        );
        assert_eq!(s.render_state().ray_bounces, 3);
    }

    #[test]
    fn title_reports_twice_per_second() {
        let mut panel = SettingsPanel::new("voxtrace");
        let s = session();
        let frame = Duration::from_millis(20);

        let titles: Vec<String> = (0..50)
            .filter_map(|_| panel.record_frame(frame, &s))
            .collect();
        assert_eq!(titles.len(), 2);
        assert!(titles[0].starts_with("voxtrace | 20.00 ms/frame | 50 fps | 0 samples"));
        assert!(titles[0].ends_with("accumulate on"));
    }
}
