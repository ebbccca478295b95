//! Turns raw window input into fluid splats and scene commands.

use std::time::{Duration, Instant};

use sceneconfig::PointerSettings;
use transition::SceneCommand;
use winit::dpi::{LogicalSize, PhysicalSize};

/// Upper bound on the device pixel ratio used for the render surface.
pub const MAX_PIXEL_RATIO: f64 = 2.0;

/// Impulse derived from pointer motion, in normalized viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSplat {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
}

/// Converts pointer moves into time-normalized velocities.
///
/// Velocity is measured in logical pixels per millisecond over an interval of
/// at least `min_interval`. The first move after creation only records the
/// position.
#[derive(Debug, Clone)]
pub struct PointerTracker {
    settings: PointerSettings,
    last: Option<(f64, f64, Instant)>,
}

impl PointerTracker {
    pub fn new(settings: &PointerSettings) -> Self {
        Self {
            settings: settings.clone(),
            last: None,
        }
    }

    /// `x`/`y` are logical pixels from the top-left of a `viewport`-sized window.
    pub fn on_move(
        &mut self,
        x: f64,
        y: f64,
        viewport: LogicalSize<f64>,
        now: Instant,
    ) -> Option<PointerSplat> {
        let Some((last_x, last_y, last_time)) = self.last.replace((x, y, now)) else {
            return None;
        };

        let elapsed = now.saturating_duration_since(last_time);
        let dt = elapsed.max(self.settings.min_interval).max(Duration::from_micros(1));
        let dt_ms = dt.as_secs_f64() * 1000.0;
        let velocity_x = ((x - last_x) / dt_ms) as f32;
        let velocity_y = ((y - last_y) / dt_ms) as f32;

        let threshold = self.settings.threshold;
        if velocity_x.abs() <= threshold && velocity_y.abs() <= threshold {
            return None;
        }

        let scale = self.settings.velocity_scale;
        Some(PointerSplat {
            x: (x / viewport.width.max(1.0)) as f32,
            y: (y / viewport.height.max(1.0)) as f32,
            dx: velocity_x * scale,
            dy: velocity_y * scale,
        })
    }

    /// Forgets the last position; the next move starts a new stroke.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Walks the scroll sequence in response to wheel input.
///
/// The position is measured in sections: `1.25` sits a quarter of the way
/// from `sequence[1]` to `sequence[2]`. Positions strictly between two
/// sections emit progress events; reaching the neighbourhood of a new section
/// activates it.
#[derive(Debug, Clone)]
pub struct ScrollDriver {
    sequence: Vec<String>,
    position: f32,
    active: usize,
}

impl ScrollDriver {
    pub fn new(sequence: Vec<String>) -> Self {
        Self {
            sequence,
            position: 0.0,
            active: 0,
        }
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn active_section(&self) -> Option<&str> {
        self.sequence.get(self.active).map(String::as_str)
    }

    /// Moves by `delta` sections and returns the commands the move produced.
    pub fn scroll(&mut self, delta: f32) -> Vec<SceneCommand> {
        let mut commands = Vec::new();
        if self.sequence.len() < 2 || !delta.is_finite() || delta == 0.0 {
            return commands;
        }

        let last = (self.sequence.len() - 1) as f32;
        self.position = (self.position + delta).clamp(0.0, last);

        let index = self.position.floor() as usize;
        let progress = self.position - self.position.floor();
        if progress > 0.0 {
            if let (Some(from), Some(to)) = (self.sequence.get(index), self.sequence.get(index + 1))
            {
                commands.push(SceneCommand::SectionProgress {
                    from: Some(from.clone()),
                    to: to.clone(),
                    progress,
                });
            }
        }

        let nearest = self.position.round() as usize;
        if nearest != self.active {
            self.active = nearest;
            if let Some(target) = self.sequence.get(nearest) {
                commands.push(SceneCommand::ActivateSection {
                    target: target.clone(),
                });
            }
        }
        commands
    }
}

/// Physical render size for a logical window size, with the pixel ratio capped.
pub fn render_size(logical: LogicalSize<f64>, scale_factor: f64) -> PhysicalSize<u32> {
    let ratio = scale_factor.clamp(f64::MIN_POSITIVE, MAX_PIXEL_RATIO);
    PhysicalSize::new(
        (logical.width * ratio).round().max(1.0) as u32,
        (logical.height * ratio).round().max(1.0) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> LogicalSize<f64> {
        LogicalSize::new(1000.0, 500.0)
    }

    #[test]
    fn first_move_only_records_position() {
        let mut tracker = PointerTracker::new(&PointerSettings::default());
        let start = Instant::now();
        assert_eq!(tracker.on_move(100.0, 100.0, viewport(), start), None);

        let splat = tracker
            .on_move(128.0, 86.0, viewport(), start + Duration::from_millis(28))
            .expect("splat");
        assert!((splat.x - 0.128).abs() < 1e-6);
        assert!((splat.y - 0.172).abs() < 1e-6);
        assert!((splat.dx - 0.8).abs() < 1e-6);
        assert!((splat.dy + 0.4).abs() < 1e-6);
    }

    #[test]
    fn short_intervals_use_the_minimum() {
        let mut tracker = PointerTracker::new(&PointerSettings::default());
        let start = Instant::now();
        tracker.on_move(0.0, 0.0, viewport(), start);
        let splat = tracker
            .on_move(14.0, 0.0, viewport(), start + Duration::from_millis(2))
            .expect("splat");
        assert!((splat.dx - 0.8).abs() < 1e-6);
    }

    #[test]
    fn tiny_motion_stays_below_threshold() {
        let mut tracker = PointerTracker::new(&PointerSettings::default());
        let start = Instant::now();
        tracker.on_move(10.0, 10.0, viewport(), start);
        let later = start + Duration::from_secs(1);
        assert_eq!(tracker.on_move(10.5, 10.0, viewport(), later), None);
        tracker.reset();
        assert_eq!(
            tracker.on_move(500.0, 10.0, viewport(), later + Duration::from_millis(16)),
            None
        );
    }

    fn sequence() -> Vec<String> {
        ["hero", "sport", "manifesto"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn scrolling_between_sections_reports_progress() {
        let mut driver = ScrollDriver::new(sequence());
        let commands = driver.scroll(0.25);
        assert_eq!(
            commands,
            vec![SceneCommand::SectionProgress {
                from: Some("hero".into()),
                to: "sport".into(),
                progress: 0.25,
            }]
        );
        assert_eq!(driver.active_section(), Some("hero"));
    }

    #[test]
    fn reaching_a_section_activates_it() {
        let mut driver = ScrollDriver::new(sequence());
        driver.scroll(0.25);
        let commands = driver.scroll(0.75);
        assert_eq!(
            commands,
            vec![SceneCommand::ActivateSection {
                target: "sport".into()
            }]
        );

        let commands = driver.scroll(-0.75);
        assert_eq!(commands.len(), 2);
        assert_eq!(
            commands[1],
            SceneCommand::ActivateSection {
                target: "hero".into()
            }
        );
    }

    #[test]
    fn scroll_position_is_clamped_to_the_sequence() {
        let mut driver = ScrollDriver::new(sequence());
        driver.scroll(10.0);
        assert_eq!(driver.position(), 2.0);
        assert_eq!(driver.active_section(), Some("manifesto"));
        assert!(driver.scroll(1.0).is_empty());
        driver.scroll(-10.0);
        assert_eq!(driver.position(), 0.0);
    }

    #[test]
    fn render_size_caps_pixel_ratio() {
        let logical = LogicalSize::new(800.0, 600.0);
        assert_eq!(render_size(logical, 1.0), PhysicalSize::new(800, 600));
        assert_eq!(render_size(logical, 1.5), PhysicalSize::new(1200, 900));
        assert_eq!(render_size(logical, 3.0), PhysicalSize::new(1600, 1200));
    }
}
