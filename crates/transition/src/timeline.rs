use std::time::{Duration, Instant};

/// Wall-clock progress of a slide fade.
#[derive(Debug, Clone, Copy)]
pub struct FadeEnvelope {
    start: Instant,
    duration: Duration,
}

impl FadeEnvelope {
    /// Returns `None` for a zero-length fade; callers switch immediately.
    pub fn new(duration: Duration, now: Instant) -> Option<Self> {
        if duration <= Duration::ZERO {
            None
        } else {
            Some(Self {
                start: now,
                duration,
            })
        }
    }

    /// Linear progress in `[0, 1]` and whether the fade has run its course.
    pub fn progress(&self, now: Instant) -> (f32, bool) {
        let elapsed = now.saturating_duration_since(self.start);
        let raw = elapsed.as_secs_f32() / self.duration.as_secs_f32().max(f32::EPSILON);
        let finished = elapsed >= self.duration;
        (raw.clamp(0.0, 1.0), finished)
    }
}
