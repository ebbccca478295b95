//! Host-side events that drive the transition engine.
//!
//! The page choreography (scroll timelines, carousels, section anchors) lives
//! outside the renderer. It talks to the engine only through [`SceneCommand`]s
//! sent over a channel; [`CommandBridge`] applies the filtering rules before
//! anything reaches the engine.

use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use sceneconfig::SceneConfig;

use crate::engine::{SlideChange, TransitionEngine};

#[derive(Debug, Clone, PartialEq)]
pub enum SceneCommand {
    /// Scroll progress between two sections. Only the open interval `(0, 1)`
    /// is forwarded; the endpoints belong to the neighbouring transitions.
    SectionProgress {
        from: Option<String>,
        to: String,
        progress: f32,
    },
    /// Direct morph request; any finite progress is forwarded.
    Transition {
        from: Option<String>,
        to: String,
        progress: f32,
    },
    /// Carousel slide change, optionally switching step first.
    ChangeSlide {
        index: Option<usize>,
        step: Option<String>,
    },
    /// A section anchor scrolled into view.
    ActivateSection { target: String },
    /// The logical viewport width changed.
    Viewport { logical_width: f64 },
    LockCarousel,
    UnlockCarousel,
    Hide,
    Show,
}

pub type CommandSender = Sender<SceneCommand>;

pub fn command_channel() -> (CommandSender, Receiver<SceneCommand>) {
    unbounded()
}

/// Applies [`SceneCommand`]s to a [`TransitionEngine`].
#[derive(Debug, Clone)]
pub struct CommandBridge {
    scene: SceneConfig,
    slide: SlideChange,
}

impl CommandBridge {
    pub fn from_scene(scene: &SceneConfig) -> Self {
        Self {
            scene: scene.clone(),
            slide: SlideChange::from_settings(&scene.fade),
        }
    }

    /// Applies one command; returns whether the engine accepted it.
    pub fn dispatch(
        &self,
        engine: &mut TransitionEngine,
        command: SceneCommand,
        now: Instant,
    ) -> bool {
        match command {
            SceneCommand::SectionProgress { from, to, progress } => {
                if !(progress > 0.0 && progress < 1.0) {
                    return false;
                }
                self.forward_progress(engine, from, &to, progress)
            }
            SceneCommand::Transition { from, to, progress } => {
                self.forward_progress(engine, from, &to, progress)
            }
            SceneCommand::ChangeSlide { index, step } => {
                if let Some(step) = step.as_deref() {
                    engine.set_step(step);
                }
                engine.change_slide(index.unwrap_or(0), self.slide, now)
            }
            SceneCommand::ActivateSection { target } => match self.scene.resolve_section(&target) {
                Some(step) => engine.set_step(step),
                None => {
                    tracing::trace!(target = %target, "section has no step");
                    false
                }
            },
            SceneCommand::Viewport { logical_width } => {
                engine.set_mobile_mode(self.scene.is_mobile_width(logical_width))
            }
            SceneCommand::LockCarousel => {
                engine.lock_carousel();
                true
            }
            SceneCommand::UnlockCarousel => {
                engine.unlock_carousel();
                true
            }
            SceneCommand::Hide => {
                engine.hide();
                true
            }
            SceneCommand::Show => {
                engine.show();
                true
            }
        }
    }

    /// Applies every queued command; returns how many were accepted.
    pub fn drain(
        &self,
        engine: &mut TransitionEngine,
        receiver: &Receiver<SceneCommand>,
        now: Instant,
    ) -> usize {
        receiver
            .try_iter()
            .map(|command| self.dispatch(engine, command, now))
            .filter(|accepted| *accepted)
            .count()
    }

    fn forward_progress(
        &self,
        engine: &mut TransitionEngine,
        from: Option<String>,
        to: &str,
        progress: f32,
    ) -> bool {
        if !progress.is_finite() || !engine.has_step(to) {
            return false;
        }
        let from = from.as_deref().unwrap_or(&self.scene.default_step);
        engine.on_progress(progress, from, to)
    }
}
