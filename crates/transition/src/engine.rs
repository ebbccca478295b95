//! Dual-slot image transition state machine.
//!
//! Two image slots (A and B) feed the compositor. A scroll-driven morph blends
//! A into B by an externally supplied progress; a slide change runs a timed
//! zoom/rotate/crossfade within the current step. Both paradigms write the
//! same slots, so [`TransitionEngine::enter`] is the only place the phase
//! changes and it decides what happens to a fade that is still running.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use sceneconfig::{FadeSettings, SceneConfig, StepImages, Variant};

use crate::cache::{CacheStatus, DecodedImage, ImageCache, LoadedImage, TextureKey};
use crate::timeline::FadeEnvelope;

/// Options for a timed slide change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlideChange {
    pub duration: Duration,
    pub zoom_from: f32,
    pub rotation_from: f32,
    /// Trusted callers own the carousel and may change slides while it is locked.
    pub trusted: bool,
}

impl Default for SlideChange {
    fn default() -> Self {
        Self::from_settings(&FadeSettings::default())
    }
}

impl SlideChange {
    pub fn from_settings(settings: &FadeSettings) -> Self {
        Self {
            duration: settings.duration,
            zoom_from: settings.zoom_from,
            rotation_from: settings.rotation_from,
            trusted: false,
        }
    }

    pub fn trusted(mut self) -> Self {
        self.trusted = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Morph,
    Fade,
}

#[derive(Debug, Clone, Copy)]
pub struct FadeState {
    envelope: FadeEnvelope,
    pub zoom_from: f32,
    pub rotation_from: f32,
    pub target_slide: usize,
    pub progress: f32,
    finished: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum Phase {
    /// Showing slot A at rest.
    Static,
    Morphing { progress: f32 },
    Fading(FadeState),
}

impl Phase {
    pub fn blend_mode(&self) -> BlendMode {
        match self {
            Phase::Fading(_) => BlendMode::Fade,
            Phase::Static | Phase::Morphing { .. } => BlendMode::Morph,
        }
    }

    pub fn is_fading(&self) -> bool {
        matches!(self, Phase::Fading(_))
    }
}

/// What a running fade turns into when another phase takes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FadeExit {
    /// Jump to the end state: B becomes A and the target slide is committed.
    Complete,
    /// Drop the animation and leave the slots to the caller.
    Abandon,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Slot {
    url: Option<String>,
    image: Option<LoadedImage>,
}

impl Slot {
    fn resolution(&self) -> [f32; 2] {
        self.image
            .map(|image| image.resolution())
            .unwrap_or([1.0, 1.0])
    }

    fn key(&self) -> Option<TextureKey> {
        self.image.map(|image| image.key)
    }
}

/// Everything the compositor needs from the engine for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeState {
    /// `None` means the shared black fallback.
    pub texture_a: Option<TextureKey>,
    pub texture_b: Option<TextureKey>,
    pub image_res_a: [f32; 2],
    pub image_res_b: [f32; 2],
    pub mode: BlendMode,
    pub progress: f32,
    pub fade_progress: f32,
    pub zoom_from: f32,
    pub rotation_from: f32,
    pub image_mix: f32,
}

/// Urls requested by a preload call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadSet {
    urls: Vec<String>,
}

impl PreloadSet {
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

pub struct TransitionEngine {
    steps: BTreeMap<String, StepImages>,
    cache: ImageCache,
    variant: Variant,
    step: Option<String>,
    slide: usize,
    last_slide: HashMap<String, usize>,
    carousel_locked: bool,
    phase: Phase,
    slot_a: Slot,
    slot_b: Slot,
    image_mix: f32,
    reveal_on_load: bool,
}

impl TransitionEngine {
    pub fn new(steps: BTreeMap<String, StepImages>, cache: ImageCache, mobile: bool) -> Self {
        Self {
            steps,
            cache,
            variant: Variant::from_mobile(mobile),
            step: None,
            slide: 0,
            last_slide: HashMap::new(),
            carousel_locked: false,
            phase: Phase::Static,
            slot_a: Slot::default(),
            slot_b: Slot::default(),
            image_mix: 0.0,
            reveal_on_load: false,
        }
    }

    pub fn from_scene(scene: &SceneConfig, cache: ImageCache, mobile: bool) -> Self {
        Self::new(scene.steps.clone(), cache, mobile)
    }

    pub fn has_step(&self, key: &str) -> bool {
        self.steps.contains_key(key)
    }

    pub fn step_key(&self) -> Option<&str> {
        self.step.as_deref()
    }

    pub fn slide_index(&self) -> usize {
        self.slide
    }

    pub fn slide_count(&self) -> usize {
        self.step
            .as_deref()
            .map(|key| self.urls(key).len())
            .unwrap_or(0)
    }

    /// Slide most recently selected in `key`, whether or not its fade finished.
    pub fn last_slide(&self, key: &str) -> Option<usize> {
        self.last_slide.get(key).copied()
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_carousel_locked(&self) -> bool {
        self.carousel_locked
    }

    pub fn is_mobile(&self) -> bool {
        self.variant == Variant::Mobile
    }

    pub fn image_mix(&self) -> f32 {
        self.image_mix
    }

    pub fn preload_step(&mut self, key: &str) -> Option<PreloadSet> {
        let urls = self.steps.get(key)?.urls(self.variant).to_vec();
        for url in &urls {
            self.cache.request(url);
        }
        Some(PreloadSet { urls })
    }

    pub fn preload_all(&mut self) -> PreloadSet {
        let mut urls: Vec<String> = Vec::new();
        for images in self.steps.values() {
            for url in images.urls(self.variant) {
                if !urls.contains(url) {
                    urls.push(url.clone());
                }
            }
        }
        for url in &urls {
            self.cache.request(url);
        }
        PreloadSet { urls }
    }

    /// True once every url in `set` has either decoded or failed.
    pub fn preload_settled(&self, set: &PreloadSet) -> bool {
        set.urls.iter().all(|url| {
            self.cache
                .status(url)
                .map(|status| status.is_settled())
                .unwrap_or(false)
        })
    }

    /// Blocks until `set` settles or `timeout` passes.
    pub fn wait_for_preload(&mut self, set: &PreloadSet, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        for url in &set.urls {
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.cache.wait_for(url, remaining);
        }
        self.refresh_slots();
        self.preload_settled(set)
    }

    /// Decoded images the renderer has not uploaded yet.
    pub fn take_uploads(&mut self) -> Vec<DecodedImage> {
        self.cache.take_uploads()
    }

    pub fn set_mobile_mode(&mut self, mobile: bool) -> bool {
        let variant = Variant::from_mobile(mobile);
        if self.variant == variant {
            return false;
        }
        tracing::debug!(%variant, "switching image variant");
        self.variant = variant;
        true
    }

    pub fn lock_carousel(&mut self) {
        if !self.carousel_locked {
            tracing::debug!("carousel locked");
        }
        self.carousel_locked = true;
    }

    pub fn unlock_carousel(&mut self) {
        if self.carousel_locked {
            tracing::debug!("carousel unlocked");
        }
        self.carousel_locked = false;
    }

    pub fn hide(&mut self) {
        self.image_mix = 0.0;
    }

    pub fn show(&mut self) {
        self.image_mix = 1.0;
    }

    /// Makes `key` the active step, resuming at its last selected slide.
    /// Images only change here on a cold start; otherwise the scroll morph
    /// owns the slots.
    pub fn set_step(&mut self, key: &str) -> bool {
        if self.step.as_deref() == Some(key) {
            return false;
        }
        if self.carousel_locked {
            tracing::trace!(step = key, "step change ignored while carousel is locked");
            return false;
        }
        if !self.has_step(key) {
            tracing::trace!(step = key, "step change ignored for unknown step");
            return false;
        }

        if self.phase.is_fading() {
            self.enter(Phase::Static, FadeExit::Complete);
        }
        if let Some(previous) = self.step.take() {
            self.last_slide.insert(previous, self.slide);
        }

        self.slide = self.remembered_slide(key);
        self.step = Some(key.to_string());
        tracing::debug!(step = key, slide = self.slide, "step changed");

        if self.slot_a.image.is_some() {
            return true;
        }

        if let Some(url) = self.url_for(key, self.slide) {
            self.slot_a = self.request_slot(&url);
            if self.slot_a.image.is_some() {
                self.image_mix = 1.0;
                self.reveal_on_load = false;
            } else {
                self.reveal_on_load = true;
            }
        }
        true
    }

    /// Scroll-driven morph between the remembered slides of `from_key` and
    /// `to_key`, so the image shown on arrival matches the slide `set_step`
    /// resumes at.
    pub fn on_progress(&mut self, progress: f32, from_key: &str, to_key: &str) -> bool {
        if self.carousel_locked {
            tracing::trace!(from = from_key, to = to_key, "morph ignored while carousel is locked");
            return false;
        }
        if !progress.is_finite() {
            return false;
        }

        let progress = progress.clamp(0.0, 1.0);
        self.enter(Phase::Morphing { progress }, FadeExit::Complete);

        let from_slide = self.remembered_slide(from_key);
        if let Some(url) = self.url_for(from_key, from_slide) {
            if let Some(slot) = self.ready_slot(&url) {
                self.slot_a = slot;
            }
        }
        let to_slide = self.remembered_slide(to_key);
        if let Some(url) = self.url_for(to_key, to_slide) {
            if let Some(slot) = self.ready_slot(&url) {
                self.slot_b = slot;
            }
        }

        self.image_mix = 1.0;
        self.reveal_on_load = false;
        true
    }

    /// Timed crossfade to `index` within the current step.
    pub fn change_slide(&mut self, index: usize, options: SlideChange, now: Instant) -> bool {
        if self.carousel_locked && !options.trusted {
            tracing::trace!(index, "slide change ignored while carousel is locked");
            return false;
        }
        let Some(step) = self.step.clone() else {
            return false;
        };
        let urls = self.urls(&step).to_vec();
        if index >= urls.len() {
            tracing::trace!(step = %step, index, count = urls.len(), "slide index out of range");
            return false;
        }

        if index == self.slide {
            if self.phase.is_fading() {
                // Heading back to the committed slide: drop the fade and rest on A.
                self.enter(Phase::Static, FadeExit::Abandon);
                self.last_slide.insert(step, self.slide);
            }
            return false;
        }

        self.last_slide.insert(step.clone(), index);
        let from = self.slide.min(urls.len() - 1);
        self.slot_a = self.request_slot(&urls[from]);
        self.slot_b = self.request_slot(&urls[index]);
        self.image_mix = 1.0;
        self.reveal_on_load = false;

        match FadeEnvelope::new(options.duration, now) {
            Some(envelope) => {
                tracing::debug!(step = %step, from, to = index, "slide fade started");
                self.enter(
                    Phase::Fading(FadeState {
                        envelope,
                        zoom_from: options.zoom_from,
                        rotation_from: options.rotation_from,
                        target_slide: index,
                        progress: 0.0,
                        finished: false,
                    }),
                    FadeExit::Abandon,
                );
            }
            None => {
                self.enter(Phase::Static, FadeExit::Abandon);
                self.slot_a = self.slot_b.clone();
                self.slide = index;
            }
        }
        true
    }

    /// Advances wall-clock state: folds finished loads into the slots and
    /// drives any running fade. A fade reports progress 1 on the tick it ends
    /// and settles back to [`Phase::Static`] on the following tick.
    pub fn tick(&mut self, now: Instant) {
        self.cache.poll();
        self.refresh_slots();

        let settle = match &mut self.phase {
            Phase::Fading(fade) if fade.finished => true,
            Phase::Fading(fade) => {
                let (progress, finished) = fade.envelope.progress(now);
                fade.progress = progress;
                fade.finished = finished;
                false
            }
            Phase::Static | Phase::Morphing { .. } => false,
        };
        if settle {
            self.enter(Phase::Static, FadeExit::Complete);
            tracing::debug!(slide = self.slide, "slide fade settled");
        }
    }

    pub fn composite_state(&self) -> CompositeState {
        let (progress, fade_progress, zoom_from, rotation_from) = match &self.phase {
            Phase::Static => (0.0, 0.0, 1.0, 0.0),
            Phase::Morphing { progress } => (*progress, 0.0, 1.0, 0.0),
            Phase::Fading(fade) => (0.0, fade.progress, fade.zoom_from, fade.rotation_from),
        };
        CompositeState {
            texture_a: self.slot_a.key(),
            texture_b: self.slot_b.key(),
            image_res_a: self.slot_a.resolution(),
            image_res_b: self.slot_b.resolution(),
            mode: self.phase.blend_mode(),
            progress,
            fade_progress,
            zoom_from,
            rotation_from,
            image_mix: self.image_mix,
        }
    }

    fn enter(&mut self, next: Phase, exit: FadeExit) {
        let previous = std::mem::replace(&mut self.phase, next);
        if let (Phase::Fading(fade), FadeExit::Complete) = (previous, exit) {
            self.slot_a = self.slot_b.clone();
            self.slide = fade.target_slide;
        }
    }

    /// Slide `key` resumes at: the live slide for the active step, else the
    /// last one selected there, clamped to the current variant.
    fn remembered_slide(&self, key: &str) -> usize {
        let slide = if self.step.as_deref() == Some(key) {
            self.slide
        } else {
            self.last_slide.get(key).copied().unwrap_or(0)
        };
        slide.min(self.urls(key).len().saturating_sub(1))
    }

    fn urls(&self, key: &str) -> &[String] {
        self.steps
            .get(key)
            .map(|images| images.urls(self.variant))
            .unwrap_or(&[])
    }

    fn url_for(&self, key: &str, slide: usize) -> Option<String> {
        self.urls(key).get(slide).cloned()
    }

    /// Slot bound to `url`; empty until the image decodes.
    fn request_slot(&mut self, url: &str) -> Slot {
        let image = match self.cache.request(url) {
            CacheStatus::Ready(image) => Some(image),
            CacheStatus::Loading | CacheStatus::Failed => None,
        };
        Slot {
            url: Some(url.to_string()),
            image,
        }
    }

    /// Slot for `url` only if it is already decoded; starts the load otherwise.
    fn ready_slot(&mut self, url: &str) -> Option<Slot> {
        let slot = self.request_slot(url);
        slot.image.is_some().then_some(slot)
    }

    fn refresh_slots(&mut self) {
        for slot in [&mut self.slot_a, &mut self.slot_b] {
            if slot.image.is_none() {
                if let Some(url) = slot.url.as_deref() {
                    slot.image = self.cache.lookup(url);
                }
            }
        }
        if self.reveal_on_load && self.slot_a.image.is_some() {
            self.image_mix = 1.0;
            self.reveal_on_load = false;
        }
    }
}
