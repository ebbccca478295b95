use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use sceneconfig::SceneConfig;
use tempfile::TempDir;
use transition::{
    BlendMode, CommandBridge, FileSource, ImageCache, Phase, SceneCommand, SlideChange,
    TransitionEngine,
};

const SCENE: &str = r#"
version = 1
default_step = "hero"
sequence = ["hero", "manifesto", "focus"]

[fade]
duration = "800ms"

[steps.hero]
desktop = ["/images/desktop/hero.png"]
mobile = ["/images/mobile/hero.png"]

[steps.manifesto]
desktop = ["/images/desktop/c2.png", "/images/desktop/c3.png", "/images/desktop/c4.png"]
mobile = ["/images/mobile/c2.png"]

[steps.focus]
desktop = [
    "/images/desktop/f1.png",
    "/images/desktop/f2.png",
    "/images/desktop/f3.png",
    "/images/desktop/f4.png",
]
mobile = ["/images/mobile/f1.png"]
"#;

fn write_image(root: &Path, url: &str, shade: u8) {
    let path = root.join(url.trim_start_matches('/'));
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    RgbaImage::from_pixel(6, 3, Rgba([shade, shade, shade, 255]))
        .save(&path)
        .expect("write png");
}

struct Fixture {
    _dir: TempDir,
    bridge: CommandBridge,
    engine: TransitionEngine,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let scene = SceneConfig::from_toml_str(SCENE).expect("scene");
    for (index, url) in scene.all_urls(sceneconfig::Variant::Desktop).iter().enumerate() {
        write_image(dir.path(), url, (index * 20) as u8);
    }

    let cache = ImageCache::new(Arc::new(FileSource::new(dir.path())));
    let mut engine = TransitionEngine::from_scene(&scene, cache, false);
    let set = engine.preload_all();
    assert!(engine.wait_for_preload(&set, Duration::from_secs(10)));
    assert_eq!(engine.take_uploads().len(), 8);

    Fixture {
        _dir: dir,
        bridge: CommandBridge::from_scene(&scene),
        engine,
    }
}

#[test]
fn manifesto_slide_fade_runs_to_completion() {
    let Fixture { mut engine, .. } = fixture();
    engine.set_step("manifesto");
    let committed = engine.composite_state().texture_a;

    let start = Instant::now();
    assert!(engine.change_slide(2, SlideChange::default(), start));
    engine.tick(start);
    let state = engine.composite_state();
    assert_eq!(state.mode, BlendMode::Fade);
    assert_eq!(state.fade_progress, 0.0);
    assert_eq!(state.texture_a, committed);
    let target = state.texture_b;
    assert_ne!(target, committed);

    engine.tick(start + Duration::from_millis(400));
    let mid = engine.composite_state().fade_progress;
    assert!((mid - 0.5).abs() < 0.02, "mid fade progress {mid}");

    engine.tick(start + Duration::from_millis(800));
    let state = engine.composite_state();
    assert_eq!(state.mode, BlendMode::Fade);
    assert_eq!(state.fade_progress, 1.0);

    engine.tick(start + Duration::from_millis(816));
    let state = engine.composite_state();
    assert_eq!(state.mode, BlendMode::Morph);
    assert_eq!(state.texture_a, target);
    assert_eq!(engine.slide_index(), 2);
    assert_eq!(engine.last_slide("manifesto"), Some(2));
}

#[test]
fn locked_carousel_ignores_untrusted_slide_changes() {
    let Fixture {
        bridge, mut engine, ..
    } = fixture();
    let now = Instant::now();
    engine.set_step("manifesto");
    bridge.dispatch(&mut engine, SceneCommand::LockCarousel, now);
    let before = engine.composite_state();

    let command = SceneCommand::ChangeSlide {
        index: Some(1),
        step: None,
    };
    assert!(!bridge.dispatch(&mut engine, command, now));
    engine.tick(now + Duration::from_millis(100));
    assert_eq!(engine.composite_state(), before);
    assert_eq!(engine.slide_index(), 0);
}

#[test]
fn slide_position_survives_a_round_trip_through_steps() {
    let Fixture { mut engine, .. } = fixture();
    let start = Instant::now();
    engine.set_step("focus");
    engine.change_slide(3, SlideChange::default(), start);
    engine.tick(start + Duration::from_secs(1));
    engine.tick(start + Duration::from_secs(2));
    assert_eq!(engine.slide_index(), 3);

    engine.set_step("hero");
    assert_eq!(engine.last_slide("focus"), Some(3));
    engine.set_step("focus");
    assert_eq!(engine.slide_index(), 3);

    // morphing out of focus starts from the remembered slide
    let focus_slide = engine.composite_state().texture_a;
    engine.on_progress(0.25, "focus", "hero");
    assert_eq!(engine.composite_state().texture_a, focus_slide);
}

#[test]
fn scrolling_back_into_a_step_shows_the_slide_it_resumes_at() {
    let Fixture { mut engine, .. } = fixture();
    let start = Instant::now();
    engine.set_step("focus");
    engine.change_slide(3, SlideChange::default(), start);
    engine.tick(start + Duration::from_secs(1));
    engine.tick(start + Duration::from_secs(2));
    let fourth = engine.composite_state().texture_a;
    assert!(fourth.is_some());

    engine.set_step("manifesto");
    assert!(engine.on_progress(0.5, "manifesto", "focus"));
    assert_eq!(engine.composite_state().texture_b, fourth);
    assert!(engine.on_progress(1.0, "manifesto", "focus"));
    assert!(engine.set_step("focus"));
    assert_eq!(engine.slide_index(), 3);

    // the slide on screen is the one the carousel believes is current
    let later = start + Duration::from_secs(3);
    assert!(!engine.change_slide(3, SlideChange::default(), later));
    assert!(engine.change_slide(0, SlideChange::default(), later));
    engine.tick(later);
    let state = engine.composite_state();
    assert_eq!(state.mode, BlendMode::Fade);
    assert_eq!(state.texture_a, fourth);
    assert_ne!(state.texture_b, fourth);
}

#[test]
fn morph_targets_the_first_slide_when_none_was_chosen() {
    let Fixture { mut engine, .. } = fixture();
    engine.set_step("focus");
    let first = engine.composite_state().texture_a;
    assert!(first.is_some());

    engine.set_step("hero");
    assert!(engine.on_progress(0.5, "hero", "focus"));
    assert_eq!(engine.composite_state().texture_b, first);
}

#[test]
fn scroll_progress_completes_an_interrupted_fade() {
    let Fixture {
        bridge, mut engine, ..
    } = fixture();
    let start = Instant::now();
    engine.set_step("manifesto");
    engine.change_slide(1, SlideChange::default(), start);
    engine.tick(start + Duration::from_millis(200));
    assert!(engine.phase().is_fading());

    let command = SceneCommand::SectionProgress {
        from: Some("manifesto".into()),
        to: "focus".into(),
        progress: 0.5,
    };
    assert!(bridge.dispatch(&mut engine, command, start + Duration::from_millis(200)));
    assert!(matches!(engine.phase(), Phase::Morphing { .. }));
    assert_eq!(engine.slide_index(), 1);
    let state = engine.composite_state();
    assert_eq!(state.fade_progress, 0.0);
    assert!((state.progress - 0.5).abs() < 1e-6);
}

#[test]
fn cold_start_shows_first_step_image() {
    let Fixture {
        bridge, mut engine, ..
    } = fixture();
    assert_eq!(engine.composite_state().image_mix, 0.0);
    let command = SceneCommand::ActivateSection {
        target: "hero".into(),
    };
    assert!(bridge.dispatch(&mut engine, command, Instant::now()));
    let state = engine.composite_state();
    assert_eq!(state.image_mix, 1.0);
    assert_eq!(state.image_res_a, [6.0, 3.0]);
}
