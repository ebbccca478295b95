use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};
use renderer::gpu::{
    passes_per_step, read_rgba8, AdvectionMode, CompositeParams, Compositor, FieldFormats,
    FluidField, FluidSolver, TextureArena,
};
use renderer::{GpuPowerPreference, HeadlessGpu};
use sceneconfig::{Appearance, FluidSettings};
use transition::{
    AssetError, BlendMode, CacheStatus, CompositeState, ImageCache, ImageSource, LoadedImage,
};

fn headless() -> Option<HeadlessGpu> {
    match HeadlessGpu::new(GpuPowerPreference::Low) {
        Ok(gpu) => Some(gpu),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

fn small_settings() -> FluidSettings {
    FluidSettings {
        sim_resolution: 64,
        dye_resolution: 128,
        seed: Some(7),
        ..FluidSettings::default()
    }
}

fn solver(gpu: &HeadlessGpu) -> FluidSolver {
    FluidSolver::new(&gpu.device, &gpu.formats, &small_settings(), Some(7))
}

#[test]
fn fluid_without_splats_keeps_every_field_at_zero() {
    let Some(gpu) = headless() else { return };
    let mut solver = solver(&gpu);
    for _ in 0..5 {
        solver.update(&gpu.device, &gpu.queue);
    }

    for field in [
        FluidField::Pressure,
        FluidField::Velocity,
        FluidField::Divergence,
    ] {
        let image = solver
            .read_field(&gpu.device, &gpu.queue, field)
            .expect("readback");
        assert!(image.is_finite(), "{field:?} has non-finite values");
        assert!(
            image.max_abs(field.channels()) < 1e-6,
            "{field:?} drifted from zero"
        );
    }
}

#[test]
fn splat_pushes_velocity_and_dye_with_falloff() {
    let Some(gpu) = headless() else { return };
    let mut solver = solver(&gpu);
    solver.splat(0.5, 0.5, 0.1, 0.0);
    assert_eq!(solver.pending_splats(), 1);
    solver.update(&gpu.device, &gpu.queue);
    assert_eq!(solver.pending_splats(), 0);

    let velocity = solver
        .read_field(&gpu.device, &gpu.queue, FluidField::Velocity)
        .expect("velocity");
    let center = velocity.sample_uv(0.5, 0.5);
    let far = velocity.sample_uv(0.5, 0.8);
    assert!(center[0] > 0.1, "center velocity {center:?}");
    assert!(center[0].abs() > far[0].abs());

    let dye = solver
        .read_field(&gpu.device, &gpu.queue, FluidField::Dye)
        .expect("dye");
    let near = dye.sample_uv(0.5, 0.5)[1];
    let ring = dye.sample_uv(0.5, 0.55)[1];
    let outside = dye.sample_uv(0.5, 0.7)[1];
    assert!(near > ring, "near {near} ring {ring}");
    assert!(ring > outside, "ring {ring} outside {outside}");
    assert!(outside.abs() < 1e-3);
}

#[test]
fn splat_energy_decays_without_blowing_up() {
    let Some(gpu) = headless() else { return };
    let mut solver = solver(&gpu);
    solver.splat(0.3, 0.6, 0.2, -0.1);
    solver.update(&gpu.device, &gpu.queue);
    let initial = solver
        .read_field(&gpu.device, &gpu.queue, FluidField::Velocity)
        .expect("velocity");

    for _ in 0..400 {
        solver.update(&gpu.device, &gpu.queue);
    }
    let settled = solver
        .read_field(&gpu.device, &gpu.queue, FluidField::Velocity)
        .expect("velocity");
    let dye = solver
        .read_field(&gpu.device, &gpu.queue, FluidField::Dye)
        .expect("dye");

    assert!(settled.is_finite());
    assert!(dye.is_finite());
    assert!(settled.max_abs(2) < initial.max_abs(2) * 0.01);
    assert!(dye.max_abs(3) < 1e-3);
}

#[test]
fn pressure_and_divergence_stay_zero_in_still_fluid() {
    let Some(gpu) = headless() else { return };
    let mut solver = solver(&gpu);
    for _ in 0..30 {
        solver.update(&gpu.device, &gpu.queue);
    }
    for field in [FluidField::Pressure, FluidField::Divergence, FluidField::Curl] {
        let image = solver
            .read_field(&gpu.device, &gpu.queue, field)
            .expect("readback");
        assert!(image.is_finite());
        assert_eq!(image.max_abs(field.channels()), 0.0, "{field:?}");
    }
}

#[test]
fn splat_builds_pressure_that_relaxes_back() {
    let Some(gpu) = headless() else { return };
    let mut solver = solver(&gpu);
    solver.splat(0.5, 0.5, 0.2, 0.0);
    solver.update(&gpu.device, &gpu.queue);
    let pressure = solver
        .read_field(&gpu.device, &gpu.queue, FluidField::Pressure)
        .expect("pressure");
    let peak = pressure.max_abs(1);
    assert!(pressure.is_finite());
    assert!(peak > 0.0, "splat left no pressure");

    for _ in 0..600 {
        solver.update(&gpu.device, &gpu.queue);
    }
    let relaxed = solver
        .read_field(&gpu.device, &gpu.queue, FluidField::Pressure)
        .expect("pressure");
    assert!(relaxed.is_finite());
    assert!(relaxed.max_abs(1) < peak * 0.05, "pressure {}", relaxed.max_abs(1));
}

#[test]
fn many_splats_in_one_step_each_get_their_own_parameters() {
    let Some(gpu) = headless() else { return };
    let mut solver = solver(&gpu);
    let points = [0.15_f32, 0.35, 0.55, 0.75];
    for _ in 0..5 {
        for &x in &points {
            solver.splat(x, 0.5, 0.0, -0.05);
        }
    }
    assert!(passes_per_step(solver.pending_splats()) > 32);
    solver.update(&gpu.device, &gpu.queue);

    let dye = solver
        .read_field(&gpu.device, &gpu.queue, FluidField::Dye)
        .expect("dye");
    assert!(dye.is_finite());
    for &x in &points {
        let tint = dye.sample_uv(x, 0.5);
        assert!(tint[0] > 0.05, "no dye at x = {x}: {tint:?}");
    }
    let between = dye.sample_uv(0.95, 0.5);
    assert!(between[0].abs() < 1e-3, "dye leaked to the edge: {between:?}");
}

#[test]
fn manual_bilinear_path_runs_headless() {
    let Some(gpu) = headless() else { return };
    let formats = FieldFormats {
        linear_filtering: false,
        advection: AdvectionMode::ManualBilinear,
        ..gpu.formats
    };
    let mut solver = FluidSolver::new(&gpu.device, &formats, &small_settings(), Some(7));
    solver.splat(0.5, 0.5, 0.1, 0.0);
    solver.update(&gpu.device, &gpu.queue);
    let first = solver
        .read_field(&gpu.device, &gpu.queue, FluidField::Velocity)
        .expect("velocity");
    assert!(first.is_finite());
    assert!(first.sample_uv(0.5, 0.5)[0] > 0.1);

    for _ in 0..50 {
        solver.update(&gpu.device, &gpu.queue);
    }
    let later = solver
        .read_field(&gpu.device, &gpu.queue, FluidField::Velocity)
        .expect("velocity");
    assert!(later.is_finite());
    assert!(later.max_abs(2) < first.max_abs(2));

    let arena = TextureArena::new(&gpu.device, &gpu.queue, wgpu::TextureFormat::Rgba8Unorm);
    let state = CompositeState {
        progress: 0.5,
        ..empty_state()
    };
    let pixel = composite_with(&gpu, &arena, &solver, &state, false);
    assert_eq!(&pixel[..3], &[0, 0, 0]);
}

#[test]
fn long_runs_stay_finite_and_quiet() {
    let Some(gpu) = headless() else { return };
    let settings = FluidSettings {
        sim_resolution: 32,
        dye_resolution: 64,
        ..small_settings()
    };
    let mut solver = FluidSolver::new(&gpu.device, &gpu.formats, &settings, Some(11));
    for step in 0..10_000u32 {
        if step % 500 == 0 && step < 5_000 {
            let x = 0.2 + (step / 500) as f32 * 0.06;
            solver.splat(x, 0.4, 0.15, 0.1);
        }
        solver.update(&gpu.device, &gpu.queue);
        if step % 2_000 == 1_999 {
            for field in [FluidField::Velocity, FluidField::Pressure, FluidField::Dye] {
                let image = solver
                    .read_field(&gpu.device, &gpu.queue, field)
                    .expect("readback");
                assert!(image.is_finite(), "{field:?} non-finite at step {step}");
            }
        }
    }
    assert_eq!(solver.steps(), 10_000);

    let velocity = solver
        .read_field(&gpu.device, &gpu.queue, FluidField::Velocity)
        .expect("velocity");
    let dye = solver
        .read_field(&gpu.device, &gpu.queue, FluidField::Dye)
        .expect("dye");
    assert!(velocity.max_abs(2) < 1e-3);
    assert!(dye.max_abs(3) < 1e-3);
}

struct SolidColors;

impl ImageSource for SolidColors {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let color = match url {
            "red" => Rgba([255, 0, 0, 255]),
            "blue" => Rgba([0, 0, 255, 255]),
            other => return Err(AssetError::UnsupportedUrl(other.to_string())),
        };
        let mut png = Vec::new();
        RgbaImage::from_pixel(16, 16, color)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|source| AssetError::Decode {
                url: url.to_string(),
                source,
            })?;
        Ok(png)
    }
}

fn load(cache: &mut ImageCache, url: &str) -> LoadedImage {
    cache.request(url);
    match cache.wait_for(url, Duration::from_secs(5)) {
        CacheStatus::Ready(image) => image,
        other => panic!("{url} did not load: {other:?}"),
    }
}

fn empty_state() -> CompositeState {
    CompositeState {
        texture_a: None,
        texture_b: None,
        image_res_a: [1.0, 1.0],
        image_res_b: [1.0, 1.0],
        mode: BlendMode::Morph,
        progress: 0.0,
        fade_progress: 0.0,
        zoom_from: 1.0,
        rotation_from: 0.0,
        image_mix: 1.0,
    }
}

fn composite(
    gpu: &HeadlessGpu,
    arena: &TextureArena,
    fluid: &FluidSolver,
    state: &CompositeState,
) -> [u8; 4] {
    composite_with(gpu, arena, fluid, state, gpu.formats.linear_filtering)
}

fn composite_with(
    gpu: &HeadlessGpu,
    arena: &TextureArena,
    fluid: &FluidSolver,
    state: &CompositeState,
    linear_filtering: bool,
) -> [u8; 4] {
    let target = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("composite test target"),
        size: wgpu::Extent3d {
            width: 32,
            height: 32,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());
    let compositor = Compositor::new(
        &gpu.device,
        wgpu::TextureFormat::Rgba8Unorm,
        linear_filtering,
    );
    let appearance = Appearance {
        grain: 0.0,
        vignette: 0.0,
        ..Appearance::default()
    };
    let params = CompositeParams::new([32.0, 32.0], &appearance, state, 0.0);

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    compositor.encode(
        &gpu.device,
        &mut encoder,
        &view,
        fluid.texture(),
        arena.view(state.texture_a),
        arena.view(state.texture_b),
        &params,
    );
    gpu.queue.submit(std::iter::once(encoder.finish()));

    read_rgba8(&gpu.device, &gpu.queue, &target)
        .expect("readback")
        .get(16, 16)
}

#[test]
fn morph_progress_moves_output_from_image_a_to_image_b() {
    let Some(gpu) = headless() else { return };
    let fluid = solver(&gpu);
    let mut cache = ImageCache::new(Arc::new(SolidColors));
    let red = load(&mut cache, "red");
    let blue = load(&mut cache, "blue");

    let mut arena = TextureArena::new(&gpu.device, &gpu.queue, wgpu::TextureFormat::Rgba8Unorm);
    for image in cache.take_uploads() {
        arena.upload(&gpu.device, &gpu.queue, &image);
    }
    assert!(arena.contains(red.key) && arena.contains(blue.key));

    let mut state = CompositeState {
        texture_a: Some(red.key),
        texture_b: Some(blue.key),
        image_res_a: red.resolution(),
        image_res_b: blue.resolution(),
        mode: BlendMode::Morph,
        progress: 0.0,
        fade_progress: 0.0,
        zoom_from: 1.0,
        rotation_from: 0.0,
        image_mix: 1.0,
    };

    let start = composite(&gpu, &arena, &fluid, &state);
    assert!(start[0] > 200 && start[2] < 50, "progress 0 gave {start:?}");

    state.progress = 1.0;
    let end = composite(&gpu, &arena, &fluid, &state);
    assert!(end[2] > 200 && end[0] < 50, "progress 1 gave {end:?}");

    state.image_mix = 0.0;
    let hidden = composite(&gpu, &arena, &fluid, &state);
    assert_eq!(&hidden[..3], &[0, 0, 0]);
}

#[test]
fn missing_slots_render_the_black_fallback() {
    let Some(gpu) = headless() else { return };
    let fluid = solver(&gpu);
    let arena = TextureArena::new(&gpu.device, &gpu.queue, wgpu::TextureFormat::Rgba8Unorm);
    let state = CompositeState {
        progress: 0.5,
        ..empty_state()
    };
    let pixel = composite(&gpu, &arena, &fluid, &state);
    assert_eq!(&pixel[..3], &[0, 0, 0]);
}
