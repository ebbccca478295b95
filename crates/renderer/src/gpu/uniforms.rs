use bytemuck::{Pod, Zeroable};
use sceneconfig::Appearance;
use transition::{BlendMode, CompositeState};

/// Per-pass solver uniforms; mirrors `FluidParams` in the GLSL prelude (std140).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub(crate) struct FluidParams {
    pub texel_size: [f32; 2],
    pub dye_texel_size: [f32; 2],
    pub point: [f32; 2],
    pub aspect_ratio: f32,
    pub radius: f32,
    pub color: [f32; 4],
    pub dt: f32,
    pub dissipation: f32,
    pub curl_strength: f32,
    pub value: f32,
}

impl FluidParams {
    pub fn grid(texel_size: [f32; 2]) -> Self {
        Self {
            texel_size,
            dye_texel_size: texel_size,
            ..Self::default()
        }
    }
}

/// Compositor uniforms; mirrors `CompositeParams` in the composite shader (std140).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CompositeParams {
    pub resolution: [f32; 2],
    pub image_res_a: [f32; 2],
    pub image_res_b: [f32; 2],
    pub progress: f32,
    pub fade_progress: f32,
    pub mode: f32,
    pub strength: f32,
    pub lateral: f32,
    pub distort: f32,
    pub color: [f32; 4],
    pub zoom_from: f32,
    pub rotation_from: f32,
    pub image_mix: f32,
    pub time: f32,
    pub grain: f32,
    pub chroma: f32,
    pub vignette: f32,
    pub intensity: f32,
}

impl CompositeParams {
    pub fn new(
        resolution: [f32; 2],
        appearance: &Appearance,
        state: &CompositeState,
        time: f32,
    ) -> Self {
        let [r, g, b] = appearance.color;
        Self {
            resolution: [resolution[0].max(1.0), resolution[1].max(1.0)],
            image_res_a: state.image_res_a,
            image_res_b: state.image_res_b,
            progress: state.progress,
            fade_progress: state.fade_progress,
            mode: match state.mode {
                BlendMode::Morph => 0.0,
                BlendMode::Fade => 1.0,
            },
            strength: appearance.strength,
            lateral: appearance.lateral,
            distort: appearance.distort,
            color: [r, g, b, 1.0],
            zoom_from: state.zoom_from,
            rotation_from: state.rotation_from,
            image_mix: state.image_mix,
            time,
            grain: appearance.grain,
            chroma: appearance.chroma,
            vignette: appearance.vignette,
            intensity: appearance.intensity,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::mem::{offset_of, size_of};

    use super::*;

    #[test]
    fn fluid_params_match_std140_layout() {
        assert_eq!(size_of::<FluidParams>(), 64);
        assert_eq!(offset_of!(FluidParams, point), 16);
        assert_eq!(offset_of!(FluidParams, aspect_ratio), 24);
        assert_eq!(offset_of!(FluidParams, color), 32);
        assert_eq!(offset_of!(FluidParams, dt), 48);
        assert_eq!(offset_of!(FluidParams, value), 60);
    }

    #[test]
    fn composite_params_match_std140_layout() {
        assert_eq!(size_of::<CompositeParams>(), 96);
        assert_eq!(offset_of!(CompositeParams, progress), 24);
        assert_eq!(offset_of!(CompositeParams, color), 48);
        assert_eq!(offset_of!(CompositeParams, zoom_from), 64);
        assert_eq!(offset_of!(CompositeParams, intensity), 92);
    }

    #[test]
    fn fade_state_selects_fade_mode() {
        let state = CompositeState {
            texture_a: None,
            texture_b: None,
            image_res_a: [1920.0, 1080.0],
            image_res_b: [1.0, 1.0],
            mode: BlendMode::Fade,
            progress: 0.0,
            fade_progress: 0.25,
            zoom_from: 1.05,
            rotation_from: 0.02,
            image_mix: 1.0,
        };
        let params = CompositeParams::new([0.0, 720.0], &Appearance::default(), &state, 3.5);
        assert_eq!(params.mode, 1.0);
        assert_eq!(params.resolution, [1.0, 720.0]);
        assert_eq!(params.fade_progress, 0.25);
        assert_eq!(params.color[3], 1.0);
        assert_eq!(params.grain, 0.04);
    }
}
