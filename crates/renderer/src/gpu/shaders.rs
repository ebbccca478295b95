//! GLSL sources for the fluid passes and the compositor.
//!
//! Everything goes through naga's GLSL frontend. Uniform blocks must match
//! [`FluidParams`](super::uniforms::FluidParams) and
//! [`CompositeParams`](super::uniforms::CompositeParams) byte for byte.

use std::borrow::Cow;

use wgpu::naga::ShaderStage;

use super::formats::AdvectionMode;

/// Fluid pass selector; each maps to one fragment body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum FluidShader {
    Splat,
    Curl,
    Vorticity,
    Divergence,
    Clear,
    Pressure,
    GradientSubtract,
    Advection(AdvectionMode),
}

impl FluidShader {
    pub(crate) fn label(self) -> &'static str {
        match self {
            FluidShader::Splat => "splat",
            FluidShader::Curl => "curl",
            FluidShader::Vorticity => "vorticity",
            FluidShader::Divergence => "divergence",
            FluidShader::Clear => "clear",
            FluidShader::Pressure => "pressure",
            FluidShader::GradientSubtract => "gradient subtract",
            FluidShader::Advection(AdvectionMode::Hardware) => "advection",
            FluidShader::Advection(AdvectionMode::ManualBilinear) => "advection (manual bilinear)",
        }
    }

    fn body(self) -> &'static str {
        match self {
            FluidShader::Splat => SPLAT_FRAG,
            FluidShader::Curl => CURL_FRAG,
            FluidShader::Vorticity => VORTICITY_FRAG,
            FluidShader::Divergence => DIVERGENCE_FRAG,
            FluidShader::Clear => CLEAR_FRAG,
            FluidShader::Pressure => PRESSURE_FRAG,
            FluidShader::GradientSubtract => GRADIENT_SUBTRACT_FRAG,
            FluidShader::Advection(AdvectionMode::Hardware) => ADVECTION_FRAG,
            FluidShader::Advection(AdvectionMode::ManualBilinear) => ADVECTION_MANUAL_FRAG,
        }
    }

    /// Full fragment source: shared prelude followed by the pass body.
    pub(crate) fn source(self) -> String {
        format!("{FLUID_PRELUDE}\n{}", self.body())
    }
}

/// Vertex shader for solver passes; `v_uv.y == 0` lands on texel row 0.
pub(crate) fn compile_field_vertex(device: &wgpu::Device) -> wgpu::ShaderModule {
    compile(device, "field vertex", Cow::Borrowed(FIELD_VERTEX), ShaderStage::Vertex)
}

/// Vertex shader for presenting; `v_uv.y == 0` is the bottom of the screen.
pub(crate) fn compile_screen_vertex(device: &wgpu::Device) -> wgpu::ShaderModule {
    compile(device, "screen vertex", Cow::Borrowed(SCREEN_VERTEX), ShaderStage::Vertex)
}

pub(crate) fn compile_fluid_fragment(device: &wgpu::Device, shader: FluidShader) -> wgpu::ShaderModule {
    compile(device, shader.label(), Cow::Owned(shader.source()), ShaderStage::Fragment)
}

pub(crate) fn compile_composite_fragment(device: &wgpu::Device) -> wgpu::ShaderModule {
    compile(device, "composite", Cow::Borrowed(COMPOSITE_FRAG), ShaderStage::Fragment)
}

fn compile(
    device: &wgpu::Device,
    label: &str,
    shader: Cow<'static, str>,
    stage: ShaderStage,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader,
            stage,
            defines: &[],
        },
    })
}

const FIELD_VERTEX: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -1.0),
    vec2(3.0, -1.0),
    vec2(-1.0, 3.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos.x, -pos.y, 0.0, 1.0);
}
";

const SCREEN_VERTEX: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -1.0),
    vec2(3.0, -1.0),
    vec2(-1.0, 3.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

/// Shared declarations for every solver pass. `SOURCE` and `AUX` are the two
/// input fields; single-input passes bind the same field to both.
const FLUID_PRELUDE: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform FluidParams {
    vec2 texel_size;
    vec2 dye_texel_size;
    vec2 point;
    float aspect_ratio;
    float radius;
    vec4 color;
    float dt;
    float dissipation;
    float curl_strength;
    float value;
} params;

layout(set = 1, binding = 0) uniform texture2D source_texture;
layout(set = 1, binding = 1) uniform sampler source_sampler;
layout(set = 1, binding = 2) uniform texture2D aux_texture;
layout(set = 1, binding = 3) uniform sampler aux_sampler;

#define SOURCE sampler2D(source_texture, source_sampler)
#define AUX sampler2D(aux_texture, aux_sampler)

vec2 left_uv() { return v_uv - vec2(params.texel_size.x, 0.0); }
vec2 right_uv() { return v_uv + vec2(params.texel_size.x, 0.0); }
vec2 top_uv() { return v_uv + vec2(0.0, params.texel_size.y); }
vec2 bottom_uv() { return v_uv - vec2(0.0, params.texel_size.y); }
";

const SPLAT_FRAG: &str = r"void main() {
    vec2 p = v_uv - params.point;
    p.x *= params.aspect_ratio;
    vec3 splat = exp(-dot(p, p) / params.radius) * params.color.rgb;
    vec3 base = texture(SOURCE, v_uv).xyz;
    out_color = vec4(base + splat, 1.0);
}
";

const CURL_FRAG: &str = r"void main() {
    float L = texture(SOURCE, left_uv()).y;
    float R = texture(SOURCE, right_uv()).y;
    float T = texture(SOURCE, top_uv()).x;
    float B = texture(SOURCE, bottom_uv()).x;
    float vorticity = R - L - T + B;
    out_color = vec4(0.5 * vorticity, 0.0, 0.0, 1.0);
}
";

// SOURCE = velocity, AUX = curl
const VORTICITY_FRAG: &str = r"void main() {
    float L = texture(AUX, left_uv()).x;
    float R = texture(AUX, right_uv()).x;
    float T = texture(AUX, top_uv()).x;
    float B = texture(AUX, bottom_uv()).x;
    float C = texture(AUX, v_uv).x;
    vec2 force = 0.5 * vec2(abs(T) - abs(B), abs(R) - abs(L));
    force /= length(force) + 0.0001;
    force *= params.curl_strength * C;
    force.y *= -1.0;
    vec2 velocity = texture(SOURCE, v_uv).xy;
    out_color = vec4(velocity + force * params.dt, 0.0, 1.0);
}
";

const DIVERGENCE_FRAG: &str = r"void main() {
    vec2 l_uv = left_uv();
    vec2 r_uv = right_uv();
    vec2 t_uv = top_uv();
    vec2 b_uv = bottom_uv();
    float L = texture(SOURCE, l_uv).x;
    float R = texture(SOURCE, r_uv).x;
    float T = texture(SOURCE, t_uv).y;
    float B = texture(SOURCE, b_uv).y;
    vec2 C = texture(SOURCE, v_uv).xy;
    if (l_uv.x < 0.0) { L = -C.x; }
    if (r_uv.x > 1.0) { R = -C.x; }
    if (t_uv.y > 1.0) { T = -C.y; }
    if (b_uv.y < 0.0) { B = -C.y; }
    float div = 0.5 * (R - L + T - B);
    out_color = vec4(div, 0.0, 0.0, 1.0);
}
";

const CLEAR_FRAG: &str = r"void main() {
    out_color = params.value * texture(SOURCE, v_uv);
}
";

// SOURCE = pressure, AUX = divergence
const PRESSURE_FRAG: &str = r"void main() {
    float L = texture(SOURCE, left_uv()).x;
    float R = texture(SOURCE, right_uv()).x;
    float T = texture(SOURCE, top_uv()).x;
    float B = texture(SOURCE, bottom_uv()).x;
    float divergence = texture(AUX, v_uv).x;
    float pressure = (L + R + B + T - divergence) * 0.25;
    out_color = vec4(pressure, 0.0, 0.0, 1.0);
}
";

// SOURCE = pressure, AUX = velocity
const GRADIENT_SUBTRACT_FRAG: &str = r"void main() {
    float L = texture(SOURCE, left_uv()).x;
    float R = texture(SOURCE, right_uv()).x;
    float T = texture(SOURCE, top_uv()).x;
    float B = texture(SOURCE, bottom_uv()).x;
    vec2 velocity = texture(AUX, v_uv).xy;
    velocity -= vec2(R - L, T - B);
    out_color = vec4(velocity, 0.0, 1.0);
}
";

// SOURCE = velocity, AUX = advected field
const ADVECTION_FRAG: &str = r"void main() {
    vec2 coord = v_uv - params.dt * texture(SOURCE, v_uv).xy * params.texel_size;
    vec4 result = params.dissipation * texture(AUX, coord);
    out_color = vec4(result.rgb, 1.0);
}
";

const ADVECTION_MANUAL_FRAG: &str = r"vec4 bilerp_velocity(vec2 uv, vec2 tsize) {
    vec2 st = uv / tsize - 0.5;
    vec2 iuv = floor(st);
    vec2 fuv = fract(st);
    vec4 a = texture(SOURCE, (iuv + vec2(0.5, 0.5)) * tsize);
    vec4 b = texture(SOURCE, (iuv + vec2(1.5, 0.5)) * tsize);
    vec4 c = texture(SOURCE, (iuv + vec2(0.5, 1.5)) * tsize);
    vec4 d = texture(SOURCE, (iuv + vec2(1.5, 1.5)) * tsize);
    return mix(mix(a, b, fuv.x), mix(c, d, fuv.x), fuv.y);
}

vec4 bilerp_field(vec2 uv, vec2 tsize) {
    vec2 st = uv / tsize - 0.5;
    vec2 iuv = floor(st);
    vec2 fuv = fract(st);
    vec4 a = texture(AUX, (iuv + vec2(0.5, 0.5)) * tsize);
    vec4 b = texture(AUX, (iuv + vec2(1.5, 0.5)) * tsize);
    vec4 c = texture(AUX, (iuv + vec2(0.5, 1.5)) * tsize);
    vec4 d = texture(AUX, (iuv + vec2(1.5, 1.5)) * tsize);
    return mix(mix(a, b, fuv.x), mix(c, d, fuv.x), fuv.y);
}

void main() {
    vec2 coord = v_uv - params.dt * bilerp_velocity(v_uv, params.texel_size).xy * params.texel_size;
    vec4 result = params.dissipation * bilerp_field(coord, params.dye_texel_size);
    out_color = vec4(result.rgb, 1.0);
}
";

/// Dual-image compositor. The fluid dye field distorts both images, the mode
/// switch picks the luminance morph or the zoom/rotate fade, and the result
/// gets chromatic split, overlay tint, grain and vignette.
const COMPOSITE_FRAG: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform CompositeParams {
    vec2 resolution;
    vec2 image_res_a;
    vec2 image_res_b;
    float progress;
    float fade_progress;
    float mode;
    float strength;
    float lateral;
    float distort;
    vec4 color;
    float zoom_from;
    float rotation_from;
    float image_mix;
    float time;
    float grain;
    float chroma;
    float vignette;
    float intensity;
} params;

layout(set = 1, binding = 0) uniform texture2D fluid_texture;
layout(set = 1, binding = 1) uniform sampler fluid_sampler;
layout(set = 1, binding = 2) uniform texture2D map_a_texture;
layout(set = 1, binding = 3) uniform sampler map_a_sampler;
layout(set = 1, binding = 4) uniform texture2D map_b_texture;
layout(set = 1, binding = 5) uniform sampler map_b_sampler;

#define FLUID sampler2D(fluid_texture, fluid_sampler)
#define MAP_A sampler2D(map_a_texture, map_a_sampler)
#define MAP_B sampler2D(map_b_texture, map_b_sampler)

vec2 cover_uv(vec2 uv, vec2 image_res, vec2 screen_res) {
    float screen_aspect = screen_res.x / screen_res.y;
    float image_aspect = image_res.x / image_res.y;
    vec2 scale = vec2(1.0);
    if (screen_aspect > image_aspect) {
        scale.y = image_aspect / screen_aspect;
    } else {
        scale.x = screen_aspect / image_aspect;
    }
    return (uv - 0.5) * scale + 0.5;
}

float ease_quad_out(float t) {
    return t * (2.0 - t);
}

vec2 rotate_uv(vec2 uv, float angle) {
    float s = sin(angle);
    float c = cos(angle);
    uv -= 0.5;
    uv = mat2(c, -s, s, c) * uv;
    uv += 0.5;
    return uv;
}

float hash(vec2 p) {
    vec3 p3 = fract(vec3(p.xyx) * 0.1031);
    p3 += dot(p3, p3.yzx + 33.33);
    return fract((p3.x + p3.y) * p3.z);
}

vec4 blend(vec2 base_a, vec2 base_b, vec2 flow) {
    vec2 offset = flow * params.distort;
    vec2 ua = base_a - offset;
    vec2 ub = base_b - offset;

    if (params.mode > 0.5) {
        float t = ease_quad_out(params.fade_progress);
        vec2 za = (ua - 0.5) * mix(1.0, params.zoom_from, 1.0 - t) + 0.5;
        vec2 zb = (ub - 0.5) * mix(params.zoom_from, 1.0, t) + 0.5;
        za = rotate_uv(za, mix(0.0, params.rotation_from, 1.0 - t)) - offset;
        zb = rotate_uv(zb, mix(-params.rotation_from, 0.0, t)) - offset;
        return mix(texture(MAP_A, za), texture(MAP_B, zb), t);
    }

    float p = params.progress;
    vec4 ta = texture(MAP_A, ua);
    vec4 tb = texture(MAP_B, ub);
    float lum_a = dot(ta.rgb, vec3(0.299, 0.587, 0.114));
    float lum_b = dot(tb.rgb, vec3(0.299, 0.587, 0.114));
    vec2 da = vec2(lum_a * params.strength * p, lum_a * params.lateral * p);
    vec2 db = vec2(lum_b * params.strength * (1.0 - p), lum_b * params.lateral * (1.0 - p));
    return mix(texture(MAP_A, ua + da), texture(MAP_B, ub - db), p);
}

void main() {
    vec4 fluid = texture(FLUID, v_uv);
    vec2 flow = fluid.rg;
    float fluid_len = length(flow);

    vec2 uv_a = cover_uv(v_uv, params.image_res_a, params.resolution);
    vec2 uv_b = cover_uv(v_uv, params.image_res_b, params.resolution);

    vec4 result = blend(uv_a, uv_b, flow);

    float chroma_amount = fluid_len * params.chroma;
    if (chroma_amount > 0.0001) {
        vec2 dir = normalize(flow) * chroma_amount;
        vec4 red = blend(uv_a + dir, uv_b + dir, flow);
        vec4 blue = blend(uv_a - dir, uv_b - dir, flow);
        result = vec4(red.r, result.g, blue.b, 1.0);
    }

    result.rgb += params.color.rgb * fluid_len * params.intensity;

    float lum = dot(result.rgb, vec3(0.299, 0.587, 0.114));
    float grain_amount = params.grain * (1.0 - lum * 0.5);
    float noise = hash(v_uv * params.resolution + fract(params.time * 1.7) * 437.585) - 0.5;
    result.rgb += noise * grain_amount;

    float dist = length(v_uv - 0.5) * 1.4;
    result.rgb *= 1.0 - smoothstep(0.4, 1.1, dist) * params.vignette;

    // hidden imagery is black, overlay and grain included
    out_color = vec4(result.rgb * params.image_mix, 1.0);
}
";
