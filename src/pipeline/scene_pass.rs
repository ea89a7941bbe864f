//! Multisampled color + bloom pass: PBR objects, light markers with stencil
//! outlines, the skybox and the sorted window panes

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RendererError;
use crate::pipeline::context::{PipelineContext, HDR_FORMAT, SCENE_DEPTH_FORMAT};
use crate::pipeline::state::{PipelineVariants, RenderState, StateTracker};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::scene::{GpuScene, Scene, OBJECT_UNIFORM_SHADER};

/// Stencil value written under each light marker
pub const MARKER_STENCIL: u32 = 1;

pub const CLEAR_COLOR: [f32; 4] = [0.2, 0.3, 0.3, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DrawKind {
    Surface,
    Blended,
    Skybox,
}

pub struct ColorBloomPass {
    variants: PipelineVariants<DrawKind>,
    environment_group: BindGroupHandle,
    skybox_group: BindGroupHandle,
}

impl ColorBloomPass {
    pub const NAME: &'static str = "Color/Bloom";

    pub fn new<B: GraphicsBackend>(backend: &mut B, ctx: &PipelineContext) -> Result<Self, RendererError> {
        let brdf_view = ctx.ibl.brdf_lut.color_view(0).ok_or_else(|| RendererError::MissingInput {
            pass: Self::NAME.to_string(),
            input: "BRDF LUT view".to_string(),
        })?;
        let environment_group = backend.create_bind_group(
            ctx.layouts.environment,
            &[
                (0, BindGroupEntry::Texture(ctx.ibl.irradiance.cube_view())),
                (1, BindGroupEntry::Texture(ctx.ibl.prefilter.cube_view())),
                (2, BindGroupEntry::Texture(brdf_view)),
                (3, BindGroupEntry::Sampler(ctx.samplers.linear)),
                (4, BindGroupEntry::Texture(ctx.shadow_map.cube_view())),
                (5, BindGroupEntry::Sampler(ctx.samplers.shadow)),
            ],
        )?;
        let skybox_group = ctx.capture.source_bind_group(
            backend,
            ctx.capture.cube_source_layout,
            ctx.ibl.environment.cube_view(),
        )?;

        let samples = ctx.settings.msaa_samples;
        let scene_shader = format!("{}{}", OBJECT_UNIFORM_SHADER, PBR_SHADER);
        let scene_layouts = vec![
            ctx.layouts.frame,
            ctx.layouts.object,
            ctx.layouts.material,
            ctx.layouts.environment,
        ];

        let mut variants = PipelineVariants::new(Self::NAME);
        let surface_states = [
            ("Opaque", RenderState::default()),
            ("Marker", RenderState::marker(MARKER_STENCIL)),
            ("Outline", RenderState::outline(MARKER_STENCIL)),
        ];
        for (label, state) in surface_states {
            let pipeline = create_pipeline(
                backend,
                label,
                scene_shader.clone(),
                scene_layouts.clone(),
                state,
                None,
                samples,
            )?;
            variants.insert(DrawKind::Surface, state, pipeline);
        }

        let transparent = RenderState::transparent();
        let pipeline = create_pipeline(
            backend,
            "Window",
            scene_shader,
            scene_layouts,
            transparent,
            Some(BlendState::alpha_blending()),
            samples,
        )?;
        variants.insert(DrawKind::Blended, transparent, pipeline);

        let skybox = RenderState::skybox();
        let pipeline = create_pipeline(
            backend,
            "Skybox",
            SKYBOX_SHADER.to_string(),
            vec![ctx.layouts.frame, ctx.capture.cube_source_layout],
            skybox,
            None,
            samples,
        )?;
        variants.insert(DrawKind::Skybox, skybox, pipeline);

        log::debug!("{}: {} pipeline variants", Self::NAME, variants.len());

        Ok(Self {
            variants,
            environment_group,
            skybox_group,
        })
    }

    /// Draw order: opaque objects, light markers each followed by its
    /// outline, the skybox, then windows back to front
    fn record<B: GraphicsBackend>(
        &self,
        backend: &mut B,
        ctx: &PipelineContext,
        scene: &Scene,
        gpu_scene: &GpuScene,
    ) -> Result<(), RendererError> {
        let missing = |input: &str| RendererError::MissingInput {
            pass: Self::NAME.to_string(),
            input: input.to_string(),
        };
        let mut state = StateTracker::new();
        state.bind(backend, &self.variants, DrawKind::Surface)?;
        backend.set_bind_group(0, ctx.frame_bind_group);
        backend.set_bind_group(3, self.environment_group);
        for (slot, model) in gpu_scene.opaque() {
            backend.set_bind_group(1, slot);
            model.draw(backend, Some(2), None);
        }

        for light in 0..gpu_scene.light_count() {
            let (Some(marker_slot), Some(outline_slot)) =
                (gpu_scene.marker_slot(light), gpu_scene.outline_slot(light))
            else {
                return Err(missing("light marker slots"));
            };
            let mut marker = state.scope(RenderState::marker(MARKER_STENCIL));
            marker.bind(backend, &self.variants, DrawKind::Surface)?;
            backend.set_bind_group(1, marker_slot);
            gpu_scene.marker.draw(backend, Some(2), None);

            let outline = marker.scope(RenderState::outline(MARKER_STENCIL));
            outline.bind(backend, &self.variants, DrawKind::Surface)?;
            backend.set_bind_group(1, outline_slot);
            gpu_scene.marker.draw(backend, None, None);
        }

        {
            let skybox = state.scope(RenderState::skybox());
            skybox.bind(backend, &self.variants, DrawKind::Skybox)?;
            backend.set_bind_group(1, self.skybox_group);
            ctx.unit_cube.draw(backend);
        }

        let windows = state.scope(RenderState::transparent());
        windows.bind(backend, &self.variants, DrawKind::Blended)?;
        backend.set_bind_group(3, self.environment_group);
        backend.set_bind_group(2, gpu_scene.window.material.bind_group);
        for k in 0..scene.transparent.len() {
            let slot = gpu_scene.window_slot(k).ok_or_else(|| missing("window slot"))?;
            backend.set_bind_group(1, slot);
            gpu_scene.window.draw(backend, None, None);
        }
        Ok(())
    }
}

fn create_pipeline<B: GraphicsBackend>(
    backend: &mut B,
    label: &str,
    shader: String,
    bind_group_layouts: Vec<BindGroupLayoutHandle>,
    state: RenderState,
    blend: Option<BlendState>,
    sample_count: u32,
) -> Result<RenderPipelineHandle, RendererError> {
    let target = ColorTargetState {
        blend,
        ..ColorTargetState::opaque(HDR_FORMAT)
    };
    Ok(backend.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(format!("{} Pipeline", label)),
        shader,
        has_fragment: true,
        vertex_layouts: vec![Vertex::layout()],
        bind_group_layouts,
        primitive_topology: PrimitiveTopology::TriangleList,
        front_face: FrontFace::Ccw,
        cull_mode: state.cull,
        depth_stencil: Some(state.depth_stencil(SCENE_DEPTH_FORMAT)),
        color_targets: vec![target.clone(), target],
        sample_count,
        multiview: None,
    })?)
}

impl<B: GraphicsBackend> RenderPass<B> for ColorBloomPass {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read("shadow_cube", ResourceUsage::TextureRead);
        ctx.read("environment", ResourceUsage::TextureRead);
        ctx.read("irradiance", ResourceUsage::TextureRead);
        ctx.read("prefilter", ResourceUsage::TextureRead);
        ctx.read("brdf_lut", ResourceUsage::TextureRead);
        ctx.write("scene_color_msaa", ResourceUsage::RenderTarget);
        ctx.write("scene_bloom_msaa", ResourceUsage::RenderTarget);
        ctx.write("scene_depth", ResourceUsage::DepthStencilWrite);
    }

    fn execute(&self, ctx: &mut PassExecuteContext<B>) -> Result<(), RendererError> {
        let (scene, gpu_scene) = ctx.require_scene(Self::NAME)?;
        let target = &ctx.pipeline.scene_target;
        let missing = |input: &str| RendererError::MissingInput {
            pass: Self::NAME.to_string(),
            input: input.to_string(),
        };
        let color = target.color_view(0).ok_or_else(|| missing("scene color"))?;
        let bloom = target.color_view(1).ok_or_else(|| missing("scene bloom"))?;
        let depth = target.depth_view().ok_or_else(|| missing("scene depth"))?;
        let (width, height) = target.size();

        let backend = &mut *ctx.backend;
        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(Self::NAME.to_string()),
            color_attachments: vec![
                ColorAttachment::clear(color, CLEAR_COLOR),
                ColorAttachment::clear(bloom, [0.0, 0.0, 0.0, 1.0]),
            ],
            depth_stencil_attachment: Some(DepthStencilAttachment::clear(depth).with_stencil_clear(0)),
        });
        backend.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);

        let result = self.record(backend, ctx.pipeline, scene, gpu_scene);
        backend.end_render_pass();
        result
    }
}

const PBR_SHADER: &str = r#"
const PI: f32 = 3.14159265359;
const MAX_LIGHTS: u32 = 4u;
const SHADOW_BIAS: f32 = 0.05;

struct Camera {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
    position: vec4<f32>,
}

struct Lighting {
    positions: array<vec4<f32>, 4>,
    colors: array<vec4<f32>, 4>,
    shadow_light: vec4<f32>,
    params: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: Camera;
@group(0) @binding(1) var<uniform> lighting: Lighting;

@group(2) @binding(0) var diffuse_map: texture_2d<f32>;
@group(2) @binding(1) var normal_map: texture_2d<f32>;
@group(2) @binding(2) var roughness_map: texture_2d<f32>;
@group(2) @binding(3) var metallic_map: texture_2d<f32>;
@group(2) @binding(4) var ao_map: texture_2d<f32>;
@group(2) @binding(5) var emissive_map: texture_2d<f32>;
@group(2) @binding(6) var material_sampler: sampler;

@group(3) @binding(0) var irradiance_map: texture_cube<f32>;
@group(3) @binding(1) var prefilter_map: texture_cube<f32>;
@group(3) @binding(2) var brdf_lut: texture_2d<f32>;
@group(3) @binding(3) var environment_sampler: sampler;
@group(3) @binding(4) var shadow_map: texture_depth_cube;
@group(3) @binding(5) var shadow_sampler: sampler_comparison;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec4<f32>,
}

struct FragmentOutput {
    @location(0) color: vec4<f32>,
    @location(1) bloom: vec4<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    let world = object.model * vec4<f32>(input.position, 1.0);
    var output: VertexOutput;
    output.world_position = world.xyz;
    output.normal = (object.normal_matrix * vec4<f32>(input.normal, 0.0)).xyz;
    output.uv = input.uv;
    output.tangent = vec4<f32>((object.model * vec4<f32>(input.tangent.xyz, 0.0)).xyz, input.tangent.w);
    output.clip_position = camera.projection * camera.view * world;
    return output;
}

fn has_map(slot: u32) -> bool {
    return (object.flags.x & (1u << slot)) != 0u;
}

fn distribution_ggx(n: vec3<f32>, h: vec3<f32>, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let n_dot_h = max(dot(n, h), 0.0);
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * denom * denom);
}

fn geometry_schlick_ggx(n_dot_v: f32, roughness: f32) -> f32 {
    let r = roughness + 1.0;
    let k = (r * r) / 8.0;
    return n_dot_v / (n_dot_v * (1.0 - k) + k);
}

fn geometry_smith(n: vec3<f32>, v: vec3<f32>, l: vec3<f32>, roughness: f32) -> f32 {
    return geometry_schlick_ggx(max(dot(n, v), 0.0), roughness)
        * geometry_schlick_ggx(max(dot(n, l), 0.0), roughness);
}

fn fresnel_schlick(cos_theta: f32, f0: vec3<f32>) -> vec3<f32> {
    return f0 + (1.0 - f0) * pow(clamp(1.0 - cos_theta, 0.0, 1.0), 5.0);
}

fn fresnel_schlick_roughness(cos_theta: f32, f0: vec3<f32>, roughness: f32) -> vec3<f32> {
    return f0 + (max(vec3<f32>(1.0 - roughness), f0) - f0) * pow(clamp(1.0 - cos_theta, 0.0, 1.0), 5.0);
}

@fragment
fn fs_main(input: VertexOutput) -> FragmentOutput {
    // Implicit-derivative and comparison sampling stay in uniform control flow
    let diffuse_texel = textureSample(diffuse_map, material_sampler, input.uv);
    let normal_texel = textureSample(normal_map, material_sampler, input.uv).xyz;
    let roughness_texel = textureSample(roughness_map, material_sampler, input.uv).r;
    let metallic_texel = textureSample(metallic_map, material_sampler, input.uv).r;
    let ao_texel = textureSample(ao_map, material_sampler, input.uv).r;
    let emissive_texel = textureSample(emissive_map, material_sampler, input.uv).rgb;

    let to_shadow_light = input.world_position - lighting.shadow_light.xyz;
    let shadow_reference = length(to_shadow_light) / lighting.shadow_light.w - SHADOW_BIAS / lighting.shadow_light.w;
    let lit_fraction = textureSampleCompare(shadow_map, shadow_sampler, to_shadow_light, shadow_reference);

    let albedo = object.base_color.rgb * select(vec3<f32>(1.0), diffuse_texel.rgb, has_map(0u));
    let alpha = object.base_color.a * select(1.0, diffuse_texel.a, has_map(0u));
    let metallic = object.params.x * select(1.0, metallic_texel, has_map(3u));
    let roughness = clamp(object.params.y * select(1.0, roughness_texel, has_map(2u)), 0.04, 1.0);
    let ao = object.params.z * select(1.0, ao_texel, has_map(4u));
    let emissive = object.emissive.rgb * select(vec3<f32>(1.0), emissive_texel, has_map(5u));

    var n = normalize(input.normal);
    if has_map(1u) {
        let t = normalize(input.tangent.xyz - n * dot(n, input.tangent.xyz));
        let b = cross(n, t) * input.tangent.w;
        n = normalize(mat3x3<f32>(t, b, n) * (normal_texel * 2.0 - 1.0));
    }
    let v = normalize(camera.position.xyz - input.world_position);
    let n_dot_v = max(dot(n, v), 0.0);
    let f0 = mix(vec3<f32>(0.04), albedo, metallic);

    var lo = vec3<f32>(0.0);
    let count = min(u32(lighting.params.x), MAX_LIGHTS);
    for (var i = 0u; i < count; i = i + 1u) {
        let to_light = lighting.positions[i].xyz - input.world_position;
        let distance = length(to_light);
        let l = to_light / distance;
        let h = normalize(v + l);
        let radiance = lighting.colors[i].rgb / (distance * distance);

        let ndf = distribution_ggx(n, h, roughness);
        let g = geometry_smith(n, v, l, roughness);
        let f = fresnel_schlick(max(dot(h, v), 0.0), f0);
        let specular = ndf * g * f / (4.0 * n_dot_v * max(dot(n, l), 0.0) + 0.0001);
        let kd = (vec3<f32>(1.0) - f) * (1.0 - metallic);

        let visibility = select(1.0, lit_fraction, i == 0u);
        lo += (kd * albedo / PI + specular) * radiance * max(dot(n, l), 0.0) * visibility;
    }

    let f = fresnel_schlick_roughness(n_dot_v, f0, roughness);
    let kd = (vec3<f32>(1.0) - f) * (1.0 - metallic);
    let irradiance = textureSampleLevel(irradiance_map, environment_sampler, n, 0.0).rgb;
    let r = reflect(-v, n);
    let prefiltered = textureSampleLevel(prefilter_map, environment_sampler, r, roughness * lighting.params.z).rgb;
    let brdf = textureSampleLevel(brdf_lut, environment_sampler, vec2<f32>(n_dot_v, roughness), 0.0).rg;
    let ambient = (kd * irradiance * albedo + prefiltered * (f * brdf.x + brdf.y)) * ao;

    let unlit = object.flags.y == 1u;
    let color = select(ambient + lo + emissive, albedo, unlit);
    let brightness = dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));

    var output: FragmentOutput;
    output.color = vec4<f32>(color, alpha);
    output.bloom = vec4<f32>(select(vec3<f32>(0.0), color, brightness > lighting.params.y), alpha);
    return output;
}
"#;

const SKYBOX_SHADER: &str = r#"
struct Camera {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
    position: vec4<f32>,
}

struct Lighting {
    positions: array<vec4<f32>, 4>,
    colors: array<vec4<f32>, 4>,
    shadow_light: vec4<f32>,
    params: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: Camera;
@group(0) @binding(1) var<uniform> lighting: Lighting;
@group(1) @binding(0) var environment_map: texture_cube<f32>;
@group(1) @binding(1) var environment_sampler: sampler;

struct SkyboxOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) direction: vec3<f32>,
}

struct FragmentOutput {
    @location(0) color: vec4<f32>,
    @location(1) bloom: vec4<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> SkyboxOutput {
    let rotation = mat3x3<f32>(camera.view[0].xyz, camera.view[1].xyz, camera.view[2].xyz);
    let clip = camera.projection * vec4<f32>(rotation * position, 1.0);
    var output: SkyboxOutput;
    output.direction = position;
    // z = w puts the box on the far plane
    output.clip_position = clip.xyww;
    return output;
}

@fragment
fn fs_main(input: SkyboxOutput) -> FragmentOutput {
    let color = textureSampleLevel(environment_map, environment_sampler, input.direction, 0.0).rgb;
    let brightness = dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
    var output: FragmentOutput;
    output.color = vec4<f32>(color, 1.0);
    output.bloom = vec4<f32>(select(vec3<f32>(0.0), color, brightness > lighting.params.y), 1.0);
    return output;
}
"#;
