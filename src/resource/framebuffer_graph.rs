//! Render targets of every pass and the order the passes run in.
//!
//! All framebuffers and their attachments are created once, by [`FramebufferGraph::new`], and
//! released together when the graph is dropped. Reflection textures are the exception: they
//! belong to their object and live in the [`Scene`](crate::scene::Scene).

use crate::error::{Error, GpuError};
use crate::gpu::{
    AttachmentPoint, AttachmentTarget, Filter, Framebuffer, Gpu, SamplerDesc, Texture,
    TextureDesc, TextureFormat, TextureKind,
};
use crate::binding::TextureUnit;
use crate::settings::{mip_levels, RenderSettings};

/// Mip levels of the bloom texture: level 0 receives the bright pass, level 1 is blurred.
pub const BLOOM_LEVELS: u32 = 2;

/// The geometry buffer and the lighting target sharing its accumulation attachment.
///
/// Colour 0 of both framebuffers is the accumulation texture unless a pass redirects it with
/// [`GBuffer::redirect_output`].
pub struct GBuffer {
    lighting: Framebuffer,
    geometry: Framebuffer,
    specular_roughness: Texture,
    diffuse: Texture,
    normal: Texture,
    accumulation: Texture,
    depth: Texture,
}

impl GBuffer {
    /// Allocates a `width × height` geometry buffer.
    pub fn new(gpu: &Gpu, label: &str, width: u32, height: u32) -> Result<Self, GpuError> {
        let target = |name: &str, format| {
            Texture::new(
                gpu,
                TextureDesc::new_2d(format!("{label}_{name}"), format, width, height),
            )
        };
        let depth = target("depth", TextureFormat::Depth32F)?;
        let accumulation = target("accumulation", TextureFormat::R11G11B10F)?;
        let normal = target("normal", TextureFormat::Rg16F)?;
        let diffuse = target("diffuse", TextureFormat::Rgb8)?;
        let specular_roughness = target("specular_roughness", TextureFormat::Rgba8)?;

        let geometry = Framebuffer::new(gpu, &format!("{label}_geometry"))?;
        geometry.attach(AttachmentPoint::Depth, AttachmentTarget::new(depth.id()));
        for (i, texture) in [&accumulation, &normal, &diffuse, &specular_roughness]
            .into_iter()
            .enumerate()
        {
            geometry.attach(AttachmentPoint::Color(i as u8), AttachmentTarget::new(texture.id()));
        }

        let lighting = Framebuffer::new(gpu, &format!("{label}_lighting"))?;
        lighting.attach(AttachmentPoint::Color(0), AttachmentTarget::new(accumulation.id()));

        Ok(GBuffer {
            lighting,
            geometry,
            specular_roughness,
            diffuse,
            normal,
            accumulation,
            depth,
        })
    }

    /// The framebuffer written by the geometry pass.
    #[inline]
    pub fn geometry(&self) -> &Framebuffer {
        &self.geometry
    }

    /// The framebuffer written by the lighting pass.
    #[inline]
    pub fn lighting(&self) -> &Framebuffer {
        &self.lighting
    }

    #[inline]
    pub fn depth(&self) -> &Texture {
        &self.depth
    }

    #[inline]
    pub fn accumulation(&self) -> &Texture {
        &self.accumulation
    }

    #[inline]
    pub fn normal(&self) -> &Texture {
        &self.normal
    }

    #[inline]
    pub fn diffuse(&self) -> &Texture {
        &self.diffuse
    }

    #[inline]
    pub fn specular_roughness(&self) -> &Texture {
        &self.specular_roughness
    }

    /// Width and height of every attachment.
    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.depth.width(), self.depth.height())
    }

    /// Binds the attachments read by the lighting pass to their texture units.
    pub fn bind_textures(&self, gpu: &Gpu) {
        gpu.bind_texture(TextureUnit::GBufferDepth, self.depth.id());
        gpu.bind_texture(TextureUnit::GBufferNormal, self.normal.id());
        gpu.bind_texture(TextureUnit::GBufferDiffuse, self.diffuse.id());
        gpu.bind_texture(TextureUnit::GBufferSpecularRoughness, self.specular_roughness.id());
    }

    /// Makes both framebuffers write their colour 0 into `target`.
    pub fn redirect_output(&self, target: AttachmentTarget) {
        self.geometry.attach(AttachmentPoint::Color(0), target);
        self.lighting.attach(AttachmentPoint::Color(0), target);
    }

    /// Points colour 0 of both framebuffers back at the accumulation texture.
    pub fn restore_output(&self) {
        self.redirect_output(AttachmentTarget::new(self.accumulation.id()));
    }
}

/// Layered shadow maps and the framebuffers rendering into them.
///
/// Point shadows live in a cube array (one cube per light), spot shadows in a 2D array (one
/// layer per light) with a co-indexed colour array receiving the tint of transparent casters.
/// Every array holds at least one layer so that the lighting pass always has something bound.
pub struct ShadowTargets {
    transparency_framebuffer: Framebuffer,
    depth_framebuffer: Framebuffer,
    spot_transparency: Texture,
    spot: Texture,
    point: Texture,
}

impl ShadowTargets {
    /// Allocates square maps of side `resolution`.
    pub fn new(
        gpu: &Gpu,
        resolution: u32,
        point_lights: usize,
        spot_lights: usize,
    ) -> Result<Self, GpuError> {
        let cubes = (point_lights as u32).max(1);
        let layers = (spot_lights as u32).max(1);
        let depth_sampler = SamplerDesc::default()
            .with_filter(Filter::Linear)
            .with_compare();

        let point = Texture::new(
            gpu,
            TextureDesc::new_2d("point_shadows", TextureFormat::Depth32F, resolution, resolution)
                .with_kind(TextureKind::CubeArray { cubes })
                .with_sampler(depth_sampler),
        )?;
        let spot = Texture::new(
            gpu,
            TextureDesc::new_2d("spot_shadows", TextureFormat::Depth32F, resolution, resolution)
                .with_kind(TextureKind::D2Array { layers })
                .with_sampler(depth_sampler),
        )?;
        let spot_transparency = Texture::new(
            gpu,
            TextureDesc::new_2d(
                "spot_shadow_transparency",
                TextureFormat::Rgb8,
                resolution,
                resolution,
            )
            .with_kind(TextureKind::D2Array { layers })
            .with_sampler(SamplerDesc::default().with_filter(Filter::Linear)),
        )?;

        let depth_framebuffer = Framebuffer::new(gpu, "shadow_depth")?;
        let transparency_framebuffer = Framebuffer::new(gpu, "shadow_transparency")?;
        transparency_framebuffer
            .attach(AttachmentPoint::Depth, AttachmentTarget::new(spot.id()));
        transparency_framebuffer.attach(
            AttachmentPoint::Color(0),
            AttachmentTarget::new(spot_transparency.id()),
        );

        Ok(ShadowTargets {
            transparency_framebuffer,
            depth_framebuffer,
            spot_transparency,
            spot,
            point,
        })
    }

    /// Depth-only framebuffer; its depth attachment is switched between the point and spot
    /// arrays by the shadow passes.
    #[inline]
    pub fn depth_framebuffer(&self) -> &Framebuffer {
        &self.depth_framebuffer
    }

    /// Spot depth (read-only) plus the transparency colour array.
    #[inline]
    pub fn transparency_framebuffer(&self) -> &Framebuffer {
        &self.transparency_framebuffer
    }

    #[inline]
    pub fn point(&self) -> &Texture {
        &self.point
    }

    #[inline]
    pub fn spot(&self) -> &Texture {
        &self.spot
    }

    #[inline]
    pub fn spot_transparency(&self) -> &Texture {
        &self.spot_transparency
    }

    /// Side of every map.
    #[inline]
    pub fn resolution(&self) -> u32 {
        self.point.width()
    }

    /// Binds the maps read by the lighting pass to their texture units.
    pub fn bind_textures(&self, gpu: &Gpu) {
        gpu.bind_texture(TextureUnit::PointShadow, self.point.id());
        gpu.bind_texture(TextureUnit::SpotShadow, self.spot.id());
        gpu.bind_texture(TextureUnit::SpotTransparency, self.spot_transparency.id());
    }
}

/// Luminance and bloom chain.
pub struct PostProcessTargets {
    blur_framebuffer: Framebuffer,
    bloom_framebuffer: Framebuffer,
    init_framebuffer: Framebuffer,
    blur: Texture,
    bloom: Texture,
    luminance: Texture,
}

impl PostProcessTargets {
    /// Allocates the chain for a `width × height` accumulation buffer.
    pub fn new(gpu: &Gpu, width: u32, height: u32) -> Result<Self, GpuError> {
        let luminance = Texture::new(
            gpu,
            TextureDesc::new_2d("luminance", TextureFormat::R16, width, height)
                .with_levels(mip_levels(width.max(height)))
                .with_sampler(SamplerDesc::default().with_filter(Filter::LinearMipNearest)),
        )?;
        let bloom = Texture::new(
            gpu,
            TextureDesc::new_2d("bloom", TextureFormat::R11G11B10F, width, height)
                .with_levels(BLOOM_LEVELS)
                .with_sampler(SamplerDesc::default().with_filter(Filter::LinearMipNearest)),
        )?;
        let (half_width, half_height) = bloom.desc().level_size(1);
        let blur = Texture::new(
            gpu,
            TextureDesc::new_2d("bloom_blur", TextureFormat::R11G11B10F, half_width, half_height)
                .with_sampler(SamplerDesc::default().with_filter(Filter::Linear)),
        )?;

        let init_framebuffer = Framebuffer::new(gpu, "post_process_init")?;
        init_framebuffer.attach(AttachmentPoint::Color(0), AttachmentTarget::new(luminance.id()));
        init_framebuffer.attach(AttachmentPoint::Color(1), AttachmentTarget::new(bloom.id()));

        let bloom_framebuffer = Framebuffer::new(gpu, "bloom")?;
        bloom_framebuffer.attach(
            AttachmentPoint::Color(0),
            AttachmentTarget::new(bloom.id()).level(1),
        );

        let blur_framebuffer = Framebuffer::new(gpu, "bloom_blur")?;
        blur_framebuffer.attach(AttachmentPoint::Color(0), AttachmentTarget::new(blur.id()));

        Ok(PostProcessTargets {
            blur_framebuffer,
            bloom_framebuffer,
            init_framebuffer,
            blur,
            bloom,
            luminance,
        })
    }

    /// Writes luminance level 0 and bloom level 0.
    #[inline]
    pub fn init_framebuffer(&self) -> &Framebuffer {
        &self.init_framebuffer
    }

    /// Writes bloom level 1.
    #[inline]
    pub fn bloom_framebuffer(&self) -> &Framebuffer {
        &self.bloom_framebuffer
    }

    /// Writes the half-resolution scratch texture.
    #[inline]
    pub fn blur_framebuffer(&self) -> &Framebuffer {
        &self.blur_framebuffer
    }

    #[inline]
    pub fn luminance(&self) -> &Texture {
        &self.luminance
    }

    #[inline]
    pub fn bloom(&self) -> &Texture {
        &self.bloom
    }

    #[inline]
    pub fn blur(&self) -> &Texture {
        &self.blur
    }
}

/// A render pass of the frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Pass {
    Shadow,
    Reflection,
    Deferred,
    PostProcess,
}

impl Pass {
    /// Name used in logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Pass::Shadow => "shadow",
            Pass::Reflection => "reflection",
            Pass::Deferred => "deferred",
            Pass::PostProcess => "post_process",
        }
    }
}

/// A resource passes hand to each other within a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrameResource {
    ShadowMaps,
    ReflectionTextures,
    GBuffer,
    Accumulation,
    Luminance,
    Bloom,
    Surface,
}

#[derive(Clone, Debug)]
struct PassNode {
    pass: Pass,
    reads: Vec<FrameResource>,
    writes: Vec<FrameResource>,
}

/// Passes with the resources they read and write.
///
/// A pass runs after every other pass writing a resource it reads. Passes with no ordering
/// constraint between them keep their declaration order.
#[derive(Clone, Debug, Default)]
pub struct PassGraph {
    nodes: Vec<PassNode>,
}

impl PassGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// The passes of a frame.
    pub fn frame() -> Self {
        use FrameResource::*;

        let mut graph = Self::new();
        graph
            .declare(Pass::PostProcess, &[Accumulation, GBuffer], &[Luminance, Bloom, Surface])
            .declare(Pass::Deferred, &[ShadowMaps, ReflectionTextures], &[GBuffer, Accumulation])
            .declare(Pass::Reflection, &[ShadowMaps], &[ReflectionTextures])
            .declare(Pass::Shadow, &[], &[ShadowMaps]);
        graph
    }

    /// Adds a pass.
    pub fn declare(
        &mut self,
        pass: Pass,
        reads: &[FrameResource],
        writes: &[FrameResource],
    ) -> &mut Self {
        self.nodes.push(PassNode {
            pass,
            reads: reads.to_vec(),
            writes: writes.to_vec(),
        });
        self
    }

    /// Orders the passes so that every pass runs after the passes it depends on.
    pub fn resolve(&self) -> Result<Vec<Pass>, Error> {
        let n = self.nodes.len();
        let mut dependents = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];

        for (consumer, node) in self.nodes.iter().enumerate() {
            for (producer, other) in self.nodes.iter().enumerate() {
                if producer != consumer && other.writes.iter().any(|r| node.reads.contains(r)) {
                    dependents[producer].push(consumer);
                    in_degree[consumer] += 1;
                }
            }
        }

        let mut order = Vec::with_capacity(n);
        let mut done = vec![false; n];
        while order.len() < n {
            let Some(next) = (0..n).find(|&i| !done[i] && in_degree[i] == 0) else {
                let stuck = (0..n).find(|&i| !done[i]).map_or("", |i| self.nodes[i].pass.as_str());
                return Err(Error::PassCycle(stuck));
            };
            done[next] = true;
            order.push(self.nodes[next].pass);
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
            }
        }

        log::debug!(
            "pass order: {}",
            order.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(" -> ")
        );
        Ok(order)
    }
}

/// Every render target of the pipeline.
pub struct FramebufferGraph {
    shadow: ShadowTargets,
    post_process: PostProcessTargets,
    environment: GBuffer,
    primary: GBuffer,
    order: Vec<Pass>,
}

impl FramebufferGraph {
    /// Creates the targets and resolves the pass order.
    ///
    /// Targets are created in initialisation order: geometry buffers, post-process chain,
    /// then shadow maps.
    pub fn new(
        gpu: &Gpu,
        settings: &RenderSettings,
        point_lights: usize,
        spot_lights: usize,
    ) -> Result<Self, Error> {
        let order = PassGraph::frame().resolve()?;
        let primary = GBuffer::new(gpu, "gbuffer", settings.width, settings.height)?;
        let environment =
            GBuffer::new(gpu, "environment_gbuffer", settings.height, settings.height)?;
        let post_process = PostProcessTargets::new(gpu, settings.width, settings.height)?;
        let shadow = ShadowTargets::new(
            gpu,
            settings.shadow_resolution(),
            point_lights,
            spot_lights,
        )?;

        Ok(FramebufferGraph {
            shadow,
            post_process,
            environment,
            primary,
            order,
        })
    }

    /// The window-sized geometry buffer.
    #[inline]
    pub fn primary(&self) -> &GBuffer {
        &self.primary
    }

    /// The square geometry buffer used for cube-map faces.
    #[inline]
    pub fn environment(&self) -> &GBuffer {
        &self.environment
    }

    #[inline]
    pub fn shadow(&self) -> &ShadowTargets {
        &self.shadow
    }

    #[inline]
    pub fn post_process(&self) -> &PostProcessTargets {
        &self.post_process
    }

    /// The order passes run in each frame.
    #[inline]
    pub fn order(&self) -> &[Pass] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{HeadlessDevice, RenderDevice};
    use std::rc::Rc;

    #[test]
    fn frame_passes_resolve_in_dependency_order() {
        let order = PassGraph::frame().resolve().unwrap();
        assert_eq!(
            order,
            [Pass::Shadow, Pass::Reflection, Pass::Deferred, Pass::PostProcess]
        );
    }

    #[test]
    fn independent_passes_keep_their_declaration_order() {
        let mut graph = PassGraph::new();
        graph
            .declare(Pass::Deferred, &[], &[FrameResource::GBuffer])
            .declare(Pass::Shadow, &[], &[FrameResource::ShadowMaps]);
        assert_eq!(graph.resolve().unwrap(), [Pass::Deferred, Pass::Shadow]);
    }

    #[test]
    fn chained_declarations_land_on_one_graph() {
        let mut graph = PassGraph::new();
        graph
            .declare(Pass::Reflection, &[], &[FrameResource::ReflectionTextures])
            .declare(Pass::Shadow, &[], &[FrameResource::ShadowMaps])
            .declare(Pass::Deferred, &[FrameResource::ShadowMaps], &[FrameResource::GBuffer]);
        assert_eq!(
            graph.resolve().unwrap(),
            [Pass::Reflection, Pass::Shadow, Pass::Deferred]
        );
    }

    #[test]
    fn cycles_are_rejected() {
        let mut graph = PassGraph::new();
        graph
            .declare(Pass::Shadow, &[FrameResource::Accumulation], &[FrameResource::ShadowMaps])
            .declare(Pass::Deferred, &[FrameResource::ShadowMaps], &[FrameResource::Accumulation]);
        assert!(matches!(graph.resolve(), Err(Error::PassCycle("shadow"))));
    }

    #[test]
    fn redirected_output_is_restored() {
        let device = Rc::new(HeadlessDevice::new(16, 8));
        let gpu: Gpu = device.clone();
        let gbuffer = GBuffer::new(&gpu, "test", 16, 8).unwrap();
        let other = Texture::new(
            &gpu,
            TextureDesc::new_2d("other", TextureFormat::Rgb8, 16, 8),
        )
        .unwrap();

        gbuffer.redirect_output(AttachmentTarget::new(other.id()));
        for fb in [gbuffer.geometry(), gbuffer.lighting()] {
            let attached = device.attachment(fb.id(), AttachmentPoint::Color(0)).unwrap();
            assert_eq!(attached.texture, other.id());
        }

        gbuffer.restore_output();
        for fb in [gbuffer.geometry(), gbuffer.lighting()] {
            let attached = device.attachment(fb.id(), AttachmentPoint::Color(0)).unwrap();
            assert_eq!(attached, AttachmentTarget::new(gbuffer.accumulation().id()));
        }
    }

    #[test]
    fn shadow_arrays_are_never_empty() {
        let gpu: Gpu = Rc::new(HeadlessDevice::new(16, 16));
        let shadow = ShadowTargets::new(&gpu, 32, 0, 0).unwrap();
        assert_eq!(shadow.point().desc().kind, TextureKind::CubeArray { cubes: 1 });
        assert_eq!(shadow.spot().desc().kind, TextureKind::D2Array { layers: 1 });
        assert_eq!(shadow.resolution(), 32);

        let shadow = ShadowTargets::new(&gpu, 32, 3, 2).unwrap();
        assert_eq!(shadow.point().desc().kind.layer_count(), 18);
        assert_eq!(shadow.spot_transparency().desc().kind.layer_count(), 2);
    }

    #[test]
    fn bloom_chain_is_half_resolution() {
        let gpu: Gpu = Rc::new(HeadlessDevice::new(64, 48));
        let post = PostProcessTargets::new(&gpu, 64, 48).unwrap();
        assert_eq!(post.luminance().levels(), 6);
        assert_eq!(post.bloom().levels(), BLOOM_LEVELS);
        assert_eq!((post.blur().width(), post.blur().height()), (32, 24));
    }

    #[test]
    fn dropping_the_graph_releases_every_target() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let gpu: Gpu = device.clone();
        let settings = RenderSettings::default().with_size(32, 16);
        let graph = FramebufferGraph::new(&gpu, &settings, 1, 1).unwrap();
        assert_eq!(graph.environment().size(), (16, 16));
        drop(graph);
        assert_eq!(device.live_resources(), (0, 0, 0, 0));
    }
}
