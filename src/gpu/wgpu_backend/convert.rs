//! Mapping of device-level descriptions onto wgpu types.

use crate::gpu::{
    CullFace, Filter, SampleKind, SamplerDesc, TextureFormat, TextureKind, ViewDimension, Wrap,
};

pub fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgb8 | TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rg16F => wgpu::TextureFormat::Rg16Float,
        // R16Unorm is not renderable without an optional feature.
        TextureFormat::R16 => wgpu::TextureFormat::R16Float,
        // Rg11b10Ufloat is only renderable with an optional feature.
        TextureFormat::R11G11B10F | TextureFormat::Rgba16F => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Depth32F => wgpu::TextureFormat::Depth32Float,
    }
}

pub fn view_dimension(dimension: ViewDimension) -> wgpu::TextureViewDimension {
    match dimension {
        ViewDimension::D2 => wgpu::TextureViewDimension::D2,
        ViewDimension::D2Array => wgpu::TextureViewDimension::D2Array,
        ViewDimension::Cube => wgpu::TextureViewDimension::Cube,
        ViewDimension::CubeArray => wgpu::TextureViewDimension::CubeArray,
    }
}

pub fn dimension_of(kind: TextureKind) -> ViewDimension {
    match kind {
        TextureKind::D2 => ViewDimension::D2,
        TextureKind::D2Array { .. } => ViewDimension::D2Array,
        TextureKind::Cube => ViewDimension::Cube,
        TextureKind::CubeArray { .. } => ViewDimension::CubeArray,
    }
}

pub fn sample_type(sample: SampleKind) -> wgpu::TextureSampleType {
    match sample {
        SampleKind::Float => wgpu::TextureSampleType::Float { filterable: true },
        SampleKind::Depth | SampleKind::DepthCompare => wgpu::TextureSampleType::Depth,
    }
}

pub fn sampler_binding(sample: SampleKind) -> wgpu::SamplerBindingType {
    match sample {
        SampleKind::Float => wgpu::SamplerBindingType::Filtering,
        SampleKind::Depth => wgpu::SamplerBindingType::NonFiltering,
        SampleKind::DepthCompare => wgpu::SamplerBindingType::Comparison,
    }
}

pub fn cull_mode(cull: CullFace) -> Option<wgpu::Face> {
    match cull {
        CullFace::None => None,
        CullFace::Back => Some(wgpu::Face::Back),
        CullFace::Front => Some(wgpu::Face::Front),
    }
}

pub fn sampler_descriptor<'a>(
    label: &'a str,
    desc: &SamplerDesc,
) -> wgpu::SamplerDescriptor<'a> {
    let address_mode = match desc.wrap {
        Wrap::Clamp => wgpu::AddressMode::ClampToEdge,
        Wrap::Repeat => wgpu::AddressMode::Repeat,
    };
    let (filter, mipmap_filter, lod_max_clamp) = match desc.filter {
        Filter::Nearest => (wgpu::FilterMode::Nearest, wgpu::FilterMode::Nearest, 0.0),
        Filter::Linear => (wgpu::FilterMode::Linear, wgpu::FilterMode::Nearest, 0.0),
        Filter::LinearMipNearest => (wgpu::FilterMode::Linear, wgpu::FilterMode::Nearest, 32.0),
        Filter::Trilinear => (wgpu::FilterMode::Linear, wgpu::FilterMode::Linear, 32.0),
    };
    // Anisotropic filtering requires every filter to be linear.
    let anisotropy_clamp = if desc.filter == Filter::Trilinear {
        desc.anisotropy.max(1)
    } else {
        1
    };

    wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter,
        lod_min_clamp: 0.0,
        lod_max_clamp,
        compare: desc.compare.then_some(wgpu::CompareFunction::LessEqual),
        anisotropy_clamp,
        border_color: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_descriptor_borrows_the_label() {
        let label = String::from("shadow sampler");
        let desc = SamplerDesc::default()
            .with_filter(Filter::Linear)
            .with_compare();
        let sampler = sampler_descriptor(&label, &desc);

        assert_eq!(sampler.label, Some("shadow sampler"));
        assert_eq!(sampler.mag_filter, wgpu::FilterMode::Linear);
        assert_eq!(sampler.mipmap_filter, wgpu::FilterMode::Nearest);
        assert_eq!(sampler.compare, Some(wgpu::CompareFunction::LessEqual));
        assert_eq!(sampler.anisotropy_clamp, 1);
    }

    #[test]
    fn anisotropy_only_applies_to_trilinear_samplers() {
        let linear = SamplerDesc::default()
            .with_filter(Filter::Linear)
            .with_anisotropy(8);
        let trilinear = linear.with_filter(Filter::Trilinear);

        assert_eq!(sampler_descriptor("linear", &linear).anisotropy_clamp, 1);
        let sampler = sampler_descriptor("trilinear", &trilinear);
        assert_eq!(sampler.anisotropy_clamp, 8);
        assert_eq!(sampler.lod_max_clamp, 32.0);
        assert_eq!(sampler.address_mode_u, wgpu::AddressMode::ClampToEdge);
    }
}
