//! Texture creation helpers: material textures, the procedural sky and placeholders.

use crate::error::GpuError;
use crate::gpu::{
    Filter, Gpu, SamplerDesc, Texture, TextureDesc, TextureFormat, TextureKind, Wrap,
};
use crate::math::CubeFace;
use crate::settings::mip_levels;
use glamx::Vec3;
use image::{imageops, DynamicImage, RgbaImage};

/// Converts a colour with components in `[0, 1]` to 8-bit RGBA.
pub fn rgba8(colour: [f32; 4]) -> [u8; 4] {
    colour.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// A 1×1 texture filled with `colour`.
pub fn solid_colour(gpu: &Gpu, label: &str, colour: [f32; 4]) -> Result<Texture, GpuError> {
    let desc = TextureDesc::new_2d(label, TextureFormat::Rgba8, 1, 1)
        .with_sampler(SamplerDesc::default().with_wrap(Wrap::Repeat));
    let texture = Texture::new(gpu, desc)?;
    texture.write(0, 0, &rgba8(colour));
    Ok(texture)
}

/// Uploads a decoded image with a full mip chain.
///
/// The image is flipped vertically so that its first row lands at `v = 0`, and sampled
/// trilinearly with the given anisotropy.
pub fn from_image(
    gpu: &Gpu,
    label: &str,
    image: &DynamicImage,
    anisotropy: u16,
) -> Result<Texture, GpuError> {
    let pixels = flipped_rgba(image);
    let (width, height) = pixels.dimensions();
    let sampler = SamplerDesc::default()
        .with_filter(Filter::Trilinear)
        .with_wrap(Wrap::Repeat)
        .with_anisotropy(anisotropy);
    let desc = TextureDesc::new_2d(label, TextureFormat::Rgba8, width, height)
        .with_levels(mip_levels(width.max(height)))
        .with_sampler(sampler);

    let texture = Texture::new(gpu, desc)?;
    texture.write(0, 0, pixels.as_raw());
    gpu.generate_mipmaps(texture.id());
    Ok(texture)
}

/// The RGBA8 pixels of `image`, bottom row first.
pub fn flipped_rgba(image: &DynamicImage) -> RgbaImage {
    imageops::flip_vertical(&image.to_rgba8())
}

/// Does any pixel have an alpha below one?
pub fn has_transparency(image: &DynamicImage) -> bool {
    image.color().has_alpha() && image.to_rgba8().pixels().any(|p| p.0[3] < u8::MAX)
}

/// A 1×1 black texture of the given shape, bound to units whose real texture is not
/// available (or is the target of the current draw).
pub fn placeholder(gpu: &Gpu, label: &str, kind: TextureKind) -> Result<Texture, GpuError> {
    let desc = TextureDesc::new_2d(label, TextureFormat::Rgba8, 1, 1).with_kind(kind);
    let texture = Texture::new(gpu, desc)?;
    for layer in 0..kind.layer_count() {
        texture.write(0, layer, &[0, 0, 0, u8::MAX]);
    }
    Ok(texture)
}

const ZENITH: Vec3 = Vec3::new(0.22, 0.42, 0.78);
const HORIZON: Vec3 = Vec3::new(0.78, 0.84, 0.9);
const GROUND: Vec3 = Vec3::new(0.3, 0.27, 0.24);

/// Colour of the sky seen along `direction`.
pub fn sky_colour(direction: Vec3) -> Vec3 {
    let height = direction.normalize().y;
    if height >= 0.0 {
        HORIZON.lerp(ZENITH, height.sqrt())
    } else {
        HORIZON.lerp(GROUND, (-height).sqrt().min(1.0))
    }
}

/// Direction through texel `(s, t)` of a cube face, with `s` and `t` in `[-1, 1]` and `t`
/// growing with the row index.
pub fn cube_texel_direction(face: CubeFace, s: f32, t: f32) -> Vec3 {
    match face {
        CubeFace::PositiveX => Vec3::new(1.0, -t, -s),
        CubeFace::NegativeX => Vec3::new(-1.0, -t, s),
        CubeFace::PositiveY => Vec3::new(s, 1.0, t),
        CubeFace::NegativeY => Vec3::new(s, -1.0, -t),
        CubeFace::PositiveZ => Vec3::new(s, -t, 1.0),
        CubeFace::NegativeZ => Vec3::new(-s, -t, -1.0),
    }
}

/// Generates the sky cube map refracted by transparent objects.
pub fn sky_cube(gpu: &Gpu, size: u32) -> Result<Texture, GpuError> {
    let sampler = SamplerDesc::default().with_filter(Filter::Trilinear);
    let desc = TextureDesc::new_2d("environment_sky", TextureFormat::Rgba8, size, size)
        .with_kind(TextureKind::Cube)
        .with_levels(mip_levels(size))
        .with_sampler(sampler);
    let texture = Texture::new(gpu, desc)?;

    let mut texels = Vec::with_capacity((size * size * 4) as usize);
    for face in CubeFace::ALL {
        texels.clear();
        for row in 0..size {
            for column in 0..size {
                let s = (column as f32 + 0.5) / size as f32 * 2.0 - 1.0;
                let t = (row as f32 + 0.5) / size as f32 * 2.0 - 1.0;
                let colour = sky_colour(cube_texel_direction(face, s, t));
                texels.extend_from_slice(&rgba8([colour.x, colour.y, colour.z, 1.0]));
            }
        }
        texture.write(0, face.layer(), &texels);
    }
    gpu.generate_mipmaps(texture.id());
    Ok(texture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{Contents, HeadlessDevice};
    use std::rc::Rc;

    #[test]
    fn cube_texel_centres_point_along_the_face() {
        for face in CubeFace::ALL {
            let centre = cube_texel_direction(face, 0.0, 0.0);
            assert!(centre.abs_diff_eq(face.direction(), 1.0e-6));
        }
    }

    #[test]
    fn sky_is_brighter_above_the_horizon() {
        let up = sky_colour(Vec3::Y);
        let down = sky_colour(Vec3::NEG_Y);
        assert!(up.z > down.z);
        assert!(sky_colour(Vec3::X).abs_diff_eq(HORIZON, 1.0e-6));
    }

    #[test]
    fn transparency_is_detected_from_alpha() {
        let mut image = RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]));
        assert!(!has_transparency(&DynamicImage::ImageRgba8(image.clone())));
        image.put_pixel(1, 1, image::Rgba([255, 0, 0, 128]));
        assert!(has_transparency(&DynamicImage::ImageRgba8(image)));
    }

    #[test]
    fn images_are_uploaded_bottom_row_first_with_mipmaps() {
        let device = Rc::new(HeadlessDevice::new(8, 8));
        let gpu: Gpu = device.clone();
        let mut image = RgbaImage::new(4, 2);
        image.put_pixel(0, 0, image::Rgba([255, 255, 255, 255]));
        let flipped = flipped_rgba(&DynamicImage::ImageRgba8(image));
        assert_eq!(flipped.get_pixel(0, 1).0, [255, 255, 255, 255]);

        let texture = from_image(&gpu, "test", &DynamicImage::ImageRgba8(flipped), 4).unwrap();
        assert_eq!(texture.levels(), 2);
        assert!(matches!(
            device.contents(texture.id(), 1, 0),
            Some(Contents::Downsampled(_))
        ));
    }

    #[test]
    fn sky_cube_fills_every_face() {
        let device = Rc::new(HeadlessDevice::new(8, 8));
        let gpu: Gpu = device.clone();
        let sky = sky_cube(&gpu, 16).unwrap();
        for face in CubeFace::ALL {
            assert!(device.contents(sky.id(), 0, face.layer()).unwrap().has_content());
        }
        assert_eq!(device.diagnostics(), vec![]);
    }
}
