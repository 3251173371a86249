// Frame capture: swapchain pixels -> PPM file

use anyhow::{Context, Result};
use ash::vk;
use image::RgbImage;
use std::path::PathBuf;

/// Tightly packed pixels copied out of a swapchain image
pub struct Capture {
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl Capture {
    pub fn to_rgb(&self) -> Result<RgbImage> {
        to_rgb(self.format, &self.bytes, self.width, self.height)
    }
}

/// Formats `to_rgb` understands, all 4 bytes per pixel
pub fn supports(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::B8G8R8A8_UNORM
            | vk::Format::B8G8R8A8_SRGB
            | vk::Format::R8G8B8A8_UNORM
            | vk::Format::R8G8B8A8_SRGB
    )
}

/// Drop alpha and put channels in RGB order
pub fn to_rgb(format: vk::Format, bytes: &[u8], width: u32, height: u32) -> Result<RgbImage> {
    let swizzle: [usize; 3] = match format {
        vk::Format::B8G8R8A8_UNORM | vk::Format::B8G8R8A8_SRGB => [2, 1, 0],
        vk::Format::R8G8B8A8_UNORM | vk::Format::R8G8B8A8_SRGB => [0, 1, 2],
        other => anyhow::bail!("Cannot convert swapchain format {:?} to RGB", other),
    };

    let expected = width as usize * height as usize * 4;
    if bytes.len() < expected {
        anyhow::bail!(
            "Capture holds {} bytes, {}x{} RGBA needs {}",
            bytes.len(),
            width,
            height,
            expected
        );
    }

    let rgb = bytes[..expected]
        .chunks_exact(4)
        .flat_map(|px| swizzle.map(|c| px[c]))
        .collect();

    RgbImage::from_raw(width, height, rgb).context("Pixel buffer does not match image size")
}

/// Write `image` as binary PPM to `<name>.ppm`
pub fn save_ppm(image: &RgbImage, name: &str) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{}.ppm", name));
    image
        .save_with_format(&path, image::ImageFormat::Pnm)
        .with_context(|| format!("Failed to write {:?}", path))?;
    log::info!("Saved frame to {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn bgra_is_swizzled() {
        let bytes = [10, 20, 30, 255, 1, 2, 3, 255];
        let rgb = to_rgb(vk::Format::B8G8R8A8_UNORM, &bytes, 2, 1).unwrap();
        assert_eq!(*rgb.get_pixel(0, 0), Rgb([30, 20, 10]));
        assert_eq!(*rgb.get_pixel(1, 0), Rgb([3, 2, 1]));
    }

    #[test]
    fn rgba_passes_through() {
        let bytes = [10, 20, 30, 0];
        let rgb = to_rgb(vk::Format::R8G8B8A8_UNORM, &bytes, 1, 1).unwrap();
        assert_eq!(*rgb.get_pixel(0, 0), Rgb([10, 20, 30]));
    }

    #[test]
    fn unsupported_format() {
        assert!(supports(vk::Format::B8G8R8A8_SRGB));
        assert!(!supports(vk::Format::R16G16B16A16_SFLOAT));
        assert!(to_rgb(vk::Format::R16G16B16A16_SFLOAT, &[0; 8], 1, 1).is_err());
    }

    #[test]
    fn short_buffer() {
        assert!(to_rgb(vk::Format::B8G8R8A8_UNORM, &[0; 7], 2, 1).is_err());
    }

    #[test]
    fn writes_ppm() {
        let dir = std::env::temp_dir().join(format!("spirv-spec-capture-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let name = dir.join("frame");
        let image = RgbImage::from_pixel(3, 2, Rgb([0, 0, 255]));

        let path = save_ppm(&image, name.to_str().unwrap()).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"P6"));

        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded, image);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
