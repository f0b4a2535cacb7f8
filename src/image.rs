//! Image preprocessing and augmentation
//!
//! Inputs are decoded from their content (not their extension) with the
//! `image` crate. Every technique result is a PNG, base64 encoded.

use crate::error::{MediaError, Result};
use crate::modality::Modality;
use crate::pipeline::{encode_base64, rng_from_seed, Pipeline};
use crate::technique::{techniques, TechniqueReport};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use ndarray::Array3;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use std::io::Cursor;
use std::path::Path;

techniques! {
    pub enum ImagePreprocess for Modality::Image {
        Grayscale => "grayscale",
        Resize => "resize",
        Normalize => "normalize",
    }
}

techniques! {
    pub enum ImageAugment for Modality::Image {
        Flip => "flip",
        Rotate => "rotate",
        Noise => "noise",
    }
}

#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Previews are downscaled to fit this square
    pub preview_max: u32,
    pub width: u32,
    pub height: u32,
    /// Counter-clockwise rotation, canvas expanded to fit
    pub rotation_degrees: f64,
    pub noise_std: f32,
    pub seed: Option<u64>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            preview_max: 800,
            width: 224,   // ImageNet-style model input
            height: 224,
            rotation_degrees: 30.0,
            noise_std: 25.0,
            seed: None,
        }
    }
}

pub struct ImagePipeline {
    config: ImageConfig,
}

impl ImagePipeline {
    pub fn new(config: ImageConfig) -> Self {
        Self { config }
    }

    /// Decode an image file, guessing the format from its bytes
    pub fn load(&self, path: &Path) -> Result<DynamicImage> {
        let bytes = std::fs::read(path).map_err(|e| MediaError::load(path, e))?;
        image::load_from_memory(&bytes).map_err(|e| MediaError::load(path, e))
    }

    /// Resize to the configured dimensions with a SIMD convolution resizer
    pub fn resize(&self, img: &DynamicImage) -> Result<DynamicImage> {
        use fast_image_resize as fr;
        use fr::images::Image as FrImage;

        let (width, height) = (self.config.width, self.config.height);
        let (pixel_type, raw) = match img {
            DynamicImage::ImageLuma8(gray) => (fr::PixelType::U8, gray.as_raw().clone()),
            _ if img.color().has_alpha() => (fr::PixelType::U8x4, img.to_rgba8().into_raw()),
            _ => (fr::PixelType::U8x3, img.to_rgb8().into_raw()),
        };

        let src_image = FrImage::from_vec_u8(img.width(), img.height(), raw, pixel_type)
            .map_err(|e| MediaError::technique(ImagePreprocess::Resize, format!("{:?}", e)))?;
        let mut dst_image = FrImage::new(width, height, src_image.pixel_type());

        let mut resizer = fr::Resizer::new();
        resizer.resize(&src_image, &mut dst_image, None)
            .map_err(|e| MediaError::technique(ImagePreprocess::Resize, format!("{:?}", e)))?;

        let bytes = dst_image.buffer().to_vec();
        let resized = match pixel_type {
            fr::PixelType::U8 => GrayImage::from_raw(width, height, bytes).map(DynamicImage::ImageLuma8),
            fr::PixelType::U8x4 => RgbaImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgba8),
            _ => RgbImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgb8),
        };
        resized.ok_or_else(|| MediaError::technique(ImagePreprocess::Resize, "resized buffer size mismatch"))
    }

    fn add_noise(&self, img: &RgbImage, rng: &mut impl Rng) -> Result<RgbImage> {
        let normal = Normal::new(0.0f32, self.config.noise_std)
            .map_err(|e| MediaError::technique(ImageAugment::Noise, e))?;

        let mut noisy = img.clone();
        for value in noisy.iter_mut() {
            let shifted = *value as f32 + normal.sample(rng);
            *value = shifted.round().clamp(0.0, 255.0) as u8;
        }
        Ok(noisy)
    }
}

impl Pipeline for ImagePipeline {
    type Process = ImagePreprocess;
    type Augment = ImageAugment;

    const MODALITY: Modality = Modality::Image;

    fn preview(&self, path: &Path) -> Result<String> {
        let mut img = self.load(path)?;
        let max = self.config.preview_max;
        if img.width() > max || img.height() > max {
            img = img.thumbnail(max, max);
        }
        encode_png(&DynamicImage::ImageRgb8(img.to_rgb8()), "preview")
    }

    fn process(&self, path: &Path, techniques: &[ImagePreprocess]) -> Result<TechniqueReport> {
        let img = self.load(path)?;

        Ok(TechniqueReport::collect(techniques, |technique| {
            let processed = match technique {
                ImagePreprocess::Grayscale => DynamicImage::ImageLuma8(grayscale(&img.to_rgb8())),
                ImagePreprocess::Resize => self.resize(&img)?,
                ImagePreprocess::Normalize => normalize_round_trip(&img)?,
            };
            encode_png(&processed, technique)
        }))
    }

    fn augment(&self, path: &Path, techniques: &[ImageAugment]) -> Result<TechniqueReport> {
        let rgb = self.load(path)?.to_rgb8();
        let mut rng = rng_from_seed(self.config.seed);

        Ok(TechniqueReport::collect(techniques, |technique| {
            let processed = match technique {
                ImageAugment::Flip => image::imageops::flip_horizontal(&rgb),
                ImageAugment::Rotate => rotate_expand(&rgb, self.config.rotation_degrees),
                ImageAugment::Noise => self.add_noise(&rgb, &mut rng)?,
            };
            encode_png(&DynamicImage::ImageRgb8(processed), technique)
        }))
    }
}

/// PNG-encode an image and base64 the bytes
pub fn encode_png(img: &DynamicImage, technique: impl ToString) -> Result<String> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| MediaError::technique(technique, e))?;
    Ok(encode_base64(buffer.get_ref()))
}

/// Scale pixels into [0, 1] and back; the output matches the input
/// ITU-R 601 luma in 16-bit fixed point: L = (299 R + 587 G + 114 B) / 1000
pub fn grayscale(rgb: &RgbImage) -> GrayImage {
    let (width, height) = rgb.dimensions();
    let luma: Vec<u8> = rgb
        .par_chunks_exact(3)
        .map(|p| ((p[0] as u32 * 19595 + p[1] as u32 * 38470 + p[2] as u32 * 7471 + 0x8000) >> 16) as u8)
        .collect();
    GrayImage::from_raw(width, height, luma).unwrap_or_else(|| GrayImage::new(width, height))
}

fn normalize_round_trip(img: &DynamicImage) -> Result<DynamicImage> {
    let channels = if img.color().has_alpha() { 4 } else { 3 };
    let (width, height) = (img.width(), img.height());
    let raw = if channels == 4 { img.to_rgba8().into_raw() } else { img.to_rgb8().into_raw() };

    let normalized = Array3::from_shape_vec((height as usize, width as usize, channels), raw)
        .map_err(|e| MediaError::technique(ImagePreprocess::Normalize, e))?
        .mapv(|v| v as f32 / 255.0);
    let restored: Vec<u8> = normalized
        .iter()
        .map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect();

    let img = if channels == 4 {
        RgbaImage::from_raw(width, height, restored).map(DynamicImage::ImageRgba8)
    } else {
        RgbImage::from_raw(width, height, restored).map(DynamicImage::ImageRgb8)
    };
    img.ok_or_else(|| MediaError::technique(ImagePreprocess::Normalize, "buffer size mismatch"))
}

/// Rotate counter-clockwise about the center, expanding the canvas so the
/// whole rotated image fits. Uncovered pixels are black.
pub fn rotate_expand(img: &RgbImage, degrees: f64) -> RgbImage {
    let (w, h) = (img.width() as f64, img.height() as f64);
    let (sin, cos) = degrees.to_radians().sin_cos();

    // Shave float noise so 90 degree turns do not gain a pixel
    let new_w = ((w * cos.abs() + h * sin.abs()) - 1e-6).ceil().max(1.0) as u32;
    let new_h = ((w * sin.abs() + h * cos.abs()) - 1e-6).ceil().max(1.0) as u32;

    let (src_cx, src_cy) = (w / 2.0, h / 2.0);
    let (dst_cx, dst_cy) = (new_w as f64 / 2.0, new_h as f64 / 2.0);
    let row_len = new_w as usize * 3;

    let mut buffer = vec![0u8; row_len * new_h as usize];
    buffer.par_chunks_mut(row_len).enumerate().for_each(|(y, row)| {
        let dy = y as f64 + 0.5 - dst_cy;
        for x in 0..new_w as usize {
            let dx = x as f64 + 0.5 - dst_cx;
            let sx = (dx * cos - dy * sin + src_cx).floor();
            let sy = (dx * sin + dy * cos + src_cy).floor();
            if sx >= 0.0 && sy >= 0.0 && sx < w && sy < h {
                let pixel = img.get_pixel(sx as u32, sy as u32);
                row[x * 3..x * 3 + 3].copy_from_slice(&pixel.0);
            }
        }
    });

    // Buffer length is new_w * new_h * 3 by construction
    RgbImage::from_raw(new_w, new_h, buffer).unwrap_or_else(|| RgbImage::new(new_w, new_h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::decode_base64;
    use image::Rgb;
    use tempfile::NamedTempFile;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 128]))
    }

    fn png_file(img: &RgbImage) -> NamedTempFile {
        let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        img.save_with_format(file.path(), ImageFormat::Png).unwrap();
        file
    }

    fn decode(payload: &str) -> DynamicImage {
        image::load_from_memory(&decode_base64(payload).unwrap()).unwrap()
    }

    fn pipeline() -> ImagePipeline {
        ImagePipeline::new(ImageConfig { seed: Some(9), ..Default::default() })
    }

    #[test]
    fn test_grayscale_uses_601_weights() {
        let img = RgbImage::from_vec(4, 1, vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 200, 200, 200]).unwrap();
        let gray = grayscale(&img);
        assert_eq!(gray.into_raw(), vec![76, 150, 29, 200]);
    }

    #[test]
    fn test_preview_downscales_large_images() {
        let file = png_file(&gradient(1600, 400));
        let preview = decode(&pipeline().preview(file.path()).unwrap());
        assert_eq!((preview.width(), preview.height()), (800, 200));

        let small = png_file(&gradient(40, 30));
        let preview = decode(&pipeline().preview(small.path()).unwrap());
        assert_eq!((preview.width(), preview.height()), (40, 30));
    }

    #[test]
    fn test_process_techniques() {
        let source = gradient(64, 48);
        let file = png_file(&source);
        let report = pipeline()
            .process(file.path(), &[ImagePreprocess::Grayscale, ImagePreprocess::Resize, ImagePreprocess::Normalize])
            .unwrap();

        let gray = decode(report.output("grayscale").unwrap());
        assert_eq!(gray.color(), image::ColorType::L8);

        let resized = decode(report.output("resize").unwrap());
        assert_eq!((resized.width(), resized.height()), (224, 224));

        let normalized = decode(report.output("normalize").unwrap()).to_rgb8();
        assert_eq!(normalized, source);
    }

    #[test]
    fn test_flip_mirrors_horizontally() {
        let source = gradient(10, 4);
        let file = png_file(&source);
        let report = pipeline().augment(file.path(), &[ImageAugment::Flip]).unwrap();
        let flipped = decode(report.output("flip").unwrap()).to_rgb8();

        assert_eq!(flipped.get_pixel(0, 2), source.get_pixel(9, 2));
        assert_eq!(flipped.get_pixel(9, 0), source.get_pixel(0, 0));
    }

    #[test]
    fn test_rotate_expands_canvas() {
        let rotated = rotate_expand(&gradient(100, 50), 30.0);
        assert_eq!((rotated.width(), rotated.height()), (112, 94));
        // Corners of the expanded canvas are uncovered
        assert_eq!(rotated.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_rotate_quarter_turn_is_counter_clockwise() {
        let source = gradient(4, 2);
        let rotated = rotate_expand(&source, 90.0);
        assert_eq!((rotated.width(), rotated.height()), (2, 4));
        assert_eq!(rotated.get_pixel(0, 0), source.get_pixel(3, 0));
        assert_eq!(rotated.get_pixel(1, 3), source.get_pixel(0, 1));
    }

    #[test]
    fn test_noise_keeps_dimensions_and_changes_pixels() {
        let source = gradient(32, 32);
        let file = png_file(&source);
        let report = pipeline().augment(file.path(), &[ImageAugment::Noise, ImageAugment::Rotate]).unwrap();

        let noisy = decode(report.output("noise").unwrap()).to_rgb8();
        assert_eq!(noisy.dimensions(), source.dimensions());
        assert_ne!(noisy, source);
        assert!(report.output("rotate").is_some());
    }

    #[test]
    fn test_undecodable_file_is_load_error() {
        let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        std::fs::write(file.path(), b"not an image").unwrap();
        assert!(matches!(
            pipeline().process(file.path(), &[ImagePreprocess::Grayscale]),
            Err(MediaError::Load { .. })
        ));
    }
}
