//! Image transforms
//!
//! The preprocessing pipeline shared by training, validation and inference:
//! resize the shorter side to 256 preserving aspect ratio, center-crop to
//! 224x224, convert to a CHW float buffer. Normalization uses the ImageNet
//! per-channel constants.

use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Shorter-side target before cropping
pub const RESIZE_SIZE: u32 = 256;

/// Final square crop fed to the network
pub const CROP_SIZE: u32 = 224;

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize so the shorter side equals `target`, preserving aspect ratio.
pub fn resize_shorter_side(image: &DynamicImage, target: u32) -> DynamicImage {
    let (width, height) = image.dimensions();

    let (new_width, new_height) = if width <= height {
        (target, (height as u64 * target as u64 / width as u64) as u32)
    } else {
        ((width as u64 * target as u64 / height as u64) as u32, target)
    };

    image.resize_exact(new_width, new_height, FilterType::Triangle)
}

/// Center-crop to a `size` x `size` square.
pub fn center_crop(image: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let size = size.min(width).min(height);

    let left = (width - size) / 2;
    let top = (height - size) / 2;

    image.crop_imm(left, top, size, size)
}

/// Convert to a flat CHW buffer scaled to `[0, 1]`.
pub fn to_chw_unit(image: &DynamicImage) -> Vec<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let num_pixels = (width * height) as usize;

    let mut buffer = vec![0.0f32; 3 * num_pixels];
    for (i, pixel) in rgb.pixels().enumerate() {
        buffer[i] = pixel[0] as f32 / 255.0;
        buffer[num_pixels + i] = pixel[1] as f32 / 255.0;
        buffer[2 * num_pixels + i] = pixel[2] as f32 / 255.0;
    }

    buffer
}

/// Apply ImageNet mean/std normalization in place to a CHW buffer.
pub fn normalize_chw(buffer: &mut [f32]) {
    let num_pixels = buffer.len() / 3;
    for channel in 0..3 {
        let (mean, std) = (IMAGENET_MEAN[channel], IMAGENET_STD[channel]);
        for value in &mut buffer[channel * num_pixels..(channel + 1) * num_pixels] {
            *value = (*value - mean) / std;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_shorter_side_landscape() {
        let img = DynamicImage::new_rgb8(400, 200);
        let resized = resize_shorter_side(&img, 256);
        assert_eq!(resized.height(), 256);
        assert_eq!(resized.width(), 512);
    }

    #[test]
    fn test_resize_shorter_side_portrait() {
        let img = DynamicImage::new_rgb8(128, 512);
        let resized = resize_shorter_side(&img, 256);
        assert_eq!(resized.width(), 256);
        assert_eq!(resized.height(), 1024);
    }

    #[test]
    fn test_center_crop_dims() {
        let img = DynamicImage::new_rgb8(512, 256);
        let cropped = center_crop(&img, 224);
        assert_eq!(cropped.dimensions(), (224, 224));
    }

    #[test]
    fn test_to_chw_unit_layout() {
        let img = DynamicImage::new_rgb8(4, 4);
        let buffer = to_chw_unit(&img);
        assert_eq!(buffer.len(), 3 * 4 * 4);
        assert!(buffer.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_normalize_chw_zero_input() {
        let mut buffer = vec![0.0f32; 3 * 4];
        normalize_chw(&mut buffer);

        // Channel 0 becomes (0 - mean) / std
        let expected = (0.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        assert!((buffer[0] - expected).abs() < 1e-6);
    }
}
