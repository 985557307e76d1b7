use image::{DynamicImage, GrayImage, ImageFormat};
use imageproc::filter::gaussian_blur_f32;
use imageproc::rect::Rect;
use log::debug;
use logging_timer::time;
use rayon::prelude::*;

use crate::config::OmrConfig;
use crate::error::{OmrError, OmrResult};
use crate::image_utils::{ratio_in, BLACK, WHITE};

/// A scanned sheet as decoded, in whatever color model it came in.
pub type RawImage = DynamicImage;

/// Mark/no-mark version of a sheet. Foreground (mark) pixels are white,
/// background pixels are black.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask(GrayImage);

impl BinaryMask {
    /// Wraps an image, treating every non-black pixel as foreground.
    pub fn from_image(img: GrayImage) -> Self {
        let mut img = img;
        for pixel in img.pixels_mut() {
            if *pixel != BLACK {
                *pixel = WHITE;
            }
        }
        Self(img)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        *self.0.get_pixel(x, y) == WHITE
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }

    /// Fraction of `rect` covered by foreground pixels.
    pub fn fill_ratio(&self, rect: &Rect) -> f32 {
        ratio_in(&self.0, rect, &WHITE)
    }
}

/// Decodes raw image bytes, sniffing the format when none is declared.
pub fn decode_image(bytes: &[u8], format: Option<ImageFormat>) -> OmrResult<RawImage> {
    let img = match format {
        Some(format) => image::load_from_memory_with_format(bytes, format)?,
        None => image::load_from_memory(bytes)?,
    };
    Ok(img)
}

#[time]
pub fn preprocess(image: &RawImage, config: &OmrConfig) -> OmrResult<BinaryMask> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(OmrError::EmptyImage { width, height });
    }

    let gray = image.to_luma8();
    let smoothed = match blur_sigma(config.blur_kernel_size) {
        Some(sigma) => gaussian_blur_f32(&gray, sigma),
        None => gray,
    };

    let mask = adaptive_threshold(
        &smoothed,
        config.adaptive_block_size,
        config.adaptive_offset,
        config.binarization_threshold,
    );
    debug!(
        "binarized {}x{} image (block {}, offset {}, ceiling {})",
        width,
        height,
        config.adaptive_block_size,
        config.adaptive_offset,
        config.binarization_threshold
    );

    Ok(BinaryMask(mask))
}

/// Gaussian sigma for a kernel width, using the same rule OpenCV uses when
/// sigma is left unspecified. Widths of 0 or 1 mean "no smoothing".
pub fn blur_sigma(kernel_size: u32) -> Option<f32> {
    if kernel_size <= 1 {
        return None;
    }
    Some(0.3 * ((kernel_size - 1) as f32 * 0.5 - 1.0) + 0.8)
}

/// Summed-area table with a zero row and column in front, so the sum over
/// `[x0, x1) x [y0, y1)` is four lookups.
fn integral_image(img: &GrayImage) -> Vec<u64> {
    let w = img.width() as usize;
    let h = img.height() as usize;
    let iw = w + 1;
    let src = img.as_raw();
    let mut integral = vec![0u64; (w + 1) * (h + 1)];

    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += src[y * w + x] as u64;
            integral[(y + 1) * iw + (x + 1)] = row_sum + integral[y * iw + (x + 1)];
        }
    }

    integral
}

/// Marks a pixel as foreground when it is at least `offset` darker than the
/// mean of its `block_size` neighbourhood and no brighter than `ceiling`.
/// The local mean keeps uneven illumination from shifting the cutoff.
pub fn adaptive_threshold(img: &GrayImage, block_size: u32, offset: u8, ceiling: u8) -> GrayImage {
    let w = img.width() as usize;
    let h = img.height() as usize;
    let iw = w + 1;
    let radius = (block_size / 2) as usize;
    let integral = integral_image(img);
    let src = img.as_raw();

    let mut mask = GrayImage::new(img.width(), img.height());
    if w == 0 {
        return mask;
    }

    mask.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(h);
        for (x, out) in row.iter_mut().enumerate() {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(w);
            let area = ((y1 - y0) * (x1 - x0)) as u64;
            let sum = integral[y1 * iw + x1] + integral[y0 * iw + x0]
                - integral[y0 * iw + x1]
                - integral[y1 * iw + x0];
            let local_mean = sum / area;
            let pixel = src[y * w + x] as u64;

            let is_mark = pixel <= ceiling as u64 && pixel + offset as u64 <= local_mean;
            *out = if is_mark { WHITE.0[0] } else { BLACK.0[0] };
        }
    });

    mask
}

#[cfg(test)]
mod test {
    use super::*;
    use image::{Luma, Rgb, RgbImage};
    use imageproc::drawing::draw_filled_circle_mut;

    #[test]
    fn test_rejects_empty_image() {
        let img = DynamicImage::new_luma8(0, 10);
        assert!(matches!(
            preprocess(&img, &OmrConfig::default()),
            Err(OmrError::EmptyImage {
                width: 0,
                height: 10
            })
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_image(b"definitely not an image", None),
            Err(OmrError::ImageDecode(_))
        ));
        assert!(matches!(
            decode_image(b"definitely not an image", Some(ImageFormat::Png)),
            Err(OmrError::ImageDecode(_))
        ));
    }

    #[test]
    fn test_decode_png_round_trip() {
        let img = RgbImage::from_pixel(8, 6, Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let decoded = decode_image(&bytes, None).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
    }

    #[test]
    fn test_blank_page_has_no_marks() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(50, 40, WHITE));
        let mask = preprocess(&img, &OmrConfig::default()).unwrap();
        assert_eq!((mask.width(), mask.height()), (50, 40));
        assert!(mask.as_image().pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn test_dark_disc_becomes_foreground() {
        let mut img = RgbImage::from_pixel(60, 60, Rgb([250, 250, 250]));
        draw_filled_circle_mut(&mut img, (30, 30), 8, Rgb([20, 20, 20]));
        let mask = preprocess(&DynamicImage::ImageRgb8(img), &OmrConfig::default()).unwrap();

        assert!(mask.is_foreground(30, 30));
        assert!(mask.is_foreground(30, 25));
        assert!(!mask.is_foreground(5, 5));
        assert!(!mask.is_foreground(55, 30));
    }

    #[test]
    fn test_uneven_illumination_does_not_mark_background() {
        // background ramps from 150 to 255 left to right; a global cutoff of
        // 180 alone would mark the whole left side
        let mut img = GrayImage::from_fn(200, 100, |x, _| {
            Luma([(150.0 + x as f32 * 105.0 / 199.0).round() as u8])
        });
        draw_filled_circle_mut(&mut img, (100, 50), 10, Luma([40u8]));
        let mask = preprocess(&DynamicImage::ImageLuma8(img), &OmrConfig::default()).unwrap();

        assert!(mask.is_foreground(100, 50));
        assert!(!mask.is_foreground(30, 20));
        assert!(!mask.is_foreground(40, 80));
        assert!(!mask.is_foreground(170, 80));
    }

    #[test]
    fn test_blur_sigma() {
        assert_eq!(blur_sigma(0), None);
        assert_eq!(blur_sigma(1), None);
        assert!((blur_sigma(5).unwrap() - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_mask_from_image_normalizes() {
        let mask = BinaryMask::from_image(GrayImage::from_fn(2, 1, |x, _| Luma([x as u8 * 7])));
        assert!(!mask.is_foreground(0, 0));
        assert!(mask.is_foreground(1, 0));
    }
}
