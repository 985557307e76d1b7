use image::{GrayImage, Luma, Rgb};
use imageproc::rect::Rect;

pub const WHITE: Luma<u8> = Luma([u8::MAX]);
pub const BLACK: Luma<u8> = Luma([u8::MIN]);

pub const WHITE_RGB: Rgb<u8> = Rgb([255, 255, 255]);
pub const GREEN: Rgb<u8> = Rgb([0, 200, 0]);
pub const RED: Rgb<u8> = Rgb([220, 0, 0]);
pub const PINK: Rgb<u8> = Rgb([255, 0, 255]);

pub const RAINBOW: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([255, 127, 0]),
    Rgb([200, 200, 0]),
    Rgb([0, 180, 0]),
    Rgb([0, 0, 255]),
    Rgb([139, 0, 255]),
];

/// Clips `rect` to the image bounds, returning `None` when nothing is left.
pub fn clip_rect(img: &GrayImage, rect: &Rect) -> Option<Rect> {
    let left = rect.left().max(0);
    let top = rect.top().max(0);
    let right = rect.right().min(img.width() as i32 - 1);
    let bottom = rect.bottom().min(img.height() as i32 - 1);
    if right < left || bottom < top {
        return None;
    }
    Some(Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32))
}

/// Determines the number of pixels inside `rect` that match the given luma.
pub fn count_pixels_in(img: &GrayImage, rect: &Rect, luma: &Luma<u8>) -> u32 {
    let Some(rect) = clip_rect(img, rect) else {
        return 0;
    };

    let mut count = 0;
    for y in rect.top()..=rect.bottom() {
        for x in rect.left()..=rect.right() {
            if img.get_pixel(x as u32, y as u32) == luma {
                count += 1;
            }
        }
    }
    count
}

/// Determines the ratio of pixels inside `rect` that match the given luma.
/// The area outside the image counts as not matching.
pub fn ratio_in(img: &GrayImage, rect: &Rect, luma: &Luma<u8>) -> f32 {
    let total = rect.width() as u64 * rect.height() as u64;
    if total == 0 {
        return 0.0;
    }
    (count_pixels_in(img, rect, luma) as f64 / total as f64) as f32
}
