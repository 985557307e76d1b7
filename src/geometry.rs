use imageproc::rect::Rect;

/// Builds a rect from inclusive pixel bounds.
pub fn rect_from_bounds(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Rect {
    Rect::at(min_x as i32, min_y as i32).of_size(max_x - min_x + 1, max_y - min_y + 1)
}

/// Width over height.
pub fn aspect_ratio(rect: &Rect) -> f32 {
    rect.width() as f32 / rect.height() as f32
}

/// Determines whether a rect is close enough to square to be a bubble.
pub fn is_roughly_square(rect: &Rect, tolerance: f32) -> bool {
    let ratio = aspect_ratio(rect);
    ratio >= 1.0 - tolerance && ratio <= 1.0 + tolerance
}
