/// Draw the actions of one iteration onto the screenshot the model saw.
///
/// Pointer actions get a crosshair box, drags a line from start to end, and
/// every marker carries its action name (e.g. "1 CLICK").
use crate::errors::GroundResult;
use crate::grounding::action::{ActionType, StructuredAction};
use crate::grounding::coords::{to_destination_pixels, NormPoint};
use crate::perception::types::EncodedImage;

/// RGBA colour per action kind.
fn action_colour(at: ActionType) -> [u8; 4] {
    match at {
        ActionType::Click       => [255, 68, 68, 220],   // red
        ActionType::DoubleClick => [255, 170, 0, 220],   // orange
        ActionType::RightClick  => [255, 68, 255, 220],  // magenta
        ActionType::Hover       => [0, 220, 255, 220],   // cyan
        ActionType::Drag        => [68, 255, 68, 220],   // green
        ActionType::Scroll      => [68, 68, 255, 220],   // blue
        _                       => [255, 255, 255, 200], // white
    }
}

/// Returns PNG bytes of `shot` with every locatable action marked.
/// Actions without a point (type, hotkey, wait) are listed in the top-left corner.
pub fn annotate_actions(shot: &EncodedImage, actions: &[StructuredAction]) -> GroundResult<Vec<u8>> {
    let img = image::load_from_memory(&shot.bytes)?;
    let mut canvas = img.to_rgba8();
    let (w, h) = canvas.dimensions();

    let label_scale: u32 = if w > 1600 { 2 } else { 1 };
    let thickness: i32 = if w > 1600 { 3 } else { 2 };
    let half = 10 * label_scale as i32;
    let px = |p: NormPoint| to_destination_pixels(p, w, h);

    let mut unplaced = 0i32;
    for (i, action) in actions.iter().enumerate() {
        let col = action_colour(action.action_type);
        let label = format!("{} {}", i + 1, action.action_type.as_str());

        if action.action_type == ActionType::Drag {
            if let Some((start, end)) = action.drag_endpoints() {
                let (sx, sy) = px(start);
                let (ex, ey) = px(end);
                draw_line(&mut canvas, sx, sy, ex, ey, col, thickness);
                draw_marker(&mut canvas, ex, ey, half / 2, col, thickness);
            }
        }

        match action.anchor() {
            Some(p) => {
                let (x, y) = px(p);
                draw_marker(&mut canvas, x, y, half, col, thickness);
                let label_h_px = (5 * label_scale + 4 * label_scale) as i32;
                draw_label_bg(&mut canvas, x - half, (y - half - label_h_px).max(0), &label, col, label_scale);
            }
            None => {
                let row_h = (5 * label_scale + 6 * label_scale) as i32;
                draw_label_bg(&mut canvas, 0, unplaced * row_h, &label, col, label_scale);
                unplaced += 1;
            }
        }
    }

    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(
            &mut std::io::Cursor::new(&mut out),
            image::ImageFormat::Png,
        )?;

    Ok(out)
}

// ── Drawing primitives ──────────────────────────────────────────────────────

/// Square outline with a crosshair through its centre.
fn draw_marker(canvas: &mut image::RgbaImage, x: i32, y: i32, half: i32, col: [u8; 4], thickness: i32) {
    draw_rect(canvas, x - half, y - half, x + half, y + half, col, thickness);
    draw_line(canvas, x - half / 2, y, x + half / 2, y, col, 1);
    draw_line(canvas, x, y - half / 2, x, y + half / 2, col, 1);
}

fn draw_rect(
    canvas: &mut image::RgbaImage,
    x1: i32, y1: i32, x2: i32, y2: i32,
    col: [u8; 4],
    thickness: i32,
) {
    for t in 0..thickness {
        draw_line(canvas, x1, y1 + t, x2, y1 + t, col, 1);
        draw_line(canvas, x1, y2 - t, x2, y2 - t, col, 1);
        draw_line(canvas, x1 + t, y1, x1 + t, y2, col, 1);
        draw_line(canvas, x2 - t, y1, x2 - t, y2, col, 1);
    }
}

/// Bresenham line, `thickness` pixels wide (square brush).
fn draw_line(
    canvas: &mut image::RgbaImage,
    x0: i32, y0: i32, x1: i32, y1: i32,
    col: [u8; 4],
    thickness: i32,
) {
    let (w, h) = canvas.dimensions();
    let (iw, ih) = (w as i32, h as i32);
    let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
    let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
    let (mut x, mut y, mut err) = (x0, y0, dx + dy);
    let r = (thickness - 1) / 2;

    loop {
        for oy in -r..=r {
            for ox in -r..=r {
                let (px, py) = (x + ox, y + oy);
                if px >= 0 && px < iw && py >= 0 && py < ih {
                    set_pixel(canvas, px as u32, py as u32, col);
                }
            }
        }
        if x == x1 && y == y1 { break; }
        let e2 = 2 * err;
        if e2 >= dy { err += dy; x += sx; }
        if e2 <= dx { err += dx; y += sy; }
    }
}

fn draw_label_bg(
    canvas: &mut image::RgbaImage,
    x: i32, y: i32,
    text: &str,
    col: [u8; 4],
    scale: u32,
) {
    let (w, h) = canvas.dimensions();
    let x = x.max(0) as u32;
    let y = y.max(0) as u32;
    let char_w = 5 * scale + 1; // glyph width + 1px gap
    let char_h = 5 * scale;
    let pad = 2 * scale;
    let label_w = text.len() as u32 * char_w + pad * 2;
    let label_h = char_h + pad * 2;

    // Dark background
    for dy in 0..label_h {
        for dx in 0..label_w {
            let (px, py) = (x + dx, y + dy);
            if px < w && py < h {
                let p = canvas.get_pixel_mut(px, py);
                p[0] = (p[0] as f32 * 0.2) as u8;
                p[1] = (p[1] as f32 * 0.2) as u8;
                p[2] = (p[2] as f32 * 0.2) as u8;
                p[3] = 255;
            }
        }
    }

    for (i, c) in text.to_uppercase().chars().enumerate() {
        let gx = x + pad + i as u32 * char_w;
        if gx + 5 * scale >= w { break; }
        draw_mini_glyph(canvas, c, gx, y + pad, col, scale);
    }
}

/// 5×5 bitmap glyphs, drawn at `scale` pixels per dot.
fn draw_mini_glyph(canvas: &mut image::RgbaImage, c: char, px: u32, py: u32, col: [u8; 4], scale: u32) {
    let glyph = match c {
        '0'..='9' => MINI_FONT[(c as u8 - b'0') as usize],
        'A'..='Z' => MINI_FONT[10 + (c as u8 - b'A') as usize],
        ':' => [0b00000, 0b00100, 0b00000, 0b00100, 0b00000],
        '_' => [0b00000, 0b00000, 0b00000, 0b00000, 0b11111],
        ' ' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000],
        _   => return,
    };
    let (w, h) = canvas.dimensions();
    for (row, &bits) in glyph.iter().enumerate() {
        for bit in 0..5u32 {
            if (bits >> (4 - bit)) & 1 == 0 { continue; }
            for sy in 0..scale {
                for sx in 0..scale {
                    let x = px + bit * scale + sx;
                    let y = py + row as u32 * scale + sy;
                    if x < w && y < h {
                        set_pixel(canvas, x, y, col);
                    }
                }
            }
        }
    }
}

fn set_pixel(canvas: &mut image::RgbaImage, x: u32, y: u32, col: [u8; 4]) {
    let p = canvas.get_pixel_mut(x, y);
    let a = col[3] as f32 / 255.0;
    p[0] = (p[0] as f32 * (1.0 - a) + col[0] as f32 * a).round() as u8;
    p[1] = (p[1] as f32 * (1.0 - a) + col[1] as f32 * a).round() as u8;
    p[2] = (p[2] as f32 * (1.0 - a) + col[2] as f32 * a).round() as u8;
    p[3] = 255;
}

/// Digits 0-9, letters A-Z.
const MINI_FONT: [[u8; 5]; 36] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111], // 2
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110], // 3
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110], // 5
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100], // 7
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110], // 9
    [0b01110, 0b10001, 0b11111, 0b10001, 0b10001], // A
    [0b11110, 0b10001, 0b11110, 0b10001, 0b11110], // B
    [0b01110, 0b10000, 0b10000, 0b10000, 0b01110], // C
    [0b11100, 0b10010, 0b10001, 0b10010, 0b11100], // D
    [0b11111, 0b10000, 0b11110, 0b10000, 0b11111], // E
    [0b11111, 0b10000, 0b11110, 0b10000, 0b10000], // F
    [0b01110, 0b10000, 0b10011, 0b10001, 0b01110], // G
    [0b10001, 0b10001, 0b11111, 0b10001, 0b10001], // H
    [0b01110, 0b00100, 0b00100, 0b00100, 0b01110], // I
    [0b00111, 0b00010, 0b00010, 0b10010, 0b01100], // J
    [0b10001, 0b10010, 0b11100, 0b10010, 0b10001], // K
    [0b10000, 0b10000, 0b10000, 0b10000, 0b11111], // L
    [0b10001, 0b11011, 0b10101, 0b10001, 0b10001], // M
    [0b10001, 0b11001, 0b10101, 0b10011, 0b10001], // N
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // O
    [0b11110, 0b10001, 0b11110, 0b10000, 0b10000], // P
    [0b01110, 0b10001, 0b10101, 0b10010, 0b01101], // Q
    [0b11110, 0b10001, 0b11110, 0b10010, 0b10001], // R
    [0b01111, 0b10000, 0b01110, 0b00001, 0b11110], // S
    [0b11111, 0b00100, 0b00100, 0b00100, 0b00100], // T
    [0b10001, 0b10001, 0b10001, 0b10001, 0b01110], // U
    [0b10001, 0b10001, 0b10001, 0b01010, 0b00100], // V
    [0b10001, 0b10001, 0b10101, 0b11011, 0b10001], // W
    [0b10001, 0b01010, 0b00100, 0b01010, 0b10001], // X
    [0b10001, 0b01010, 0b00100, 0b00100, 0b00100], // Y
    [0b11111, 0b00010, 0b00100, 0b01000, 0b11111], // Z
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grounding::coords::{CoordinateSpace, PerceivedFrame};
    use crate::grounding::parser::parse_response;
    use crate::perception::types::solid_png;

    #[test]
    fn marks_actions_and_keeps_size() {
        let shot = EncodedImage::from_bytes(solid_png(200, 100)).unwrap();
        let frame = PerceivedFrame { width: 200, height: 100, space: CoordinateSpace::ResizedPixels };
        let parsed = parse_response(
            "Action: click(point='<point>100 50</point>')\n\
             drag(start_point='<point>10 10</point>', end_point='<point>190 90</point>')\n\
             type(content='hi')",
            &frame,
        );
        assert_eq!(parsed.actions.len(), 3);

        let out = annotate_actions(&shot, &parsed.actions).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (200, 100));
        // Click crosshair centre is painted red-ish.
        let p = img.get_pixel(100, 50);
        assert!(p[0] > p[2]);
    }
}
