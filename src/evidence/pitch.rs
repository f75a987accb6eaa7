//! Schematic pitch drawing for event-based evidence.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::{
    drawing::{
        draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut,
        draw_line_segment_mut,
    },
    rect::Rect,
};

use crate::models::EventRecord;

pub const PITCH_LENGTH: f64 = 105.0;
pub const PITCH_WIDTH: f64 = 68.0;
pub const SCALE: f64 = 8.0;
pub const FRAME_WIDTH: u32 = (PITCH_LENGTH * SCALE) as u32;
pub const FRAME_HEIGHT: u32 = (PITCH_WIDTH * SCALE) as u32;

const GRASS: Rgb<u8> = Rgb([0, 85, 0]);
const LINE: Rgb<u8> = Rgb([255, 255, 255]);

pub const SHOT: Rgb<u8> = Rgb([255, 0, 0]);
pub const PASS: Rgb<u8> = Rgb([255, 200, 0]);
pub const CARRY: Rgb<u8> = Rgb([0, 140, 255]);
pub const LOST_BALL: Rgb<u8> = Rgb([180, 180, 180]);
pub const OTHER: Rgb<u8> = Rgb([0, 255, 255]);

pub fn to_px(x: Option<f64>, y: Option<f64>) -> Option<(f32, f32)> {
    let (x, y) = (x?, y?);
    Some((
        (x * FRAME_WIDTH as f64 / PITCH_LENGTH).floor() as f32,
        (y * FRAME_HEIGHT as f64 / PITCH_WIDTH).floor() as f32,
    ))
}

pub fn color_for(event: &EventRecord) -> Rgb<u8> {
    match event.type_lower().as_str() {
        "shot" => SHOT,
        "pass" => PASS,
        "carry" => CARRY,
        t if t.contains("turnover") || event.is_unsuccessful() => LOST_BALL,
        _ => OTHER,
    }
}

/// Line with a given pixel thickness, drawn as parallel offsets.
fn thick_line(img: &mut RgbImage, start: (f32, f32), end: (f32, f32), width: i32, color: Rgb<u8>) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let len = (dx * dx + dy * dy).sqrt().max(f32::EPSILON);
    let (nx, ny) = (-dy / len, dx / len);
    for k in 0..width {
        let off = k as f32 - (width - 1) as f32 / 2.0;
        draw_line_segment_mut(
            img,
            (start.0 + nx * off, start.1 + ny * off),
            (end.0 + nx * off, end.1 + ny * off),
            color,
        );
    }
}

pub fn draw_arrow(img: &mut RgbImage, start: (f32, f32), end: (f32, f32), width: i32, color: Rgb<u8>) {
    thick_line(img, start, end, width, color);

    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1.0 {
        return;
    }
    let tip = (len * 0.2).max(6.0);
    let (ux, uy) = (dx / len, dy / len);
    for angle in [0.5f32, -0.5f32] {
        let (s, c) = angle.sin_cos();
        let bx = -(ux * c - uy * s) * tip;
        let by = -(ux * s + uy * c) * tip;
        thick_line(img, end, (end.0 + bx, end.1 + by), width, color);
    }
}

fn hollow_rect(img: &mut RgbImage, x: i32, y: i32, w: u32, h: u32) {
    for inset in 0..2 {
        if w > 2 * inset as u32 && h > 2 * inset as u32 {
            draw_hollow_rect_mut(
                img,
                Rect::at(x + inset, y + inset).of_size(w - 2 * inset as u32, h - 2 * inset as u32),
                LINE,
            );
        }
    }
}

pub fn draw_pitch() -> RgbImage {
    let mut img = RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, GRASS);
    hollow_rect(&mut img, 0, 0, FRAME_WIDTH, FRAME_HEIGHT);

    let mid_x = (FRAME_WIDTH / 2) as f32;
    thick_line(&mut img, (mid_x, 0.0), (mid_x, FRAME_HEIGHT as f32), 2, LINE);
    let center = ((FRAME_WIDTH / 2) as i32, (FRAME_HEIGHT / 2) as i32);
    draw_hollow_circle_mut(&mut img, center, 40, LINE);
    draw_hollow_circle_mut(&mut img, center, 41, LINE);

    let box_w = (16.5 * SCALE) as u32;
    let box_h = (40.3 * SCALE) as u32;
    let box_y = ((FRAME_HEIGHT - box_h) / 2) as i32;
    hollow_rect(&mut img, 0, box_y, box_w, box_h);
    hollow_rect(&mut img, (FRAME_WIDTH - box_w) as i32, box_y, box_w, box_h);
    img
}

/// Arrow from start to end when both are known, otherwise a marker at whichever is.
pub fn draw_event(img: &mut RgbImage, event: &EventRecord) {
    let color = color_for(event);
    let start = to_px(event.start_x, event.start_y);
    let end = to_px(event.end_x, event.end_y);
    match (start, end) {
        (Some(s), Some(e)) => draw_arrow(img, s, e, 3, color),
        (Some(p), None) | (None, Some(p)) => {
            draw_filled_circle_mut(img, (p.0 as i32, p.1 as i32), 6, color)
        }
        (None, None) => {}
    }
}

/// Pitch with every event at or before `until` drawn, in time order.
pub fn render_events(events: &[EventRecord], from: f64, until: f64) -> RgbImage {
    let mut img = draw_pitch();
    for event in events
        .iter()
        .filter(|e| e.time_seconds >= from && e.time_seconds <= until)
    {
        draw_event(&mut img, event);
    }
    img
}

/// Video frame with a horizontal arrow from the center, length proportional to `bias`.
pub fn bias_overlay(frame: &GrayImage, bias: f64) -> RgbImage {
    let mut img = image::DynamicImage::ImageLuma8(frame.clone()).to_rgb8();
    let (w, h) = (img.width() as f32, img.height() as f32);
    let center = (w / 2.0, h / 2.0);
    let reach = (w / 3.0) * bias.clamp(-1.0, 1.0) as f32;
    let color = if bias >= 0.0 { SHOT } else { CARRY };
    draw_arrow(&mut img, center, (center.0 + reach, center.1), 3, color);
    img
}
