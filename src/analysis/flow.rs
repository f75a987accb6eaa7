//! Sparse-grid Lucas–Kanade optical flow on grayscale frames.

use image::GrayImage;

const GRID_STEP: u32 = 8;
const WINDOW_RADIUS: i32 = 7;
const ITERATIONS: usize = 4;
const MIN_EIGEN: f32 = 1.0;
const CONVERGED: f32 = 0.01;

/// Per-pair flow aggregate after removing the median (camera pan) on each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowSummary {
    pub sum_fx: f64,
    pub sum_abs_fx: f64,
    /// Mean residual magnitude, px/frame.
    pub intensity: f64,
    pub points: usize,
}

fn pixel(img: &GrayImage, x: i32, y: i32) -> f32 {
    let x = x.clamp(0, img.width() as i32 - 1) as u32;
    let y = y.clamp(0, img.height() as i32 - 1) as u32;
    img.get_pixel(x, y)[0] as f32
}

fn bilinear(img: &GrayImage, x: f32, y: f32) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let (ax, ay) = (x - x0, y - y0);
    let (xi, yi) = (x0 as i32, y0 as i32);
    let top = pixel(img, xi, yi) * (1.0 - ax) + pixel(img, xi + 1, yi) * ax;
    let bottom = pixel(img, xi, yi + 1) * (1.0 - ax) + pixel(img, xi + 1, yi + 1) * ax;
    top * (1.0 - ay) + bottom * ay
}

/// Flow vectors `(u, v)` at grid points with enough texture to be tracked.
pub fn grid_lucas_kanade(prev: &GrayImage, next: &GrayImage) -> Vec<(f32, f32)> {
    if prev.dimensions() != next.dimensions() {
        return Vec::new();
    }
    let (w, h) = (prev.width() as i32, prev.height() as i32);
    let margin = WINDOW_RADIUS + 1;
    if w <= 2 * margin || h <= 2 * margin {
        return Vec::new();
    }

    let area = ((2 * WINDOW_RADIUS + 1) * (2 * WINDOW_RADIUS + 1)) as f32;
    let mut vectors = Vec::new();

    for cy in (margin..h - margin).step_by(GRID_STEP as usize) {
        for cx in (margin..w - margin).step_by(GRID_STEP as usize) {
            let mut grads = Vec::with_capacity(area as usize);
            let (mut a, mut b, mut d) = (0f32, 0f32, 0f32);
            for dy in -WINDOW_RADIUS..=WINDOW_RADIUS {
                for dx in -WINDOW_RADIUS..=WINDOW_RADIUS {
                    let (x, y) = (cx + dx, cy + dy);
                    let gx = (pixel(prev, x + 1, y) - pixel(prev, x - 1, y)) * 0.5;
                    let gy = (pixel(prev, x, y + 1) - pixel(prev, x, y - 1)) * 0.5;
                    a += gx * gx;
                    b += gx * gy;
                    d += gy * gy;
                    grads.push((x, y, gx, gy, pixel(prev, x, y)));
                }
            }

            let det = a * d - b * b;
            let trace = a + d;
            let min_eigen = (trace - (trace * trace - 4.0 * det).max(0.0).sqrt()) * 0.5;
            if det.abs() < f32::EPSILON || min_eigen / area < MIN_EIGEN {
                continue;
            }

            let (mut u, mut v) = (0f32, 0f32);
            let mut diverged = false;
            for _ in 0..ITERATIONS {
                let (mut bx, mut by) = (0f32, 0f32);
                for &(x, y, gx, gy, i0) in &grads {
                    let it = bilinear(next, x as f32 + u, y as f32 + v) - i0;
                    bx += gx * it;
                    by += gy * it;
                }
                let du = (-d * bx + b * by) / det;
                let dv = (b * bx - a * by) / det;
                u += du;
                v += dv;
                if u.abs() > WINDOW_RADIUS as f32 || v.abs() > WINDOW_RADIUS as f32 {
                    diverged = true;
                    break;
                }
                if du.abs() < CONVERGED && dv.abs() < CONVERGED {
                    break;
                }
            }
            if !diverged && u.is_finite() && v.is_finite() {
                vectors.push((u, v));
            }
        }
    }
    vectors
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) * 0.5
    } else {
        values[mid]
    }
}

/// Removes the per-axis median and aggregates horizontal bias and magnitude.
/// `frame_gap` rescales displacement between non-adjacent frames to px/frame.
pub fn summarize(vectors: &[(f32, f32)], frame_gap: u64) -> Option<FlowSummary> {
    if vectors.is_empty() {
        return None;
    }
    let scale = 1.0 / frame_gap.max(1) as f32;
    let mut xs: Vec<f32> = vectors.iter().map(|(u, _)| u * scale).collect();
    let mut ys: Vec<f32> = vectors.iter().map(|(_, v)| v * scale).collect();
    let (mx, my) = (median(&mut xs), median(&mut ys));

    let mut summary = FlowSummary {
        sum_fx: 0.0,
        sum_abs_fx: 0.0,
        intensity: 0.0,
        points: vectors.len(),
    };
    for (u, v) in vectors {
        let fx = (u * scale - mx) as f64;
        let fy = (v * scale - my) as f64;
        summary.sum_fx += fx;
        summary.sum_abs_fx += fx.abs();
        summary.intensity += (fx * fx + fy * fy).sqrt();
    }
    summary.intensity /= vectors.len() as f64;
    Some(summary)
}

#[cfg(test)]
pub(crate) fn texture(width: u32, height: u32, shift_x: f32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let xf = x as f32 - shift_x;
        let value = 128.0 + 60.0 * (xf * 0.3).sin() * (y as f32 * 0.25).cos();
        image::Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}
