//! PNG rendering of a sampled curve.
//!
//! The canvas is plain white with black axes (where they fall inside the
//! view) and the curve in green, drawn as line segments between samples.

use std::path::Path;

use anyhow::{Context, Result, bail};
use image::{Rgb, RgbImage};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([0, 0, 0]);
const CURVE: Rgb<u8> = Rgb([0, 128, 0]);

/// World-space rectangle mapped onto the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Viewport {
    /// Bounding box of `points`, widened to include `y = 0` and padded by 10%.
    pub fn fit(points: &[(f64, f64)]) -> Option<Self> {
        let mut finite = points.iter().filter(|(x, y)| x.is_finite() && y.is_finite());
        let &(x0, y0) = finite.next()?;
        let mut view = Self {
            x_min: x0,
            x_max: x0,
            y_min: y0.min(0.0),
            y_max: y0.max(0.0),
        };
        for &(x, y) in finite {
            view.x_min = view.x_min.min(x);
            view.x_max = view.x_max.max(x);
            view.y_min = view.y_min.min(y);
            view.y_max = view.y_max.max(y);
        }
        let pad = |lo: f64, hi: f64| {
            let span = hi - lo;
            if span > 0.0 { span * 0.1 } else { 1.0 }
        };
        let (px, py) = (pad(view.x_min, view.x_max), pad(view.y_min, view.y_max));
        view.x_min -= px;
        view.x_max += px;
        view.y_min -= py;
        view.y_max += py;
        Some(view)
    }

    /// Canvas pixel for a world point; y grows downwards on the canvas.
    pub fn to_pixel(&self, x: f64, y: f64) -> (i64, i64) {
        let px = (x - self.x_min) / (self.x_max - self.x_min) * f64::from(WIDTH - 1);
        let py = (self.y_max - y) / (self.y_max - self.y_min) * f64::from(HEIGHT - 1);
        (px.round() as i64, py.round() as i64)
    }
}

/// Draw `points` and return the image.
pub fn render(points: &[(f64, f64)]) -> Result<RgbImage> {
    let Some(view) = Viewport::fit(points) else {
        bail!("nothing to plot: the curve has no points");
    };
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);

    if view.y_min <= 0.0 && view.y_max >= 0.0 {
        let (x0, y) = view.to_pixel(view.x_min, 0.0);
        let (x1, _) = view.to_pixel(view.x_max, 0.0);
        draw_line(&mut img, (x0, y), (x1, y), AXIS);
    }
    if view.x_min <= 0.0 && view.x_max >= 0.0 {
        let (x, y0) = view.to_pixel(0.0, view.y_max);
        let (_, y1) = view.to_pixel(0.0, view.y_min);
        draw_line(&mut img, (x, y0), (x, y1), AXIS);
    }

    let pixels: Vec<(i64, i64)> = points
        .iter()
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|&(x, y)| view.to_pixel(x, y))
        .collect();
    match pixels.as_slice() {
        [single] => put(&mut img, *single, CURVE),
        _ => {
            for pair in pixels.windows(2) {
                draw_line(&mut img, pair[0], pair[1], CURVE);
            }
        }
    }
    Ok(img)
}

/// Draw `points` and write them to `path` as PNG, creating parent directories.
pub fn render_png(points: &[(f64, f64)], path: &Path) -> Result<()> {
    let img = render(points)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    img.save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write plot to {}", path.display()))?;
    tracing::debug!(path = %path.display(), points = points.len(), "Plot written");
    Ok(())
}

fn put(img: &mut RgbImage, (x, y): (i64, i64), colour: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < i64::from(img.width()) && y < i64::from(img.height()) {
        img.put_pixel(x as u32, y as u32, colour);
    }
}

/// Bresenham line, clipped per pixel.
fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), colour: Rgb<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put(img, (x, y), colour);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}
