//! Palette-shrinking stage.
//!
//! Scanned pages are mostly background with a handful of ink colors. This
//! stage estimates the background color from a bit-quantized histogram,
//! separates foreground pixels by value/saturation distance from the
//! background, fits a small palette to the foreground with k-means, and
//! remaps every pixel to its nearest palette entry. The result recolors a
//! noisy scan into a clean, small-palette image that downstream
//! quantization compresses well.

use crate::{TransformError, TransformStage};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Cursor;
use tracing::debug;

const STAGE: &str = "shrink";

/// Palette-shrink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShrinkConfig {
    pub enable: bool,
    /// Minimum brightness distance from the background for a pixel to
    /// count as foreground (0.0-1.0)
    pub value_threshold: f32,
    /// Minimum saturation distance from the background for a pixel to
    /// count as foreground (0.0-1.0)
    pub sat_threshold: f32,
    /// Total palette size including the background entry
    pub num_colors: usize,
    /// Sample every n-th pixel when estimating background and palette
    pub sample_stride: usize,
    /// k-means refinement iterations
    pub kmeans_iter: usize,
    /// Stretch the palette to the full value range
    pub saturate: bool,
    /// Force the background entry to pure white
    pub white_bg: bool,
}

impl Default for ShrinkConfig {
    fn default() -> Self {
        Self {
            enable: true,
            value_threshold: 0.4,
            sat_threshold: 0.2,
            num_colors: 8,
            sample_stride: 20,
            kmeans_iter: 5,
            saturate: true,
            white_bg: false,
        }
    }
}

/// The palette-shrinking stage
pub struct PaletteShrink {
    config: ShrinkConfig,
}

impl PaletteShrink {
    #[must_use]
    pub fn new(config: ShrinkConfig) -> Self {
        Self { config }
    }
}

impl TransformStage for PaletteShrink {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn enabled(&self) -> bool {
        self.config.enable
    }

    fn apply(&self, input: Vec<u8>) -> Result<Vec<u8>, TransformError> {
        let img = image::load_from_memory(&input)
            .map_err(|e| TransformError::new(STAGE, format!("image decode failed: {e}")))?
            .to_rgb8();
        if img.width() == 0 || img.height() == 0 {
            return Err(TransformError::new(STAGE, "empty image"));
        }

        let samples = sample_pixels(&img, self.config.sample_stride);
        let background = background_color(&samples);
        let palette = self.fit_palette(&samples, background);
        debug!(colors = palette.len(), "palette fitted");

        // label pixels against the fitted palette, then recolor the palette;
        // adjustments (saturate, white background) recolor labeled regions
        // rather than shifting which palette entry a pixel maps to
        let indices: Vec<usize> = img
            .pixels()
            .map(|px| nearest(&palette, to_f32(px.0)))
            .collect();
        let palette = self.adjust_palette(palette);

        let mut output = RgbImage::new(img.width(), img.height());
        for (index, dst) in indices.iter().zip(output.pixels_mut()) {
            *dst = image::Rgb(palette[*index]);
        }

        let mut bytes = Vec::new();
        output
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| TransformError::new(STAGE, format!("PNG encode failed: {e}")))?;
        Ok(bytes)
    }
}

impl PaletteShrink {
    /// Background entry first, then k-means centers over the foreground
    fn fit_palette(&self, samples: &[[u8; 3]], background: [u8; 3]) -> Vec<[u8; 3]> {
        let foreground: Vec<[f32; 3]> = samples
            .iter()
            .filter(|px| {
                is_foreground(
                    **px,
                    background,
                    self.config.value_threshold,
                    self.config.sat_threshold,
                )
            })
            .map(|px| to_f32(*px))
            .collect();

        let mut palette = vec![background];
        let clusters = kmeans(
            &foreground,
            self.config.num_colors.saturating_sub(1),
            self.config.kmeans_iter,
        );
        palette.extend(clusters.iter().map(|c| to_u8(*c)));
        palette
    }

    fn adjust_palette(&self, mut palette: Vec<[u8; 3]>) -> Vec<[u8; 3]> {
        if self.config.saturate && palette.len() > 1 {
            saturate_palette(&mut palette);
        }
        if self.config.white_bg {
            palette[0] = [255, 255, 255];
        }
        palette
    }
}

fn sample_pixels(img: &RgbImage, stride: usize) -> Vec<[u8; 3]> {
    img.pixels().step_by(stride.max(1)).map(|px| px.0).collect()
}

/// Most frequent color after dropping the two low bits of each channel
fn background_color(samples: &[[u8; 3]]) -> [u8; 3] {
    const SHIFT: u8 = 2;
    let mut counts: HashMap<[u8; 3], usize> = HashMap::new();
    for px in samples {
        *counts.entry(px.map(|c| c >> SHIFT)).or_insert(0) += 1;
    }
    let mode = counts
        .iter()
        .max_by_key(|(_, &count)| count)
        .map(|(&bin, _)| bin)
        .unwrap_or([255 >> SHIFT; 3]);
    // expand back to the bin center
    mode.map(|c| (c << SHIFT) | (1 << (SHIFT - 1)))
}

fn value(px: [u8; 3]) -> f32 {
    px.iter().copied().max().unwrap_or(0) as f32 / 255.0
}

fn saturation(px: [u8; 3]) -> f32 {
    let max = px.iter().copied().max().unwrap_or(0);
    let min = px.iter().copied().min().unwrap_or(0);
    if max == 0 {
        0.0
    } else {
        (max - min) as f32 / max as f32
    }
}

fn is_foreground(px: [u8; 3], background: [u8; 3], value_threshold: f32, sat_threshold: f32) -> bool {
    (value(px) - value(background)).abs() > value_threshold
        || (saturation(px) - saturation(background)).abs() > sat_threshold
}

fn to_f32(px: [u8; 3]) -> [f32; 3] {
    px.map(|c| c as f32)
}

fn to_u8(px: [f32; 3]) -> [u8; 3] {
    px.map(|c| c.round().clamp(0.0, 255.0) as u8)
}

fn squared_distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

fn nearest(palette: &[[u8; 3]], point: [f32; 3]) -> usize {
    palette
        .iter()
        .enumerate()
        .map(|(i, entry)| (i, squared_distance(to_f32(*entry), point)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Plain Lloyd iterations with deterministic farthest-point seeding, so a
/// given input always produces the same palette
fn kmeans(points: &[[f32; 3]], k: usize, iterations: usize) -> Vec<[f32; 3]> {
    if points.is_empty() || k == 0 {
        return Vec::new();
    }
    let k = k.min(points.len());
    let mut centroids = seed_centroids(points, k);

    for _ in 0..iterations {
        let mut sums = vec![[0.0f32; 3]; k];
        let mut counts = vec![0usize; k];
        for point in points {
            let cluster = nearest_centroid(&centroids, *point);
            for (sum, component) in sums[cluster].iter_mut().zip(point.iter()) {
                *sum += *component;
            }
            counts[cluster] += 1;
        }
        for (index, count) in counts.iter().enumerate() {
            if *count > 0 {
                centroids[index] = sums[index].map(|s| s / *count as f32);
            }
        }
    }
    centroids
}

fn nearest_centroid(centroids: &[[f32; 3]], point: [f32; 3]) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(*c, point)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Farthest-point traversal: start from the first sample, then repeatedly
/// take the point with the largest distance to any chosen centroid
fn seed_centroids(points: &[[f32; 3]], k: usize) -> Vec<[f32; 3]> {
    let mut centroids = vec![points[0]];
    while centroids.len() < k {
        let farthest = points
            .iter()
            .map(|point| {
                let distance = centroids
                    .iter()
                    .map(|c| squared_distance(*c, *point))
                    .fold(f32::INFINITY, f32::min);
                (point, distance)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .map(|(point, _)| *point)
            .unwrap_or(points[0]);
        centroids.push(farthest);
    }
    centroids
}

/// Stretch all palette channels to span the full 0-255 range
fn saturate_palette(palette: &mut [[u8; 3]]) {
    let min = palette
        .iter()
        .flat_map(|px| px.iter())
        .copied()
        .min()
        .unwrap_or(0) as f32;
    let max = palette
        .iter()
        .flat_map(|px| px.iter())
        .copied()
        .max()
        .unwrap_or(255) as f32;
    if max <= min {
        return;
    }
    for entry in palette.iter_mut() {
        *entry = entry.map(|c| (255.0 * (c as f32 - min) / (max - min)).round() as u8);
    }
}
