// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

// Image-processing primitives used by the detectors. These are thin wrappers
// around `image`/`imageproc` that pin down the exact conventions (kernel
// extents, threshold direction, contour selection) the detectors rely on.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::euclidean_squared_distance_transform;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode};
use imageproc::point::Point;
use imageproc::rect::Rect;
use imageproc::region_labelling::{Connectivity, connected_components};
use imageproc::stats::histogram;

// Single-channel 8-bit intensity of an arbitrary frame.
pub fn to_intensity(frame: &DynamicImage) -> GrayImage {
    frame.to_luma8()
}

// The sigma implied by a Gaussian kernel of `kernel_size` extent when no
// explicit sigma is given.
pub fn sigma_for_kernel_size(kernel_size: u32) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

// Gaussian smoothing with a kernel of `kernel_size` extent. A size of 1 is the
// identity.
pub fn gaussian_smooth(image: &GrayImage, kernel_size: u32) -> GrayImage {
    if kernel_size <= 1 {
        return image.clone();
    }
    gaussian_blur_f32(image, sigma_for_kernel_size(kernel_size))
}

pub fn max_intensity(image: &GrayImage) -> u8 {
    let mut peak_value = 0_u8;
    for pixel in image.pixels() {
        if pixel[0] > peak_value {
            peak_value = pixel[0];
        }
    }
    peak_value
}

// Otsu's level: pixels above it form the foreground class.
pub fn otsu_threshold(image: &GrayImage) -> u8 {
    otsu_level(image)
}

// The `percentile`-th percentile (0..=100) of the pixel values, linearly
// interpolated between the two nearest ranks.
pub fn percentile_level(image: &GrayImage, percentile: f64) -> f64 {
    let histo = histogram(image).channels[0];
    let count: u64 = histo.iter().map(|c| *c as u64).sum();
    if count == 0 {
        return 0.0;
    }
    let rank = percentile / 100.0 * (count - 1) as f64;
    let lower_rank = rank.floor() as u64;
    let upper_rank = rank.ceil() as u64;
    let lower = value_at_rank(&histo, lower_rank) as f64;
    let upper = value_at_rank(&histo, upper_rank) as f64;
    lower + (upper - lower) * (rank - lower_rank as f64)
}

// Value of the `rank`-th (zero based) smallest pixel, given the histogram.
fn value_at_rank(histo: &[u32; 256], rank: u64) -> u8 {
    let mut cumulative = 0_u64;
    for (value, count) in histo.iter().enumerate() {
        cumulative += *count as u64;
        if cumulative > rank {
            return value as u8;
        }
    }
    255
}

// Binary mask: 255 where the pixel is strictly above `level`, 0 elsewhere.
pub fn binarize(image: &GrayImage, level: f64) -> GrayImage {
    let mut mask = image.clone();
    for pixel in mask.pixels_mut() {
        pixel[0] = if pixel[0] as f64 > level { 255 } else { 0 };
    }
    mask
}

// Elliptical structuring element of `kernel_size` extent, centered.
fn ellipse_mask(kernel_size: u32) -> Mask {
    let r = kernel_size / 2;
    let mut kernel = GrayImage::new(2 * r + 1, 2 * r + 1);
    for (dx, dy) in ellipse_offsets(kernel_size) {
        kernel.put_pixel((dx + r as i32) as u32, (dy + r as i32) as u32, Luma([255]));
    }
    Mask::from_image(&kernel, r as u8, r as u8)
}

// `iterations` erosions followed by as many dilations, with an elliptical
// kernel; removes foreground specks the kernel does not fit into.
pub fn open_mask(mask: &GrayImage, kernel_size: u32, iterations: u32) -> GrayImage {
    if kernel_size <= 1 || iterations == 0 {
        return mask.clone();
    }
    let kernel = ellipse_mask(kernel_size);
    let mut result = mask.clone();
    for _ in 0..iterations {
        result = grayscale_erode(&result, &kernel);
    }
    for _ in 0..iterations {
        result = grayscale_dilate(&result, &kernel);
    }
    result
}

// `iterations` dilations followed by as many erosions; fills foreground gaps
// smaller than the kernel.
pub fn close_mask(mask: &GrayImage, kernel_size: u32, iterations: u32) -> GrayImage {
    if kernel_size <= 1 || iterations == 0 {
        return mask.clone();
    }
    let kernel = ellipse_mask(kernel_size);
    let mut result = mask.clone();
    for _ in 0..iterations {
        result = grayscale_dilate(&result, &kernel);
    }
    for _ in 0..iterations {
        result = grayscale_erode(&result, &kernel);
    }
    result
}

// Euclidean distance from every foreground pixel of `mask` to the nearest
// background pixel; background pixels map to 0. Row-major, one value per
// pixel.
pub fn foreground_distance(mask: &GrayImage) -> Vec<f64> {
    // The transform measures distance to the nearest non-zero pixel, so the
    // background has to become the non-zero set.
    let mut background = mask.clone();
    for pixel in background.pixels_mut() {
        pixel[0] = if pixel[0] == 0 { 255 } else { 0 };
    }
    let squared = euclidean_squared_distance_transform(&background);
    squared.pixels().map(|p| p[0].sqrt()).collect()
}

// (dx, dy) offsets of an elliptical structuring element of `kernel_size`
// extent. Each row spans round(r * sqrt(1 - dy^2 / r^2)) columns either side of
// the center.
pub fn ellipse_offsets(kernel_size: u32) -> Vec<(i32, i32)> {
    let r = (kernel_size / 2) as i32;
    if r == 0 {
        return vec![(0, 0)];
    }
    let inv_r2 = 1.0 / (r * r) as f64;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        let dx = (r as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as i32;
        for x in -dx..=dx {
            offsets.push((x, dy));
        }
    }
    offsets
}

// Outer borders of the top-level foreground regions of `mask`, in discovery
// (raster) order. Holes, and regions nested inside holes, are ignored.
pub fn outer_contours(mask: &GrayImage) -> Vec<Contour<i32>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .collect()
}

// Number of pixels enclosed by a traced border, the border itself included.
// Border points are pixel centers one step apart, so by Pick's theorem this is
// the polygon's shoelace area plus half its boundary steps plus one. A filled
// n x n square has area n^2, a one pixel wide line of n pixels has area n.
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    let n = points.len();
    if n == 0 {
        return 0.0;
    }
    let mut twice_area = 0_i64;
    let mut boundary_steps = 0_i64;
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
        boundary_steps += gcd((q.x - p.x).unsigned_abs() as i64,
                              (q.y - p.y).unsigned_abs() as i64);
    }
    (twice_area.abs() + boundary_steps) as f64 / 2.0 + 1.0
}

// Lattice points on a segment, endpoints excluded, is gcd(dx, dy) - 1.
fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

// Smallest upright rectangle containing all `points`. `points` must not be
// empty.
pub fn bounding_rect(points: &[Point<i32>]) -> Rect {
    let mut min_x = i32::MAX;
    let mut min_y = i32::MAX;
    let mut max_x = i32::MIN;
    let mut max_y = i32::MIN;
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Rect::at(min_x, min_y).of_size((max_x - min_x + 1) as u32,
                                   (max_y - min_y + 1) as u32)
}

// Centroid of each 8-connected foreground component of `mask`, ordered by
// component label.
pub fn component_centroids(mask: &GrayImage) -> Vec<(f64, f64)> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0_u8]));
    // Per label: sum of x, sum of y, pixel count.
    let mut sums: Vec<(u64, u64, u64)> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        if label > sums.len() {
            sums.resize(label, (0, 0, 0));
        }
        let entry = &mut sums[label - 1];
        entry.0 += x as u64;
        entry.1 += y as u64;
        entry.2 += 1;
    }
    sums.iter()
        .filter(|(_, _, count)| *count > 0)
        .map(|(sx, sy, count)| (*sx as f64 / *count as f64,
                                *sy as f64 / *count as f64))
        .collect()
}

// mod tests.
