// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use canonical_error::{CanonicalError, failed_precondition_error};
use image::{DynamicImage, GrayImage};
use log::debug;

use crate::detection::DetectionResult;
use crate::image_ops::{binarize, bounding_rect, close_mask, component_centroids,
                       contour_area, ellipse_offsets, foreground_distance,
                       gaussian_smooth, max_intensity, open_mask, otsu_threshold,
                       outer_contours, percentile_level, to_intensity};
use crate::options::{FixedOptions, OtsuOptions, PeaksOptions, PercentileOptions};

/// A blob detection algorithm together with its options. Each call to
/// `detect()` is a pure function of the frame and the options.
#[derive(Clone, Debug, PartialEq)]
pub enum Detector {
    // Global threshold chosen by Otsu's method.
    Otsu(OtsuOptions),
    // Threshold at a percentile of the smoothed intensities.
    Percentile(PercentileOptions),
    // Threshold at a fraction of the smoothed frame's max.
    Fixed(FixedOptions),
    // Local maxima of the distance transform of a margin-of-max mask.
    Peaks(PeaksOptions),
}

// Parameters shared by the contour-based variants once the threshold rule has
// been resolved.
struct ContourParams {
    blur_size: u32,
    clean_size: u32,
    // Open and close are each applied this many times.
    clean_iterations: u32,
    min_area: f64,
    max_area: f64,
    label_precision: usize,
}

enum LevelRule {
    Otsu,
    Percentile(f64),
    MarginOfMax(f64),
}

impl Detector {
    pub fn name(&self) -> &'static str {
        match self {
            Detector::Otsu(_) => "Otsu",
            Detector::Percentile(_) => "Percentile",
            Detector::Fixed(_) => "Fixed",
            Detector::Peaks(_) => "Peaks",
        }
    }

    /// Checks the options; returns an InvalidArgument error describing the
    /// first out-of-range value.
    pub fn validate(&self) -> Result<(), CanonicalError> {
        match self {
            Detector::Otsu(options) => options.validate(),
            Detector::Percentile(options) => options.validate(),
            Detector::Fixed(options) => options.validate(),
            Detector::Peaks(options) => options.validate(),
        }
    }

    /// Detects blobs in a frame of any color layout.
    pub fn detect(&self, frame: &DynamicImage) -> Result<DetectionResult, CanonicalError> {
        // Validate before paying for the color conversion.
        self.validate()?;
        self.detect_intensity(&to_intensity(frame))
    }

    /// Detects blobs in a single-channel intensity frame.
    pub fn detect_intensity(&self, gray: &GrayImage)
                            -> Result<DetectionResult, CanonicalError> {
        self.validate()?;
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Err(failed_precondition_error(
                format!("Frame has zero dimension {}x{}", width, height).as_str()));
        }
        let result = match self {
            Detector::Otsu(o) => detect_contours(
                gray, LevelRule::Otsu,
                &ContourParams{blur_size: o.blur_size, clean_size: o.clean_size,
                               clean_iterations: 1, min_area: o.min_area,
                               max_area: o.max_area, label_precision: 2}),
            Detector::Percentile(o) => detect_contours(
                gray, LevelRule::Percentile(o.percentile),
                &ContourParams{blur_size: o.blur_size, clean_size: o.clean_size,
                               clean_iterations: 1, min_area: o.min_area,
                               max_area: o.max_area, label_precision: 1}),
            Detector::Fixed(o) => detect_contours(
                gray, LevelRule::MarginOfMax(o.margin),
                &ContourParams{blur_size: o.blur_size, clean_size: o.clean_size,
                               clean_iterations: 2, min_area: o.min_area,
                               max_area: o.max_area, label_precision: 1}),
            Detector::Peaks(o) => detect_peaks(gray, o),
        };
        debug!("{} detector found {} blobs in {}x{} frame",
               self.name(), result.len(), width, height);
        Ok(result)
    }
}

// Cut level at `margin` times the frame's max; integer truncated.
fn margin_of_max_level(smoothed: &GrayImage, margin: f64) -> f64 {
    (max_intensity(smoothed) as f64 * margin).floor()
}

fn detect_contours(gray: &GrayImage, rule: LevelRule, params: &ContourParams)
                   -> DetectionResult {
    let smoothed = gaussian_smooth(gray, params.blur_size);
    let level = match rule {
        LevelRule::Otsu => otsu_threshold(&smoothed) as f64,
        LevelRule::Percentile(percentile) => percentile_level(&smoothed, percentile),
        LevelRule::MarginOfMax(margin) => margin_of_max_level(&smoothed, margin),
    };
    let mask = binarize(&smoothed, level);
    let mask = open_mask(&mask, params.clean_size, params.clean_iterations);
    let mask = close_mask(&mask, params.clean_size, params.clean_iterations);

    let contours = outer_contours(&mask);
    let mut result = DetectionResult::new(params.label_precision);
    for contour in &contours {
        let area = contour_area(&contour.points);
        if area < params.min_area || area > params.max_area {
            continue;
        }
        let bbox = bounding_rect(&contour.points);
        // Bounding box center, not the contour centroid.
        let center = (bbox.left() + bbox.width() as i32 / 2,
                      bbox.top() + bbox.height() as i32 / 2);
        result.push_blob(center, bbox, area);
    }
    debug!("level {:.1}: {} contours, {} within area band [{}, {}]",
           level, contours.len(), result.len(), params.min_area, params.max_area);
    result
}

fn detect_peaks(gray: &GrayImage, options: &PeaksOptions) -> DetectionResult {
    let smoothed = gaussian_smooth(gray, options.blur_size);
    let level = margin_of_max_level(&smoothed, options.margin);
    let mask = open_mask(&binarize(&smoothed, level), options.clean_size, 1);

    let (width, height) = mask.dimensions();
    let distance = foreground_distance(&mask);
    let offsets = ellipse_offsets(options.peak_size);

    // A pixel is a peak when no pixel of its neighborhood is farther from the
    // background than it is, i.e. it equals its own grayscale dilation.
    let mut peaks = GrayImage::new(width, height);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let value = distance[(y as u32 * width + x as u32) as usize];
            if value <= 0.0 {
                continue;
            }
            let dominated = offsets.iter().any(|(dx, dy)| {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                    return false;
                }
                distance[(ny as u32 * width + nx as u32) as usize] > value
            });
            if !dominated {
                peaks.put_pixel(x as u32, y as u32, image::Luma([255]));
            }
        }
    }

    let centroids = component_centroids(&peaks);
    let mut result = DetectionResult::new(1);
    for (cx, cy) in &centroids {
        result.push_center((*cx as i32, *cy as i32));
    }
    debug!("level {:.1}: {} peak components", level, result.len());
    result
}

#[cfg(test)]
mod tests {
    use canonical_error::CanonicalErrorCode;
    use image::{Luma, Rgb, RgbImage};
    use super::*;

    fn frame_with_squares(width: u32, height: u32,
                          squares: &[(u32, u32, u32, u8)]) -> GrayImage {
        let mut image = GrayImage::new(width, height);
        for &(x0, y0, size, value) in squares {
            for y in y0..y0 + size {
                for x in x0..x0 + size {
                    image.put_pixel(x, y, Luma([value]));
                }
            }
        }
        image
    }

    fn all_variants() -> Vec<Detector> {
        vec![Detector::Otsu(OtsuOptions::default()),
             Detector::Percentile(PercentileOptions::default()),
             Detector::Fixed(FixedOptions::default()),
             Detector::Peaks(PeaksOptions::default())]
    }

    // Several well separated blobs of different sizes and brightness.
    fn starfield() -> GrayImage {
        frame_with_squares(120, 90, &[(10, 10, 10, 255), (50, 12, 4, 230),
                                      (80, 40, 14, 250), (20, 60, 6, 240),
                                      (95, 75, 3, 220), (60, 65, 8, 255)])
    }

    fn assert_co_indexed(result: &DetectionResult) {
        let n = result.len();
        assert_eq!(result.centers().len(), n);
        for len in [result.boxes().len(), result.areas().len(), result.labels().len()] {
            assert!(len == 0 || len == n);
        }
    }

    #[test]
    fn test_single_square_otsu() {
        let frame = frame_with_squares(60, 60, &[(25, 20, 10, 255)]);
        let result = Detector::Otsu(OtsuOptions::default())
            .detect_intensity(&frame).unwrap();
        assert_eq!(result.len(), 1);
        assert_co_indexed(&result);
        let bbox = result.boxes()[0];
        assert!((8..=12).contains(&bbox.width()), "{:?}", bbox);
        assert!((8..=12).contains(&bbox.height()), "{:?}", bbox);
        assert!((bbox.left() - 25).abs() <= 2 && (bbox.top() - 20).abs() <= 2);
        let (cx, cy) = result.centers()[0];
        assert!((cx - 30).abs() <= 1 && (cy - 25).abs() <= 1, "{:?}", (cx, cy));
        // Within 20% of the 100 pixels of the square.
        let area = result.areas()[0];
        assert!((80.0..=120.0).contains(&area), "area {}", area);
        assert!(result.labels()[0].starts_with("0 "));
    }

    #[test]
    fn test_color_frame() {
        let mut frame = RgbImage::new(40, 40);
        for y in 10..20 {
            for x in 10..20 {
                frame.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let result = Detector::Otsu(OtsuOptions::default())
            .detect(&DynamicImage::ImageRgb8(frame)).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_blank_frame_is_empty_for_all_variants() {
        let frame = GrayImage::new(64, 48);
        for detector in all_variants() {
            let result = detector.detect_intensity(&frame).unwrap();
            assert!(result.is_empty(), "{}", detector.name());
            assert_co_indexed(&result);
        }
    }

    #[test]
    fn test_all_variants_find_starfield() {
        let frame = starfield();
        for detector in all_variants() {
            let result = detector.detect_intensity(&frame).unwrap();
            assert!(!result.is_empty(), "{}", detector.name());
            assert_co_indexed(&result);
        }
    }

    #[test]
    fn test_percentile_and_fixed_count_blobs() {
        let frame = starfield();
        let percentile = Detector::Percentile(
            PercentileOptions{percentile: 50.0, ..Default::default()});
        assert_eq!(percentile.detect_intensity(&frame).unwrap().len(), 6);
        let fixed = Detector::Fixed(
            FixedOptions{margin: 0.3, blur_size: 3, clean_size: 1, min_area: 2.0,
                         ..Default::default()});
        let result = fixed.detect_intensity(&frame).unwrap();
        assert_eq!(result.len(), 6);
        assert!(result.has_geometry());
        assert!(result.labels().iter().all(|label| label.contains('.')));
    }

    #[test]
    fn test_areas_within_band() {
        let frame = starfield();
        for (min_area, max_area) in [(2.0, 86400.0), (10.0, 60.0), (30.0, 200.0)] {
            let detectors = [
                Detector::Otsu(OtsuOptions{min_area, max_area, ..Default::default()}),
                Detector::Percentile(PercentileOptions{
                    percentile: 50.0, min_area, max_area, ..Default::default()}),
                Detector::Fixed(FixedOptions{
                    margin: 0.3, min_area, max_area, ..Default::default()}),
            ];
            for detector in detectors {
                let result = detector.detect_intensity(&frame).unwrap();
                assert_co_indexed(&result);
                for area in result.areas() {
                    assert!(*area >= min_area && *area <= max_area,
                            "{} area {}", detector.name(), area);
                }
            }
        }
    }

    #[test]
    fn test_raising_min_area_is_monotone() {
        let frame = starfield();
        let with_min_area = |min_area: f64| vec![
            Detector::Otsu(OtsuOptions{min_area, ..Default::default()}),
            Detector::Percentile(PercentileOptions{
                percentile: 50.0, min_area, ..Default::default()}),
            Detector::Fixed(FixedOptions{margin: 0.3, min_area, ..Default::default()}),
        ];
        let mut previous = vec![usize::MAX; 3];
        for min_area in [1.0, 5.0, 10.0, 20.0, 40.0, 80.0, 150.0, 600.0] {
            for (k, detector) in with_min_area(min_area).iter().enumerate() {
                let count = detector.detect_intensity(&frame).unwrap().len();
                assert!(count <= previous[k], "{} at {}", detector.name(), min_area);
                previous[k] = count;
            }
        }
        assert_eq!(previous, vec![0, 0, 0]);
    }

    #[test]
    fn test_fixed_cleans_twice() {
        // With no blur the 3x3 blob survives one cleaning pass as a cross but
        // not two.
        let frame = frame_with_squares(60, 30, &[(10, 10, 8, 255), (40, 10, 3, 255)]);
        let otsu = Detector::Otsu(OtsuOptions{blur_size: 1, min_area: 1.0,
                                              ..Default::default()});
        let result = otsu.detect_intensity(&frame).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.areas()[1], 5.0);

        let fixed = Detector::Fixed(FixedOptions{margin: 0.5, blur_size: 1, min_area: 1.0,
                                                 ..Default::default()});
        let result = fixed.detect_intensity(&frame).unwrap();
        assert_eq!(result.len(), 1);
        let (cx, cy) = result.centers()[0];
        assert!((cx - 14).abs() <= 1 && (cy - 14).abs() <= 1, "{:?}", (cx, cy));
    }

    #[test]
    fn test_peaks_plateau_is_one_blob() {
        // The middle row of a 20x5 bar is a 16 pixel plateau at distance 3;
        // it is reported once, at its centroid.
        let mut frame = GrayImage::new(60, 30);
        for y in 10..15 {
            for x in 20..40 {
                frame.put_pixel(x, y, Luma([255]));
            }
        }
        let detector = Detector::Peaks(PeaksOptions{margin: 0.5, blur_size: 1, clean_size: 1,
                                                    ..Default::default()});
        let result = detector.detect_intensity(&frame).unwrap();
        assert_eq!(result.centers(), &[(29, 12)]);
    }

    #[test]
    fn test_tiny_max_area_is_empty_not_error() {
        let frame = starfield();
        // Every blob covers at least one pixel.
        let detector = Detector::Otsu(OtsuOptions{min_area: 0.1, max_area: 0.4,
                                                  ..Default::default()});
        assert!(detector.detect_intensity(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_peaks_finds_separate_blobs() {
        let frame = frame_with_squares(100, 60, &[(10, 10, 12, 255), (60, 30, 12, 255)]);
        let result = Detector::Peaks(PeaksOptions::default())
            .detect_intensity(&frame).unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.boxes().is_empty());
        assert!(result.areas().is_empty());
        assert!(result.labels().is_empty());
        let (x0, y0) = result.centers()[0];
        assert!((x0 - 15).abs() <= 2 && (y0 - 15).abs() <= 2, "{:?}", (x0, y0));
        let (x1, y1) = result.centers()[1];
        assert!((x1 - 65).abs() <= 2 && (y1 - 35).abs() <= 2, "{:?}", (x1, y1));
    }

    #[test]
    fn test_invalid_options_fail_before_processing() {
        let frame = starfield();
        let detector = Detector::Otsu(OtsuOptions{blur_size: 4, ..Default::default()});
        let err = detector.detect_intensity(&frame).unwrap_err();
        assert!(err.code == CanonicalErrorCode::InvalidArgument);
        let detector = Detector::Peaks(PeaksOptions{margin: 2.0, ..Default::default()});
        let err = detector.detect(&DynamicImage::ImageLuma8(frame)).unwrap_err();
        assert!(err.code == CanonicalErrorCode::InvalidArgument);
    }

    #[test]
    fn test_zero_dimension_frame() {
        let err = Detector::Fixed(FixedOptions::default())
            .detect_intensity(&GrayImage::new(0, 10)).unwrap_err();
        assert!(err.code == CanonicalErrorCode::FailedPrecondition);
    }

    #[test]
    fn test_detect_is_deterministic() {
        let frame = starfield();
        for detector in all_variants() {
            let first = detector.detect_intensity(&frame).unwrap();
            let second = detector.detect_intensity(&frame).unwrap();
            assert_eq!(first, second);
        }
    }

}  // mod tests.
