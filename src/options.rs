// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use canonical_error::{CanonicalError, invalid_argument_error};

// Largest accepted kernel extent for blur, cleaning and peak kernels.
pub const MAX_KERNEL_SIZE: u32 = 255;

/// Options for Otsu's automatic thresholding.
#[derive(Clone, Debug, PartialEq)]
pub struct OtsuOptions {
    // Gaussian blur kernel extent (odd).
    pub blur_size: u32,
    // Morphology kernel extent for cleaning (odd).
    pub clean_size: u32,
    // Inclusive contour area band, pixels^2.
    pub min_area: f64,
    pub max_area: f64,
}

impl Default for OtsuOptions {
    fn default() -> Self {
        OtsuOptions{blur_size: 5, clean_size: 3, min_area: 2.0, max_area: 86400.0}
    }
}

/// Options for percentile-based thresholding.
#[derive(Clone, Debug, PartialEq)]
pub struct PercentileOptions {
    // Detection sensitivity [0-100]; higher means fewer detections.
    pub percentile: f64,
    pub blur_size: u32,
    pub clean_size: u32,
    pub min_area: f64,
    pub max_area: f64,
}

impl Default for PercentileOptions {
    fn default() -> Self {
        PercentileOptions{percentile: 96.0, blur_size: 5, clean_size: 3,
                          min_area: 2.0, max_area: 86400.0}
    }
}

/// Options for the fixed margin-of-max threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct FixedOptions {
    // Threshold as a fraction of the smoothed frame's max intensity [0-1];
    // higher means fewer detections.
    pub margin: f64,
    pub blur_size: u32,
    pub clean_size: u32,
    pub min_area: f64,
    pub max_area: f64,
}

impl Default for FixedOptions {
    fn default() -> Self {
        FixedOptions{margin: 0.7, blur_size: 7, clean_size: 3,
                     min_area: 5.0, max_area: 86400.0}
    }
}

/// Options for local peak detection on the distance transform.
#[derive(Clone, Debug, PartialEq)]
pub struct PeaksOptions {
    pub margin: f64,
    pub blur_size: u32,
    pub clean_size: u32,
    // Neighborhood extent for local maximum suppression (odd).
    pub peak_size: u32,
}

impl Default for PeaksOptions {
    fn default() -> Self {
        PeaksOptions{margin: 0.7, blur_size: 5, clean_size: 3, peak_size: 15}
    }
}

impl OtsuOptions {
    pub fn validate(&self) -> Result<(), CanonicalError> {
        validate_kernel_size("blur_size", self.blur_size)?;
        validate_kernel_size("clean_size", self.clean_size)?;
        validate_area_band(self.min_area, self.max_area)
    }
}

impl PercentileOptions {
    pub fn validate(&self) -> Result<(), CanonicalError> {
        validate_unit_range("percentile", self.percentile, 100.0)?;
        validate_kernel_size("blur_size", self.blur_size)?;
        validate_kernel_size("clean_size", self.clean_size)?;
        validate_area_band(self.min_area, self.max_area)
    }
}

impl FixedOptions {
    pub fn validate(&self) -> Result<(), CanonicalError> {
        validate_unit_range("margin", self.margin, 1.0)?;
        validate_kernel_size("blur_size", self.blur_size)?;
        validate_kernel_size("clean_size", self.clean_size)?;
        validate_area_band(self.min_area, self.max_area)
    }
}

impl PeaksOptions {
    pub fn validate(&self) -> Result<(), CanonicalError> {
        validate_unit_range("margin", self.margin, 1.0)?;
        validate_kernel_size("blur_size", self.blur_size)?;
        validate_kernel_size("clean_size", self.clean_size)?;
        validate_kernel_size("peak_size", self.peak_size)
    }
}

// Kernel extents must be odd and within 1..=MAX_KERNEL_SIZE.
fn validate_kernel_size(name: &str, size: u32) -> Result<(), CanonicalError> {
    if size == 0 || size % 2 == 0 || size > MAX_KERNEL_SIZE {
        return Err(invalid_argument_error(
            format!("{} must be an odd number in 1..={}, got {}",
                    name, MAX_KERNEL_SIZE, size).as_str()));
    }
    Ok(())
}

// `value` must lie in [0, upper].
fn validate_unit_range(name: &str, value: f64, upper: f64) -> Result<(), CanonicalError> {
    if !value.is_finite() || value < 0.0 || value > upper {
        return Err(invalid_argument_error(
            format!("{} must be in [0, {}], got {}", name, upper, value).as_str()));
    }
    Ok(())
}

fn validate_area_band(min_area: f64, max_area: f64) -> Result<(), CanonicalError> {
    for (name, value) in [("min_area", min_area), ("max_area", max_area)] {
        if !value.is_finite() || value <= 0.0 {
            return Err(invalid_argument_error(
                format!("{} must be positive, got {}", name, value).as_str()));
        }
    }
    if min_area > max_area {
        return Err(invalid_argument_error(
            format!("min_area {} exceeds max_area {}", min_area, max_area).as_str()));
    }
    Ok(())
}

// mod tests.
