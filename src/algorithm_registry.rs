// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::collections::BTreeMap;
use std::fmt;

use canonical_error::{CanonicalError, invalid_argument_error, not_found_error};
use log::warn;

use crate::detector::Detector;
use crate::options::{FixedOptions, OtsuOptions, PeaksOptions, PercentileOptions};

/// A user-settable detection parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Param {
    Percentile,
    BlurSize,
    CleanSize,
    MinArea,
    MaxArea,
    Margin,
    PeakSize,
}

impl Param {
    pub fn name(&self) -> &'static str {
        match self {
            Param::Percentile => "percentile",
            Param::BlurSize => "blur_size",
            Param::CleanSize => "clean_size",
            Param::MinArea => "min_area",
            Param::MaxArea => "max_area",
            Param::Margin => "margin",
            Param::PeakSize => "peak_size",
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// User-supplied parameter values; parameters not present keep the
/// algorithm's defaults.
pub type ParamValues = BTreeMap<Param, f64>;

/// Describes one detection algorithm: how it is named and which parameters
/// it recognizes.
#[derive(Debug)]
pub struct AlgorithmConfig {
    // Lookup key, e.g. "otsu".
    pub key: &'static str,
    // Display name, e.g. "Otsu".
    pub name: &'static str,
    pub params: &'static [Param],
}

impl AlgorithmConfig {
    pub fn default_detector(&self) -> Detector {
        match self.key {
            "otsu" => Detector::Otsu(OtsuOptions::default()),
            "percentile" => Detector::Percentile(PercentileOptions::default()),
            "fixed" => Detector::Fixed(FixedOptions::default()),
            _ => Detector::Peaks(PeaksOptions::default()),
        }
    }

    pub fn recognizes(&self, param: Param) -> bool {
        self.params.contains(&param)
    }

    /// Builds a validated detector from the defaults overridden by `values`.
    /// Values for parameters this algorithm does not use are ignored with a
    /// warning.
    pub fn detector(&self, values: &ParamValues) -> Result<Detector, CanonicalError> {
        for param in values.keys() {
            if !self.recognizes(*param) {
                warn!("{} algorithm ignores parameter {}", self.name, param);
            }
        }
        let mut detector = self.default_detector();
        match &mut detector {
            Detector::Otsu(o) => {
                apply_kernel_size(values, Param::BlurSize, &mut o.blur_size)?;
                apply_kernel_size(values, Param::CleanSize, &mut o.clean_size)?;
                apply_value(values, Param::MinArea, &mut o.min_area);
                apply_value(values, Param::MaxArea, &mut o.max_area);
            },
            Detector::Percentile(o) => {
                apply_value(values, Param::Percentile, &mut o.percentile);
                apply_kernel_size(values, Param::BlurSize, &mut o.blur_size)?;
                apply_kernel_size(values, Param::CleanSize, &mut o.clean_size)?;
                apply_value(values, Param::MinArea, &mut o.min_area);
                apply_value(values, Param::MaxArea, &mut o.max_area);
            },
            Detector::Fixed(o) => {
                apply_value(values, Param::Margin, &mut o.margin);
                apply_kernel_size(values, Param::BlurSize, &mut o.blur_size)?;
                apply_kernel_size(values, Param::CleanSize, &mut o.clean_size)?;
                apply_value(values, Param::MinArea, &mut o.min_area);
                apply_value(values, Param::MaxArea, &mut o.max_area);
            },
            Detector::Peaks(o) => {
                apply_value(values, Param::Margin, &mut o.margin);
                apply_kernel_size(values, Param::BlurSize, &mut o.blur_size)?;
                apply_kernel_size(values, Param::CleanSize, &mut o.clean_size)?;
                apply_kernel_size(values, Param::PeakSize, &mut o.peak_size)?;
            },
        }
        detector.validate()?;
        Ok(detector)
    }
}

fn apply_value(values: &ParamValues, param: Param, target: &mut f64) {
    if let Some(value) = values.get(&param) {
        *target = *value;
    }
}

// Kernel sizes arrive as f64 alongside the other parameters; they must be
// non-negative whole numbers. Range and oddness are left to validate().
fn apply_kernel_size(values: &ParamValues, param: Param, target: &mut u32)
                     -> Result<(), CanonicalError> {
    let Some(value) = values.get(&param) else {
        return Ok(());
    };
    if !value.is_finite() || value.fract() != 0.0 || *value < 0.0 || *value > u32::MAX as f64 {
        return Err(invalid_argument_error(
            format!("{} must be a whole number, got {}", param, value).as_str()));
    }
    *target = *value as u32;
    Ok(())
}

/// The set of available detection algorithms. Build it once and pass it to
/// whatever needs to enumerate or select algorithms.
#[derive(Debug)]
pub struct AlgorithmRegistry {
    algorithms: Vec<AlgorithmConfig>,
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        AlgorithmRegistry{algorithms: vec![
            AlgorithmConfig{
                key: "otsu",
                name: "Otsu",
                params: &[Param::BlurSize, Param::CleanSize,
                          Param::MinArea, Param::MaxArea],
            },
            AlgorithmConfig{
                key: "percentile",
                name: "Percentile",
                params: &[Param::Percentile, Param::BlurSize, Param::CleanSize,
                          Param::MinArea, Param::MaxArea],
            },
            AlgorithmConfig{
                key: "peaks",
                name: "Peaks",
                params: &[Param::Margin, Param::BlurSize, Param::CleanSize,
                          Param::PeakSize],
            },
            AlgorithmConfig{
                key: "fixed",
                name: "Fixed",
                params: &[Param::Margin, Param::BlurSize, Param::CleanSize,
                          Param::MinArea, Param::MaxArea],
            },
        ]}
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlgorithmConfig> {
        self.algorithms.iter()
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.algorithms.iter().map(|a| a.key).collect()
    }

    pub fn get(&self, key: &str) -> Option<&AlgorithmConfig> {
        self.algorithms.iter().find(|a| a.key == key)
    }

    /// Looks up `key` and builds its detector from `values`.
    pub fn detector(&self, key: &str, values: &ParamValues)
                    -> Result<Detector, CanonicalError> {
        match self.get(key) {
            Some(config) => config.detector(values),
            None => Err(not_found_error(
                format!("Unknown algorithm '{}'; expected one of {}",
                        key, self.keys().join(", ")).as_str())),
        }
    }
}

// mod tests.
