// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use imageproc::rect::Rect;

/// Blobs detected in one frame. `centers` always has one entry per blob;
/// `boxes`, `areas` and `labels` are either empty or co-indexed with
/// `centers`, so position `i` describes the same blob in every field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    // Integer (x, y) blob centers, in discovery order.
    centers: Vec<(i32, i32)>,

    // Upright bounding rectangles. Empty when the detector produces no
    // contour geometry.
    boxes: Vec<Rect>,

    // Contour areas, pixels^2.
    areas: Vec<f64>,

    // "<index> <area>" strings.
    labels: Vec<String>,

    // Decimal places used when formatting areas into labels.
    label_precision: usize,
}

impl DetectionResult {
    pub(crate) fn new(label_precision: usize) -> Self {
        DetectionResult{label_precision, ..Default::default()}
    }

    // Appends a blob with full contour geometry.
    pub(crate) fn push_blob(&mut self, center: (i32, i32), bbox: Rect, area: f64) {
        assert_eq!(self.boxes.len(), self.centers.len(),
                   "cannot mix center-only and contour blobs");
        let index = self.centers.len();
        self.centers.push(center);
        self.boxes.push(bbox);
        self.areas.push(area);
        self.labels.push(format!("{} {:.*}", index, self.label_precision, area));
    }

    // Appends a blob known only by its center.
    pub(crate) fn push_center(&mut self, center: (i32, i32)) {
        assert!(self.boxes.is_empty(), "cannot mix center-only and contour blobs");
        self.centers.push(center);
    }

    pub fn centers(&self) -> &[(i32, i32)] {
        &self.centers
    }

    pub fn boxes(&self) -> &[Rect] {
        &self.boxes
    }

    pub fn areas(&self) -> &[f64] {
        &self.areas
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of detected blobs.
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    /// True when boxes, areas and labels are available for every blob.
    pub fn has_geometry(&self) -> bool {
        !self.centers.is_empty() && self.boxes.len() == self.centers.len()
    }
}

// mod tests.
