//! Bounding box model

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A detected object inside an image.
///
/// All coordinates are normalized to `[0, 1]` relative to the image
/// dimensions, so the same box renders correctly at any resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Center x
    pub cx: f32,
    /// Center y
    pub cy: f32,
    /// Width
    pub w: f32,
    /// Height
    pub h: f32,
    /// Detector confidence in `[0, 1]`
    pub confidence: f32,
    /// Class index in the detector's label table
    pub class_index: i32,
    /// Human-readable class (pest) name
    pub class_name: String,
}

impl BoundingBox {
    /// Build a box from its two corners, deriving center and size.
    #[must_use]
    pub fn from_corners(
        (x1, y1): (f32, f32),
        (x2, y2): (f32, f32),
        confidence: f32,
        class_index: i32,
        class_name: impl Into<String>,
    ) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            cx: (x1 + x2) / 2.0,
            cy: (y1 + y2) / 2.0,
            w: x2 - x1,
            h: y2 - y1,
            confidence,
            class_index,
            class_name: class_name.into(),
        }
    }

    /// Check that coordinates and confidence are finite and normalized.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("x1", self.x1),
            ("y1", self.y1),
            ("x2", self.x2),
            ("y2", self.y2),
            ("cx", self.cx),
            ("cy", self.cy),
            ("w", self.w),
            ("h", self.h),
            ("confidence", self.confidence),
        ];
        for (name, value) in fields {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidInput(format!(
                    "bounding box field '{name}' must be within [0, 1], got {value}"
                )));
            }
        }
        if self.x2 < self.x1 || self.y2 < self.y1 {
            return Err(Error::InvalidInput(
                "bounding box corners are inverted".to_string(),
            ));
        }
        if self.class_name.trim().is_empty() {
            return Err(Error::InvalidInput(
                "bounding box class name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_corners_derives_center_and_size() {
        let bbox = BoundingBox::from_corners((0.1, 0.2), (0.5, 0.6), 0.9, 2, "aphid");
        assert!((bbox.cx - 0.3).abs() < 1e-6);
        assert!((bbox.cy - 0.4).abs() < 1e-6);
        assert!((bbox.w - 0.4).abs() < 1e-6);
        assert!((bbox.h - 0.4).abs() < 1e-6);
        assert!(bbox.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let bbox = BoundingBox::from_corners((0.1, 0.1), (1.2, 0.5), 0.5, 0, "mite");
        let err = bbox.validate().unwrap_err();
        assert!(err.to_string().contains("x2"));

        let bbox = BoundingBox::from_corners((0.1, 0.1), (0.5, 0.5), f32::NAN, 0, "mite");
        assert!(bbox.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_corners() {
        let mut bbox = BoundingBox::from_corners((0.1, 0.1), (0.5, 0.5), 0.5, 0, "mite");
        bbox.x1 = 0.6;
        assert!(bbox.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_class_name() {
        let bbox = BoundingBox::from_corners((0.1, 0.1), (0.5, 0.5), 0.5, 0, "  ");
        assert!(bbox.validate().is_err());
    }
}
