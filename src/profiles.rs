//! Known label profiles and fuzzy matching of RFID readings against them

use crate::models::Dpi::{self, Dpi203, Dpi300};
use crate::models::PrintDirection::{self, Horizontal, Vertical};
use crate::types::RfidReading;
use serde::Serialize;
use std::hash::{Hash, Hasher};

/// Allowed deviation per axis, in millimetres
pub const TOLERANCE_MM: f64 = 1.0;

/// Confidence lost per full tolerance step of deviation
const CONFIDENCE_PENALTY: f64 = 0.05;

/// Readings outside this range are treated as garbage
const MIN_DIMENSION_MM: f64 = 10.0;
const MAX_DIMENSION_MM: f64 = 200.0;

/// A known label size for a printer model.
///
/// Equality and hashing use `(model, width_mm, height_mm)` only; the rest is display metadata.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LabelProfile {
    pub name: &'static str,
    pub model: &'static str,
    pub width_mm: u16,
    pub height_mm: u16,
    pub width_px: u16,
    pub height_px: u16,
    pub dpi: Dpi,
    pub print_direction: PrintDirection,
    #[serde(skip)]
    pub confidence: f32,
}

impl PartialEq for LabelProfile {
    fn eq(&self, other: &Self) -> bool {
        self.model == other.model
            && self.width_mm == other.width_mm
            && self.height_mm == other.height_mm
    }
}

impl Eq for LabelProfile {}

impl Hash for LabelProfile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.model.hash(state);
        self.width_mm.hash(state);
        self.height_mm.hash(state);
    }
}

const fn profile(
    name: &'static str,
    model: &'static str,
    (width_mm, height_mm): (u16, u16),
    (width_px, height_px): (u16, u16),
    dpi: Dpi,
    print_direction: PrintDirection,
) -> LabelProfile {
    LabelProfile {
        name,
        model,
        width_mm,
        height_mm,
        width_px,
        height_px,
        dpi,
        print_direction,
        confidence: 1.0,
    }
}

// Order matters: detection returns the first entry within tolerance, so earlier entries
// win for sizes shared by several models (50x30 for B1/B21 Pro, 12x40 for D11-H/D110).
pub static PROFILES: [LabelProfile; 11] = [
    profile("B1 50mm", "b1", (50, 30), (400, 240), Dpi203, Horizontal),
    profile("B1 40mm", "b1", (40, 30), (320, 240), Dpi203, Horizontal),
    profile("B1 50x50mm", "b1", (50, 50), (400, 400), Dpi203, Horizontal),
    profile("B21 75mm", "b21", (75, 50), (600, 400), Dpi203, Horizontal),
    profile("B21 Pro 50mm", "b21_pro", (50, 30), (591, 354), Dpi300, Horizontal),
    profile("B18 14mm", "b18", (14, 50), (112, 400), Dpi203, Horizontal),
    profile("D11-H 12mm", "d11_h", (12, 40), (142, 472), Dpi300, Vertical),
    profile("D110 12mm", "d110", (12, 40), (96, 320), Dpi203, Vertical),
    profile("D110 15mm", "d110", (15, 30), (120, 240), Dpi203, Vertical),
    profile("D11 14mm", "d11", (14, 30), (112, 240), Dpi203, Vertical),
    profile("D101 25mm", "d101", (25, 40), (200, 320), Dpi203, Vertical),
];

/// Match a reading against [`PROFILES`].
///
/// Returns a copy of the first profile whose width and height are both within
/// [`TOLERANCE_MM`] of the reading, with `confidence` set from the deviation.
pub fn detect_profile(reading: Option<&RfidReading>) -> Option<LabelProfile> {
    let reading = reading?;
    let width = valid_dimension(reading.width_mm?)?;
    let height = valid_dimension(reading.height_mm?)?;

    PROFILES
        .iter()
        .find(|p| {
            (f64::from(p.width_mm) - width).abs() <= TOLERANCE_MM
                && (f64::from(p.height_mm) - height).abs() <= TOLERANCE_MM
        })
        .map(|p| {
            let confidence = (axis_confidence(f64::from(p.width_mm) - width)
                + axis_confidence(f64::from(p.height_mm) - height))
                / 2.0;
            LabelProfile {
                confidence: confidence as f32,
                ..*p
            }
        })
}

/// First profile for `model`
pub fn get_profile_by_model(model: &str) -> Option<LabelProfile> {
    PROFILES
        .iter()
        .find(|p| p.model.eq_ignore_ascii_case(model))
        .copied()
}

/// Every profile for `model`, in declaration order
pub fn get_profiles_by_model(model: &str) -> Vec<LabelProfile> {
    PROFILES
        .iter()
        .filter(|p| p.model.eq_ignore_ascii_case(model))
        .copied()
        .collect()
}

fn valid_dimension(mm: f64) -> Option<f64> {
    (mm.is_finite() && (MIN_DIMENSION_MM..=MAX_DIMENSION_MM).contains(&mm)).then_some(mm)
}

fn axis_confidence(diff: f64) -> f64 {
    (1.0 - (diff.abs() / TOLERANCE_MM) * CONFIDENCE_PENALTY).max(0.0)
}
