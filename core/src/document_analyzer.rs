//! Document quality and fraud analysis.
//!
//! Pure per-document scoring. This module:
//!   1. Scores legibility of an uploaded image (blur, brightness, contrast,
//!      resolution, framing, text coverage)
//!   2. Flags fraud indicators (editing-tool metadata, channel tampering,
//!      implausible document aspect ratio)
//!   3. Never fails a submission: analysis problems degrade to neutral
//!      defaults and only inform risk scoring
//!
//! Non-image uploads (PDFs and the like) skip pixel analysis and receive a
//! fixed high quality default; the metadata scan still runs on raw bytes.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

/// Pixel count at which the resolution score caps out (640x480).
const FULL_RESOLUTION_PIXELS: f64 = 307_200.0;

/// Laplacian-variance at which an image counts as fully sharp.
const SHARP_VARIANCE_REF: f64 = 0.005;

/// Luma standard deviation at which contrast caps out.
const CONTRAST_REF: f64 = 0.25;

/// Mean gradient magnitude at which the base image-quality score caps out.
const GRADIENT_REF: f64 = 0.2;

/// Gradient magnitude above which a pixel counts as an edge.
const EDGE_PIXEL_THRESHOLD: f64 = 0.1;

/// Edge-density band consistent with one framed document. Below: featureless
/// frame; above: background clutter.
const EDGE_DENSITY_MIN: f64 = 0.02;
const EDGE_DENSITY_MAX: f64 = 0.6;

/// Luma below this counts as ink.
const TEXT_DARK_THRESHOLD: f64 = 0.45;

/// Dark-pixel ratio band consistent with printed text coverage.
const TEXT_RATIO_MIN: f64 = 0.05;
const TEXT_RATIO_MAX: f64 = 0.30;

/// Fallback when a sub-check cannot run.
const NEUTRAL_SCORE: f64 = 0.5;

/// Quality granted to non-image uploads (PDFs are not pixel-scored).
const NON_IMAGE_QUALITY: f64 = 0.85;

/// Overall-quality weights, in report-field order.
const W_IMAGE_QUALITY: f64 = 0.25;
const W_SHARPNESS: f64 = 0.20;
const W_BRIGHTNESS: f64 = 0.10;
const W_CONTRAST: f64 = 0.10;
const W_RESOLUTION: f64 = 0.15;
const W_EDGES: f64 = 0.10;
const W_TEXT: f64 = 0.10;

/// Fraud indicator weights.
const FRAUD_MANIPULATION: f64 = 0.4;
const FRAUD_TAMPERING: f64 = 0.5;
const FRAUD_TEMPLATE: f64 = 0.3;

/// Spread between the brightest and darkest channel mean beyond which the
/// colour statistics look spliced.
const CHANNEL_SPREAD_MAX: f64 = 0.35;

/// width/height bands for recognised document classes: portrait ID,
/// landscape ID, card.
const VALID_ASPECT_BANDS: [(f64, f64); 3] = [(0.7, 0.8), (1.3, 1.6), (0.6, 0.7)];

/// Byte signatures of common editing software, matched case-insensitively.
const EDITING_TOOL_SIGNATURES: [&str; 6] = [
    "photoshop",
    "gimp",
    "adobe",
    "canva",
    "pixelmator",
    "affinity",
];

// ── Reports ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    /// Weighted sum of the sub-scores, in [0,1].
    pub overall: f64,
    pub image_quality: f64,
    /// 1.0 is fully blurred; the overall term uses (1 - blur).
    pub blur: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub resolution: f64,
    pub edges_ok: bool,
    pub text_clarity: f64,
    /// True when pixel analysis was skipped or failed.
    pub defaulted: bool,
}

impl QualityReport {
    fn non_image() -> Self {
        Self {
            overall: NON_IMAGE_QUALITY,
            image_quality: NON_IMAGE_QUALITY,
            blur: 1.0 - NON_IMAGE_QUALITY,
            brightness: NON_IMAGE_QUALITY,
            contrast: NON_IMAGE_QUALITY,
            resolution: NON_IMAGE_QUALITY,
            edges_ok: true,
            text_clarity: NON_IMAGE_QUALITY,
            defaulted: true,
        }
    }

    fn degraded() -> Self {
        Self {
            overall: NEUTRAL_SCORE,
            image_quality: NEUTRAL_SCORE,
            blur: NEUTRAL_SCORE,
            brightness: NEUTRAL_SCORE,
            contrast: NEUTRAL_SCORE,
            resolution: NEUTRAL_SCORE,
            edges_ok: true,
            text_clarity: NEUTRAL_SCORE,
            defaulted: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudReport {
    /// Sum of triggered indicator weights, clamped to [0,1].
    pub risk_score: f64,
    pub indicators: Vec<String>,
}

impl FraudReport {
    pub fn is_clean(&self) -> bool {
        self.indicators.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub quality: QualityReport,
    pub fraud: FraudReport,
}

// ── Analyzer ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct DocumentAnalyzer;

impl DocumentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, bytes: &[u8], mime_type: &str) -> DocumentAnalysis {
        let mut indicators = Vec::new();
        let mut risk = 0.0;

        if scan_for_editing_tools(bytes) {
            indicators.push("editing_software_signature".to_string());
            risk += FRAUD_MANIPULATION;
        }

        if !mime_type.starts_with("image/") {
            return DocumentAnalysis {
                quality: QualityReport::non_image(),
                fraud: FraudReport {
                    risk_score: risk.clamp(0.0, 1.0),
                    indicators,
                },
            };
        }

        let img = match image::load_from_memory(bytes) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("Document image failed to decode, scoring neutral: {e}");
                return DocumentAnalysis {
                    quality: QualityReport::degraded(),
                    fraud: FraudReport {
                        risk_score: risk.clamp(0.0, 1.0),
                        indicators,
                    },
                };
            }
        };

        if channel_spread(&img) > CHANNEL_SPREAD_MAX {
            indicators.push("channel_variance_anomaly".to_string());
            risk += FRAUD_TAMPERING;
        }
        if !aspect_ratio_valid(&img) {
            indicators.push("aspect_ratio_mismatch".to_string());
            risk += FRAUD_TEMPLATE;
        }

        DocumentAnalysis {
            quality: score_image(&img),
            fraud: FraudReport {
                risk_score: risk.clamp(0.0, 1.0),
                indicators,
            },
        }
    }
}

fn score_image(img: &DynamicImage) -> QualityReport {
    let gray = img.to_luma8();
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    if w < 3 || h < 3 {
        return QualityReport::degraded();
    }

    let luma: Vec<f64> = gray.pixels().map(|p| p.0[0] as f64 / 255.0).collect();
    let at = |x: usize, y: usize| luma[y * w + x];

    // Laplacian variance: texture energy over interior pixels.
    let mut responses = Vec::with_capacity((w - 2) * (h - 2));
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let r = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1)
                - 4.0 * at(x, y);
            responses.push(r);
        }
    }
    let sharpness = match variance(&responses) {
        Some(v) => (v / SHARP_VARIANCE_REF).min(1.0),
        None => NEUTRAL_SCORE,
    };
    let blur = 1.0 - sharpness;

    // Gradient statistics drive base quality and the framing check.
    let mut gradient_sum = 0.0;
    let mut edge_pixels = 0usize;
    let interior = (w - 1) * (h - 1);
    for y in 0..h - 1 {
        for x in 0..w - 1 {
            let g = (at(x + 1, y) - at(x, y)).abs() + (at(x, y + 1) - at(x, y)).abs();
            gradient_sum += g;
            if g > EDGE_PIXEL_THRESHOLD {
                edge_pixels += 1;
            }
        }
    }
    let image_quality = ((gradient_sum / interior as f64) / GRADIENT_REF).min(1.0);
    let edge_density = edge_pixels as f64 / interior as f64;
    let edges_ok = (EDGE_DENSITY_MIN..=EDGE_DENSITY_MAX).contains(&edge_density);

    let mean = luma.iter().sum::<f64>() / luma.len() as f64;
    let brightness = 1.0 - (mean - 0.5).abs() * 2.0;
    let contrast = match variance(&luma) {
        Some(v) => (v.sqrt() / CONTRAST_REF).min(1.0),
        None => NEUTRAL_SCORE,
    };

    let resolution = ((w * h) as f64 / FULL_RESOLUTION_PIXELS).min(1.0);

    let dark_ratio = luma.iter().filter(|&&l| l < TEXT_DARK_THRESHOLD).count() as f64
        / luma.len() as f64;
    let text_clarity = text_clarity_score(dark_ratio);

    let overall = W_IMAGE_QUALITY * image_quality
        + W_SHARPNESS * (1.0 - blur)
        + W_BRIGHTNESS * brightness
        + W_CONTRAST * contrast
        + W_RESOLUTION * resolution
        + W_EDGES * if edges_ok { 1.0 } else { 0.0 }
        + W_TEXT * text_clarity;

    QualityReport {
        overall: overall.clamp(0.0, 1.0),
        image_quality,
        blur,
        brightness,
        contrast,
        resolution,
        edges_ok,
        text_clarity,
        defaulted: false,
    }
}

/// 1.0 inside the plausible text-coverage band, tapering linearly outside.
fn text_clarity_score(dark_ratio: f64) -> f64 {
    if (TEXT_RATIO_MIN..=TEXT_RATIO_MAX).contains(&dark_ratio) {
        1.0
    } else if dark_ratio < TEXT_RATIO_MIN {
        dark_ratio / TEXT_RATIO_MIN
    } else {
        ((1.0 - dark_ratio) / (1.0 - TEXT_RATIO_MAX)).max(0.0)
    }
}

fn variance(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64)
}

/// Spread between channel means. Genuine photographs keep channels loosely
/// correlated; a large spread suggests spliced or recoloured regions.
fn channel_spread(img: &DynamicImage) -> f64 {
    let rgb = img.to_rgb8();
    let n = (rgb.width() as f64) * (rgb.height() as f64);
    if n == 0.0 {
        return 0.0;
    }
    let mut sums = [0.0f64; 3];
    for p in rgb.pixels() {
        for c in 0..3 {
            sums[c] += p.0[c] as f64 / 255.0;
        }
    }
    let means = sums.map(|s| s / n);
    let max = means.iter().cloned().fold(f64::MIN, f64::max);
    let min = means.iter().cloned().fold(f64::MAX, f64::min);
    max - min
}

fn aspect_ratio_valid(img: &DynamicImage) -> bool {
    let h = img.height();
    if h == 0 {
        return false;
    }
    let ratio = img.width() as f64 / h as f64;
    VALID_ASPECT_BANDS
        .iter()
        .any(|(lo, hi)| (*lo..=*hi).contains(&ratio))
}

fn scan_for_editing_tools(bytes: &[u8]) -> bool {
    let lowered: Vec<u8> = bytes.iter().map(|b| b.to_ascii_lowercase()).collect();
    EDITING_TOOL_SIGNATURES
        .iter()
        .any(|sig| find_subslice(&lowered, sig.as_bytes()))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}
