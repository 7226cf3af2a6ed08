// SPDX-License-Identifier: GPL-3.0-only

//! Decoded barcode results
//!
//! These types are what callers receive from every decode path. They are
//! plain owned values converted from the engine's native result array,
//! which is released as soon as conversion finishes (see [`native`]).

pub mod native;

use crate::config::BarcodeFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Four corner points of a located symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Quadrilateral {
    pub points: [Point; 4],
}

impl Quadrilateral {
    pub fn new(points: [Point; 4]) -> Self {
        Self { points }
    }

    /// Reorder the corners clockwise (in image coordinates, y down)
    /// starting from the top-left-most point
    pub fn normalized(&self) -> Self {
        let mut points = self.points;

        // Shoelace sum is positive for clockwise order when y grows downwards
        let area2: i64 = (0..4)
            .map(|i| {
                let a = points[i];
                let b = points[(i + 1) % 4];
                a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
            })
            .sum();
        if area2 < 0 {
            points.reverse();
        }

        let start = (0..4)
            .min_by_key(|&i| {
                let p = points[i];
                (p.x as i64 + p.y as i64, p.y, p.x)
            })
            .unwrap_or(0);
        points.rotate_left(start);

        Self { points }
    }

    /// Axis aligned bounding box as (left, top, right, bottom)
    pub fn bounding_box(&self) -> (i32, i32, i32, i32) {
        let xs = self.points.iter().map(|p| p.x);
        let ys = self.points.iter().map(|p| p.y);
        (
            xs.clone().min().unwrap_or(0),
            ys.clone().min().unwrap_or(0),
            xs.max().unwrap_or(0),
            ys.max().unwrap_or(0),
        )
    }
}

/// How decoded bytes are turned into result text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextEncoding {
    /// Strict UTF-8; invalid sequences fail the conversion
    #[default]
    #[serde(rename = "UTF_8")]
    Utf8,
    /// UTF-8 with invalid sequences replaced by U+FFFD
    #[serde(rename = "UTF_8_LOSSY")]
    Utf8Lossy,
    /// ISO-8859-1, every byte maps to one character
    #[serde(rename = "LATIN_1")]
    Latin1,
}

impl TextEncoding {
    /// Interpret bytes under this encoding
    ///
    /// Returns `None` if the bytes are not valid for a strict encoding.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
            TextEncoding::Utf8Lossy => Some(String::from_utf8_lossy(bytes).into_owned()),
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF_8",
            TextEncoding::Utf8Lossy => "UTF_8_LOSSY",
            TextEncoding::Latin1 => "LATIN_1",
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded barcode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolResult {
    /// Format tag as reported by the engine (e.g. `"QR_CODE"`)
    pub format: String,
    /// Raw decoded payload
    pub bytes: Vec<u8>,
    /// Payload interpreted under the configured text encoding
    pub text: String,
    /// Corners, clockwise from the top-left-most
    pub location: Quadrilateral,
    /// Engine confidence (0-100) when reported
    pub confidence: Option<u32>,
}

impl SymbolResult {
    /// Format as a known [`BarcodeFormat`], if the tag is recognized
    pub fn barcode_format(&self) -> Option<BarcodeFormat> {
        self.format.parse().ok()
    }
}

impl fmt::Display for SymbolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.format, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(points: [(i32, i32); 4]) -> Quadrilateral {
        Quadrilateral::new(points.map(|(x, y)| Point::new(x, y)))
    }

    #[test]
    fn test_normalized_reorders_counter_clockwise_input() {
        // BL, BR, TR, TL is counter-clockwise on screen
        let q = quad([(0, 10), (10, 10), (10, 0), (0, 0)]).normalized();
        assert_eq!(q, quad([(0, 0), (10, 0), (10, 10), (0, 10)]));
    }

    #[test]
    fn test_normalized_rotates_to_top_left() {
        let q = quad([(10, 10), (0, 10), (0, 0), (10, 0)]).normalized();
        assert_eq!(q.points[0], Point::new(0, 0));
        assert_eq!(q.points[1], Point::new(10, 0));
    }

    #[test]
    fn test_normalized_is_idempotent() {
        let q = quad([(3, 1), (12, 4), (9, 13), (0, 10)]).normalized();
        assert_eq!(q.normalized(), q);
    }

    #[test]
    fn test_bounding_box() {
        let q = quad([(3, 1), (12, 4), (9, 13), (0, 10)]);
        assert_eq!(q.bounding_box(), (0, 1, 12, 13));
    }

    #[test]
    fn test_text_encodings() {
        let bytes = [0x48, 0xe9, 0x6c];
        assert_eq!(TextEncoding::Utf8.decode(&bytes), None);
        assert_eq!(TextEncoding::Latin1.decode(&bytes).as_deref(), Some("Hél"));
        assert_eq!(
            TextEncoding::Utf8Lossy.decode(&bytes).as_deref(),
            Some("H\u{fffd}l")
        );
        assert_eq!(TextEncoding::Utf8.decode("Hé".as_bytes()).as_deref(), Some("Hé"));
    }

    #[test]
    fn test_encoding_serializes_as_tag() {
        let json = serde_json::to_string(&TextEncoding::Utf8Lossy).unwrap();
        assert_eq!(json, "\"UTF_8_LOSSY\"");
    }

    #[test]
    fn test_barcode_format_lookup() {
        let result = SymbolResult {
            format: "QR_CODE".to_string(),
            bytes: b"hi".to_vec(),
            text: "hi".to_string(),
            location: Quadrilateral::default(),
            confidence: None,
        };
        assert_eq!(result.barcode_format(), Some(BarcodeFormat::QrCode));

        let unknown = SymbolResult {
            format: "SOMETHING_ELSE".to_string(),
            ..result
        };
        assert_eq!(unknown.barcode_format(), None);
    }
}
