// SPDX-License-Identifier: GPL-3.0-only

//! Runtime decode settings
//!
//! [`RuntimeSettings`] is the typed form of the engine's JSON parameter
//! template. It is serialized with camelCase keys, rejects unknown keys and
//! is range-checked by [`RuntimeSettings::validate`] before it can become
//! active in a [`SettingsStore`].

pub mod store;

pub use store::{ConflictPolicy, SettingsStore};

use crate::constants::settings as defaults;
use crate::errors::{ReaderError, ReaderResult};
use crate::results::TextEncoding;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

macro_rules! tagged_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $prefix:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $tag:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $tag)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Template tag, e.g. `BM_LOCAL_BLOCK`
            pub fn tag(&self) -> &'static str {
                match self {
                    $($name::$variant => $tag,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ReaderError;

            /// Accepts the template tag with or without its prefix
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_ascii_uppercase();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| {
                        let tag = v.tag();
                        tag == wanted || tag.strip_prefix($prefix) == Some(wanted.as_str())
                    })
                    .ok_or_else(|| {
                        ReaderError::Configuration(format!(
                            "unknown {} '{}'",
                            stringify!($name),
                            s
                        ))
                    })
            }
        }
    };
}

tagged_enum! {
    /// Barcode symbologies the engine can be asked to look for
    BarcodeFormat, "BF_" {
        Code39 => "BF_CODE_39",
        Code128 => "BF_CODE_128",
        Code93 => "BF_CODE_93",
        Codabar => "BF_CODABAR",
        Itf => "BF_ITF",
        Ean13 => "BF_EAN_13",
        Ean8 => "BF_EAN_8",
        UpcA => "BF_UPC_A",
        UpcE => "BF_UPC_E",
        Industrial25 => "BF_INDUSTRIAL_25",
        Code39Extended => "BF_CODE_39_EXTENDED",
        Gs1DatabarOmnidirectional => "BF_GS1_DATABAR_OMNIDIRECTIONAL",
        Gs1DatabarTruncated => "BF_GS1_DATABAR_TRUNCATED",
        Gs1DatabarStacked => "BF_GS1_DATABAR_STACKED",
        Gs1DatabarStackedOmnidirectional => "BF_GS1_DATABAR_STACKED_OMNIDIRECTIONAL",
        Gs1DatabarExpanded => "BF_GS1_DATABAR_EXPANDED",
        Gs1DatabarExpandedStacked => "BF_GS1_DATABAR_EXPANDED_STACKED",
        Gs1DatabarLimited => "BF_GS1_DATABAR_LIMITED",
        PatchCode => "BF_PATCHCODE",
        Pdf417 => "BF_PDF417",
        QrCode => "BF_QR_CODE",
        DataMatrix => "BF_DATAMATRIX",
        Aztec => "BF_AZTEC",
        MaxiCode => "BF_MAXICODE",
        MicroQr => "BF_MICRO_QR",
        MicroPdf417 => "BF_MICRO_PDF417",
        Gs1Composite => "BF_GS1_COMPOSITE",
        MsiCode => "BF_MSI_CODE",
        Code11 => "BF_CODE_11",
    }
}

impl BarcodeFormat {
    /// Result format name, e.g. `QR_CODE`
    pub fn as_str(&self) -> &'static str {
        let tag = self.tag();
        tag.strip_prefix("BF_").unwrap_or(tag)
    }
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

tagged_enum! {
    /// Binarization strategies, tried in order
    BinarizationMode, "BM_" {
        Auto => "BM_AUTO",
        LocalBlock => "BM_LOCAL_BLOCK",
        Threshold => "BM_THRESHOLD",
        Skip => "BM_SKIP",
    }
}

tagged_enum! {
    /// Localization strategies, tried in order
    LocalizationMode, "LM_" {
        Auto => "LM_AUTO",
        ConnectedBlocks => "LM_CONNECTED_BLOCKS",
        Statistics => "LM_STATISTICS",
        Lines => "LM_LINES",
        ScanDirectly => "LM_SCAN_DIRECTLY",
        StatisticsMarks => "LM_STATISTICS_MARKS",
        StatisticsPostalCode => "LM_STATISTICS_POSTAL_CODE",
        Centre => "LM_CENTRE",
        OnedFastScan => "LM_ONED_FAST_SCAN",
        Skip => "LM_SKIP",
    }
}

/// Decode configuration applied to every engine call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RuntimeSettings {
    /// Symbologies to search for
    pub barcode_format_ids: Vec<BarcodeFormat>,
    /// Number of barcodes to stop after; 0 means at least one
    pub expected_barcodes_count: i32,
    /// Recognition time limit in milliseconds; 0 means no limit
    pub timeout: i32,
    pub max_algorithm_thread_count: i32,
    /// Images whose shorter edge exceeds this are shrunk first
    pub scale_down_threshold: i32,
    pub pdf_raster_dpi: i32,
    /// Results below this confidence are discarded by the engine
    pub min_result_confidence: i32,
    /// Results with shorter payloads are discarded by the engine
    pub min_barcode_text_length: i32,
    pub deblur_level: i32,
    pub binarization_modes: Vec<BinarizationMode>,
    pub localization_modes: Vec<LocalizationMode>,
    /// How result bytes become text
    pub text_encoding: TextEncoding,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            barcode_format_ids: BarcodeFormat::ALL.to_vec(),
            expected_barcodes_count: 0,
            timeout: defaults::DEFAULT_TIMEOUT_MS,
            max_algorithm_thread_count: defaults::DEFAULT_MAX_ALGORITHM_THREAD_COUNT,
            scale_down_threshold: defaults::DEFAULT_SCALE_DOWN_THRESHOLD,
            pdf_raster_dpi: defaults::DEFAULT_PDF_RASTER_DPI,
            min_result_confidence: 0,
            min_barcode_text_length: 0,
            deblur_level: defaults::DEFAULT_DEBLUR_LEVEL,
            binarization_modes: vec![BinarizationMode::LocalBlock],
            localization_modes: vec![
                LocalizationMode::ConnectedBlocks,
                LocalizationMode::ScanDirectly,
                LocalizationMode::Statistics,
                LocalizationMode::Lines,
            ],
            text_encoding: TextEncoding::default(),
        }
    }
}

fn check_range(key: &str, value: i32, min: i32, max: i32) -> ReaderResult<()> {
    if value < min || value > max {
        return Err(ReaderError::Configuration(format!(
            "{} = {} is outside {}..={}",
            key, value, min, max
        )));
    }
    Ok(())
}

fn check_list<T: Eq + std::hash::Hash + fmt::Debug>(
    key: &str,
    values: &[T],
    max: usize,
) -> ReaderResult<()> {
    if values.is_empty() {
        return Err(ReaderError::Configuration(format!("{} must not be empty", key)));
    }
    if values.len() > max {
        return Err(ReaderError::Configuration(format!(
            "{} holds {} entries, at most {} allowed",
            key,
            values.len(),
            max
        )));
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = values.iter().find(|v| !seen.insert(*v)) {
        return Err(ReaderError::Configuration(format!(
            "{} lists {:?} twice",
            key, duplicate
        )));
    }
    Ok(())
}

impl RuntimeSettings {
    /// Parse a complete or partial settings document
    ///
    /// Missing keys take their defaults. The result is validated.
    pub fn from_json(text: &str) -> ReaderResult<Self> {
        let settings: RuntimeSettings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Pretty-printed JSON of every key
    pub fn to_json(&self) -> ReaderResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every value against its accepted range
    pub fn validate(&self) -> ReaderResult<()> {
        check_list(
            "barcodeFormatIds",
            &self.barcode_format_ids,
            BarcodeFormat::ALL.len(),
        )?;
        check_range("expectedBarcodesCount", self.expected_barcodes_count, 0, i32::MAX)?;
        check_range("timeout", self.timeout, 0, i32::MAX)?;
        check_range(
            "maxAlgorithmThreadCount",
            self.max_algorithm_thread_count,
            1,
            defaults::DEFAULT_MAX_ALGORITHM_THREAD_COUNT,
        )?;
        check_range(
            "scaleDownThreshold",
            self.scale_down_threshold,
            defaults::MIN_SCALE_DOWN_THRESHOLD,
            i32::MAX,
        )?;
        let (dpi_min, dpi_max) = defaults::PDF_RASTER_DPI_RANGE;
        check_range("pdfRasterDpi", self.pdf_raster_dpi, dpi_min, dpi_max)?;
        check_range("minResultConfidence", self.min_result_confidence, 0, 100)?;
        check_range("minBarcodeTextLength", self.min_barcode_text_length, 0, i32::MAX)?;
        check_range("deblurLevel", self.deblur_level, 0, defaults::DEFAULT_DEBLUR_LEVEL)?;
        check_list(
            "binarizationModes",
            &self.binarization_modes,
            defaults::MAX_MODE_ENTRIES,
        )?;
        check_list(
            "localizationModes",
            &self.localization_modes,
            defaults::MAX_MODE_ENTRIES,
        )?;
        Ok(())
    }

    /// Recognition time limit, `None` when unlimited
    pub fn timeout_duration(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_millis(self.timeout as u64))
    }

    /// Whether the given symbology is enabled
    pub fn accepts(&self, format: BarcodeFormat) -> bool {
        self.barcode_format_ids.contains(&format)
    }
}
