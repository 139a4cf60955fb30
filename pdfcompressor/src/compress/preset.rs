//! Compression presets.
//!
//! Presets are a fixed table ordered from most to least aggressive. Each
//! strictly raises both the image resolution and the JPEG quality of the one
//! before it.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::error::ValidationError;

/// Named compression quality level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionPreset {
    /// Smallest output, on-screen viewing only.
    Screen,
    /// Medium quality, e-readers.
    #[default]
    Ebook,
    /// High quality for office printing.
    Printer,
    /// Highest quality, colour-preserving.
    Prepress,
}

/// Parameters a preset stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetParams {
    /// Target resolution for downsampled images.
    pub dpi: u32,
    /// JPEG quality percentage.
    pub quality: u8,
    /// Human-readable label.
    pub label: &'static str,
}

impl CompressionPreset {
    /// All presets, least to most quality.
    pub const ALL: [CompressionPreset; 4] = [
        CompressionPreset::Screen,
        CompressionPreset::Ebook,
        CompressionPreset::Printer,
        CompressionPreset::Prepress,
    ];

    pub fn params(&self) -> PresetParams {
        match self {
            CompressionPreset::Screen => PresetParams {
                dpi: 72,
                quality: 30,
                label: "Screen (smallest size, 72 dpi)",
            },
            CompressionPreset::Ebook => PresetParams {
                dpi: 150,
                quality: 50,
                label: "eBook (medium quality, 150 dpi)",
            },
            CompressionPreset::Printer => PresetParams {
                dpi: 300,
                quality: 80,
                label: "Printer (high quality, 300 dpi)",
            },
            CompressionPreset::Prepress => PresetParams {
                dpi: 400,
                quality: 90,
                label: "Prepress (highest quality, 400 dpi)",
            },
        }
    }

    /// Identifier as accepted by [`FromStr`].
    pub fn id(&self) -> &'static str {
        match self {
            CompressionPreset::Screen => "screen",
            CompressionPreset::Ebook => "ebook",
            CompressionPreset::Printer => "printer",
            CompressionPreset::Prepress => "prepress",
        }
    }

    pub fn dpi(&self) -> u32 {
        self.params().dpi
    }

    pub fn quality(&self) -> u8 {
        self.params().quality
    }

    pub fn label(&self) -> &'static str {
        self.params().label
    }

    /// Whether the built-in compressor also strips document metadata.
    pub fn strips_metadata(&self) -> bool {
        matches!(self, CompressionPreset::Screen | CompressionPreset::Ebook)
    }
}

impl fmt::Display for CompressionPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for CompressionPreset {
    type Err = ValidationError;

    /// Accepts `ebook`, `/ebook` and any casing of either.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim();
        let id = id.strip_prefix('/').unwrap_or(id);
        CompressionPreset::ALL
            .into_iter()
            .find(|p| p.id().eq_ignore_ascii_case(id))
            .ok_or_else(|| ValidationError::UnknownPreset(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_preset_ids() {
        assert_eq!("screen".parse(), Ok(CompressionPreset::Screen));
        assert_eq!("/ebook".parse(), Ok(CompressionPreset::Ebook));
        assert_eq!(" Printer ".parse(), Ok(CompressionPreset::Printer));
        assert_eq!("/PREPRESS".parse(), Ok(CompressionPreset::Prepress));
    }

    #[test]
    fn test_unknown_preset_is_rejected() {
        let err = "default".parse::<CompressionPreset>().unwrap_err();
        assert_eq!(err, ValidationError::UnknownPreset("default".to_string()));
        assert!("".parse::<CompressionPreset>().is_err());
    }

    #[test]
    fn test_table_values() {
        assert_eq!(CompressionPreset::Screen.dpi(), 72);
        assert_eq!(CompressionPreset::Ebook.quality(), 50);
        assert_eq!(CompressionPreset::Prepress.dpi(), 400);
        assert_eq!(CompressionPreset::default(), CompressionPreset::Ebook);
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for preset in CompressionPreset::ALL {
            assert_eq!(preset.to_string().parse(), Ok(preset));
        }
    }

    proptest! {
        #[test]
        fn test_ordering_is_monotonic_in_dpi_and_quality(a in 0usize..4, b in 0usize..4) {
            let (pa, pb) = (CompressionPreset::ALL[a], CompressionPreset::ALL[b]);
            if pa < pb {
                prop_assert!(pa.dpi() < pb.dpi());
                prop_assert!(pa.quality() < pb.quality());
            }
        }
    }
}
