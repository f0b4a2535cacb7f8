//! Media modalities and extension inference

use crate::error::{MediaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "3d")]
    Mesh,
}

impl Modality {
    pub const ALL: [Modality; 4] = [Modality::Text, Modality::Image, Modality::Audio, Modality::Mesh];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
            Modality::Audio => "audio",
            Modality::Mesh => "3d",
        }
    }

    /// File extensions routed to this modality
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Modality::Text => &["txt", "csv"],
            Modality::Image => &["jpg", "jpeg", "png"],
            Modality::Audio => &["wav", "mp3"],
            Modality::Mesh => &["obj", "stl", "off", "ply"],
        }
    }

    /// Map a file extension (without the dot, any case) to its modality
    pub fn from_extension(ext: &str) -> Result<Self> {
        let ext = ext.to_ascii_lowercase();
        Modality::ALL
            .into_iter()
            .find(|m| m.extensions().contains(&ext.as_str()))
            .ok_or(MediaError::UnsupportedType(ext))
    }

    /// Infer modality from the extension of a filename
    pub fn from_filename(name: &str) -> Result<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| MediaError::UnsupportedType(name.to_string()))?;
        Self::from_extension(ext)
    }

    /// Parse the modality name used in request paths
    pub fn from_name(name: &str) -> Result<Self> {
        Modality::ALL
            .into_iter()
            .find(|m| m.as_str() == name)
            .ok_or_else(|| MediaError::UnsupportedType(name.to_string()))
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_extension_maps_to_exactly_one_modality() {
        for modality in Modality::ALL {
            for ext in modality.extensions() {
                let owners: Vec<_> = Modality::ALL
                    .iter()
                    .filter(|m| m.extensions().contains(ext))
                    .collect();
                assert_eq!(owners, vec![&modality], "ambiguous extension {}", ext);
                assert_eq!(Modality::from_extension(ext).unwrap(), modality);
            }
        }
    }

    #[test]
    fn test_extension_case_insensitive() {
        assert_eq!(Modality::from_extension("PNG").unwrap(), Modality::Image);
        assert_eq!(Modality::from_filename("Track.MP3").unwrap(), Modality::Audio);
        assert_eq!(Modality::from_filename("bunny.ply").unwrap(), Modality::Mesh);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Modality::from_filename("blob.bin").unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedType(_)));
        assert_eq!(err.to_string(), "Unsupported file type");
        assert!(Modality::from_filename("README").is_err());
    }

    #[test]
    fn test_names_round_trip() {
        for modality in Modality::ALL {
            assert_eq!(Modality::from_name(modality.as_str()).unwrap(), modality);
        }
        assert!(Modality::from_name("video").is_err());
        assert_eq!(serde_json::to_string(&Modality::Mesh).unwrap(), "\"3d\"");
    }
}
