use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of payload a multimodal asset carries.
///
/// Each variant doubles as the name of the storage bucket its blobs live in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Image,
    Audio,
    Video,
    Pdf,
    Text,
    Timeseries,
    Other,
}

impl Modality {
    pub const ALL: [Modality; 7] = [
        Modality::Image,
        Modality::Audio,
        Modality::Video,
        Modality::Pdf,
        Modality::Text,
        Modality::Timeseries,
        Modality::Other,
    ];

    /// Parse a client-supplied modality tag.
    ///
    /// Unrecognized tags fold to [`Modality::Other`]. Matching is exact on the
    /// trimmed tag, so `"IMAGE"` is not an image.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "image" => Self::Image,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "pdf" => Self::Pdf,
            "text" => Self::Text,
            "timeseries" => Self::Timeseries,
            _ => Self::Other,
        }
    }

    /// Directory name of this modality's bucket under the storage root.
    pub fn bucket(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Pdf => "pdf",
            Self::Text => "text",
            Self::Timeseries => "timeseries",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.bucket())
    }
}
