//! Request and response models for stem separation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Stem name to public URL, filled only after a confirmed upload.
pub type StemDownloads = BTreeMap<String, String>;

/// Separation granularity selected by the `mode` form field.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum SeparationMode {
    /// `"2"`: vocals and everything else
    #[default]
    #[serde(rename = "2")]
    TwoStems,
    /// any other value: vocals, drums, bass, other
    #[serde(rename = "4")]
    FourStems,
}

impl SeparationMode {
    /// Interpret the raw `mode` field. Missing or blank means two stems;
    /// `"2"` means two stems; anything else selects the four stem split.
    pub fn from_form_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("2") => SeparationMode::TwoStems,
            Some(_) => SeparationMode::FourStems,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeparationMode::TwoStems => "2",
            SeparationMode::FourStems => "4",
        }
    }

    /// Stems produced for this mode, in upload order.
    pub fn stems(&self) -> &'static [Stem] {
        match self {
            SeparationMode::TwoStems => &[Stem::Vocals, Stem::Instrumental],
            SeparationMode::FourStems => &[Stem::Vocals, Stem::Drums, Stem::Bass, Stem::Other],
        }
    }
}

impl fmt::Display for SeparationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One isolated component of the mixed track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Vocals,
    /// Everything but the vocals (two stem mode only)
    Instrumental,
    Drums,
    Bass,
    Other,
}

impl Stem {
    pub fn name(&self) -> &'static str {
        match self {
            Stem::Vocals => "vocals",
            Stem::Instrumental => "instrumental",
            Stem::Drums => "drums",
            Stem::Bass => "bass",
            Stem::Other => "other",
        }
    }

    /// File the separation tool writes for this stem when asked for mp3 output.
    pub fn output_file_name(&self) -> &'static str {
        match self {
            Stem::Vocals => "vocals.mp3",
            Stem::Instrumental => "no_vocals.mp3",
            Stem::Drums => "drums.mp3",
            Stem::Bass => "bass.mp3",
            Stem::Other => "other.mp3",
        }
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Successful separation response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SeparationResponse {
    pub message: String,
    /// Stem name to download URL
    pub downloads: StemDownloads,
    /// Wall-clock seconds for the whole request
    pub processing_time: f64,
    /// Seconds spent inside the separation tool
    pub separation_time: f64,
    /// URL of the stored input, when original uploads are enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_defaults_to_two_stems() {
        assert_eq!(SeparationMode::from_form_value(None), SeparationMode::TwoStems);
        assert_eq!(SeparationMode::from_form_value(Some("")), SeparationMode::TwoStems);
        assert_eq!(SeparationMode::from_form_value(Some(" 2 ")), SeparationMode::TwoStems);
    }

    #[test]
    fn any_other_mode_selects_four_stems() {
        for value in ["4", "3", "four", "22"] {
            assert_eq!(
                SeparationMode::from_form_value(Some(value)),
                SeparationMode::FourStems,
                "mode {value}"
            );
        }
    }

    #[test]
    fn stem_sets_match_mode() {
        let two: Vec<&str> = SeparationMode::TwoStems.stems().iter().map(Stem::name).collect();
        assert_eq!(two, vec!["vocals", "instrumental"]);

        let four: Vec<&str> = SeparationMode::FourStems.stems().iter().map(Stem::name).collect();
        assert_eq!(four, vec!["vocals", "drums", "bass", "other"]);
    }

    #[test]
    fn instrumental_maps_to_no_vocals_output() {
        assert_eq!(Stem::Instrumental.output_file_name(), "no_vocals.mp3");
        assert_eq!(Stem::Drums.output_file_name(), "drums.mp3");
    }

    #[test]
    fn response_omits_missing_original() {
        let response = SeparationResponse {
            message: "Separation complete".to_string(),
            downloads: StemDownloads::new(),
            processing_time: 1.5,
            separation_time: 1.0,
            original_file: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("original_file").is_none());
        assert_eq!(json["processing_time"], 1.5);
    }
}
