//! Which face to analyse when a frame holds more than one.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::types::BoundingBox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceSelection {
    /// The first face in detector output order.
    ///
    /// `ScrfdDetector` returns faces sorted by descending confidence, so with
    /// that detector this picks the same face as `MostConfident`. Only
    /// detectors with another output order make the two differ.
    #[default]
    First,
    /// The face with the largest box area.
    Largest,
    /// The face with the highest detector confidence.
    MostConfident,
}

impl FaceSelection {
    /// Pick one face. Ties keep the earliest candidate.
    pub fn select<'a>(&self, faces: &'a [BoundingBox]) -> Option<&'a BoundingBox> {
        self.select_index(faces).map(|i| &faces[i])
    }

    pub fn select_index(&self, faces: &[BoundingBox]) -> Option<usize> {
        match self {
            FaceSelection::First => (!faces.is_empty()).then_some(0),
            FaceSelection::Largest => best_by(faces, BoundingBox::area),
            FaceSelection::MostConfident => best_by(faces, |f| f.confidence),
        }
    }
}

fn best_by(faces: &[BoundingBox], key: impl Fn(&BoundingBox) -> f32) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, face) in faces.iter().enumerate() {
        let k = key(face);
        if best.map_or(true, |(_, b)| k > b) {
            best = Some((i, k));
        }
    }
    best.map(|(i, _)| i)
}

impl FromStr for FaceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(FaceSelection::First),
            "largest" => Ok(FaceSelection::Largest),
            "most_confident" | "most-confident" => Ok(FaceSelection::MostConfident),
            other => Err(format!("unknown face selection: {other}")),
        }
    }
}
