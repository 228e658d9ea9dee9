//! This module contains the small closed code sets found in scanner raw
//! headers. Raw integer codes can be converted to these types with
//! `num_traits::FromPrimitive`; the conversions which must never fail
//! (such as the patient position) provide a documented fallback.

use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

/// Patient position code, as stored by the scanner.
///
/// The scanner stores the position as a single bit.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, FromPrimitive)]
pub enum PatientPosition {
    /// Head first, supine.
    Supine = 1,
    /// Head first, prone.
    Prone = 2,
    /// Head first, decubitus left.
    LeftDescending = 4,
    /// Head first, decubitus right.
    RightDescending = 8,
}

impl PatientPosition {
    /// Every position the scanner declares.
    pub const ALL: [PatientPosition; 4] = [
        PatientPosition::Supine,
        PatientPosition::Prone,
        PatientPosition::LeftDescending,
        PatientPosition::RightDescending,
    ];

    /// Map a raw position code to its position.
    /// Unrecognized codes are read as `Supine`.
    pub fn from_code(code: i64) -> Self {
        FromPrimitive::from_i64(code).unwrap_or(PatientPosition::Supine)
    }

    /// The canonical token written to the header.
    pub fn token(&self) -> &'static str {
        match *self {
            PatientPosition::Supine => "HFS",
            PatientPosition::Prone => "HFP",
            PatientPosition::LeftDescending => "HFDL",
            PatientPosition::RightDescending => "HFDR",
        }
    }
}

/// How the raw container lays out its readouts.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLayout {
    /// Legacy per-file container: contiguous, array-ordered readouts.
    Legacy,
    /// Archive container: readouts tagged by control packets.
    Archive,
}

/// Opcode of a control packet in an archive stream.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, FromPrimitive)]
pub enum ControlOpcode {
    /// The packet announces a frame of sample data.
    Scan = 1,
    /// End of acquisition marker.
    Done = 2,
}
