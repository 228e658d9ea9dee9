//! This module defines the `NormalizedHeader` struct, the vendor-neutral
//! description of a raw acquisition.
//!
//! The header is built once per conversion by the [`builder`] module and is
//! not modified afterwards. Every numeric field carries a fixed unit, named
//! in its documentation: mm for geometry, T for field strength, Hz for the
//! resonance frequency, ms for sequence timings and degrees for angles.
//! Optional fields are `None` when the source has no value for them, and
//! are left out of the serialized document.
//!
//! [`builder`]: ../builder/index.html

use std::collections::BTreeMap;
use std::convert::TryFrom;

/// The complete normalized header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedHeader {
    /// Patient identity
    pub subject_information: Option<SubjectInformation>,
    /// Study identity
    pub study_information: Option<StudyInformation>,
    /// Series and run identity
    pub measurement_information: Option<MeasurementInformation>,
    /// Scanner and receiver chain
    pub acquisition_system_information: Option<AcquisitionSystemInformation>,
    /// Field conditions, always present
    pub experimental_conditions: ExperimentalConditions,
    /// One entry per encoding space. Never empty for a built header.
    pub encoding: Vec<EncodingSpace>,
    /// Sequence timings and flip angle
    pub sequence_parameters: Option<SequenceParameters>,
    /// Vendor parameters without a dedicated element
    pub user_parameters: Option<UserParameters>,
}

/// `subjectInformation` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectInformation {
    /// `patientName`
    pub patient_name: Option<String>,
    /// kg
    pub patient_weight_kg: Option<f64>,
    /// `patientID`
    pub patient_id: Option<String>,
    /// `YYYY-MM-DD`
    pub patient_birthdate: Option<String>,
    /// `M`, `F` or `O`
    pub patient_gender: Option<String>,
}

/// `studyInformation` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudyInformation {
    /// `YYYY-MM-DD`
    pub study_date: Option<String>,
    /// `HH:MM:SS`
    pub study_time: Option<String>,
    /// Study number
    pub study_id: Option<String>,
    /// `accessionNumber`
    pub accession_number: Option<String>,
    /// `referringPhysicianName`
    pub referring_physician_name: Option<String>,
    /// `studyDescription`
    pub study_description: Option<String>,
    /// `studyInstanceUID`
    pub study_instance_uid: Option<String>,
}

/// `measurementInformation` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementInformation {
    /// Run number
    pub measurement_id: Option<String>,
    /// `YYYY-MM-DD`
    pub series_date: Option<String>,
    /// `HH:MM:SS`
    pub series_time: Option<String>,
    /// One of `HFS`, `HFP`, `HFDL`, `HFDR`.
    pub patient_position: String,
    /// `initialSeriesNumber`
    pub initial_series_number: Option<i64>,
    /// `protocolName`
    pub protocol_name: Option<String>,
    /// `seriesDescription`
    pub series_description: Option<String>,
    /// `seriesInstanceUIDRoot`
    pub series_instance_uid_root: Option<String>,
    /// Pulse sequence name
    pub sequence_name: Option<String>,
}

/// `acquisitionSystemInformation` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionSystemInformation {
    /// `systemVendor`
    pub system_vendor: Option<String>,
    /// `systemModel`
    pub system_model: Option<String>,
    /// T
    pub system_field_strength_t: Option<f64>,
    /// `receiverChannels`
    pub receiver_channels: Option<u32>,
    /// `institutionName`
    pub institution_name: Option<String>,
    /// `stationName`
    pub station_name: Option<String>,
    /// `deviceSerialNumber`
    pub device_serial_number: Option<String>,
}

/// `experimentalConditions` section.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExperimentalConditions {
    /// Hz
    pub h1_resonance_frequency_hz: i64,
}

/// Matrix size of a space, in samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatrixSize {
    /// Readout
    pub x: u32,
    /// Phase encoding
    pub y: u32,
    /// Slice or partition
    pub z: u32,
}

/// Field of view of a space, mm.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldOfView {
    /// Readout
    pub x: f64,
    /// Phase encoding
    pub y: f64,
    /// Slice or slab
    pub z: f64,
}

/// A grid and its extent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Space {
    /// Samples per axis
    pub matrix_size: MatrixSize,
    /// Extent per axis
    pub field_of_view_mm: FieldOfView,
}

/// Range of an encoding counter.
///
/// A built limit always satisfies `minimum <= center <= maximum`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limit {
    /// First counter value
    pub minimum: u32,
    /// Last counter value
    pub maximum: u32,
    /// Counter value at the k-space center
    pub center: u32,
}

impl Limit {
    /// The limit of a dimension that is not used by the acquisition.
    pub const UNUSED: Limit = Limit {
        minimum: 0,
        maximum: 0,
        center: 0,
    };

    /// The limit of a dimension with `count` positions, centered at
    /// `count / 2`. A count of 0 is read as 1, and counts beyond the
    /// counter width saturate.
    pub fn from_count(count: usize) -> Self {
        let count = u32::try_from(count.max(1)).unwrap_or(u32::MAX);
        Limit {
            minimum: 0,
            maximum: count - 1,
            center: count / 2,
        }
    }

    /// Whether the limit is ordered.
    pub fn is_valid(&self) -> bool {
        self.minimum <= self.center && self.center <= self.maximum
    }
}

/// Limits of every encoding counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodingLimits {
    /// Phase-encoding views
    pub kspace_encoding_step_1: Limit,
    /// Partitions, unused in 2D
    pub kspace_encoding_step_2: Limit,
    /// Always unused
    pub average: Limit,
    /// Slices, unused in 3D
    pub slice: Limit,
    /// Echoes
    pub contrast: Limit,
    /// Phases
    pub phase: Limit,
    /// Passes
    pub repetition: Limit,
    /// Always unused
    pub set: Limit,
    /// Echo train positions, unused without an echo train
    pub segment: Limit,
}

impl EncodingLimits {
    /// All limits, paired with their element names.
    pub fn named(&self) -> [(&'static str, Limit); 9] {
        [
            ("kspace_encoding_step_1", self.kspace_encoding_step_1),
            ("kspace_encoding_step_2", self.kspace_encoding_step_2),
            ("average", self.average),
            ("slice", self.slice),
            ("contrast", self.contrast),
            ("phase", self.phase),
            ("repetition", self.repetition),
            ("set", self.set),
            ("segment", self.segment),
        ]
    }

    /// Mutable access to a limit by its element name.
    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut Limit> {
        match name {
            "kspace_encoding_step_1" => Some(&mut self.kspace_encoding_step_1),
            "kspace_encoding_step_2" => Some(&mut self.kspace_encoding_step_2),
            "average" => Some(&mut self.average),
            "slice" => Some(&mut self.slice),
            "contrast" => Some(&mut self.contrast),
            "phase" => Some(&mut self.phase),
            "repetition" => Some(&mut self.repetition),
            "set" => Some(&mut self.set),
            "segment" => Some(&mut self.segment),
            _ => None,
        }
    }
}

/// One encoding space: the acquired grid, the target grid and the
/// counter limits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodingSpace {
    /// Sampled grid
    pub encoded_space: Space,
    /// Reconstructed grid
    pub recon_space: Space,
    /// Counter limits
    pub encoding_limits: EncodingLimits,
    /// k-space trajectory, `cartesian`
    pub trajectory: String,
}

/// `sequenceParameters` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceParameters {
    /// ms
    pub tr: Vec<f64>,
    /// ms
    pub te: Vec<f64>,
    /// ms
    pub ti: Vec<f64>,
    /// degrees
    pub flip_angle_deg: Vec<f64>,
    /// DICOM scanning sequence
    pub sequence_type: Option<String>,
}

/// Free-form typed parameters, keyed by stable names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserParameters {
    /// `userParameterLong`
    pub long: BTreeMap<String, i64>,
    /// `userParameterDouble`
    pub double: BTreeMap<String, f64>,
    /// `userParameterString`
    pub string: BTreeMap<String, String>,
}

impl UserParameters {
    /// Whether there is no parameter at all.
    pub fn is_empty(&self) -> bool {
        self.long.is_empty() && self.double.is_empty() && self.string.is_empty()
    }

    /// Total number of parameters.
    pub fn len(&self) -> usize {
        self.long.len() + self.double.len() + self.string.len()
    }
}
