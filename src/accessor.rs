//! The read-only capability interface over a parsed raw container.
//!
//! Parsing the proprietary container is not this crate's business: anything
//! that can answer the questions in [`MetadataAccessor`] can be converted.
//! The crate ships one implementation, [`Snapshot`], which is also what the
//! tests use.
//!
//! [`MetadataAccessor`]: ./trait.MetadataAccessor.html
//! [`Snapshot`]: ../snapshot/struct.Snapshot.html

use crate::error::{ConvertError, Result};
use crate::typedef::SourceLayout;
use ndarray::{Array1, Array2};
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

/// A named processing-control value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// Boolean flag
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Free text
    Text(String),
}

/// Conversion from a [`ScalarValue`] into a concrete type.
///
/// Lenient conversion follows the usual widening rules of the scanner's
/// processing control (integers read as floats, booleans as 0/1, non-zero
/// integers as `true`); strict conversion accepts only the exact variant.
///
/// [`ScalarValue`]: ./enum.ScalarValue.html
pub trait FromScalar: Sized {
    /// Name of the type, for error reporting.
    const TYPE_NAME: &'static str;

    /// Convert with widening.
    fn from_lenient(value: &ScalarValue) -> Option<Self>;

    /// Convert only from the matching variant.
    fn from_strict(value: &ScalarValue) -> Option<Self>;
}

impl FromScalar for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_lenient(value: &ScalarValue) -> Option<Self> {
        match *value {
            ScalarValue::Bool(b) => Some(b),
            ScalarValue::Int(i) => Some(i != 0),
            _ => None,
        }
    }

    fn from_strict(value: &ScalarValue) -> Option<Self> {
        match *value {
            ScalarValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl FromScalar for i64 {
    const TYPE_NAME: &'static str = "integer";

    fn from_lenient(value: &ScalarValue) -> Option<Self> {
        match *value {
            ScalarValue::Int(i) => Some(i),
            ScalarValue::Bool(b) => Some(i64::from(b)),
            ScalarValue::Float(f) if f.fract() == 0.0 => Some(f as i64),
            _ => None,
        }
    }

    fn from_strict(value: &ScalarValue) -> Option<Self> {
        match *value {
            ScalarValue::Int(i) => Some(i),
            _ => None,
        }
    }
}

impl FromScalar for f64 {
    const TYPE_NAME: &'static str = "float";

    fn from_lenient(value: &ScalarValue) -> Option<Self> {
        match *value {
            ScalarValue::Float(f) => Some(f),
            ScalarValue::Int(i) => Some(i as f64),
            _ => None,
        }
    }

    fn from_strict(value: &ScalarValue) -> Option<Self> {
        match *value {
            ScalarValue::Float(f) => Some(f),
            _ => None,
        }
    }
}

impl FromScalar for String {
    const TYPE_NAME: &'static str = "text";

    fn from_lenient(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Text(s) => Some(s.clone()),
            ScalarValue::Int(i) => Some(i.to_string()),
            ScalarValue::Float(f) => Some(f.to_string()),
            ScalarValue::Bool(b) => Some(b.to_string()),
        }
    }

    fn from_strict(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Patient module of the raw container.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientModule {
    /// Patient name, DICOM person name format
    pub name: String,
    /// Patient identifier
    pub id: String,
    /// `YYYYMMDD`
    pub birthdate: String,
    /// `M`, `F` or `O`
    pub gender: String,
    /// Age string, such as `042Y`
    pub age: String,
    /// kg, as text
    pub weight: String,
    /// Free-text patient history
    pub history: String,
}

/// Study module of the raw container.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyModule {
    /// Study number assigned by the scanner
    pub number: i64,
    /// Study instance UID
    pub uid: String,
    /// Study description
    pub description: String,
    /// `YYYYMMDD`
    pub date: String,
    /// `HHMMSS`
    pub time: String,
    /// Referring physician name
    pub referring_physician: String,
    /// Accession number
    pub accession_number: String,
    /// Reading physician name
    pub reading_physician: String,
}

/// Series module of the raw container.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesModule {
    /// Series number
    pub number: i64,
    /// Series instance UID
    pub uid: String,
    /// Series description
    pub description: String,
    /// Laterality of the imaged body part
    pub laterality: String,
    /// `YYYYMMDD`
    pub date: String,
    /// `HHMMSS`
    pub time: String,
    /// Protocol name
    pub protocol_name: String,
    /// Operator name
    pub operator_name: String,
    /// Performed procedure step description
    pub pps_description: String,
}

/// Equipment module of the raw container.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquipmentModule {
    /// Manufacturer
    pub manufacturer: String,
    /// Institution name
    pub institution: String,
    /// Station name
    pub station: String,
    /// Manufacturer model name
    pub manufacturer_model: String,
    /// Device serial number
    pub device_serial_number: String,
    /// Scanner software version
    pub software_version: String,
    /// Station of the performed procedure step
    pub pps_performed_station: String,
    /// Location of the performed procedure step
    pub pps_performed_location: String,
}

/// Image module of the raw container. Numeric DICOM attributes are kept as
/// the decimal strings the scanner writes.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageModule {
    /// Pulse sequence name, used for sequence mapping
    pub psd_name: String,
    /// Internal pulse sequence name
    pub psd_internal_name: String,
    /// ms
    pub echo_time: String,
    /// ms
    pub repetition_time: String,
    /// ms, empty when not an inversion recovery sequence
    pub inversion_time: String,
    /// DICOM image type
    pub image_type: String,
    /// DICOM scanning sequence, such as `GR`
    pub scan_sequence: String,
    /// DICOM sequence variant
    pub sequence_variant: String,
    /// DICOM scan options
    pub scan_options: String,
    /// Acquisition type code
    pub acquisition_type: i64,
    /// Phase encoding direction code
    pub phase_encode_direction: i64,
    /// MHz
    pub imaging_frequency: String,
    /// T
    pub magnetic_field_strength: String,
    /// mm
    pub slice_spacing: String,
    /// degrees
    pub flip_angle: String,
    /// Views per excitation, as text
    pub echo_train_length: String,
    /// `YYYYMMDD`
    pub acquisition_date: String,
    /// `HHMMSS`
    pub acquisition_time: String,
    /// `YYYYMMDD`
    pub image_date: String,
    /// `HHMMSS`
    pub image_time: String,
    /// Direction cosines, backslash separated
    pub image_orientation: String,
    /// Position of the first voxel, mm, backslash separated
    pub image_position: String,
    /// mm
    pub slice_thickness: f64,
    /// mm
    pub slice_location: f64,
    /// mm
    pub pixel_size_x: f64,
    /// mm
    pub pixel_size_y: f64,
    /// Second echo flag, as text
    pub second_echo: String,
    /// The image header's `user0..user48` scratch fields.
    pub user: Vec<f32>,
}

/// Fields read straight from the raw acquisition header.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawHeader {
    /// Second echo time, µs
    pub te2: i64,
    /// Receive bandwidth, kHz
    pub bandwidth: f32,
    /// Coil name
    pub coil: String,
    /// The raw header's `user0..user48` scratch fields.
    pub user: Vec<f32>,
}

/// Per-channel receiver noise statistics.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseStatistics {
    /// Mean noise level, one value per channel
    pub mean: Vec<f32>,
    /// Noise standard deviation, one value per channel
    pub std_dev: Vec<f32>,
}

/// Facts about the container layout itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutInfo {
    /// Container generation
    pub layout: SourceLayout,
    /// Legacy only: views are stored in acquisition order rather than the
    /// default repetition/slice/baseline/view order.
    #[serde(default)]
    pub raw_mode: bool,
    /// Legacy only: blocks are addressed by (pass, slice) pairs.
    #[serde(default)]
    pub z_encoded: bool,
    /// Run number of the scan
    #[serde(default)]
    pub run_number: u32,
    /// Legacy only: number of raw view positions, baselines included.
    #[serde(default)]
    pub raw_view_count: usize,
}

/// Address of one complex block of a legacy container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCoord {
    /// Default addressing by slice, echo, channel and phase.
    Slice {
        /// Slice or partition
        slice: usize,
        /// Echo
        echo: usize,
        /// Receiver channel
        channel: usize,
        /// Cardiac or temporal phase
        phase: usize,
    },
    /// Z-encoded addressing by a (pass, slice) pair.
    PassSlice {
        /// Acquisition pass
        pass: usize,
        /// Slice within the pass
        slice: usize,
        /// Echo
        echo: usize,
        /// Receiver channel
        channel: usize,
    },
}

/// One entry of an archive control stream: the raw control packet and the
/// sample frames that follow it. Each frame holds `readout × channels`
/// samples, channel by channel.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Raw control packet bytes
    pub packet: Vec<u8>,
    /// Sample frames following the packet, normally exactly one
    #[serde(default)]
    pub frames: Vec<Vec<Complex32>>,
}

/// Sequential reader over an archive control stream.
pub type ControlStream<'a> = Box<dyn Iterator<Item = Result<ArchiveEntry>> + 'a>;

/// Typed read-only view over a parsed raw container.
///
/// Implementations must allow concurrent block reads: the legacy extraction
/// reads disjoint blocks from several threads.
pub trait MetadataAccessor: Sync {
    /// Look up a processing-control value by name.
    fn scalar(&self, name: &str) -> Option<&ScalarValue>;

    /// Patient module.
    fn patient(&self) -> &PatientModule;

    /// Study module.
    fn study(&self) -> &StudyModule;

    /// Series module.
    fn series(&self) -> &SeriesModule;

    /// Equipment module.
    fn equipment(&self) -> &EquipmentModule;

    /// Image module.
    fn image(&self) -> &ImageModule;

    /// Raw acquisition header.
    fn raw_header(&self) -> &RawHeader;

    /// Receiver noise statistics, when the container recorded them.
    fn noise(&self) -> Option<&NoiseStatistics>;

    /// Container layout facts.
    fn layout(&self) -> &LayoutInfo;

    /// Read one complex block of a legacy container, shaped `(views, readout)`.
    fn complex_block(&self, coord: BlockCoord) -> Result<Array2<Complex32>>;

    /// Read the samples at one raw view position of a legacy container.
    fn raw_view(&self, view: usize, channel: usize) -> Result<Array1<Complex32>>;

    /// Open the control stream of an archive container.
    fn control_stream(&self) -> Result<ControlStream<'_>>;
}

/// Typed scalar lookups, available on every accessor.
pub trait ScalarLookup {
    /// Fetch a value, converting leniently.
    /// Fails with `FieldMissing` if absent, `TypeMismatch` if not convertible.
    fn value<T: FromScalar>(&self, name: &str) -> Result<T>;

    /// Fetch a value of exactly the requested type.
    fn value_strict<T: FromScalar>(&self, name: &str) -> Result<T>;

    /// Fetch a value, converting leniently, `None` if absent.
    fn value_optional<T: FromScalar>(&self, name: &str) -> Result<Option<T>>;
}

impl<A> ScalarLookup for A
where
    A: MetadataAccessor + ?Sized,
{
    fn value<T: FromScalar>(&self, name: &str) -> Result<T> {
        self.value_optional(name)?
            .ok_or_else(|| ConvertError::FieldMissing(name.to_string()))
    }

    fn value_strict<T: FromScalar>(&self, name: &str) -> Result<T> {
        let v = self
            .scalar(name)
            .ok_or_else(|| ConvertError::FieldMissing(name.to_string()))?;
        T::from_strict(v).ok_or_else(|| ConvertError::TypeMismatch(name.to_string(), T::TYPE_NAME))
    }

    fn value_optional<T: FromScalar>(&self, name: &str) -> Result<Option<T>> {
        match self.scalar(name) {
            None => Ok(None),
            Some(v) => T::from_lenient(v)
                .map(Some)
                .ok_or_else(|| ConvertError::TypeMismatch(name.to_string(), T::TYPE_NAME)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_conversions() {
        assert_eq!(bool::from_lenient(&ScalarValue::Int(3)), Some(true));
        assert_eq!(bool::from_lenient(&ScalarValue::Int(0)), Some(false));
        assert_eq!(i64::from_lenient(&ScalarValue::Bool(true)), Some(1));
        assert_eq!(i64::from_lenient(&ScalarValue::Float(4.0)), Some(4));
        assert_eq!(i64::from_lenient(&ScalarValue::Float(4.5)), None);
        assert_eq!(f64::from_lenient(&ScalarValue::Int(7)), Some(7.0));
        assert_eq!(
            String::from_lenient(&ScalarValue::Int(7)),
            Some("7".to_string())
        );
        assert_eq!(f64::from_lenient(&ScalarValue::Text("1".into())), None);
    }

    #[test]
    fn strict_conversions() {
        assert_eq!(bool::from_strict(&ScalarValue::Int(1)), None);
        assert_eq!(bool::from_strict(&ScalarValue::Bool(true)), Some(true));
        assert_eq!(i64::from_strict(&ScalarValue::Float(1.0)), None);
        assert_eq!(f64::from_strict(&ScalarValue::Int(1)), None);
    }

    #[test]
    fn untagged_scalars_from_json() {
        let v: Vec<ScalarValue> = serde_json::from_str(r#"[true, 3, 2.5, "x"]"#).unwrap();
        assert_eq!(
            v,
            vec![
                ScalarValue::Bool(true),
                ScalarValue::Int(3),
                ScalarValue::Float(2.5),
                ScalarValue::Text("x".to_string()),
            ]
        );
    }
}
