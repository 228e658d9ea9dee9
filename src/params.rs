//! The user-parameter table.
//!
//! Downstream consumers rely on a fixed set of named scanner and
//! reconstruction parameters, copied into the header's typed user parameter
//! maps. The set is declared here as data: each entry names its source, its
//! value type and whether a missing source value is fatal.

use std::borrow::Cow;
use std::fmt;

use crate::accessor::{MetadataAccessor, ScalarLookup};
use crate::error::Result;
use crate::util::{normalize_date, normalize_time, parse_decimal};

/// Number of `user` scratch fields in the image and raw headers.
pub const USER_FIELD_COUNT: usize = 49;

/// Value type of a user parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// 64-bit integer
    Long,
    /// Floating point
    Double,
    /// Text
    String,
}

/// Whether the absence of a source value aborts the header build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requirement {
    /// Absence is a `FieldMissing` error
    Required,
    /// Absence omits the parameter with a warning
    Optional,
}

/// Where a user parameter takes its value from.
#[derive(Clone, Copy)]
pub enum ParamSource {
    /// A processing-control value.
    Control(&'static str),
    /// A `user` field of the image header.
    ImageUser(usize),
    /// A `user` field of the raw header.
    ReconUser(usize),
    /// A text field of one of the metadata modules. Empty text is absent.
    Text(fn(&dyn MetadataAccessor) -> String),
    /// A numeric field of one of the metadata modules.
    Number(fn(&dyn MetadataAccessor) -> Option<f64>),
    /// A fixed value.
    Constant(&'static str),
}

impl fmt::Debug for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParamSource::Control(name) => write!(f, "Control({:?})", name),
            ParamSource::ImageUser(i) => write!(f, "ImageUser({})", i),
            ParamSource::ReconUser(i) => write!(f, "ReconUser({})", i),
            ParamSource::Text(_) => f.write_str("Text"),
            ParamSource::Number(_) => f.write_str("Number"),
            ParamSource::Constant(v) => write!(f, "Constant({:?})", v),
        }
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// `userParameterLong`
    Long(i64),
    /// `userParameterDouble`
    Double(f64),
    /// `userParameterString`
    String(String),
}

/// One entry of the user-parameter table.
#[derive(Debug, Clone)]
pub struct UserParameter {
    /// Parameter name in the header
    pub name: Cow<'static, str>,
    /// Value type
    pub kind: ParamKind,
    /// Where the value is read from
    pub source: ParamSource,
    /// Whether a missing value aborts the build
    pub requirement: Requirement,
}

impl UserParameter {
    fn number(&self, value: f64) -> ParamValue {
        match self.kind {
            ParamKind::Long => ParamValue::Long(value.round() as i64),
            ParamKind::Double => ParamValue::Double(value),
            ParamKind::String => ParamValue::String(value.to_string()),
        }
    }

    fn text(&self, value: String) -> Option<ParamValue> {
        match self.kind {
            ParamKind::String => Some(ParamValue::String(value)),
            _ => parse_decimal(&value).map(|v| self.number(v)),
        }
    }

    /// Read the parameter from a source, `None` if the source has no value.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if a processing-control value cannot be read as the
    /// parameter's type.
    pub fn read(&self, source: &dyn MetadataAccessor) -> Result<Option<ParamValue>> {
        Ok(match self.source {
            ParamSource::Control(name) => match self.kind {
                ParamKind::Long => source.value_optional::<i64>(name)?.map(ParamValue::Long),
                ParamKind::Double => source.value_optional::<f64>(name)?.map(ParamValue::Double),
                ParamKind::String => source
                    .value_optional::<String>(name)?
                    .map(ParamValue::String),
            },
            ParamSource::ImageUser(i) => source
                .image()
                .user
                .get(i)
                .map(|v| self.number(f64::from(*v))),
            ParamSource::ReconUser(i) => source
                .raw_header()
                .user
                .get(i)
                .map(|v| self.number(f64::from(*v))),
            ParamSource::Text(f) => {
                let text = f(source);
                if text.trim().is_empty() {
                    None
                } else {
                    self.text(text)
                }
            }
            ParamSource::Number(f) => f(source).map(|v| self.number(v)),
            ParamSource::Constant(v) => self.text(v.to_string()),
        })
    }
}

fn entry(
    name: &'static str,
    kind: ParamKind,
    source: ParamSource,
    requirement: Requirement,
) -> UserParameter {
    UserParameter {
        name: Cow::Borrowed(name),
        kind,
        source,
        requirement,
    }
}

const REQUIRED_CONTROL: &[&str] = &[
    "AcquiredXRes",
    "AcquiredYRes",
    "AcquiredZRes",
    "TransformXRes",
    "TransformYRes",
    "TransformZRes",
    "NumChannels",
    "NumEchoes",
    "NumPhases",
    "Is3DAcquisition",
    "ChopX",
    "ChopY",
    "ChopZ",
    "HalfNex",
    "HalfEcho",
];

const OPTIONAL_CONTROL: &[&str] = &[
    "NumAcquisitions",
    "NumSlices",
    "NumVolumes",
    "NumBaselineViews",
    "DataSampleSize",
    "PatientEntry",
    "PatientPosition",
    "ExamNumber",
    "CoilConfigUID",
    "Asset",
    "EvenEchoFrequencyFlip",
    "OddEchoFrequencyFlip",
    "EvenEchoPhaseFlip",
    "OddEchoPhaseFlip",
    "NoFrequencyWrapData",
    "NoPhaseWrapData",
    "CreateMagnitudeImages",
    "CreatePhaseImages",
];

/// Build the complete user-parameter table, in emission order.
pub fn user_parameter_table() -> Vec<UserParameter> {
    use self::ParamKind::*;
    use self::ParamSource::*;
    use self::Requirement::*;

    let mut table = Vec::new();
    for &name in REQUIRED_CONTROL {
        table.push(entry(name, Long, Control(name), Required));
    }
    for &name in OPTIONAL_CONTROL {
        table.push(entry(name, Long, Control(name), Optional));
    }
    table.push(entry("ScanCenter", Double, Control("ScanCenter"), Optional));
    table.push(entry("Landmark", Double, Control("Landmark"), Optional));

    table.extend(vec![
        entry(
            "RunNumber",
            Long,
            Number(|s| Some(f64::from(s.layout().run_number))),
            Required,
        ),
        entry("StudyNumber", Long, Number(|s| Some(s.study().number as f64)), Optional),
        entry("SeriesNumber", Long, Number(|s| Some(s.series().number as f64)), Optional),
        entry(
            "AcquisitionType",
            Long,
            Number(|s| Some(s.image().acquisition_type as f64)),
            Optional,
        ),
        entry(
            "PhaseEncodeDirection",
            Long,
            Number(|s| Some(s.image().phase_encode_direction as f64)),
            Optional,
        ),
        entry("SliceThickness", Double, Number(|s| Some(s.image().slice_thickness)), Optional),
        entry("SliceLocation", Double, Number(|s| Some(s.image().slice_location)), Optional),
        entry("PixelSizeX", Double, Number(|s| Some(s.image().pixel_size_x)), Optional),
        entry("PixelSizeY", Double, Number(|s| Some(s.image().pixel_size_y)), Optional),
        entry(
            "SliceSpacing",
            Double,
            Number(|s| parse_decimal(&s.image().slice_spacing)),
            Optional,
        ),
        entry(
            "EchoTrainLength",
            Double,
            Number(|s| parse_decimal(&s.image().echo_train_length)),
            Optional,
        ),
        entry(
            "ReceiverBandwidth",
            Double,
            Number(|s| Some(f64::from(s.raw_header().bandwidth)).filter(|bw| *bw > 0.)),
            Optional,
        ),
    ]);

    table.extend(vec![
        entry("PSDNameInternal", String, Text(|s| s.image().psd_internal_name.clone()), Optional),
        entry("ImageType", String, Text(|s| s.image().image_type.clone()), Optional),
        entry("ScanSequence", String, Text(|s| s.image().scan_sequence.clone()), Optional),
        entry("SequenceVariant", String, Text(|s| s.image().sequence_variant.clone()), Optional),
        entry("ScanOptions", String, Text(|s| s.image().scan_options.clone()), Optional),
        entry("ImageOrientation", String, Text(|s| s.image().image_orientation.clone()), Optional),
        entry("ImagePosition", String, Text(|s| s.image().image_position.clone()), Optional),
        entry("SecondEcho", String, Text(|s| s.image().second_echo.clone()), Optional),
        entry("Coil", String, Text(|s| s.raw_header().coil.clone()), Optional),
        entry("Laterality", String, Text(|s| s.series().laterality.clone()), Optional),
        entry("PpsDescription", String, Text(|s| s.series().pps_description.clone()), Optional),
        entry(
            "SoftwareVersion",
            String,
            Text(|s| s.equipment().software_version.clone()),
            Optional,
        ),
        entry(
            "PpsPerformedStation",
            String,
            Text(|s| s.equipment().pps_performed_station.clone()),
            Optional,
        ),
        entry(
            "PpsPerformedLocation",
            String,
            Text(|s| s.equipment().pps_performed_location.clone()),
            Optional,
        ),
        entry("PatientAge", String, Text(|s| s.patient().age.clone()), Optional),
        entry("PatientHistory", String, Text(|s| s.patient().history.clone()), Optional),
        entry("OperatorName", String, Text(|s| s.series().operator_name.clone()), Optional),
        entry("ReadingPhysician", String, Text(|s| s.study().reading_physician.clone()), Optional),
        entry(
            "AcquisitionDate",
            String,
            Text(|s| normalize_date(&s.image().acquisition_date)),
            Optional,
        ),
        entry(
            "AcquisitionTime",
            String,
            Text(|s| normalize_time(&s.image().acquisition_time)),
            Optional,
        ),
        entry("ImageDate", String, Text(|s| normalize_date(&s.image().image_date)), Optional),
        entry("ImageTime", String, Text(|s| normalize_time(&s.image().image_time)), Optional),
        entry("ConverterName", String, Constant(env!("CARGO_PKG_NAME")), Required),
        entry("ConverterVersion", String, Constant(env!("CARGO_PKG_VERSION")), Required),
    ]);

    for i in 0..USER_FIELD_COUNT {
        table.push(UserParameter {
            name: Cow::Owned(format!("UserVariable{}", i)),
            kind: Double,
            source: ImageUser(i),
            requirement: Optional,
        });
    }
    for i in 0..USER_FIELD_COUNT {
        table.push(UserParameter {
            name: Cow::Owned(format!("ReconUserVariable{}", i)),
            kind: Double,
            source: ReconUser(i),
            requirement: Optional,
        });
    }
    table
}
