//! Assembly of the normalized header from a raw container.

use crate::accessor::{MetadataAccessor, ScalarLookup};
use crate::error::{ConvertError, Outcome, Result, Warning};
use crate::geometry::AcquisitionGeometry;
use crate::header::*;
use crate::params::{user_parameter_table, ParamValue, Requirement, UserParameter};
use crate::typedef::PatientPosition;
use crate::util::{normalize_date, normalize_time, parse_decimal};

/// Header fields replaced by the anonymization token, by element name.
pub const ANONYMIZED_FIELDS: &[&str] = &[
    "patientName",
    "patientID",
    "patientBirthdate",
    "studyInstanceUID",
    "studyDescription",
    "referringPhysicianName",
    "accessionNumber",
    "seriesInstanceUIDRoot",
    "seriesDescription",
];

/// User string parameters replaced by the anonymization token.
pub const ANONYMIZED_USER_STRINGS: &[&str] = &["OperatorName", "ReadingPhysician", "PatientHistory"];

/// Options of a header build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// When set, every identifying field listed in [`ANONYMIZED_FIELDS`]
    /// and [`ANONYMIZED_USER_STRINGS`] that has a value is replaced by this
    /// token.
    ///
    /// [`ANONYMIZED_FIELDS`]: ./constant.ANONYMIZED_FIELDS.html
    /// [`ANONYMIZED_USER_STRINGS`]: ./constant.ANONYMIZED_USER_STRINGS.html
    pub anonymize: Option<String>,
}

/// Builds a [`NormalizedHeader`] from a raw container.
///
/// The build reads from the source only and is idempotent: the same source
/// always yields the same header.
///
/// [`NormalizedHeader`]: ../header/struct.NormalizedHeader.html
#[derive(Debug, Clone)]
pub struct HeaderBuilder {
    options: BuildOptions,
    table: Vec<UserParameter>,
}

fn text(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl HeaderBuilder {
    /// Create a builder with the full user-parameter table.
    pub fn new(options: BuildOptions) -> Self {
        HeaderBuilder {
            options,
            table: user_parameter_table(),
        }
    }

    /// Build the header.
    ///
    /// # Errors
    ///
    /// - `FieldMissing` if a required field, including any required user
    ///   parameter, is absent from the source.
    /// - `InvalidGeometry` or `TypeMismatch` from the geometry derivation.
    pub fn build(&self, source: &dyn MetadataAccessor) -> Result<Outcome<NormalizedHeader>> {
        let geometry = AcquisitionGeometry::from_accessor(source)?;
        let mut warnings = Vec::new();

        let mut header = NormalizedHeader {
            subject_information: Some(subject_information(source)),
            study_information: Some(study_information(source)),
            measurement_information: Some(measurement_information(source)?),
            acquisition_system_information: Some(system_information(source, &geometry)),
            experimental_conditions: experimental_conditions(source)?,
            encoding: vec![encoding_space(source, &geometry)],
            sequence_parameters: Some(sequence_parameters(source, &geometry, &mut warnings)),
            user_parameters: Some(self.user_parameters(source, &mut warnings)?),
        };

        if let Some(token) = &self.options.anonymize {
            anonymize(&mut header, token);
        }
        debug!(
            "header built with {} user parameters, {} optional fields omitted",
            header.user_parameters.as_ref().map_or(0, UserParameters::len),
            warnings.len()
        );
        Ok(Outcome {
            value: header,
            warnings,
        })
    }

    fn user_parameters(
        &self,
        source: &dyn MetadataAccessor,
        warnings: &mut Vec<Warning>,
    ) -> Result<UserParameters> {
        let mut params = UserParameters::default();
        for p in &self.table {
            match p.read(source)? {
                Some(ParamValue::Long(v)) => {
                    let _ = params.long.insert(p.name.to_string(), v);
                }
                Some(ParamValue::Double(v)) => {
                    let _ = params.double.insert(p.name.to_string(), v);
                }
                Some(ParamValue::String(v)) => {
                    let _ = params.string.insert(p.name.to_string(), v);
                }
                None => match p.requirement {
                    Requirement::Required => {
                        return Err(ConvertError::FieldMissing(p.name.to_string()))
                    }
                    Requirement::Optional => {
                        warnings.push(Warning::OptionalFieldMissing(p.name.to_string()))
                    }
                },
            }
        }

        match source.noise() {
            Some(noise) => {
                for (ch, v) in noise.mean.iter().enumerate() {
                    let _ = params
                        .double
                        .insert(format!("ReceiverNoiseMean{}", ch), f64::from(*v));
                }
                for (ch, v) in noise.std_dev.iter().enumerate() {
                    let _ = params
                        .double
                        .insert(format!("ReceiverNoiseStdDev{}", ch), f64::from(*v));
                }
            }
            None => warnings.push(Warning::OptionalFieldMissing("ReceiverNoise".to_string())),
        }
        Ok(params)
    }
}

fn subject_information(source: &dyn MetadataAccessor) -> SubjectInformation {
    let patient = source.patient();
    SubjectInformation {
        patient_name: text(&patient.name),
        patient_weight_kg: parse_decimal(&patient.weight),
        patient_id: text(&patient.id),
        patient_birthdate: text(&normalize_date(&patient.birthdate)),
        patient_gender: text(&patient.gender),
    }
}

fn study_information(source: &dyn MetadataAccessor) -> StudyInformation {
    let study = source.study();
    StudyInformation {
        study_date: text(&normalize_date(&study.date)),
        study_time: text(&normalize_time(&study.time)),
        study_id: Some(study.number.to_string()),
        accession_number: text(&study.accession_number),
        referring_physician_name: text(&study.referring_physician),
        study_description: text(&study.description),
        study_instance_uid: text(&study.uid),
    }
}

fn measurement_information(source: &dyn MetadataAccessor) -> Result<MeasurementInformation> {
    let series = source.series();
    let position = source
        .value_optional::<i64>("PatientPosition")?
        .map_or(PatientPosition::Supine, PatientPosition::from_code);
    Ok(MeasurementInformation {
        measurement_id: Some(source.layout().run_number.to_string()),
        series_date: text(&normalize_date(&series.date)),
        series_time: text(&normalize_time(&series.time)),
        patient_position: position.token().to_string(),
        initial_series_number: Some(series.number),
        protocol_name: text(&series.protocol_name),
        series_description: text(&series.description),
        series_instance_uid_root: text(&series.uid),
        sequence_name: text(&source.image().psd_name),
    })
}

fn system_information(
    source: &dyn MetadataAccessor,
    geometry: &AcquisitionGeometry,
) -> AcquisitionSystemInformation {
    let equipment = source.equipment();
    AcquisitionSystemInformation {
        system_vendor: text(&equipment.manufacturer),
        system_model: text(&equipment.manufacturer_model),
        system_field_strength_t: parse_decimal(&source.image().magnetic_field_strength),
        receiver_channels: Some(geometry.channels as u32),
        institution_name: text(&equipment.institution),
        station_name: text(&equipment.station),
        device_serial_number: text(&equipment.device_serial_number),
    }
}

fn experimental_conditions(source: &dyn MetadataAccessor) -> Result<ExperimentalConditions> {
    // the image module holds MHz
    let mhz = parse_decimal(&source.image().imaging_frequency)
        .ok_or_else(|| ConvertError::FieldMissing("ImagingFrequency".to_string()))?;
    Ok(ExperimentalConditions {
        h1_resonance_frequency_hz: (mhz * 1e6).round() as i64,
    })
}

fn encoding_space(source: &dyn MetadataAccessor, g: &AcquisitionGeometry) -> EncodingSpace {
    let image = source.image();
    let thickness = image.slice_thickness;
    let fov = FieldOfView {
        x: image.pixel_size_x * g.transform.x as f64,
        y: image.pixel_size_y * g.transform.y as f64,
        z: if g.is_3d {
            g.acquired.z as f64 * thickness
        } else {
            thickness
        },
    };
    let (encoded_z, recon_z) = if g.is_3d {
        (g.acquired.z, g.transform.z)
    } else {
        (1, 1)
    };

    let partitions = Limit::from_count(g.slices());
    let encoding_limits = EncodingLimits {
        kspace_encoding_step_1: Limit::from_count(g.views()),
        kspace_encoding_step_2: if g.is_3d { partitions } else { Limit::UNUSED },
        average: Limit::UNUSED,
        slice: if g.is_3d { Limit::UNUSED } else { partitions },
        contrast: Limit::from_count(g.echoes),
        phase: Limit::from_count(g.phases),
        repetition: Limit::from_count(g.repetitions),
        set: Limit::UNUSED,
        segment: if g.echo_train_length > 1 {
            Limit::from_count(g.echo_train_length)
        } else {
            Limit::UNUSED
        },
    };

    EncodingSpace {
        encoded_space: Space {
            matrix_size: MatrixSize {
                x: g.acquired.x as u32,
                y: g.acquired.y as u32,
                z: encoded_z as u32,
            },
            field_of_view_mm: fov,
        },
        recon_space: Space {
            matrix_size: MatrixSize {
                x: g.transform.x as u32,
                y: g.transform.y as u32,
                z: recon_z as u32,
            },
            field_of_view_mm: fov,
        },
        encoding_limits,
        trajectory: "cartesian".to_string(),
    }
}

fn sequence_parameters(
    source: &dyn MetadataAccessor,
    g: &AcquisitionGeometry,
    warnings: &mut Vec<Warning>,
) -> SequenceParameters {
    let image = source.image();
    let mut list = |name: &str, value: &str| -> Vec<f64> {
        match parse_decimal(value) {
            Some(v) => vec![v],
            None => {
                warnings.push(Warning::OptionalFieldMissing(name.to_string()));
                Vec::new()
            }
        }
    };

    let tr = list("RepetitionTime", &image.repetition_time);
    let mut te = list("EchoTime", &image.echo_time);
    let flip_angle_deg = list("FlipAngle", &image.flip_angle);
    if g.echoes > 1 {
        // µs in the raw header
        te.push(1e-3 * source.raw_header().te2 as f64);
    }
    let ti = parse_decimal(&image.inversion_time).into_iter().collect();

    SequenceParameters {
        tr,
        te,
        ti,
        flip_angle_deg,
        sequence_type: text(&image.scan_sequence),
    }
}

fn anonymized_field<'h>(header: &'h mut NormalizedHeader, name: &str) -> Option<&'h mut Option<String>> {
    let subject = header.subject_information.as_mut();
    let study = header.study_information.as_mut();
    let measurement = header.measurement_information.as_mut();
    match name {
        "patientName" => subject.map(|s| &mut s.patient_name),
        "patientID" => subject.map(|s| &mut s.patient_id),
        "patientBirthdate" => subject.map(|s| &mut s.patient_birthdate),
        "studyInstanceUID" => study.map(|s| &mut s.study_instance_uid),
        "studyDescription" => study.map(|s| &mut s.study_description),
        "referringPhysicianName" => study.map(|s| &mut s.referring_physician_name),
        "accessionNumber" => study.map(|s| &mut s.accession_number),
        "seriesInstanceUIDRoot" => measurement.map(|m| &mut m.series_instance_uid_root),
        "seriesDescription" => measurement.map(|m| &mut m.series_description),
        _ => None,
    }
}

/// Replace every present field of the anonymization rule table with
/// `token`. Absent fields stay absent and fields outside the table are left
/// as they are.
pub fn anonymize(header: &mut NormalizedHeader, token: &str) {
    for name in ANONYMIZED_FIELDS {
        if let Some(field) = anonymized_field(header, name) {
            if field.is_some() {
                *field = Some(token.to_string());
            }
        }
    }
    if let Some(user) = header.user_parameters.as_mut() {
        for name in ANONYMIZED_USER_STRINGS {
            if let Some(value) = user.string.get_mut(*name) {
                *value = token.to_string();
            }
        }
    }
}
