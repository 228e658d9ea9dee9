//! XML serialization of the normalized header.
//!
//! Documents go through a small element tree: [`Element`] values are
//! written with `quick-xml` and read back into the same shape. The header
//! maps onto the ISMRMRD header vocabulary; the element names are a
//! contract with downstream readers.
//!
//! [`Element`]: ./struct.Element.html

use std::fmt::Display;
use std::str::FromStr;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{ConvertError, Result};
use crate::header::*;

/// Namespace of the produced header document.
pub const HEADER_NAMESPACE: &str = "http://www.ismrm.org/ISMRMRD";

/// Root element name of the produced header document.
pub const HEADER_ROOT: &str = "ismrmrdHeader";

/// A node of an XML document: its name, its text, and its child elements.
/// Attributes are not retained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Tag name
    pub name: String,
    /// Concatenated text content
    pub text: String,
    /// Child elements in document order
    pub children: Vec<Element>,
}

impl Element {
    /// An element without text or children.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Element {
            name: name.into(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// A leaf element holding the given value as text.
    pub fn leaf<S: Into<String>, V: Display>(name: S, value: V) -> Self {
        Element {
            name: name.into(),
            text: value.to_string(),
            children: Vec::new(),
        }
    }

    /// Append a child element, builder style.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Append a leaf child if the value is present.
    pub fn push_optional<V: Display>(&mut self, name: &str, value: &Option<V>) {
        if let Some(v) = value {
            self.children.push(Element::leaf(name, v));
        }
    }

    /// The first child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// The first child with the given name, or a `MalformedXml` error.
    pub fn required_child(&self, name: &str) -> Result<&Element> {
        self.child(name).ok_or_else(|| {
            ConvertError::MalformedXml(format!("<{}> has no <{}> element", self.name, name))
        })
    }

    /// Parse this element's text.
    pub fn parse_text<T: FromStr>(&self) -> Result<T> {
        self.text.parse().map_err(|_| {
            ConvertError::MalformedXml(format!("<{}> holds invalid value {:?}", self.name, self.text))
        })
    }

    /// Parse the text of an optional child.
    pub fn optional<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.child(name).map(|c| c.parse_text()).transpose()
    }

    /// Parse the text of a required child.
    pub fn required<T: FromStr>(&self, name: &str) -> Result<T> {
        self.required_child(name)?.parse_text()
    }

    /// Parse the text of every child with the given name.
    pub fn repeated<T: FromStr>(&self, name: &str) -> Result<Vec<T>> {
        self.children_named(name).map(|c| c.parse_text()).collect()
    }

    /// Read a complete document and return its root element.
    pub fn parse(xml: &str) -> Result<Element> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(Element::new(
                    String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                )),
                Event::Empty(e) => {
                    let element =
                        Element::new(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let mut element = stack.pop().ok_or_else(|| {
                        ConvertError::MalformedXml("unbalanced end tag".to_string())
                    })?;
                    // text around child elements is layout only
                    if !element.children.is_empty() && element.text.trim().is_empty() {
                        element.text.clear();
                    }
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&t.unescape()?);
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(ConvertError::MalformedXml(format!(
                "<{}> is never closed",
                stack[stack.len() - 1].name
            )));
        }
        root.ok_or_else(|| ConvertError::MalformedXml("document has no root element".to_string()))
    }

    /// Write this element as the root of a complete document, with a
    /// 2-space indentation.
    pub fn to_document(&self, namespace: Option<&str>) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut start = BytesStart::new(self.name.as_str());
        if let Some(ns) = namespace {
            start.push_attribute(("xmlns", ns));
        }
        self.write_with(&mut writer, start)?;
        String::from_utf8(writer.into_inner())
            .map_err(|e| ConvertError::MalformedXml(e.to_string()))
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        self.write_with(writer, BytesStart::new(self.name.as_str()))
    }

    fn write_with(&self, writer: &mut Writer<Vec<u8>>, start: BytesStart) -> Result<()> {
        if self.children.is_empty() && self.text.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        writer.write_event(Event::Start(start))?;
        if !self.text.is_empty() {
            writer.write_event(Event::Text(BytesText::new(&self.text)))?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        Ok(())
    } else if root.is_none() {
        *root = Some(element);
        Ok(())
    } else {
        Err(ConvertError::MalformedXml(
            "document has more than one root element".to_string(),
        ))
    }
}

fn xyz<T: Display>(name: &str, x: T, y: T, z: T) -> Element {
    Element::new(name)
        .with_child(Element::leaf("x", x))
        .with_child(Element::leaf("y", y))
        .with_child(Element::leaf("z", z))
}

fn space_element(name: &str, space: &Space) -> Element {
    let m = space.matrix_size;
    let f = space.field_of_view_mm;
    Element::new(name)
        .with_child(xyz("matrixSize", m.x, m.y, m.z))
        .with_child(xyz("fieldOfView_mm", f.x, f.y, f.z))
}

fn read_space(element: &Element) -> Result<Space> {
    let m = element.required_child("matrixSize")?;
    let f = element.required_child("fieldOfView_mm")?;
    Ok(Space {
        matrix_size: MatrixSize {
            x: m.required("x")?,
            y: m.required("y")?,
            z: m.required("z")?,
        },
        field_of_view_mm: FieldOfView {
            x: f.required("x")?,
            y: f.required("y")?,
            z: f.required("z")?,
        },
    })
}

fn encoding_element(encoding: &EncodingSpace) -> Element {
    let mut limits = Element::new("encodingLimits");
    for (name, limit) in encoding.encoding_limits.named().iter() {
        limits.children.push(
            Element::new(*name)
                .with_child(Element::leaf("minimum", limit.minimum))
                .with_child(Element::leaf("maximum", limit.maximum))
                .with_child(Element::leaf("center", limit.center)),
        );
    }
    Element::new("encoding")
        .with_child(space_element("encodedSpace", &encoding.encoded_space))
        .with_child(space_element("reconSpace", &encoding.recon_space))
        .with_child(limits)
        .with_child(Element::leaf("trajectory", &encoding.trajectory))
}

fn read_encoding(element: &Element) -> Result<EncodingSpace> {
    let mut encoding_limits = EncodingLimits::default();
    if let Some(limits) = element.child("encodingLimits") {
        for child in &limits.children {
            let limit = encoding_limits.by_name_mut(&child.name).ok_or_else(|| {
                ConvertError::MalformedXml(format!("unknown encoding limit <{}>", child.name))
            })?;
            *limit = Limit {
                minimum: child.required("minimum")?,
                maximum: child.required("maximum")?,
                center: child.required("center")?,
            };
        }
    }
    Ok(EncodingSpace {
        encoded_space: read_space(element.required_child("encodedSpace")?)?,
        recon_space: read_space(element.required_child("reconSpace")?)?,
        encoding_limits,
        trajectory: element.required("trajectory")?,
    })
}

impl NormalizedHeader {
    /// Build the element tree of this header.
    pub fn to_element(&self) -> Element {
        let mut root = Element::new(HEADER_ROOT);

        if let Some(s) = &self.subject_information {
            let mut e = Element::new("subjectInformation");
            e.push_optional("patientName", &s.patient_name);
            e.push_optional("patientWeight_kg", &s.patient_weight_kg);
            e.push_optional("patientID", &s.patient_id);
            e.push_optional("patientBirthdate", &s.patient_birthdate);
            e.push_optional("patientGender", &s.patient_gender);
            root.children.push(e);
        }
        if let Some(s) = &self.study_information {
            let mut e = Element::new("studyInformation");
            e.push_optional("studyDate", &s.study_date);
            e.push_optional("studyTime", &s.study_time);
            e.push_optional("studyID", &s.study_id);
            e.push_optional("accessionNumber", &s.accession_number);
            e.push_optional("referringPhysicianName", &s.referring_physician_name);
            e.push_optional("studyDescription", &s.study_description);
            e.push_optional("studyInstanceUID", &s.study_instance_uid);
            root.children.push(e);
        }
        if let Some(m) = &self.measurement_information {
            let mut e = Element::new("measurementInformation");
            e.push_optional("measurementID", &m.measurement_id);
            e.push_optional("seriesDate", &m.series_date);
            e.push_optional("seriesTime", &m.series_time);
            e.children.push(Element::leaf("patientPosition", &m.patient_position));
            e.push_optional("initialSeriesNumber", &m.initial_series_number);
            e.push_optional("protocolName", &m.protocol_name);
            e.push_optional("seriesDescription", &m.series_description);
            e.push_optional("seriesInstanceUIDRoot", &m.series_instance_uid_root);
            e.push_optional("sequenceName", &m.sequence_name);
            root.children.push(e);
        }
        if let Some(a) = &self.acquisition_system_information {
            let mut e = Element::new("acquisitionSystemInformation");
            e.push_optional("systemVendor", &a.system_vendor);
            e.push_optional("systemModel", &a.system_model);
            e.push_optional("systemFieldStrength_T", &a.system_field_strength_t);
            e.push_optional("receiverChannels", &a.receiver_channels);
            e.push_optional("institutionName", &a.institution_name);
            e.push_optional("stationName", &a.station_name);
            e.push_optional("deviceSerialNumber", &a.device_serial_number);
            root.children.push(e);
        }
        root.children.push(Element::new("experimentalConditions").with_child(Element::leaf(
            "H1resonanceFrequency_Hz",
            self.experimental_conditions.h1_resonance_frequency_hz,
        )));
        for encoding in &self.encoding {
            root.children.push(encoding_element(encoding));
        }
        if let Some(p) = &self.sequence_parameters {
            let mut e = Element::new("sequenceParameters");
            let lists = [
                ("TR", &p.tr),
                ("TE", &p.te),
                ("TI", &p.ti),
                ("flipAngle_deg", &p.flip_angle_deg),
            ];
            for (name, values) in lists.iter() {
                for v in values.iter() {
                    e.children.push(Element::leaf(*name, v));
                }
            }
            e.push_optional("sequence_type", &p.sequence_type);
            root.children.push(e);
        }
        if let Some(u) = &self.user_parameters {
            let mut e = Element::new("userParameters");
            let pair = |kind: &str, name: &str, value: String| {
                Element::new(kind)
                    .with_child(Element::leaf("name", name))
                    .with_child(Element::leaf("value", value))
            };
            for (k, v) in &u.long {
                e.children.push(pair("userParameterLong", k.as_str(), v.to_string()));
            }
            for (k, v) in &u.double {
                e.children.push(pair("userParameterDouble", k.as_str(), v.to_string()));
            }
            for (k, v) in &u.string {
                e.children.push(pair("userParameterString", k.as_str(), v.clone()));
            }
            root.children.push(e);
        }
        root
    }

    /// Serialize the header as an XML document.
    pub fn to_xml(&self) -> Result<String> {
        self.to_element().to_document(Some(HEADER_NAMESPACE))
    }

    /// Read a header back from its element tree.
    pub fn from_element(root: &Element) -> Result<NormalizedHeader> {
        if root.name != HEADER_ROOT {
            return Err(ConvertError::MalformedXml(format!(
                "expected <{}>, found <{}>",
                HEADER_ROOT, root.name
            )));
        }
        let subject_information = match root.child("subjectInformation") {
            Some(e) => Some(SubjectInformation {
                patient_name: e.optional("patientName")?,
                patient_weight_kg: e.optional("patientWeight_kg")?,
                patient_id: e.optional("patientID")?,
                patient_birthdate: e.optional("patientBirthdate")?,
                patient_gender: e.optional("patientGender")?,
            }),
            None => None,
        };
        let study_information = match root.child("studyInformation") {
            Some(e) => Some(StudyInformation {
                study_date: e.optional("studyDate")?,
                study_time: e.optional("studyTime")?,
                study_id: e.optional("studyID")?,
                accession_number: e.optional("accessionNumber")?,
                referring_physician_name: e.optional("referringPhysicianName")?,
                study_description: e.optional("studyDescription")?,
                study_instance_uid: e.optional("studyInstanceUID")?,
            }),
            None => None,
        };
        let measurement_information = match root.child("measurementInformation") {
            Some(e) => Some(MeasurementInformation {
                measurement_id: e.optional("measurementID")?,
                series_date: e.optional("seriesDate")?,
                series_time: e.optional("seriesTime")?,
                patient_position: e.required("patientPosition")?,
                initial_series_number: e.optional("initialSeriesNumber")?,
                protocol_name: e.optional("protocolName")?,
                series_description: e.optional("seriesDescription")?,
                series_instance_uid_root: e.optional("seriesInstanceUIDRoot")?,
                sequence_name: e.optional("sequenceName")?,
            }),
            None => None,
        };
        let acquisition_system_information = match root.child("acquisitionSystemInformation") {
            Some(e) => Some(AcquisitionSystemInformation {
                system_vendor: e.optional("systemVendor")?,
                system_model: e.optional("systemModel")?,
                system_field_strength_t: e.optional("systemFieldStrength_T")?,
                receiver_channels: e.optional("receiverChannels")?,
                institution_name: e.optional("institutionName")?,
                station_name: e.optional("stationName")?,
                device_serial_number: e.optional("deviceSerialNumber")?,
            }),
            None => None,
        };
        let experimental_conditions = ExperimentalConditions {
            h1_resonance_frequency_hz: root
                .required_child("experimentalConditions")?
                .required("H1resonanceFrequency_Hz")?,
        };
        let encoding = root
            .children_named("encoding")
            .map(read_encoding)
            .collect::<Result<Vec<_>>>()?;
        let sequence_parameters = match root.child("sequenceParameters") {
            Some(e) => Some(SequenceParameters {
                tr: e.repeated("TR")?,
                te: e.repeated("TE")?,
                ti: e.repeated("TI")?,
                flip_angle_deg: e.repeated("flipAngle_deg")?,
                sequence_type: e.optional("sequence_type")?,
            }),
            None => None,
        };
        let user_parameters = match root.child("userParameters") {
            Some(e) => {
                let mut u = UserParameters::default();
                for p in &e.children {
                    let name: String = p.required("name")?;
                    let value = p.required_child("value")?;
                    match p.name.as_str() {
                        "userParameterLong" => {
                            let _ = u.long.insert(name, value.parse_text()?);
                        }
                        "userParameterDouble" => {
                            let _ = u.double.insert(name, value.parse_text()?);
                        }
                        "userParameterString" => {
                            let _ = u.string.insert(name, value.text.clone());
                        }
                        other => {
                            return Err(ConvertError::MalformedXml(format!(
                                "unknown user parameter kind <{}>",
                                other
                            )))
                        }
                    }
                }
                Some(u)
            }
            None => None,
        };

        Ok(NormalizedHeader {
            subject_information,
            study_information,
            measurement_information,
            acquisition_system_information,
            experimental_conditions,
            encoding,
            sequence_parameters,
            user_parameters,
        })
    }

    /// Parse a header document.
    pub fn from_xml(xml: &str) -> Result<NormalizedHeader> {
        NormalizedHeader::from_element(&Element::parse(xml)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn element_round_trip() {
        let tree = Element::new("root")
            .with_child(Element::leaf("a", "x < y & z"))
            .with_child(Element::new("empty"))
            .with_child(Element::new("nested").with_child(Element::leaf("b", 1.5)));
        let doc = tree.to_document(None).unwrap();
        assert!(doc.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(doc.contains("\n  <a>x &lt; y &amp; z</a>"));
        assert_eq!(Element::parse(&doc).unwrap(), tree);
    }

    #[test]
    fn leaf_text_is_not_trimmed() {
        let tree = Element::new("root").with_child(Element::leaf("a", "  padded "));
        let doc = tree.to_document(None).unwrap();
        assert_eq!(Element::parse(&doc).unwrap(), tree);
    }

    #[test]
    fn rejects_broken_documents() {
        assert!(Element::parse("<a><b></a>").is_err());
        assert!(Element::parse("").is_err());
        assert!(Element::parse("<a/><b/>").is_err());
    }

    #[test]
    fn header_round_trip() {
        let mut user = UserParameters::default();
        let _ = user.long.insert("NumEchoes".to_string(), 2);
        let _ = user.double.insert("ScanCenter".to_string(), -12.25);
        let _ = user.string.insert("Coil".to_string(), "HNS Head".to_string());
        let header = NormalizedHeader {
            subject_information: Some(SubjectInformation {
                patient_name: Some("Doe^Jane".to_string()),
                patient_weight_kg: Some(61.5),
                patient_gender: Some("F".to_string()),
                ..Default::default()
            }),
            measurement_information: Some(MeasurementInformation {
                patient_position: "HFS".to_string(),
                initial_series_number: Some(3),
                ..Default::default()
            }),
            experimental_conditions: ExperimentalConditions {
                h1_resonance_frequency_hz: 127_740_000,
            },
            encoding: vec![EncodingSpace {
                encoded_space: Space {
                    matrix_size: MatrixSize { x: 256, y: 128, z: 1 },
                    field_of_view_mm: FieldOfView {
                        x: 240.,
                        y: 240.,
                        z: 5.,
                    },
                },
                recon_space: Space::default(),
                encoding_limits: EncodingLimits {
                    kspace_encoding_step_1: Limit::from_count(128),
                    slice: Limit::from_count(4),
                    ..Default::default()
                },
                trajectory: "cartesian".to_string(),
            }],
            sequence_parameters: Some(SequenceParameters {
                tr: vec![500.],
                te: vec![10.5, 21.0],
                flip_angle_deg: vec![90.],
                ..Default::default()
            }),
            user_parameters: Some(user),
            ..Default::default()
        };
        let xml = header.to_xml().unwrap();
        assert!(xml.contains("<ismrmrdHeader xmlns=\"http://www.ismrm.org/ISMRMRD\">"));
        assert!(xml.contains("<patientWeight_kg>61.5</patientWeight_kg>"));
        assert!(!xml.contains("studyInformation"));
        assert_eq!(NormalizedHeader::from_xml(&xml).unwrap(), header);
    }

    #[test]
    fn unknown_root() {
        assert!(matches!(
            NormalizedHeader::from_xml("<header/>"),
            Err(ConvertError::MalformedXml(_))
        ));
    }
}
