//! Types for error handling go here.
//!
//! Fatal conditions are variants of [`ConvertError`]. Conditions the
//! conversion recovers from locally are reported as [`Warning`]s inside an
//! [`Outcome`], so they can never be mistaken for a fatal error.
//!
//! [`ConvertError`]: ./enum.ConvertError.html
//! [`Warning`]: ./enum.Warning.html
//! [`Outcome`]: ./struct.Outcome.html

use std::fmt;
use std::io::Error as IOError;

quick_error! {
    /// Error type for all fatal conversion failures.
    #[derive(Debug)]
    #[non_exhaustive]
    pub enum ConvertError {
        /// The raw container could not be opened or parsed.
        SourceOpen(reason: String) {
            display("Failed to open raw source: {}", reason)
        }
        /// The raw container was opened but holds inconsistent data.
        MalformedSource(reason: String) {
            display("Malformed raw source: {}", reason)
        }
        /// A required metadata field is absent.
        FieldMissing(name: String) {
            display("Required field `{}` is missing", name)
        }
        /// A field was requested strictly with the wrong type.
        TypeMismatch(name: String, expected: &'static str) {
            display("Field `{}` is not of type {}", name, expected)
        }
        /// The acquisition geometry holds a value the extractor cannot work with.
        InvalidGeometry(field: &'static str, value: i64) {
            display("Invalid acquisition geometry: {} = {}", field, value)
        }
        /// A computed index fell outside the declared geometry.
        StructuralMismatch(dimension: &'static str, index: usize, bound: usize) {
            display("{} index {} is outside the declared bound {}", dimension, index, bound)
        }
        /// The sequence-mapping configuration did not validate.
        ConfigValidation(reason: String) {
            display("Invalid conversion configuration: {}", reason)
        }
        /// The header transform failed.
        Transform(reason: String) {
            display("Header transform failed: {}", reason)
        }
        /// An XML document is well-formed but does not have the expected structure.
        MalformedXml(reason: String) {
            display("Unexpected XML structure: {}", reason)
        }
        /// XML reading or writing error
        Xml(err: quick_xml::Error) {
            from()
            source(err)
            display("XML error: {}", err)
        }
        /// Snapshot (de)serialization error
        Json(err: serde_json::Error) {
            from()
            source(err)
            display("JSON error: {}", err)
        }
        /// I/O Error
        Io(err: IOError) {
            from()
            source(err)
            display("I/O error: {}", err)
        }
    }
}

/// Alias type for results originating from this crate.
pub type Result<T> = ::std::result::Result<T, ConvertError>;

/// A condition the conversion recovered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// An optional metadata field was absent and its entry was omitted.
    OptionalFieldMissing(String),
    /// A frame-control packet did not carry exactly one frame.
    /// The first frame was used, or the packet was skipped if it had none.
    MalformedControlPacket {
        /// Position of the packet in the control stream
        packet: usize,
        /// Number of frames found in its payload
        frames: usize,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Warning::OptionalFieldMissing(name) => {
                write!(f, "optional field `{}` is missing, omitted", name)
            }
            Warning::MalformedControlPacket { packet, frames } => write!(
                f,
                "control packet {} carries {} frames, expected exactly one",
                packet, frames
            ),
        }
    }
}

/// A successfully produced value together with the warnings raised on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// The produced value
    pub value: T,
    /// Recoverable conditions met while producing it
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    /// Wrap a value without warnings.
    pub fn clean(value: T) -> Self {
        Outcome {
            value,
            warnings: Vec::new(),
        }
    }

    /// Discard the warnings, after logging them.
    /// Omitted optional fields are only worth a debug message.
    pub fn into_value(self) -> T {
        for w in &self.warnings {
            match w {
                Warning::OptionalFieldMissing(_) => debug!("{}", w),
                _ => warn!("{}", w),
            }
        }
        self.value
    }

    /// Transform the value, keeping the warnings.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}
