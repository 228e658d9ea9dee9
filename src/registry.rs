//! Per-sequence selection of the conversion routine.
//!
//! A conversion configuration document maps pulse sequence names to a
//! converter class, a header stylesheet and a reconstruction configuration
//! name:
//!
//! ```xml
//! <conversionConfiguration>
//!   <sequenceMapping>
//!     <psdname>3dfse</psdname>
//!     <libraryPath>libsequences.so</libraryPath>
//!     <className>GenericConverter</className>
//!     <stylesheet>3dfse.xsl</stylesheet>
//!     <reconConfigName>default</reconConfigName>
//!   </sequenceMapping>
//! </conversionConfiguration>
//! ```
//!
//! Converter classes are resolved against a static [`ConverterRegistry`];
//! `libraryPath` is kept for reference only, nothing is loaded dynamically.
//!
//! [`ConverterRegistry`]: ./struct.ConverterRegistry.html

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConvertError, Result};
use crate::extract::{GenericConverter, SequenceConverter};
use crate::xml::Element;

/// Root element of a conversion configuration document.
pub const CONFIG_ROOT: &str = "conversionConfiguration";

/// Fields of a sequence mapping. Each must appear exactly once.
pub const MAPPING_FIELDS: [&str; 5] = [
    "psdname",
    "libraryPath",
    "className",
    "stylesheet",
    "reconConfigName",
];

/// One entry of the conversion configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceMapping {
    /// Pulse sequence name the mapping applies to (`psdname`)
    pub psd_name: String,
    /// Plugin location (`libraryPath`); stored, never loaded
    pub library_path: String,
    /// Registered converter class (`className`)
    pub class_name: String,
    /// Header stylesheet, may be empty
    pub stylesheet: String,
    /// Reconstruction configuration name (`reconConfigName`)
    pub recon_config_name: String,
}

/// A validated conversion configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionConfig {
    /// Mappings in document order, at least one
    pub mappings: Vec<SequenceMapping>,
}

fn invalid<S: Into<String>>(reason: S) -> ConvertError {
    ConvertError::ConfigValidation(reason.into())
}

fn read_mapping(index: usize, element: &Element) -> Result<SequenceMapping> {
    let mut fields: BTreeMap<&str, String> = BTreeMap::new();
    for child in &element.children {
        let name: &str = *MAPPING_FIELDS
            .iter()
            .find(|f| **f == child.name)
            .ok_or_else(|| {
                invalid(format!(
                    "sequence mapping {}: unexpected element <{}>",
                    index, child.name
                ))
            })?;
        if !child.children.is_empty() {
            return Err(invalid(format!(
                "sequence mapping {}: <{}> must hold text only",
                index, name
            )));
        }
        if fields.insert(name, child.text.trim().to_string()).is_some() {
            return Err(invalid(format!(
                "sequence mapping {}: <{}> appears more than once",
                index, name
            )));
        }
    }
    let mut take = |name: &str| {
        fields.remove(name).ok_or_else(|| {
            invalid(format!("sequence mapping {}: <{}> is missing", index, name))
        })
    };
    Ok(SequenceMapping {
        psd_name: take("psdname")?,
        library_path: take("libraryPath")?,
        class_name: take("className")?,
        stylesheet: take("stylesheet")?,
        recon_config_name: take("reconConfigName")?,
    })
}

impl ConversionConfig {
    /// Parse and validate a configuration document.
    ///
    /// # Errors
    ///
    /// `ConfigValidation` for any document that is not well-formed or does
    /// not follow the schema.
    pub fn parse(xml: &str) -> Result<Self> {
        let root = Element::parse(xml).map_err(|e| invalid(e.to_string()))?;
        if root.name != CONFIG_ROOT {
            return Err(invalid(format!(
                "root element is <{}>, expected <{}>",
                root.name, CONFIG_ROOT
            )));
        }
        let mut mappings = Vec::new();
        for (i, child) in root.children.iter().enumerate() {
            if child.name != "sequenceMapping" {
                return Err(invalid(format!("unexpected element <{}>", child.name)));
            }
            mappings.push(read_mapping(i, child)?);
        }
        if mappings.is_empty() {
            return Err(invalid("no sequence mapping declared"));
        }
        Ok(ConversionConfig { mappings })
    }

    /// Read and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path)
            .map_err(|e| invalid(format!("{}: {}", path.display(), e)))?;
        ConversionConfig::parse(&xml)
    }

    /// The mapping of a pulse sequence, if there is one.
    pub fn find(&self, psd_name: &str) -> Option<&SequenceMapping> {
        self.mappings.iter().find(|m| m.psd_name == psd_name)
    }
}

/// Factory of a sequence converter.
pub type ConverterFactory = fn() -> Box<dyn SequenceConverter>;

fn generic() -> Box<dyn SequenceConverter> {
    Box::new(GenericConverter::new())
}

/// The converter chosen for a run, with the mapping's extra settings.
#[derive(Debug)]
pub struct Selection {
    /// Chosen converter
    pub converter: Box<dyn SequenceConverter>,
    /// Stylesheet of the mapping
    pub stylesheet: Option<PathBuf>,
    /// Recon configuration name of the mapping
    pub recon_config_name: Option<String>,
}

/// Static table of converter factories, by class name.
#[derive(Debug, Clone)]
pub struct ConverterRegistry {
    factories: BTreeMap<String, ConverterFactory>,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        let mut registry = ConverterRegistry::empty();
        registry.register(GenericConverter::NAME, generic);
        registry
    }
}

impl ConverterRegistry {
    /// A registry with no converter at all.
    pub fn empty() -> Self {
        ConverterRegistry {
            factories: BTreeMap::new(),
        }
    }

    /// Register a converter class, replacing any previous one of that name.
    pub fn register<S: Into<String>>(&mut self, class_name: S, factory: ConverterFactory) {
        let _ = self.factories.insert(class_name.into(), factory);
    }

    /// Instantiate a converter by class name.
    pub fn create(&self, class_name: &str) -> Option<Box<dyn SequenceConverter>> {
        self.factories.get(class_name).map(|factory| factory())
    }

    /// The registered class names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Choose the converter for a pulse sequence.
    ///
    /// Sequences without a mapping, and mappings naming an unknown class,
    /// get the generic converter.
    pub fn select(&self, psd_name: &str, config: Option<&ConversionConfig>) -> Selection {
        let mapping = match config.and_then(|c| c.find(psd_name)) {
            Some(m) => m,
            None => {
                debug!("no mapping for sequence `{}`, using {}", psd_name, GenericConverter::NAME);
                return Selection {
                    converter: generic(),
                    stylesheet: None,
                    recon_config_name: None,
                };
            }
        };
        let converter = self.create(&mapping.class_name).unwrap_or_else(|| {
            warn!(
                "converter class `{}` of sequence `{}` is not available, using {}",
                mapping.class_name,
                psd_name,
                GenericConverter::NAME
            );
            generic()
        });
        Selection {
            converter,
            stylesheet: if mapping.stylesheet.is_empty() {
                None
            } else {
                Some(PathBuf::from(&mapping.stylesheet))
            },
            recon_config_name: if mapping.recon_config_name.is_empty() {
                None
            } else {
                Some(mapping.recon_config_name.clone())
            },
        }
    }
}
