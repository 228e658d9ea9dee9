//! The conversion pipeline.
//!
//! A run builds the header, optionally transforms it, and hands it to the
//! sink; then extracts the acquisition records and appends them in scan
//! counter order. K-space volumes of legacy sources may follow.

use std::fmt;
use std::path::PathBuf;

use ndarray::Array4;
use num_complex::Complex32;

use crate::accessor::MetadataAccessor;
use crate::builder::{BuildOptions, HeaderBuilder};
use crate::error::{ConvertError, Outcome, Result};
use crate::extract::LegacyWalk;
use crate::geometry::AcquisitionGeometry;
use crate::header::NormalizedHeader;
use crate::registry::{ConversionConfig, ConverterRegistry, Selection};
use crate::sink::OutputSink;
use crate::transform::TransformPipeline;

/// Options of a conversion run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvertOptions {
    /// Replace identifying header fields by this token.
    pub anonymize: Option<String>,
    /// Stylesheet applied to the header. Takes precedence over the one of
    /// the sequence mapping.
    pub stylesheet: Option<PathBuf>,
    /// Sequence mapping configuration.
    pub config: Option<ConversionConfig>,
    /// Walk used for legacy containers.
    pub walk: LegacyWalk,
    /// Also append one k-space volume per echo and phase.
    pub kspace_volumes: bool,
}

/// Counts of what a run handed to its sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Records appended
    pub acquisitions: usize,
    /// Arrays appended
    pub arrays: usize,
    /// Recoverable conditions met on the way
    pub warnings: usize,
}

/// A conversion run over one raw container.
pub struct Converter<'a> {
    source: &'a dyn MetadataAccessor,
    options: ConvertOptions,
    selection: Selection,
    transform: TransformPipeline,
}

impl<'a> fmt::Debug for Converter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Converter")
            .field("options", &self.options)
            .field("selection", &self.selection)
            .field("transform", &self.transform)
            .finish()
    }
}

impl<'a> Converter<'a> {
    /// Create a run with the default converter registry.
    pub fn new(source: &'a dyn MetadataAccessor, options: ConvertOptions) -> Self {
        Converter::with_registry(source, options, &ConverterRegistry::default())
    }

    /// Create a run choosing its sequence converter from `registry`.
    pub fn with_registry(
        source: &'a dyn MetadataAccessor,
        options: ConvertOptions,
        registry: &ConverterRegistry,
    ) -> Self {
        let selection = registry.select(&source.image().psd_name, options.config.as_ref());
        debug!("using converter {}", selection.converter.name());
        let transform = match options.stylesheet.as_ref().or(selection.stylesheet.as_ref()) {
            Some(path) => TransformPipeline::with_stylesheet(path.clone()),
            None => TransformPipeline::passthrough(),
        };
        Converter {
            source,
            options,
            selection,
            transform,
        }
    }

    /// Replace the header transform.
    pub fn with_transform(mut self, transform: TransformPipeline) -> Self {
        self.transform = transform;
        self
    }

    /// Name of the selected sequence converter.
    pub fn converter_name(&self) -> &str {
        self.selection.converter.name()
    }

    /// Reconstruction configuration named by the sequence mapping, if any.
    pub fn recon_config_name(&self) -> Option<&str> {
        self.selection.recon_config_name.as_deref()
    }

    /// The header, before serialization.
    pub fn header(&self) -> Result<Outcome<NormalizedHeader>> {
        HeaderBuilder::new(BuildOptions {
            anonymize: self.options.anonymize.clone(),
        })
        .build(self.source)
    }

    /// The serialized header, after the stylesheet pass.
    ///
    /// # Errors
    ///
    /// Besides build and transform failures, a header which ends up empty
    /// is reported as `ConvertError::Transform`.
    pub fn header_xml(&self) -> Result<Outcome<String>> {
        let header = self.header()?;
        let xml = header.value.to_xml()?;
        let xml = self.transform.apply(&xml)?;
        if xml.trim().is_empty() {
            return Err(ConvertError::Transform("the header is empty".to_string()));
        }
        Ok(Outcome {
            value: xml,
            warnings: header.warnings,
        })
    }

    /// The k-space of one echo and phase, if the source has one.
    pub fn kspace_volume(&self, echo: usize, phase: usize) -> Result<Option<Array4<Complex32>>> {
        let geometry = AcquisitionGeometry::from_accessor(self.source)?;
        self.selection
            .converter
            .kspace_volume(self.source, &geometry, echo, phase)
    }

    /// Run the whole conversion into a sink.
    pub fn write_to(&self, sink: &mut dyn OutputSink) -> Result<Summary> {
        let mut summary = Summary::default();

        let header = self.header_xml()?;
        summary.warnings += header.warnings.len();
        sink.write_header(&header.into_value())?;

        let geometry = AcquisitionGeometry::from_accessor(self.source)?;
        let converter = &self.selection.converter;
        let records = converter.acquisitions(self.source, &geometry, self.options.walk)?;
        summary.warnings += records.warnings.len();
        for record in &records.into_value() {
            sink.append_acquisition(record)?;
            summary.acquisitions += 1;
        }

        if self.options.kspace_volumes {
            for phase in 0..geometry.phases {
                for echo in 0..geometry.echoes {
                    if let Some(volume) =
                        converter.kspace_volume(self.source, &geometry, echo, phase)?
                    {
                        let name = format!("kspace_echo{}_phase{}", echo, phase);
                        sink.append_array(&name, &volume.into_dyn())?;
                        summary.arrays += 1;
                    }
                }
            }
        }

        info!(
            "converted {} acquisitions, {} arrays, {} warnings",
            summary.acquisitions, summary.arrays, summary.warnings
        );
        Ok(summary)
    }
}
