//! Module for an in-memory raw container.
//!
//! A [`Snapshot`] holds everything a [`MetadataAccessor`] exposes, and can be
//! (de)serialized as JSON, optionally gzip-compressed. It is the input format
//! of the command line tool and the synthetic source used by the tests.
//!
//! [`Snapshot`]: ./struct.Snapshot.html
//! [`MetadataAccessor`]: ../accessor/trait.MetadataAccessor.html

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::bufread::GzDecoder;
use ndarray::{Array1, Array2};
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::accessor::{
    ArchiveEntry, BlockCoord, ControlStream, EquipmentModule, ImageModule, LayoutInfo,
    MetadataAccessor, NoiseStatistics, PatientModule, RawHeader, ScalarValue, SeriesModule,
    StudyModule,
};
use crate::error::{ConvertError, Result};
use crate::typedef::SourceLayout;
use crate::util::is_gz_file;

/// Sample storage of a legacy container.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyData {
    /// Samples per readout
    pub readout: usize,
    /// Phase-encoding views per block
    pub views: usize,
    /// Slices or partitions
    pub slices: usize,
    /// Echoes
    pub echoes: usize,
    /// Receiver channels
    pub channels: usize,
    /// Phases, or passes of a Z-encoded container
    pub phases: usize,
    /// Ordered `[phase][slice][echo][channel][view][sample]`.
    pub blocks: Vec<Complex32>,
    /// Ordered `[raw view][channel][sample]`, baselines included.
    #[serde(default)]
    pub raw_views: Vec<Complex32>,
}

fn product(dims: &[usize]) -> Result<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| {
            ConvertError::MalformedSource(format!("dimensions {:?} overflow the address space", dims))
        })
}

impl LegacyData {
    fn block_len(&self) -> Result<usize> {
        product(&[self.views, self.readout])
    }

    fn block_count(&self) -> Result<usize> {
        product(&[self.phases, self.slices, self.echoes, self.channels])
    }

    fn check(&self, raw_view_count: usize) -> Result<()> {
        let expected = product(&[self.block_count()?, self.block_len()?])?;
        if self.blocks.len() != expected {
            return Err(ConvertError::MalformedSource(format!(
                "legacy payload holds {} samples, its dimensions call for {}",
                self.blocks.len(),
                expected
            )));
        }
        if self.raw_views.is_empty() {
            return Ok(());
        }
        let raw = product(&[raw_view_count, self.channels, self.readout])?;
        if self.raw_views.len() != raw {
            return Err(ConvertError::MalformedSource(format!(
                "raw view payload holds {} samples, expected {}",
                self.raw_views.len(),
                raw
            )));
        }
        Ok(())
    }
}

/// The `len` samples starting at `start` units of `len`.
fn stride(start: Option<usize>, len: usize) -> Option<std::ops::Range<usize>> {
    let start = start?.checked_mul(len)?;
    Some(start..start.checked_add(len)?)
}

fn bounded(dimension: &'static str, index: usize, bound: usize) -> Result<usize> {
    if index < bound {
        Ok(index)
    } else {
        Err(ConvertError::StructuralMismatch(dimension, index, bound))
    }
}

/// A complete raw container held in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Processing-control values by name
    #[serde(default)]
    pub control: BTreeMap<String, ScalarValue>,
    /// Patient module
    #[serde(default)]
    pub patient: PatientModule,
    /// Study module
    #[serde(default)]
    pub study: StudyModule,
    /// Series module
    #[serde(default)]
    pub series: SeriesModule,
    /// Equipment module
    #[serde(default)]
    pub equipment: EquipmentModule,
    /// Image module
    #[serde(default)]
    pub image: ImageModule,
    /// Raw acquisition header
    #[serde(default)]
    pub raw_header: RawHeader,
    /// Receiver noise statistics, if recorded
    #[serde(default)]
    pub noise: Option<NoiseStatistics>,
    /// Container layout
    pub layout: LayoutInfo,
    /// Payload of a legacy container
    #[serde(default)]
    pub legacy: Option<LegacyData>,
    /// Control stream of an archive container
    #[serde(default)]
    pub archive: Vec<ArchiveEntry>,
}

impl Snapshot {
    /// Create an empty snapshot of the given layout.
    pub fn new(layout: SourceLayout) -> Self {
        Snapshot {
            control: BTreeMap::new(),
            patient: PatientModule::default(),
            study: StudyModule::default(),
            series: SeriesModule::default(),
            equipment: EquipmentModule::default(),
            image: ImageModule::default(),
            raw_header: RawHeader::default(),
            noise: None,
            layout: LayoutInfo {
                layout,
                raw_mode: false,
                z_encoded: false,
                run_number: 0,
                raw_view_count: 0,
            },
            legacy: None,
            archive: Vec::new(),
        }
    }

    /// Read a snapshot from a file in the file system.
    /// If the file's name ends with ".gz", the file is assumed to need GZip decoding.
    ///
    /// # Errors
    ///
    /// Any failure to open, decode or validate the file is reported as
    /// `ConvertError::SourceOpen`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Snapshot> {
        let path = path.as_ref();
        let open = || -> Result<Snapshot> {
            let file = BufReader::new(File::open(path)?);
            if is_gz_file(path) {
                Snapshot::from_reader(GzDecoder::new(file))
            } else {
                Snapshot::from_reader(file)
            }
        };
        open().map_err(|e| ConvertError::SourceOpen(format!("{}: {}", path.display(), e)))
    }

    /// Read and validate a snapshot from a JSON byte stream.
    pub fn from_reader<R: Read>(reader: R) -> Result<Snapshot> {
        let snapshot: Snapshot = serde_json::from_reader(reader)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Serialize this snapshot as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check that the payload agrees with the declared layout.
    pub fn validate(&self) -> Result<()> {
        match self.layout.layout {
            SourceLayout::Legacy => match &self.legacy {
                Some(data) => data.check(self.layout.raw_view_count),
                None => Err(ConvertError::MalformedSource(
                    "legacy layout without legacy payload".to_string(),
                )),
            },
            SourceLayout::Archive => Ok(()),
        }
    }

    /// Set a processing-control value.
    pub fn set_scalar<S: Into<String>>(&mut self, name: S, value: ScalarValue) {
        let _ = self.control.insert(name.into(), value);
    }

    fn legacy_data(&self) -> Result<&LegacyData> {
        self.legacy.as_ref().ok_or_else(|| {
            ConvertError::MalformedSource("container has no legacy payload".to_string())
        })
    }
}

impl MetadataAccessor for Snapshot {
    fn scalar(&self, name: &str) -> Option<&ScalarValue> {
        self.control.get(name)
    }

    fn patient(&self) -> &PatientModule {
        &self.patient
    }

    fn study(&self) -> &StudyModule {
        &self.study
    }

    fn series(&self) -> &SeriesModule {
        &self.series
    }

    fn equipment(&self) -> &EquipmentModule {
        &self.equipment
    }

    fn image(&self) -> &ImageModule {
        &self.image
    }

    fn raw_header(&self) -> &RawHeader {
        &self.raw_header
    }

    fn noise(&self) -> Option<&NoiseStatistics> {
        self.noise.as_ref()
    }

    fn layout(&self) -> &LayoutInfo {
        &self.layout
    }

    fn complex_block(&self, coord: BlockCoord) -> Result<Array2<Complex32>> {
        let data = self.legacy_data()?;
        let (phase, slice, echo, channel) = match coord {
            BlockCoord::Slice {
                slice,
                echo,
                channel,
                phase,
            } => (phase, slice, echo, channel),
            BlockCoord::PassSlice {
                pass,
                slice,
                echo,
                channel,
            } => (pass, slice, echo, channel),
        };
        let phase = bounded("phase", phase, data.phases)?;
        let slice = bounded("slice", slice, data.slices)?;
        let echo = bounded("echo", echo, data.echoes)?;
        let channel = bounded("channel", channel, data.channels)?;

        let len = data.block_len()?;
        // the indices are bounded, so the block number stays below the count
        let _ = data.block_count()?;
        let block = ((phase * data.slices + slice) * data.echoes + echo) * data.channels + channel;
        let samples = stride(Some(block), len)
            .and_then(|range| data.blocks.get(range))
            .ok_or_else(|| {
                ConvertError::MalformedSource(format!("block {} is past the payload", block))
            })?
            .to_vec();
        Array2::from_shape_vec((data.views, data.readout), samples)
            .map_err(|e| ConvertError::MalformedSource(e.to_string()))
    }

    fn raw_view(&self, view: usize, channel: usize) -> Result<Array1<Complex32>> {
        let data = self.legacy_data()?;
        if data.raw_views.is_empty() {
            return Err(ConvertError::MalformedSource(
                "container has no raw view payload".to_string(),
            ));
        }
        let view = bounded("raw view", view, self.layout.raw_view_count)?;
        let channel = bounded("channel", channel, data.channels)?;
        let slot = view
            .checked_mul(data.channels)
            .and_then(|v| v.checked_add(channel));
        stride(slot, data.readout)
            .and_then(|range| data.raw_views.get(range))
            .map(|samples| Array1::from(samples.to_vec()))
            .ok_or_else(|| {
                ConvertError::MalformedSource(format!("raw view {} is past the payload", view))
            })
    }

    fn control_stream(&self) -> Result<ControlStream<'_>> {
        if self.layout.layout != SourceLayout::Archive {
            return Err(ConvertError::MalformedSource(
                "container has no control stream".to_string(),
            ));
        }
        Ok(Box::new(self.archive.iter().cloned().map(Ok)))
    }
}
