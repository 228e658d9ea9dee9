//! Conversion of MRI scanner raw-data containers into a vendor-neutral
//! raw-data interchange format: an XML header describing the acquisition,
//! followed by one record per readout line with its full encoding index.
//!
//! Two container generations are supported behind the
//! [`MetadataAccessor`] trait: legacy containers with contiguous,
//! array-ordered sample blocks, and archive containers whose readouts are
//! tagged by control packets.
//!
//! # Example
//!
//! ```no_run
//! use mrdconv::{ContainerWriter, ConvertOptions, Converter, Snapshot};
//! # use mrdconv::error::Result;
//!
//! # fn run() -> Result<()> {
//! let source = Snapshot::from_file("scan.json.gz")?;
//! let converter = Converter::new(&source, ConvertOptions::default());
//! let mut sink = ContainerWriter::create("scan.mrd")?;
//! converter.write_to(&mut sink)?;
//! sink.finish()?;
//! # Ok(())
//! # }
//! # run().unwrap()
//! ```
//!
//! [`MetadataAccessor`]: ./accessor/trait.MetadataAccessor.html
#![deny(missing_debug_implementations)]
#![warn(missing_docs, unused_extern_crates, trivial_casts, unused_results)]

#[macro_use]
extern crate quick_error;
#[macro_use]
extern crate num_derive;
#[macro_use]
extern crate log;

pub mod accessor;
pub mod acquisition;
pub mod builder;
pub mod convert;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod header;
pub mod index;
pub mod packet;
pub mod params;
pub mod registry;
pub mod sink;
pub mod snapshot;
pub mod transform;
pub mod typedef;
pub mod util;
pub mod xml;

pub use accessor::MetadataAccessor;
pub use acquisition::{AcquisitionRecord, EncodingIndex};
pub use builder::{BuildOptions, HeaderBuilder};
pub use convert::{ConvertOptions, Converter, Summary};
pub use error::{ConvertError, Outcome, Warning};
pub use extract::{GenericConverter, LegacyWalk, SequenceConverter};
pub use geometry::AcquisitionGeometry;
pub use header::NormalizedHeader;
pub use index::IndexResolver;
pub use registry::{ConversionConfig, ConverterRegistry};
pub use sink::{ContainerReader, ContainerWriter, MemorySink, OutputSink};
pub use snapshot::Snapshot;
pub use transform::TransformPipeline;
