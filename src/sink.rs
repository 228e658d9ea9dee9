//! Destinations for the converted header and acquisition records.
//!
//! The durable destination is a small tagged binary container. All values
//! are little endian. A container starts with the magic `MRDC` and a `u32`
//! format version, followed by sections, each introduced by a one-byte tag:
//!
//! - `H`: header text, as `u64` byte length and UTF-8 bytes;
//! - `A`: one acquisition record (see `write_acquisition`);
//! - `N`: a named complex array, as `u32` name length, name bytes,
//!   `u32` rank, `u64` extents, and the samples in logical order;
//! - `E`: end of the container.
//!
//! Complex samples are stored as the real part followed by the imaginary
//! part, both `f32`.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteordered::{ByteOrdered, Endian, Endianness};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array2, ArrayD, IxDyn};
use num_complex::Complex32;
use num_traits::FromPrimitive;
use tempfile::NamedTempFile;

use crate::acquisition::{
    AcquisitionFlags, AcquisitionRecord, ChannelMask, EncodingIndex, MAX_CHANNELS,
};
use crate::error::{ConvertError, Result};
use crate::util::is_gz_file;

/// Magic code at the start of every container.
pub const MAGIC_CODE: &[u8; 4] = b"MRDC";

/// Version of the container layout written by this crate.
pub const FORMAT_VERSION: u32 = 1;

const MAX_NAME_LEN: usize = 4096;

/// Ordered, append-only destination of a conversion run.
pub trait OutputSink {
    /// Store the serialized header.
    fn write_header(&mut self, xml: &str) -> Result<()>;

    /// Append one acquisition record.
    fn append_acquisition(&mut self, record: &AcquisitionRecord) -> Result<()>;

    /// Append a named complex array.
    fn append_array(&mut self, name: &str, array: &ArrayD<Complex32>) -> Result<()>;
}

/// A sink keeping everything in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySink {
    /// Header document, once written
    pub header: Option<String>,
    /// Records in append order
    pub acquisitions: Vec<AcquisitionRecord>,
    /// Named arrays in append order
    pub arrays: Vec<(String, ArrayD<Complex32>)>,
}

impl MemorySink {
    /// An empty sink.
    pub fn new() -> Self {
        MemorySink::default()
    }
}

impl OutputSink for MemorySink {
    fn write_header(&mut self, xml: &str) -> Result<()> {
        self.header = Some(xml.to_string());
        Ok(())
    }

    fn append_acquisition(&mut self, record: &AcquisitionRecord) -> Result<()> {
        self.acquisitions.push(record.clone());
        Ok(())
    }

    fn append_array(&mut self, name: &str, array: &ArrayD<Complex32>) -> Result<()> {
        self.arrays.push((name.to_string(), array.clone()));
        Ok(())
    }
}

/// Section tags of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum SectionTag {
    /// Header document
    Header = b'H',
    /// One acquisition record
    Acquisition = b'A',
    /// One named array
    Array = b'N',
    /// End of the container
    End = b'E',
}

enum Stream {
    Plain(BufWriter<NamedTempFile>),
    Gz(GzEncoder<BufWriter<NamedTempFile>>),
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(w) => w.write(buf),
            Stream::Gz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(w) => w.flush(),
            Stream::Gz(w) => w.flush(),
        }
    }
}

impl Stream {
    fn into_file(self) -> io::Result<NamedTempFile> {
        let buffered = match self {
            Stream::Plain(w) => w,
            Stream::Gz(w) => w.finish()?,
        };
        buffered.into_inner().map_err(|e| e.into_error())
    }
}

/// Writer of the binary container.
///
/// Everything goes to a temporary file next to the destination, which
/// only takes the destination's name in [`finish`]. A writer dropped
/// before that leaves nothing behind.
///
/// [`finish`]: #method.finish
pub struct ContainerWriter {
    target: PathBuf,
    stream: Stream,
    acquisitions: usize,
    arrays: usize,
}

impl fmt::Debug for ContainerWriter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ContainerWriter")
            .field("target", &self.target)
            .field("acquisitions", &self.acquisitions)
            .field("arrays", &self.arrays)
            .finish()
    }
}

impl ContainerWriter {
    /// Start a container at the given path.
    /// If the file's name ends with ".gz", the container is GZip encoded.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<ContainerWriter> {
        let target = path.as_ref().to_path_buf();
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file = BufWriter::new(NamedTempFile::new_in(dir)?);
        let mut stream = if is_gz_file(&target) {
            Stream::Gz(GzEncoder::new(file, Compression::default()))
        } else {
            Stream::Plain(file)
        };
        stream.write_all(MAGIC_CODE)?;
        ByteOrdered::le(&mut stream).write_u32(FORMAT_VERSION)?;
        Ok(ContainerWriter {
            target,
            stream,
            acquisitions: 0,
            arrays: 0,
        })
    }

    /// Final path of the container.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Close the container and move it to its destination.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.stream.write_all(&[SectionTag::End as u8])?;
        let file = self.stream.into_file()?;
        file.as_file().sync_all()?;
        let _ = file.persist(&self.target).map_err(|e| e.error)?;
        info!(
            "wrote {} acquisitions and {} arrays to {}",
            self.acquisitions,
            self.arrays,
            self.target.display()
        );
        Ok(self.target)
    }
}

impl OutputSink for ContainerWriter {
    fn write_header(&mut self, xml: &str) -> Result<()> {
        let mut w = ByteOrdered::le(&mut self.stream);
        w.write_u8(SectionTag::Header as u8)?;
        w.write_u64(xml.len() as u64)?;
        w.write_all(xml.as_bytes())?;
        Ok(())
    }

    fn append_acquisition(&mut self, record: &AcquisitionRecord) -> Result<()> {
        let mut w = ByteOrdered::le(&mut self.stream);
        w.write_u8(SectionTag::Acquisition as u8)?;
        write_acquisition(&mut w, record)?;
        self.acquisitions += 1;
        Ok(())
    }

    fn append_array(&mut self, name: &str, array: &ArrayD<Complex32>) -> Result<()> {
        let mut w = ByteOrdered::le(&mut self.stream);
        w.write_u8(SectionTag::Array as u8)?;
        w.write_u32(name.len() as u32)?;
        w.write_all(name.as_bytes())?;
        w.write_u32(array.ndim() as u32)?;
        for &d in array.shape() {
            w.write_u64(d as u64)?;
        }
        write_samples(&mut w, array.iter())?;
        self.arrays += 1;
        Ok(())
    }
}

fn write_samples<'a, W, E, I>(w: &mut ByteOrdered<W, E>, samples: I) -> io::Result<()>
where
    W: Write,
    E: Endian,
    I: Iterator<Item = &'a Complex32>,
{
    for s in samples {
        w.write_f32(s.re)?;
        w.write_f32(s.im)?;
    }
    Ok(())
}

fn write_acquisition<W, E>(w: &mut ByteOrdered<W, E>, record: &AcquisitionRecord) -> io::Result<()>
where
    W: Write,
    E: Endian,
{
    w.write_u32(record.measurement_uid)?;
    w.write_u32(record.scan_counter)?;
    w.write_u32(record.acquisition_time_stamp)?;
    w.write_u64(record.flags.bits())?;
    w.write_u16(record.available_channels)?;
    for &word in record.channel_mask.words() {
        w.write_u64(word)?;
    }
    w.write_u16(record.discard_pre)?;
    w.write_u16(record.discard_post)?;
    w.write_u16(record.center_sample)?;
    w.write_u16(record.encoding_space_ref)?;
    w.write_f32(record.sample_time_us)?;
    for &p in &record.patient_table_position {
        w.write_f32(p)?;
    }
    let idx = &record.idx;
    for &v in &[
        idx.kspace_encode_step_1,
        idx.kspace_encode_step_2,
        idx.average,
        idx.slice,
        idx.contrast,
        idx.phase,
        idx.repetition,
        idx.set,
        idx.segment,
    ] {
        w.write_u32(v)?;
    }
    w.write_u32(record.data.nrows() as u32)?;
    w.write_u32(record.data.ncols() as u32)?;
    write_samples(w, record.data.iter())
}

/// A section read back from a container.
#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    /// The header document.
    Header(String),
    /// One acquisition record.
    Acquisition(AcquisitionRecord),
    /// A named array.
    Array(String, ArrayD<Complex32>),
}

/// Sequential reader of the binary container.
#[derive(Debug)]
pub struct ContainerReader<R> {
    source: ByteOrdered<R, Endianness>,
    done: bool,
}

impl ContainerReader<Box<dyn Read>> {
    /// Open a container file.
    /// If the file's name ends with ".gz", the file is assumed to need GZip decoding.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = BufReader::new(File::open(&path)?);
        let source: Box<dyn Read> = if is_gz_file(&path) {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Self::new(source)
    }

    /// Read a whole container file into memory.
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<MemorySink> {
        let mut sink = MemorySink::new();
        Self::open(path)?.read_into(&mut sink)?;
        Ok(sink)
    }
}

fn malformed<S: Into<String>>(reason: S) -> ConvertError {
    ConvertError::MalformedSource(reason.into())
}

impl<R: Read> ContainerReader<R> {
    /// Check the magic code and version, and position the reader at the first section.
    pub fn new(source: R) -> Result<Self> {
        let mut source = ByteOrdered::runtime(source, Endianness::Little);
        let mut magic = [0u8; 4];
        source.read_exact(&mut magic)?;
        if &magic != MAGIC_CODE {
            return Err(malformed("not a raw-data container"));
        }
        let version = source.read_u32()?;
        if version != FORMAT_VERSION {
            return Err(malformed(format!("unsupported container version {}", version)));
        }
        Ok(ContainerReader {
            source,
            done: false,
        })
    }

    /// Read the next section, or `None` once the end marker was read.
    pub fn next_section(&mut self) -> Result<Option<Section>> {
        if self.done {
            return Ok(None);
        }
        let tag = self.source.read_u8()?;
        match SectionTag::from_u8(tag) {
            Some(SectionTag::End) => {
                self.done = true;
                Ok(None)
            }
            Some(SectionTag::Header) => {
                let len = self.source.read_u64()? as usize;
                let bytes = self.read_bytes(len)?;
                let text =
                    String::from_utf8(bytes).map_err(|_| malformed("header is not UTF-8"))?;
                Ok(Some(Section::Header(text)))
            }
            Some(SectionTag::Acquisition) => {
                self.read_acquisition().map(|r| Some(Section::Acquisition(r)))
            }
            Some(SectionTag::Array) => {
                let len = self.source.read_u32()? as usize;
                if len > MAX_NAME_LEN {
                    return Err(malformed(format!("array name of {} bytes", len)));
                }
                let name = String::from_utf8(self.read_bytes(len)?)
                    .map_err(|_| malformed("array name is not UTF-8"))?;
                let rank = self.source.read_u32()? as usize;
                if rank > 16 {
                    return Err(malformed(format!("array of rank {}", rank)));
                }
                let mut shape = Vec::with_capacity(rank);
                for _ in 0..rank {
                    shape.push(self.source.read_u64()? as usize);
                }
                let count = shape
                    .iter()
                    .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                    .ok_or_else(|| malformed("array size overflows"))?;
                let samples = self.read_samples(count)?;
                let array = ArrayD::from_shape_vec(IxDyn(&shape), samples)
                    .map_err(|e| malformed(e.to_string()))?;
                Ok(Some(Section::Array(name, array)))
            }
            None => Err(malformed(format!("unknown section tag {:#04x}", tag))),
        }
    }

    /// Replay every remaining section into a sink.
    pub fn read_into<S: OutputSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        while let Some(section) = self.next_section()? {
            match section {
                Section::Header(h) => sink.write_header(&h)?,
                Section::Acquisition(r) => sink.append_acquisition(&r)?,
                Section::Array(name, a) => sink.append_array(&name, &a)?,
            }
        }
        Ok(())
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        let read = (&mut self.source)
            .take(len as u64)
            .read_to_end(&mut bytes)?;
        if read != len {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        Ok(bytes)
    }

    fn read_samples(&mut self, count: usize) -> Result<Vec<Complex32>> {
        let mut samples = Vec::new();
        for _ in 0..count {
            let re = self.source.read_f32()?;
            let im = self.source.read_f32()?;
            samples.push(Complex32::new(re, im));
        }
        Ok(samples)
    }

    fn read_acquisition(&mut self) -> Result<AcquisitionRecord> {
        let s = &mut self.source;
        let measurement_uid = s.read_u32()?;
        let scan_counter = s.read_u32()?;
        let acquisition_time_stamp = s.read_u32()?;
        let flags = AcquisitionFlags::from_bits(s.read_u64()?);
        let available_channels = s.read_u16()?;
        let mut words = [0u64; MAX_CHANNELS / 64];
        for word in words.iter_mut() {
            *word = s.read_u64()?;
        }
        let discard_pre = s.read_u16()?;
        let discard_post = s.read_u16()?;
        let center_sample = s.read_u16()?;
        let encoding_space_ref = s.read_u16()?;
        let sample_time_us = s.read_f32()?;
        let mut patient_table_position = [0f32; 3];
        for p in patient_table_position.iter_mut() {
            *p = s.read_f32()?;
        }
        let mut idx = [0u32; 9];
        for v in idx.iter_mut() {
            *v = s.read_u32()?;
        }
        let channels = s.read_u32()? as usize;
        let samples = s.read_u32()? as usize;
        if channels > MAX_CHANNELS {
            return Err(malformed(format!("record with {} channels", channels)));
        }
        let data = self.read_samples(channels * samples)?;
        let data = Array2::from_shape_vec((channels, samples), data)
            .map_err(|e| malformed(e.to_string()))?;

        Ok(AcquisitionRecord {
            measurement_uid,
            scan_counter,
            acquisition_time_stamp,
            flags,
            available_channels,
            channel_mask: ChannelMask::from_words(words),
            discard_pre,
            discard_post,
            center_sample,
            encoding_space_ref,
            sample_time_us,
            patient_table_position,
            idx: EncodingIndex {
                kspace_encode_step_1: idx[0],
                kspace_encode_step_2: idx[1],
                average: idx[2],
                slice: idx[3],
                contrast: idx[4],
                phase: idx[5],
                repetition: idx[6],
                set: idx[7],
                segment: idx[8],
            },
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::AcquisitionFlag;
    use ndarray::Array3;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn record(counter: u32) -> AcquisitionRecord {
        let mut r = AcquisitionRecord::new(2, 3);
        r.scan_counter = counter;
        r.measurement_uid = 7;
        r.available_channels = 2;
        r.channel_mask = ChannelMask::first(2);
        r.center_sample = 1;
        r.sample_time_us = 4.;
        r.flags.set(AcquisitionFlag::FirstInSlice);
        r.idx.kspace_encode_step_1 = counter;
        r.idx.segment = 3;
        for ((c, s), v) in r.data.indexed_iter_mut() {
            *v = Complex32::new(c as f32, s as f32 + counter as f32);
        }
        r
    }

    fn fill(sink: &mut dyn OutputSink) -> Result<()> {
        sink.write_header("<ismrmrdHeader/>")?;
        sink.append_acquisition(&record(0))?;
        sink.append_acquisition(&record(1))?;
        let volume = Array3::from_shape_fn((2, 3, 4), |(a, b, c)| {
            Complex32::new(a as f32, (b * 4 + c) as f32)
        })
        .into_dyn();
        sink.append_array("kspace_echo0_phase0", &volume)
    }

    #[test]
    fn memory_sink_keeps_order() {
        let mut sink = MemorySink::new();
        fill(&mut sink).unwrap();
        assert_eq!(sink.header.as_deref(), Some("<ismrmrdHeader/>"));
        let counters: Vec<u32> = sink.acquisitions.iter().map(|r| r.scan_counter).collect();
        assert_eq!(counters, vec![0, 1]);
        assert_eq!(sink.arrays[0].1.shape(), &[2, 3, 4]);
    }

    #[test]
    fn container_round_trip() {
        let dir = tempdir().unwrap();
        for name in &["out.mrd", "out.mrd.gz"] {
            let path = dir.path().join(name);
            let mut writer = ContainerWriter::create(&path).unwrap();
            fill(&mut writer).unwrap();
            assert!(!path.exists());
            writer.finish().unwrap();

            let mut expected = MemorySink::new();
            fill(&mut expected).unwrap();
            let got = ContainerReader::read_file(&path).unwrap();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn unfinished_writer_leaves_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.mrd");
        {
            let mut writer = ContainerWriter::create(&path).unwrap();
            writer.write_header("<ismrmrdHeader/>").unwrap();
        }
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn rejects_foreign_bytes() {
        let err = ContainerReader::new(&b"PK\x03\x04\0\0\0\0"[..]).unwrap_err();
        assert!(matches!(err, ConvertError::MalformedSource(_)));

        let mut bytes = MAGIC_CODE.to_vec();
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.push(b'Z');
        let mut reader = ContainerReader::new(&bytes[..]).unwrap();
        assert!(matches!(reader.next_section(), Err(ConvertError::MalformedSource(_))));
    }

    #[test]
    fn truncated_container() {
        let mut bytes = MAGIC_CODE.to_vec();
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.push(b'H');
        bytes.extend_from_slice(&100u64.to_le_bytes());
        bytes.extend_from_slice(b"<short/>");
        let mut reader = ContainerReader::new(&bytes[..]).unwrap();
        assert!(matches!(reader.next_section(), Err(ConvertError::Io(_))));
    }
}
