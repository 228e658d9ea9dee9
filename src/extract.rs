//! Extraction of acquisition records from a raw container.
//!
//! The [`SequenceConverter`] trait is the capability a pulse sequence's
//! converter must offer; [`GenericConverter`] implements it for every
//! sequence laid out the default way, and is what the registry falls back to.
//!
//! [`SequenceConverter`]: ./trait.SequenceConverter.html
//! [`GenericConverter`]: ./struct.GenericConverter.html

use std::fmt;

use ndarray::{s, Array2, Array4};
use num_complex::Complex32;
use rayon::prelude::*;

use crate::accessor::{BlockCoord, MetadataAccessor};
use crate::acquisition::{AcquisitionFlag, AcquisitionFlags, AcquisitionRecord, ChannelMask, EncodingIndex};
use crate::error::{ConvertError, Outcome, Result, Warning};
use crate::geometry::AcquisitionGeometry;
use crate::index::{bounded, IndexResolver};
use crate::packet::ControlPacket;
use crate::typedef::SourceLayout;

/// How the readouts of a legacy container are walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyWalk {
    /// Block by block, through the (slice, echo, channel, phase) accessor.
    Blocks,
    /// Raw view position by position, in storage order.
    Views,
}

impl Default for LegacyWalk {
    fn default() -> Self {
        LegacyWalk::Blocks
    }
}

/// Conversion routine of one family of pulse sequences.
pub trait SequenceConverter: Send + Sync + fmt::Debug {
    /// Name under which the converter is registered.
    fn name(&self) -> &str;

    /// Extract every acquisition record of the run, ordered by scan counter.
    ///
    /// `walk` selects the legacy walk and is ignored for archive sources.
    fn acquisitions(
        &self,
        source: &dyn MetadataAccessor,
        geometry: &AcquisitionGeometry,
        walk: LegacyWalk,
    ) -> Result<Outcome<Vec<AcquisitionRecord>>>;

    /// The k-space of one echo and phase, shaped
    /// `(readout, views, slices, channels)`. `None` if the source layout has
    /// no addressable blocks.
    fn kspace_volume(
        &self,
        source: &dyn MetadataAccessor,
        geometry: &AcquisitionGeometry,
        echo: usize,
        phase: usize,
    ) -> Result<Option<Array4<Complex32>>>;
}

/// Header values shared by every record of a run.
#[derive(Debug, Clone)]
struct RecordStamp {
    measurement_uid: u32,
    time_stamp: u32,
    available_channels: u16,
    channel_mask: ChannelMask,
    center_sample: u16,
    sample_time_us: f32,
    views: usize,
    partitions: usize,
    is_3d: bool,
}

impl RecordStamp {
    fn new(source: &dyn MetadataAccessor, g: &AcquisitionGeometry) -> Self {
        let bandwidth = source.raw_header().bandwidth;
        RecordStamp {
            measurement_uid: g.run_number,
            // the container holds no acquisition time, the conversion time stands in
            time_stamp: chrono::Utc::now().timestamp() as u32,
            available_channels: g.channels as u16,
            channel_mask: ChannelMask::first(g.channels),
            center_sample: (g.readout() / 2) as u16,
            sample_time_us: if bandwidth > 0. { 500. / bandwidth } else { 0. },
            views: g.views(),
            partitions: g.slices(),
            is_3d: g.is_3d,
        }
    }

    fn flags(&self, idx: &EncodingIndex) -> AcquisitionFlags {
        let mut flags = AcquisitionFlags::default();
        let ky = idx.kspace_encode_step_1 as usize;
        if ky == 0 {
            flags.set(AcquisitionFlag::FirstInSlice);
        }
        if ky + 1 == self.views {
            flags.set(AcquisitionFlag::LastInSlice);
        }
        if self.is_3d {
            let kz = idx.kspace_encode_step_2 as usize;
            if kz == 0 {
                flags.set(AcquisitionFlag::FirstInEncodeStep2);
            }
            if kz + 1 == self.partitions {
                flags.set(AcquisitionFlag::LastInEncodeStep2);
            }
        }
        flags
    }

    fn apply(&self, record: &mut AcquisitionRecord, scan_counter: usize, idx: EncodingIndex) {
        record.measurement_uid = self.measurement_uid;
        record.scan_counter = scan_counter as u32;
        record.acquisition_time_stamp = self.time_stamp;
        record.flags = self.flags(&idx);
        record.available_channels = self.available_channels;
        record.channel_mask = self.channel_mask;
        record.discard_pre = 0;
        record.discard_post = 0;
        record.center_sample = self.center_sample;
        record.encoding_space_ref = 0;
        record.sample_time_us = self.sample_time_us;
        record.patient_table_position = [0.; 3];
        record.idx = idx;
    }
}

fn block_coord(g: &AcquisitionGeometry, slice: usize, echo: usize, channel: usize, phase: usize) -> BlockCoord {
    if g.is_z_encoded {
        BlockCoord::PassSlice {
            pass: phase,
            slice,
            echo,
            channel,
        }
    } else {
        BlockCoord::Slice {
            slice,
            echo,
            channel,
            phase,
        }
    }
}

fn read_block(
    source: &dyn MetadataAccessor,
    g: &AcquisitionGeometry,
    slice: usize,
    echo: usize,
    channel: usize,
    phase: usize,
) -> Result<Array2<Complex32>> {
    let block = source.complex_block(block_coord(g, slice, echo, channel, phase))?;
    let (views, readout) = block.dim();
    if views != g.views() {
        return Err(ConvertError::StructuralMismatch("block views", views, g.views()));
    }
    if readout != g.readout() {
        return Err(ConvertError::StructuralMismatch("block readout", readout, g.readout()));
    }
    Ok(block)
}

/// The default converter, valid for any sequence stored in the default order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GenericConverter;

impl GenericConverter {
    /// Class name of the converter in mapping documents.
    pub const NAME: &'static str = "GenericConverter";

    /// Create the converter.
    pub fn new() -> Self {
        GenericConverter
    }

    /// Walk a legacy container block by block.
    ///
    /// Records are laid out in advance, record `view + V·(echo + E·(slice +
    /// S·phase))` holding the readout at `view` of block (slice, echo, phase).
    /// Channel 0 fills in the record headers, every channel its own samples.
    /// The (slice, echo) blocks of one channel are read in parallel.
    fn legacy_blocks(
        &self,
        source: &dyn MetadataAccessor,
        g: &AcquisitionGeometry,
    ) -> Result<Vec<AcquisitionRecord>> {
        let views = g.views();
        let per_phase = g.slices() * g.echoes * views;
        let stamp = RecordStamp::new(source, g);
        let resolver = IndexResolver::new(g);

        let mut records: Vec<_> = (0..g.phases * per_phase)
            .map(|_| AcquisitionRecord::new(g.channels, g.readout()))
            .collect();

        for (phase, phase_records) in records.chunks_mut(per_phase).enumerate() {
            for channel in 0..g.channels {
                debug!("reading phase {} channel {}", phase, channel);
                phase_records
                    .par_chunks_mut(views)
                    .enumerate()
                    .try_for_each(|(unit, chunk)| -> Result<()> {
                        let (slice, echo) = (unit / g.echoes, unit % g.echoes);
                        let block = read_block(source, g, slice, echo, channel, phase)?;
                        for (view, record) in chunk.iter_mut().enumerate() {
                            record.data.row_mut(channel).assign(&block.row(view));
                            if channel == 0 {
                                let idx = resolver.resolve_block(view, slice, echo, phase)?;
                                stamp.apply(record, phase * per_phase + unit * views + view, idx);
                            }
                        }
                        Ok(())
                    })?;
            }
        }
        Ok(records)
    }

    /// Walk a legacy container raw view by raw view, skipping baselines.
    fn legacy_views(
        &self,
        source: &dyn MetadataAccessor,
        g: &AcquisitionGeometry,
    ) -> Result<Vec<AcquisitionRecord>> {
        if g.raw_view_count == 0 {
            return Err(ConvertError::MalformedSource(
                "container declares no raw view positions".to_string(),
            ));
        }
        let stamp = RecordStamp::new(source, g);
        let resolver = IndexResolver::new(g);

        let resolved = (0..g.raw_view_count)
            .into_par_iter()
            .map(|position| -> Result<Option<AcquisitionRecord>> {
                let idx = match resolver.resolve_position(position)? {
                    Some(idx) => idx,
                    None => return Ok(None),
                };
                let mut record = AcquisitionRecord::new(g.channels, g.readout());
                for channel in 0..g.channels {
                    let samples = source.raw_view(position, channel)?;
                    if samples.len() != g.readout() {
                        return Err(ConvertError::StructuralMismatch(
                            "view readout",
                            samples.len(),
                            g.readout(),
                        ));
                    }
                    record.data.row_mut(channel).assign(&samples);
                }
                record.idx = idx;
                Ok(Some(record))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut records: Vec<_> = resolved.into_iter().flatten().collect();
        for (counter, record) in records.iter_mut().enumerate() {
            let idx = record.idx;
            stamp.apply(record, counter, idx);
        }
        Ok(records)
    }

    /// Walk the control stream of an archive container.
    fn archive(
        &self,
        source: &dyn MetadataAccessor,
        g: &AcquisitionGeometry,
    ) -> Result<Outcome<Vec<AcquisitionRecord>>> {
        let stamp = RecordStamp::new(source, g);
        let resolver = IndexResolver::new(g);
        let frame_len = g.channels * g.readout();
        let mut records = Vec::new();
        let mut warnings = Vec::new();

        for (n, entry) in source.control_stream()?.enumerate() {
            let entry = entry?;
            let packet = ControlPacket::decode(&entry.packet)?;
            let idx = match resolver.resolve_packet(&packet)? {
                Some(idx) => idx,
                None => continue,
            };
            let frame = match entry.frames.len() {
                1 => &entry.frames[0],
                0 => {
                    warnings.push(Warning::MalformedControlPacket {
                        packet: n,
                        frames: 0,
                    });
                    continue;
                }
                frames => {
                    warnings.push(Warning::MalformedControlPacket { packet: n, frames });
                    &entry.frames[0]
                }
            };
            if frame.len() != frame_len {
                return Err(ConvertError::StructuralMismatch(
                    "frame samples",
                    frame.len(),
                    frame_len,
                ));
            }
            let mut record = AcquisitionRecord::new(g.channels, g.readout());
            record.data = Array2::from_shape_vec((g.channels, g.readout()), frame.clone())
                .map_err(|e| ConvertError::MalformedSource(e.to_string()))?;
            stamp.apply(&mut record, records.len(), idx);
            records.push(record);
        }

        Ok(Outcome {
            value: records,
            warnings,
        })
    }
}

impl SequenceConverter for GenericConverter {
    fn name(&self) -> &str {
        GenericConverter::NAME
    }

    fn acquisitions(
        &self,
        source: &dyn MetadataAccessor,
        geometry: &AcquisitionGeometry,
        walk: LegacyWalk,
    ) -> Result<Outcome<Vec<AcquisitionRecord>>> {
        geometry.check()?;
        let outcome = match (geometry.layout, walk) {
            (SourceLayout::Legacy, LegacyWalk::Blocks) => {
                Outcome::clean(self.legacy_blocks(source, geometry)?)
            }
            (SourceLayout::Legacy, LegacyWalk::Views) => {
                Outcome::clean(self.legacy_views(source, geometry)?)
            }
            (SourceLayout::Archive, _) => self.archive(source, geometry)?,
        };
        info!(
            "{} acquisitions extracted, {} warnings",
            outcome.value.len(),
            outcome.warnings.len()
        );
        Ok(outcome)
    }

    fn kspace_volume(
        &self,
        source: &dyn MetadataAccessor,
        g: &AcquisitionGeometry,
        echo: usize,
        phase: usize,
    ) -> Result<Option<Array4<Complex32>>> {
        if g.layout != SourceLayout::Legacy {
            return Ok(None);
        }
        g.check()?;
        let _ = bounded("echo", echo, g.echoes)?;
        let _ = bounded("phase", phase, g.phases)?;

        let slices = g.slices();
        let blocks = (0..g.channels * slices)
            .into_par_iter()
            .map(|unit| read_block(source, g, unit % slices, echo, unit / slices, phase))
            .collect::<Result<Vec<_>>>()?;

        let mut volume = Array4::zeros((g.readout(), g.views(), slices, g.channels));
        for (unit, block) in blocks.iter().enumerate() {
            let (slice, channel) = (unit % slices, unit / slices);
            volume
                .slice_mut(s![.., .., slice, channel])
                .assign(&block.t());
        }
        Ok(Some(volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::{ArchiveEntry, ScalarValue};
    use crate::geometry::tests::control_snapshot;
    use crate::snapshot::{LegacyData, Snapshot};

    /// Legacy snapshot whose samples encode their own coordinates.
    fn legacy(readout: usize, views: usize, slices: usize, echoes: usize, channels: usize) -> Snapshot {
        let mut s = control_snapshot(SourceLayout::Legacy);
        s.set_scalar("AcquiredXRes", ScalarValue::Int(readout as i64));
        s.set_scalar("AcquiredYRes", ScalarValue::Int(views as i64));
        s.set_scalar("AcquiredZRes", ScalarValue::Int(slices as i64));
        s.set_scalar("NumEchoes", ScalarValue::Int(echoes as i64));
        s.set_scalar("NumChannels", ScalarValue::Int(channels as i64));
        let mut blocks = Vec::new();
        for slice in 0..slices {
            for echo in 0..echoes {
                for channel in 0..channels {
                    for view in 0..views {
                        for sample in 0..readout {
                            blocks.push(Complex32::new(
                                (slice * 1000 + echo * 100 + view) as f32,
                                (channel * 1000 + sample) as f32,
                            ));
                        }
                    }
                }
            }
        }
        s.legacy = Some(LegacyData {
            readout,
            views,
            slices,
            echoes,
            channels,
            phases: 1,
            blocks,
            raw_views: Vec::new(),
        });
        s
    }

    fn extract(s: &Snapshot, walk: LegacyWalk) -> Outcome<Vec<AcquisitionRecord>> {
        let g = AcquisitionGeometry::from_accessor(s).unwrap();
        GenericConverter::new().acquisitions(s, &g, walk).unwrap()
    }

    #[test]
    fn block_walk_scatters_channels() {
        let s = legacy(4, 3, 2, 2, 2);
        let records = extract(&s, LegacyWalk::Blocks).value;
        assert_eq!(records.len(), 2 * 2 * 3);
        for (n, r) in records.iter().enumerate() {
            assert_eq!(r.scan_counter as usize, n);
            let view = n % 3;
            let echo = (n / 3) % 2;
            let slice = n / 6;
            assert_eq!(r.idx.kspace_encode_step_1 as usize, view);
            assert_eq!(r.idx.contrast as usize, echo);
            assert_eq!(r.idx.slice as usize, slice);
            for channel in 0..2 {
                let z = r.data[[channel, 3]];
                assert_eq!(z.re as usize, slice * 1000 + echo * 100 + view);
                assert_eq!(z.im as usize, channel * 1000 + 3);
            }
        }
        assert!(records[0].flags.contains(AcquisitionFlag::FirstInSlice));
        assert!(records[2].flags.contains(AcquisitionFlag::LastInSlice));
        assert!(records[1].flags.is_empty());
        assert_eq!(records[0].center_sample, 2);
        assert_eq!(records[0].channel_mask.count(), 2);
    }

    #[test]
    fn z_encoded_blocks_are_read_by_pass() {
        let mut s = legacy(2, 2, 2, 1, 1);
        s.layout.z_encoded = true;
        s.set_scalar("Is3DAcquisition", ScalarValue::Bool(true));
        let records = extract(&s, LegacyWalk::Blocks).value;
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.idx.slice == 0));
        assert_eq!(records[3].idx.kspace_encode_step_2, 1);
        assert!(records[3].flags.contains(AcquisitionFlag::LastInEncodeStep2));
        assert!(records[0].flags.contains(AcquisitionFlag::FirstInEncodeStep2));
    }

    #[test]
    fn view_walk_skips_baselines() {
        let (readout, views, slices, channels) = (2, 3, 2, 2);
        let mut s = legacy(readout, views, slices, 1, channels);
        s.set_scalar("NumEchoes", ScalarValue::Int(1));
        let positions = slices * (views + 1);
        s.layout.raw_view_count = positions;
        if let Some(data) = s.legacy.as_mut() {
            data.raw_views = (0..positions * channels * readout)
                .map(|i| Complex32::new(i as f32, 0.))
                .collect();
        }
        let records = extract(&s, LegacyWalk::Views).value;
        assert_eq!(records.len(), slices * views);
        let counters: Vec<_> = records.iter().map(|r| r.scan_counter).collect();
        assert_eq!(counters, (0..6).collect::<Vec<u32>>());
        // second record sits at raw position 2, channel 1
        assert_eq!(records[1].data[[1, 0]].re, ((2 * channels + 1) * readout) as f32);
        assert_eq!(records[3].idx.slice, 1);
        assert_eq!(records[3].idx.kspace_encode_step_1, 0);
    }

    #[test]
    fn archive_walk() {
        let mut s = control_snapshot(SourceLayout::Archive);
        s.set_scalar("AcquiredXRes", ScalarValue::Int(2));
        s.set_scalar("NumChannels", ScalarValue::Int(1));
        let frame = vec![Complex32::new(1., 2.); 2];
        s.archive = vec![
            ArchiveEntry {
                packet: ControlPacket::scan(1, 0, 0).encode().to_vec(),
                frames: vec![frame.clone()],
            },
            ArchiveEntry {
                packet: ControlPacket::scan(0, 0, 0).encode().to_vec(),
                frames: vec![frame.clone()],
            },
            ArchiveEntry {
                packet: ControlPacket::scan(2, 1, 1).encode().to_vec(),
                frames: vec![frame.clone(), frame.clone()],
            },
            ArchiveEntry {
                packet: ControlPacket::scan(3, 1, 0).encode().to_vec(),
                frames: Vec::new(),
            },
        ];
        let outcome = extract(&s, LegacyWalk::Blocks);
        assert_eq!(outcome.value.len(), 2);
        assert_eq!(
            outcome.warnings,
            vec![
                Warning::MalformedControlPacket {
                    packet: 2,
                    frames: 2
                },
                Warning::MalformedControlPacket {
                    packet: 3,
                    frames: 0
                },
            ]
        );
        let r = &outcome.value[1];
        assert_eq!(r.scan_counter, 1);
        assert_eq!(r.idx.kspace_encode_step_1, 1);
        assert_eq!(r.idx.slice, 1);
        assert_eq!(r.idx.contrast, 1);
        assert_eq!(r.data.dim(), (1, 2));
    }

    #[test]
    fn archive_frame_size_must_match() {
        let mut s = control_snapshot(SourceLayout::Archive);
        s.archive = vec![ArchiveEntry {
            packet: ControlPacket::scan(1, 0, 0).encode().to_vec(),
            frames: vec![vec![Complex32::new(0., 0.); 3]],
        }];
        let g = AcquisitionGeometry::from_accessor(&s).unwrap();
        assert!(matches!(
            GenericConverter.acquisitions(&s, &g, LegacyWalk::Blocks),
            Err(ConvertError::StructuralMismatch("frame samples", 3, _))
        ));
    }

    #[test]
    fn kspace_volume_layout() {
        let s = legacy(4, 3, 2, 2, 2);
        let g = AcquisitionGeometry::from_accessor(&s).unwrap();
        let volume = GenericConverter
            .kspace_volume(&s, &g, 1, 0)
            .unwrap()
            .unwrap();
        assert_eq!(volume.dim(), (4, 3, 2, 2));
        let z = volume[[3, 2, 1, 1]];
        assert_eq!(z.re as usize, 1000 + 100 + 2);
        assert_eq!(z.im as usize, 1000 + 3);
        assert!(GenericConverter.kspace_volume(&s, &g, 2, 0).is_err());
    }

    #[test]
    fn archive_has_no_volume() {
        let s = control_snapshot(SourceLayout::Archive);
        let g = AcquisitionGeometry::from_accessor(&s).unwrap();
        assert_eq!(GenericConverter.kspace_volume(&s, &g, 0, 0).unwrap(), None);
    }
}
