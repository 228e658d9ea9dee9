//! Computation of the encoding index of every raw readout.
//!
//! Two strategies exist, one per source layout. Legacy containers store
//! readouts as a flat array whose nesting order is fixed, so the index is
//! recovered from the position alone. Archive containers tag every frame with
//! a control packet carrying its coordinates explicitly.
//!
//! Both strategies assign the partition axis the same way: a 3D acquisition
//! puts it on `kspace_encode_step_2` and keeps `slice` at 0, a 2D acquisition
//! puts it on `slice` and keeps `kspace_encode_step_2` at 0. The header
//! limits follow the same rule.

use crate::acquisition::EncodingIndex;
use crate::error::{ConvertError, Result};
use crate::geometry::AcquisitionGeometry;
use crate::packet::ControlPacket;

/// Where a readout comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLocator {
    /// Linear raw view position in a legacy container.
    Position(usize),
    /// Decoded control packet of an archive stream.
    Packet(ControlPacket),
}

/// Check an index against its declared bound.
pub(crate) fn bounded(dimension: &'static str, index: usize, bound: usize) -> Result<u32> {
    if index < bound {
        Ok(index as u32)
    } else {
        Err(ConvertError::StructuralMismatch(dimension, index, bound))
    }
}

/// Stateless index computation over one acquisition geometry.
#[derive(Debug, Clone, Copy)]
pub struct IndexResolver<'a> {
    geometry: &'a AcquisitionGeometry,
}

impl<'a> IndexResolver<'a> {
    /// Create a resolver for `geometry`.
    pub fn new(geometry: &'a AcquisitionGeometry) -> Self {
        IndexResolver { geometry }
    }

    /// Resolve a readout.
    ///
    /// Returns `Ok(None)` for a locator that does not designate a data
    /// record: a baseline slot of a legacy container or a non-data control
    /// packet.
    ///
    /// # Errors
    ///
    /// `StructuralMismatch` if any resulting index falls outside the
    /// geometry.
    pub fn resolve(&self, locator: &RecordLocator) -> Result<Option<EncodingIndex>> {
        match locator {
            RecordLocator::Position(p) => self.resolve_position(*p),
            RecordLocator::Packet(packet) => self.resolve_packet(packet),
        }
    }

    /// Resolve a raw view position of a legacy container.
    ///
    /// In raw mode the nesting is repetition, then phase-encoding view, then
    /// slice (innermost). Otherwise the default order is repetition, then
    /// slice, then the baseline views of the slice, then its phase-encoding
    /// views.
    pub fn resolve_position(&self, position: usize) -> Result<Option<EncodingIndex>> {
        let g = self.geometry;
        let slices = g.slices();
        let frames = g.views();

        let (repetition, partition, view) = if g.raw_mode {
            let per_rep = slices * frames;
            let rest = position % per_rep;
            (position / per_rep, rest % slices, rest / slices)
        } else {
            let baselines = g.baseline_views;
            let per_slice = baselines + frames;
            let per_rep = slices * per_slice;
            let rest = position % per_rep;
            let k = rest % per_slice;
            if k < baselines {
                trace!("raw view {} is a baseline, skipped", position);
                return Ok(None);
            }
            (position / per_rep, rest / per_slice, k - baselines)
        };

        let mut idx = EncodingIndex {
            kspace_encode_step_1: bounded("view", view, frames)?,
            repetition: bounded("repetition", repetition, g.repetitions)?,
            ..Default::default()
        };
        self.place_partition(&mut idx, partition)?;
        Ok(Some(idx))
    }

    /// Resolve a control packet of an archive stream.
    ///
    /// View numbers are one-based; view 0 marks a non-data packet.
    pub fn resolve_packet(&self, packet: &ControlPacket) -> Result<Option<EncodingIndex>> {
        if !packet.is_data() {
            trace!("control packet {:?} carries no data, skipped", packet);
            return Ok(None);
        }
        let g = self.geometry;
        let mut idx = EncodingIndex {
            kspace_encode_step_1: bounded("view", usize::from(packet.view) - 1, g.views())?,
            contrast: bounded("echo", usize::from(packet.echo), g.echoes)?,
            segment: bounded(
                "echo train",
                usize::from(packet.echo_train_index),
                g.echo_train_length,
            )?,
            repetition: bounded("repetition", usize::from(packet.pass), g.repetitions)?,
            ..Default::default()
        };
        self.place_partition(&mut idx, usize::from(packet.slice))?;
        Ok(Some(idx))
    }

    /// Index of the readout at `view` of the block addressed by
    /// (`slice`, `echo`, `phase`) in a legacy container.
    pub fn resolve_block(
        &self,
        view: usize,
        slice: usize,
        echo: usize,
        phase: usize,
    ) -> Result<EncodingIndex> {
        let g = self.geometry;
        let mut idx = EncodingIndex {
            kspace_encode_step_1: bounded("view", view, g.views())?,
            contrast: bounded("echo", echo, g.echoes)?,
            phase: bounded("phase", phase, g.phases)?,
            ..Default::default()
        };
        self.place_partition(&mut idx, slice)?;
        Ok(idx)
    }

    fn place_partition(&self, idx: &mut EncodingIndex, partition: usize) -> Result<()> {
        let g = self.geometry;
        if g.is_3d {
            idx.kspace_encode_step_2 = bounded("partition", partition, g.slices())?;
            idx.slice = 0;
        } else {
            idx.slice = bounded("slice", partition, g.slices())?;
            idx.kspace_encode_step_2 = 0;
        }
        Ok(())
    }
}
