//! Acquisition geometry, derived once per run from the raw container.

use crate::accessor::{MetadataAccessor, ScalarLookup};
use crate::acquisition::MAX_CHANNELS;
use crate::error::{ConvertError, Result};
use crate::typedef::SourceLayout;
use crate::util::parse_decimal;

/// Matrix size along the three spatial axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Samples per readout, or image columns.
    pub x: usize,
    /// Phase-encoding views, or image rows.
    pub y: usize,
    /// Slices or partitions.
    pub z: usize,
}

/// Sign-alternation flags per axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Chop {
    /// Along the readout.
    pub x: bool,
    /// Along the phase-encoding direction.
    pub y: bool,
    /// Across slices or partitions.
    pub z: bool,
}

/// Everything the index resolver and the extractor branch on.
///
/// `acquired.z` counts partitions of a 3D acquisition or slices of a 2D one.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionGeometry {
    /// Container generation.
    pub layout: SourceLayout,
    /// Volumetric acquisition: `acquired.z` counts partitions.
    pub is_3d: bool,
    /// Blocks are addressed by (pass, slice) pairs.
    pub is_z_encoded: bool,
    /// Raw view order with the slice innermost.
    pub raw_mode: bool,
    /// Sampled matrix.
    pub acquired: Resolution,
    /// Reconstructed matrix.
    pub transform: Resolution,
    /// Receiver channels.
    pub channels: usize,
    /// Echoes, reported as contrasts.
    pub echoes: usize,
    /// Cardiac or temporal phases.
    pub phases: usize,
    /// Passes over the whole acquisition.
    pub repetitions: usize,
    /// Baseline views preceding the views of each slice in the default
    /// raw view order.
    pub baseline_views: usize,
    /// Views per excitation, 1 without an echo train.
    pub echo_train_length: usize,
    /// Sign alternation per axis.
    pub chop: Chop,
    /// Partial averaging.
    pub half_nex: bool,
    /// Partial echo.
    pub half_echo: bool,
    /// Run number of the scan, used as measurement identifier.
    pub run_number: u32,
    /// Raw view positions of a legacy container, baselines included.
    pub raw_view_count: usize,
}

/// Largest resolution or count a geometry may declare. Encoding counters
/// and readout lengths are 16 bit wide in the interchange format.
pub const MAX_DIMENSION: usize = u16::MAX as usize;

fn bounded_count(name: &'static str, v: i64) -> Result<usize> {
    if v < 1 || v as u64 > MAX_DIMENSION as u64 {
        Err(ConvertError::InvalidGeometry(name, v))
    } else {
        Ok(v as usize)
    }
}

/// A resolution or channel count, which must be at least 1.
fn positive(source: &dyn MetadataAccessor, name: &'static str) -> Result<usize> {
    bounded_count(name, source.value(name)?)
}

/// An echo, phase or repetition count, where a declared 0 reads as 1.
fn count(source: &dyn MetadataAccessor, name: &'static str) -> Result<usize> {
    match source.value::<i64>(name)? {
        0 => Ok(1),
        v => bounded_count(name, v),
    }
}

/// Like [`count`], reading an absent field as `default`.
fn count_or(source: &dyn MetadataAccessor, name: &'static str, default: usize) -> Result<usize> {
    match source.value_optional::<i64>(name)? {
        None => Ok(default),
        Some(0) => Ok(1),
        Some(v) => bounded_count(name, v),
    }
}

impl AcquisitionGeometry {
    /// Derive the geometry from the raw container.
    ///
    /// # Errors
    ///
    /// - `FieldMissing` if a resolution, the channel count, or the echo or
    ///   phase count is absent.
    /// - `InvalidGeometry` if a resolution or count is negative, a resolution
    ///   is 0, a value exceeds [`MAX_DIMENSION`], or there are more channels
    ///   than a record can flag as active.
    ///
    /// Echo, phase and repetition counts of 0 are read as 1, and an absent
    /// repetition count as 1. An absent baseline count means one baseline
    /// view per slice.
    pub fn from_accessor(source: &dyn MetadataAccessor) -> Result<Self> {
        let layout = source.layout();
        let acquired = Resolution {
            x: positive(source, "AcquiredXRes")?,
            y: positive(source, "AcquiredYRes")?,
            z: positive(source, "AcquiredZRes")?,
        };
        let transform = Resolution {
            x: positive(source, "TransformXRes")?,
            y: positive(source, "TransformYRes")?,
            z: positive(source, "TransformZRes")?,
        };
        let channels = positive(source, "NumChannels")?;
        let baseline_views = match source.value_optional::<i64>("NumBaselineViews")? {
            None => 1,
            Some(0) => 0,
            Some(v) => bounded_count("NumBaselineViews", v)?,
        };
        let echo_train_length = match parse_decimal(&source.image().echo_train_length) {
            None => 1,
            Some(v) if v <= 1.0 => 1,
            Some(v) => bounded_count("EchoTrainLength", v as i64)?,
        };

        let geometry = AcquisitionGeometry {
            layout: layout.layout,
            is_3d: source.value("Is3DAcquisition")?,
            is_z_encoded: layout.z_encoded,
            raw_mode: layout.raw_mode,
            acquired,
            transform,
            channels,
            echoes: count(source, "NumEchoes")?,
            phases: count(source, "NumPhases")?,
            repetitions: count_or(source, "NumVolumes", 1)?,
            baseline_views,
            echo_train_length,
            chop: Chop {
                x: source.value("ChopX")?,
                y: source.value("ChopY")?,
                z: source.value_strict("ChopZ")?,
            },
            half_nex: source.value_strict("HalfNex")?,
            half_echo: source.value("HalfEcho")?,
            run_number: layout.run_number,
            raw_view_count: layout.raw_view_count,
        };
        geometry.check()?;
        debug!("acquisition geometry: {:?}", geometry);
        Ok(geometry)
    }

    /// Check that every resolution and count lies in `1..=MAX_DIMENSION`
    /// and that the channels fit a channel mask. A geometry derived with
    /// [`from_accessor`](#method.from_accessor) always passes.
    ///
    /// # Errors
    ///
    /// `InvalidGeometry` naming the first offending value.
    pub fn check(&self) -> Result<()> {
        let counts = [
            ("AcquiredXRes", self.acquired.x),
            ("AcquiredYRes", self.acquired.y),
            ("AcquiredZRes", self.acquired.z),
            ("TransformXRes", self.transform.x),
            ("TransformYRes", self.transform.y),
            ("TransformZRes", self.transform.z),
            ("NumChannels", self.channels),
            ("NumEchoes", self.echoes),
            ("NumPhases", self.phases),
            ("NumVolumes", self.repetitions),
            ("EchoTrainLength", self.echo_train_length),
        ];
        for (name, v) in counts.iter() {
            if *v == 0 || *v > MAX_DIMENSION {
                return Err(ConvertError::InvalidGeometry(*name, *v as i64));
            }
        }
        if self.channels > MAX_CHANNELS {
            return Err(ConvertError::InvalidGeometry("NumChannels", self.channels as i64));
        }
        if self.baseline_views > MAX_DIMENSION {
            return Err(ConvertError::InvalidGeometry(
                "NumBaselineViews",
                self.baseline_views as i64,
            ));
        }
        Ok(())
    }

    /// Number of samples in one readout.
    pub fn readout(&self) -> usize {
        self.acquired.x
    }

    /// Number of phase-encoding views per slice or partition.
    pub fn views(&self) -> usize {
        self.acquired.y
    }

    /// Number of slices (2D) or partitions (3D).
    pub fn slices(&self) -> usize {
        self.acquired.z
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::accessor::ScalarValue::{Bool, Int};
    use crate::snapshot::Snapshot;

    pub(crate) fn control_snapshot(layout: SourceLayout) -> Snapshot {
        let mut s = Snapshot::new(layout);
        for (k, v) in &[
            ("AcquiredXRes", 64),
            ("AcquiredYRes", 32),
            ("AcquiredZRes", 4),
            ("TransformXRes", 128),
            ("TransformYRes", 128),
            ("TransformZRes", 4),
            ("NumChannels", 8),
            ("NumEchoes", 2),
            ("NumPhases", 1),
        ] {
            s.set_scalar(*k, Int(*v));
        }
        for k in &["Is3DAcquisition", "ChopX", "ChopY", "ChopZ", "HalfNex", "HalfEcho"] {
            s.set_scalar(*k, Bool(false));
        }
        s
    }

    #[test]
    fn derives_counts() {
        let s = control_snapshot(SourceLayout::Legacy);
        let g = AcquisitionGeometry::from_accessor(&s).unwrap();
        assert_eq!(g.acquired, Resolution { x: 64, y: 32, z: 4 });
        assert_eq!(g.channels, 8);
        assert_eq!(g.echoes, 2);
        assert_eq!(g.repetitions, 1);
        assert_eq!(g.baseline_views, 1);
        assert_eq!(g.echo_train_length, 1);
        assert!(!g.is_3d);
    }

    #[test]
    fn missing_resolution_is_fatal() {
        let mut s = control_snapshot(SourceLayout::Legacy);
        let _ = s.control.remove("AcquiredYRes");
        match AcquisitionGeometry::from_accessor(&s) {
            Err(ConvertError::FieldMissing(name)) => assert_eq!(name, "AcquiredYRes"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn strict_flags_reject_integers() {
        let mut s = control_snapshot(SourceLayout::Legacy);
        s.set_scalar("HalfNex", Int(0));
        assert!(matches!(
            AcquisitionGeometry::from_accessor(&s),
            Err(ConvertError::TypeMismatch(_, "bool"))
        ));
    }

    #[test]
    fn invalid_counts_are_rejected() {
        let mut s = control_snapshot(SourceLayout::Legacy);
        s.set_scalar("NumEchoes", Int(-1));
        assert!(matches!(
            AcquisitionGeometry::from_accessor(&s),
            Err(ConvertError::InvalidGeometry("NumEchoes", -1))
        ));
        let mut s = control_snapshot(SourceLayout::Legacy);
        s.set_scalar("AcquiredXRes", Int(0));
        assert!(matches!(
            AcquisitionGeometry::from_accessor(&s),
            Err(ConvertError::InvalidGeometry("AcquiredXRes", 0))
        ));
        let mut s = control_snapshot(SourceLayout::Legacy);
        s.set_scalar("NumChannels", Int(MAX_CHANNELS as i64 + 1));
        assert!(AcquisitionGeometry::from_accessor(&s).is_err());
    }

    #[test]
    fn zero_counts_read_as_one() {
        let mut s = control_snapshot(SourceLayout::Legacy);
        for k in &["NumEchoes", "NumPhases", "NumVolumes"] {
            s.set_scalar(*k, Int(0));
        }
        let g = AcquisitionGeometry::from_accessor(&s).unwrap();
        assert_eq!((g.echoes, g.phases, g.repetitions), (1, 1, 1));
    }

    #[test]
    fn oversized_resolutions_are_rejected() {
        let mut s = control_snapshot(SourceLayout::Legacy);
        s.set_scalar("AcquiredYRes", Int((1 << 32) + 4));
        assert!(matches!(
            AcquisitionGeometry::from_accessor(&s),
            Err(ConvertError::InvalidGeometry("AcquiredYRes", _))
        ));
        let mut s = control_snapshot(SourceLayout::Legacy);
        s.set_scalar("TransformXRes", Int(MAX_DIMENSION as i64 + 1));
        assert!(AcquisitionGeometry::from_accessor(&s).is_err());
        let mut s = control_snapshot(SourceLayout::Legacy);
        s.set_scalar("NumVolumes", Int(MAX_DIMENSION as i64));
        assert_eq!(
            AcquisitionGeometry::from_accessor(&s).unwrap().repetitions,
            MAX_DIMENSION
        );
    }

    #[test]
    fn hand_built_geometry_is_checked() {
        let s = control_snapshot(SourceLayout::Legacy);
        let mut g = AcquisitionGeometry::from_accessor(&s).unwrap();
        assert!(g.check().is_ok());
        g.acquired.y = (1 << 32) + 4;
        assert!(matches!(
            g.check(),
            Err(ConvertError::InvalidGeometry("AcquiredYRes", _))
        ));
        g.acquired.y = 32;
        g.echoes = 0;
        assert!(matches!(
            g.check(),
            Err(ConvertError::InvalidGeometry("NumEchoes", 0))
        ));
    }

    #[test]
    fn baseline_views() {
        let mut s = control_snapshot(SourceLayout::Legacy);
        s.set_scalar("NumBaselineViews", Int(0));
        assert_eq!(AcquisitionGeometry::from_accessor(&s).unwrap().baseline_views, 0);
        s.set_scalar("NumBaselineViews", Int(-2));
        assert!(AcquisitionGeometry::from_accessor(&s).is_err());
    }
}
