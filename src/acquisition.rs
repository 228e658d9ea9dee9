//! Normalized acquisition records: one per readout line.

use ndarray::Array2;
use num_complex::Complex32;

/// Maximum number of receiver channels a record can flag as active.
pub const MAX_CHANNELS: usize = 1024;

/// The multidimensional position of a readout in the encoded grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EncodingIndex {
    /// Phase-encoding view
    pub kspace_encode_step_1: u32,
    /// Partition of a 3D acquisition, 0 in 2D
    pub kspace_encode_step_2: u32,
    /// Signal average
    pub average: u32,
    /// Slice of a 2D acquisition, 0 in 3D
    pub slice: u32,
    /// Echo
    pub contrast: u32,
    /// Cardiac or temporal phase
    pub phase: u32,
    /// Acquisition pass
    pub repetition: u32,
    /// Unused, always 0
    pub set: u32,
    /// Position in the echo train
    pub segment: u32,
}

/// Acquisition flags, numbered as in the interchange format.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum AcquisitionFlag {
    /// First readout of its phase-encoding step.
    FirstInEncodeStep1 = 1,
    /// Last readout of its phase-encoding step.
    LastInEncodeStep1 = 2,
    /// First readout of its partition.
    FirstInEncodeStep2 = 3,
    /// Last readout of its partition.
    LastInEncodeStep2 = 4,
    /// First readout of its average.
    FirstInAverage = 5,
    /// Last readout of its average.
    LastInAverage = 6,
    /// First readout of its slice.
    FirstInSlice = 7,
    /// Last readout of its slice.
    LastInSlice = 8,
    /// First readout of its contrast.
    FirstInContrast = 9,
    /// Last readout of its contrast.
    LastInContrast = 10,
    /// First readout of its phase.
    FirstInPhase = 11,
    /// Last readout of its phase.
    LastInPhase = 12,
    /// First readout of its repetition.
    FirstInRepetition = 13,
    /// Last readout of its repetition.
    LastInRepetition = 14,
    /// First readout of its set.
    FirstInSet = 15,
    /// Last readout of its set.
    LastInSet = 16,
    /// First readout of its segment.
    FirstInSegment = 17,
    /// Last readout of its segment.
    LastInSegment = 18,
    /// Noise calibration readout.
    IsNoiseMeasurement = 19,
}

impl AcquisitionFlag {
    fn bit(self) -> u64 {
        1 << (self as u64 - 1)
    }
}

/// Set of [`AcquisitionFlag`]s.
///
/// [`AcquisitionFlag`]: ./enum.AcquisitionFlag.html
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AcquisitionFlags(u64);

impl AcquisitionFlags {
    /// Build a flag set from its raw bits.
    pub fn from_bits(bits: u64) -> Self {
        AcquisitionFlags(bits)
    }

    /// The raw bits of the set.
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Add a flag.
    pub fn set(&mut self, flag: AcquisitionFlag) {
        self.0 |= flag.bit();
    }

    /// Remove a flag.
    pub fn clear(&mut self, flag: AcquisitionFlag) {
        self.0 &= !flag.bit();
    }

    /// Whether the flag is set.
    pub fn contains(self, flag: AcquisitionFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// Whether no flag is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Bit set of active receiver channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelMask([u64; MAX_CHANNELS / 64]);

impl Default for ChannelMask {
    fn default() -> Self {
        ChannelMask([0; MAX_CHANNELS / 64])
    }
}

impl ChannelMask {
    /// A mask with the first `channels` channels active.
    pub fn first(channels: usize) -> Self {
        let mut mask = ChannelMask::default();
        for ch in 0..channels.min(MAX_CHANNELS) {
            mask.set_active(ch);
        }
        mask
    }

    /// Build a mask from its 64-bit words.
    pub fn from_words(words: [u64; MAX_CHANNELS / 64]) -> Self {
        ChannelMask(words)
    }

    /// The 64-bit words of the mask, channel 0 in the lowest bit.
    pub fn words(&self) -> &[u64; MAX_CHANNELS / 64] {
        &self.0
    }

    /// Mark a channel active. Channels beyond the mask capacity are ignored.
    pub fn set_active(&mut self, channel: usize) {
        if channel < MAX_CHANNELS {
            self.0[channel / 64] |= 1 << (channel % 64);
        }
    }

    /// Whether a channel is active.
    pub fn is_active(&self, channel: usize) -> bool {
        channel < MAX_CHANNELS && self.0[channel / 64] & (1 << (channel % 64)) != 0
    }

    /// Number of active channels.
    pub fn count(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// One raw readout line with its header.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionRecord {
    /// Run number of the scan
    pub measurement_uid: u32,
    /// Position of the record in emission order, unique within a run.
    pub scan_counter: u32,
    /// Seconds since the Unix epoch.
    pub acquisition_time_stamp: u32,
    /// Position flags
    pub flags: AcquisitionFlags,
    /// Receiver channels of the acquisition
    pub available_channels: u16,
    /// Channels present in `data`
    pub channel_mask: ChannelMask,
    /// Samples to drop at the start of the readout
    pub discard_pre: u16,
    /// Samples to drop at the end of the readout
    pub discard_post: u16,
    /// Sample at the k-space center
    pub center_sample: u16,
    /// Index of the header encoding this record belongs to
    pub encoding_space_ref: u16,
    /// Dwell time, µs
    pub sample_time_us: f32,
    /// mm
    pub patient_table_position: [f32; 3],
    /// Encoding index
    pub idx: EncodingIndex,
    /// Samples shaped `(channels, readout)`.
    pub data: Array2<Complex32>,
}

impl AcquisitionRecord {
    /// A zero-filled record with room for `channels × samples` samples.
    pub fn new(channels: usize, samples: usize) -> Self {
        AcquisitionRecord {
            measurement_uid: 0,
            scan_counter: 0,
            acquisition_time_stamp: 0,
            flags: AcquisitionFlags::default(),
            available_channels: 0,
            channel_mask: ChannelMask::default(),
            discard_pre: 0,
            discard_post: 0,
            center_sample: 0,
            encoding_space_ref: 0,
            sample_time_us: 0.,
            patient_table_position: [0.; 3],
            idx: EncodingIndex::default(),
            data: Array2::zeros((channels, samples)),
        }
    }

    /// Number of samples per channel.
    pub fn number_of_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Number of channels held in the sample buffer.
    pub fn active_channels(&self) -> usize {
        self.data.nrows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits() {
        let mut flags = AcquisitionFlags::default();
        assert!(flags.is_empty());
        flags.set(AcquisitionFlag::FirstInSlice);
        flags.set(AcquisitionFlag::LastInEncodeStep2);
        assert_eq!(flags.bits(), (1 << 6) | (1 << 3));
        assert!(flags.contains(AcquisitionFlag::FirstInSlice));
        assert!(!flags.contains(AcquisitionFlag::LastInSlice));
        flags.clear(AcquisitionFlag::FirstInSlice);
        assert_eq!(flags.bits(), 1 << 3);
    }

    #[test]
    fn channel_mask() {
        let mask = ChannelMask::first(70);
        assert_eq!(mask.count(), 70);
        assert_eq!(mask.words()[0], u64::max_value());
        assert_eq!(mask.words()[1], 0b11_1111);
        assert!(mask.is_active(69));
        assert!(!mask.is_active(70));
        assert!(!mask.is_active(MAX_CHANNELS + 1));
    }

    #[test]
    fn record_shape() {
        let r = AcquisitionRecord::new(8, 64);
        assert_eq!(r.data.dim(), (8, 64));
        assert_eq!(r.number_of_samples(), 64);
        assert_eq!(r.active_channels(), 8);
    }
}
