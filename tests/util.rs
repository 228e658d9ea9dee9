#![allow(dead_code)]

use mrdconv::accessor::{ArchiveEntry, ScalarValue};
use mrdconv::packet::ControlPacket;
use mrdconv::snapshot::{LegacyData, Snapshot};
use mrdconv::typedef::SourceLayout;
use num_complex::Complex32;

/// A source with complete identity and geometry metadata but no payload.
/// Geometry: `readout × views × slices`, 2D, one phase.
pub fn control_source(
    layout: SourceLayout,
    readout: usize,
    views: usize,
    slices: usize,
    echoes: usize,
    channels: usize,
) -> Snapshot {
    let mut s = Snapshot::new(layout);
    for (k, v) in &[
        ("AcquiredXRes", readout),
        ("AcquiredYRes", views),
        ("AcquiredZRes", slices),
        ("TransformXRes", 2 * readout),
        ("TransformYRes", 2 * views),
        ("TransformZRes", slices),
        ("NumChannels", channels),
        ("NumEchoes", echoes),
        ("NumPhases", 1),
    ] {
        s.set_scalar(*k, ScalarValue::Int(*v as i64));
    }
    for k in &["Is3DAcquisition", "ChopX", "ChopY", "ChopZ", "HalfNex", "HalfEcho"] {
        s.set_scalar(*k, ScalarValue::Bool(false));
    }
    s.set_scalar("PatientPosition", ScalarValue::Int(1));
    s.layout.run_number = 4711;

    s.patient.name = "Doe^Jane".to_string();
    s.patient.id = "P-0001".to_string();
    s.patient.gender = "F".to_string();
    s.patient.birthdate = "19800214".to_string();
    s.patient.weight = "61.5".to_string();
    s.study.number = 12;
    s.study.uid = "1.2.840.113619.2.1".to_string();
    s.study.description = "KNEE".to_string();
    s.study.date = "20230914".to_string();
    s.study.time = "101500".to_string();
    s.study.referring_physician = "Dr^Who".to_string();
    s.study.accession_number = "A77".to_string();
    s.series.number = 3;
    s.series.uid = "1.2.840.113619.2.1.3".to_string();
    s.series.description = "T1 SAG".to_string();
    s.series.operator_name = "tech".to_string();
    s.equipment.manufacturer = "GE MEDICAL SYSTEMS".to_string();
    s.equipment.manufacturer_model = "DISCOVERY MR750".to_string();
    s.image.psd_name = "fgre".to_string();
    s.image.imaging_frequency = "127.74".to_string();
    s.image.magnetic_field_strength = "3".to_string();
    s.image.echo_time = "2.1".to_string();
    s.image.repetition_time = "6.3".to_string();
    s.image.flip_angle = "12".to_string();
    s.image.slice_thickness = 4.;
    s.image.pixel_size_x = 0.5;
    s.image.pixel_size_y = 0.5;
    s.raw_header.te2 = 4_200;
    s.raw_header.bandwidth = 62.5;
    s
}

/// Sample value of a legacy block, encoding its position.
pub fn legacy_sample(slice: usize, echo: usize, channel: usize, view: usize, sample: usize) -> Complex32 {
    Complex32::new(
        (slice * 10_000 + echo * 1000 + view) as f32,
        (channel * 1000 + sample) as f32,
    )
}

/// A legacy source with one phase and recognizable samples.
pub fn legacy_source(
    readout: usize,
    views: usize,
    slices: usize,
    echoes: usize,
    channels: usize,
) -> Snapshot {
    let mut s = control_source(SourceLayout::Legacy, readout, views, slices, echoes, channels);
    let mut blocks = Vec::with_capacity(slices * echoes * channels * views * readout);
    for slice in 0..slices {
        for echo in 0..echoes {
            for channel in 0..channels {
                for view in 0..views {
                    for sample in 0..readout {
                        blocks.push(legacy_sample(slice, echo, channel, view, sample));
                    }
                }
            }
        }
    }

    // default view order: per slice, one baseline then the views
    let raw_view_count = slices * (views + 1);
    let mut raw_views = Vec::with_capacity(raw_view_count * channels * readout);
    for slice in 0..slices {
        for position in 0..=views {
            for channel in 0..channels {
                for sample in 0..readout {
                    raw_views.push(if position == 0 {
                        Complex32::new(0., 0.)
                    } else {
                        legacy_sample(slice, 0, channel, position - 1, sample)
                    });
                }
            }
        }
    }
    s.layout.raw_view_count = raw_view_count;
    s.legacy = Some(LegacyData {
        readout,
        views,
        slices,
        echoes,
        channels,
        phases: 1,
        blocks,
        raw_views,
    });
    s
}

/// An archive source with one frame per packet.
pub fn archive_source(
    readout: usize,
    views: usize,
    slices: usize,
    echoes: usize,
    channels: usize,
    packets: &[ControlPacket],
) -> Snapshot {
    let mut s = control_source(SourceLayout::Archive, readout, views, slices, echoes, channels);
    s.archive = packets
        .iter()
        .enumerate()
        .map(|(i, p)| ArchiveEntry {
            packet: p.encode().to_vec(),
            frames: vec![(0..readout * channels)
                .map(|k| Complex32::new(i as f32, k as f32))
                .collect()],
        })
        .collect();
    s
}
