extern crate mrdconv;
#[macro_use]
extern crate pretty_assertions;

mod util;

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use mrdconv::acquisition::AcquisitionFlag;
use mrdconv::accessor::ScalarValue;
use mrdconv::header::Limit;
use mrdconv::packet::ControlPacket;
use mrdconv::{
    AcquisitionGeometry, ContainerReader, ContainerWriter, ConvertError, ConvertOptions,
    Converter, GenericConverter, LegacyWalk, MemorySink, NormalizedHeader, SequenceConverter,
    Snapshot, Warning,
};
use tempfile::tempdir;
use util::{archive_source, legacy_sample, legacy_source};

fn convert(source: &Snapshot, options: ConvertOptions) -> MemorySink {
    let mut sink = MemorySink::new();
    Converter::new(source, options).write_to(&mut sink).unwrap();
    sink
}

#[test]
fn legacy_two_dimensional_multi_echo() {
    let source = legacy_source(16, 32, 4, 2, 8);
    let sink = convert(&source, ConvertOptions::default());

    assert_eq!(sink.acquisitions.len(), 4 * 2 * 32);
    for (n, r) in sink.acquisitions.iter().enumerate() {
        assert_eq!(r.scan_counter as usize, n);
        assert!(r.idx.slice < 4);
        assert!(r.idx.contrast < 2);
        assert_eq!(r.idx.kspace_encode_step_2, 0);
        assert_eq!(r.data.dim(), (8, 16));
        assert_eq!(r.measurement_uid, 4711);
        assert_eq!(r.center_sample, 8);
        assert_eq!(r.active_channels(), 8);
        assert_eq!(r.channel_mask.count(), 8);
    }

    // every (view, slice, echo) exactly once
    let seen: HashSet<_> = sink
        .acquisitions
        .iter()
        .map(|r| (r.idx.kspace_encode_step_1, r.idx.slice, r.idx.contrast))
        .collect();
    assert_eq!(seen.len(), 256);

    let r = &sink.acquisitions[32 * (1 + 2 * 3) + 5];
    assert_eq!((r.idx.slice, r.idx.contrast, r.idx.kspace_encode_step_1), (3, 1, 5));
    assert_eq!(r.data[[6, 2]], legacy_sample(3, 1, 6, 5, 2));
    assert!(sink.acquisitions[0].flags.contains(AcquisitionFlag::FirstInSlice));
    assert!(sink.acquisitions[31].flags.contains(AcquisitionFlag::LastInSlice));
}

#[test]
fn archive_skips_non_data_packets() {
    let packets: Vec<_> = (0..100u16)
        .map(|i| {
            let view = if i % 10 == 0 { 0 } else { i % 32 + 1 };
            ControlPacket::scan(view, (i / 32) % 4, (i % 2) as u8)
        })
        .collect();
    let source = archive_source(8, 32, 4, 2, 2, &packets);
    let sink = convert(&source, ConvertOptions::default());

    assert_eq!(sink.acquisitions.len(), 90);
    let counters: Vec<u32> = sink.acquisitions.iter().map(|r| r.scan_counter).collect();
    assert_eq!(counters, (0..90).collect::<Vec<_>>());

    // packet 1: view 2, slice 0, echo 1
    let first = &sink.acquisitions[0];
    assert_eq!(first.idx.kspace_encode_step_1, 1);
    assert_eq!(first.idx.contrast, 1);
    assert_eq!(first.data.dim(), (2, 8));
    assert_eq!(first.data[[1, 3]].im, 11.);
}

#[test]
fn archive_frame_count_warnings() {
    let packets = [
        ControlPacket::scan(1, 0, 0),
        ControlPacket::scan(2, 0, 0),
        ControlPacket::scan(3, 0, 0),
    ];
    let mut source = archive_source(4, 8, 1, 1, 1, &packets);
    source.archive[1].frames.clear();
    let extra = source.archive[2].frames[0].clone();
    source.archive[2].frames.push(extra);

    let g = AcquisitionGeometry::from_accessor(&source).unwrap();
    let out = GenericConverter::new()
        .acquisitions(&source, &g, LegacyWalk::Blocks)
        .unwrap();
    assert_eq!(out.value.len(), 2);
    assert_eq!(
        out.warnings,
        vec![
            Warning::MalformedControlPacket { packet: 1, frames: 0 },
            Warning::MalformedControlPacket { packet: 2, frames: 2 },
        ]
    );
}

#[test]
fn view_walk_matches_block_walk_for_first_echo() {
    let source = legacy_source(4, 6, 3, 1, 2);
    let blocks = convert(&source, ConvertOptions::default());
    let views = convert(
        &source,
        ConvertOptions {
            walk: LegacyWalk::Views,
            ..Default::default()
        },
    );
    assert_eq!(views.acquisitions.len(), 3 * 6);
    for (a, b) in blocks.acquisitions.iter().zip(&views.acquisitions) {
        assert_eq!(a.idx, b.idx);
        assert_eq!(a.data, b.data);
        assert_eq!(a.scan_counter, b.scan_counter);
    }
}

#[test]
fn volumetric_acquisition_uses_partitions() {
    let mut source = legacy_source(4, 8, 6, 1, 2);
    source.set_scalar("Is3DAcquisition", ScalarValue::Bool(true));
    let sink = convert(&source, ConvertOptions::default());

    assert_eq!(sink.acquisitions.len(), 6 * 8);
    assert!(sink.acquisitions.iter().all(|r| r.idx.slice == 0));
    let partitions: HashSet<u32> = sink
        .acquisitions
        .iter()
        .map(|r| r.idx.kspace_encode_step_2)
        .collect();
    assert_eq!(partitions, (0..6).collect());
    assert!(sink.acquisitions[0]
        .flags
        .contains(AcquisitionFlag::FirstInEncodeStep2));
    assert!(sink.acquisitions[5 * 8]
        .flags
        .contains(AcquisitionFlag::LastInEncodeStep2));

    let header = NormalizedHeader::from_xml(sink.header.as_deref().unwrap()).unwrap();
    let e = &header.encoding[0];
    assert_eq!(e.encoded_space.matrix_size.z, 6);
    assert_eq!(e.encoding_limits.kspace_encoding_step_2.maximum, 5);
    assert_eq!(e.encoding_limits.slice.maximum, 0);
    approx::assert_relative_eq!(e.encoded_space.field_of_view_mm.z, 24.);
}

#[test]
fn zero_volume_count_reads_as_one_repetition() {
    let mut source = legacy_source(4, 8, 2, 2, 2);
    source.set_scalar("NumVolumes", ScalarValue::Int(0));
    let sink = convert(&source, ConvertOptions::default());

    assert_eq!(sink.acquisitions.len(), 2 * 2 * 8);
    assert!(sink.acquisitions.iter().all(|r| r.idx.repetition == 0));
    let header = NormalizedHeader::from_xml(sink.header.as_deref().unwrap()).unwrap();
    assert_eq!(header.encoding[0].encoding_limits.repetition, Limit::from_count(1));
}

#[test]
fn geometry_mismatch_is_fatal() {
    let mut source = legacy_source(4, 8, 2, 1, 2);
    source.set_scalar("NumChannels", ScalarValue::Int(3));
    let mut sink = MemorySink::new();
    let err = Converter::new(&source, ConvertOptions::default())
        .write_to(&mut sink)
        .unwrap_err();
    assert!(matches!(err, ConvertError::StructuralMismatch(..)), "{:?}", err);
}

#[test]
fn file_to_container() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("scan.json.gz");
    let output = dir.path().join("scan.mrd.gz");

    let source = legacy_source(4, 4, 2, 2, 2);
    let mut encoder = GzEncoder::new(File::create(&input).unwrap(), Compression::fast());
    encoder.write_all(source.to_json().unwrap().as_bytes()).unwrap();
    let _ = encoder.finish().unwrap();

    let source = Snapshot::from_file(&input).unwrap();
    let options = ConvertOptions {
        kspace_volumes: true,
        ..Default::default()
    };
    let mut writer = ContainerWriter::create(&output).unwrap();
    let summary = Converter::new(&source, options.clone())
        .write_to(&mut writer)
        .unwrap();
    let _ = writer.finish().unwrap();
    assert_eq!(summary.acquisitions, 16);
    assert_eq!(summary.arrays, 2);

    // records of separate runs differ by their time stamp only
    let unstamped = |mut sink: MemorySink| {
        for r in &mut sink.acquisitions {
            r.acquisition_time_stamp = 0;
        }
        sink
    };
    let stored = ContainerReader::read_file(&output).unwrap();
    assert_eq!(unstamped(stored), unstamped(convert(&source, options)));
}

#[test]
fn unreadable_source() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("broken.json");
    std::fs::write(&input, b"{ not json").unwrap();
    assert!(matches!(
        Snapshot::from_file(&input),
        Err(ConvertError::SourceOpen(_))
    ));
}
