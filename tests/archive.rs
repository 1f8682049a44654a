mod common;

use std::sync::Arc;

use common::{FixtureEntry, ZipBuilder};
use rstest::rstest;
use zipex::{Archive, Corruption, ErrorKind, ExtractOptions, MemoryReader, ZipError, ZipExtractor};

async fn open(bytes: Vec<u8>) -> Result<Archive<MemoryReader>, ZipError> {
    Archive::open(Arc::new(MemoryReader::new(bytes))).await
}

fn cd_offset(bytes: &[u8]) -> usize {
    let eocd = bytes.len() - 22;
    u32::from_le_bytes(bytes[eocd + 16..eocd + 20].try_into().unwrap()) as usize
}

#[tokio::test]
async fn entries_keep_central_directory_order() {
    let bytes = ZipBuilder::new()
        .stored("zeta.txt", b"z")
        .directory("alpha/")
        .deflated("alpha/mid.txt", b"middle")
        .build();

    let archive = open(bytes).await.unwrap();
    let names: Vec<_> = archive.entries().iter().map(|e| e.name().into_owned()).collect();
    assert_eq!(names, ["zeta.txt", "alpha/", "alpha/mid.txt"]);
    assert!(archive.entries()[1].is_directory);
    assert_eq!(archive.entries()[2].uncompressed_size, 6);
    assert_eq!(archive.by_name(b"alpha/mid.txt"), Some(&archive.entries()[2]));
    assert!(archive.by_name(b"missing").is_none());
}

#[tokio::test]
async fn empty_archive_has_no_entries() {
    let archive = open(ZipBuilder::new().build()).await.unwrap();
    assert!(archive.is_empty());
}

#[tokio::test]
async fn eocd_is_found_behind_a_comment() {
    let comment = vec![b'c'; 1000];
    let bytes = ZipBuilder::new()
        .stored("hello.txt", b"hi")
        .comment(&comment)
        .build();

    let archive = open(bytes).await.unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.comment(), comment.as_slice());
}

#[tokio::test]
async fn eocd_is_found_behind_the_longest_comment() {
    let comment = vec![b'x'; 65535];
    let bytes = ZipBuilder::new()
        .stored("hello.txt", b"hi")
        .comment(&comment)
        .build();

    let archive = open(bytes).await.unwrap();
    assert_eq!(archive.len(), 1);
}

#[tokio::test]
async fn missing_eocd_is_malformed() {
    let mut bytes = ZipBuilder::new().stored("hello.txt", b"hi").build();
    bytes.truncate(bytes.len() - 22);
    let err = open(bytes).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::MalformedArchive);

    // Signature buried further back than any comment could reach.
    let mut bytes = ZipBuilder::new().stored("hello.txt", b"hi").build();
    bytes.extend(std::iter::repeat_n(0u8, 70_000));
    let err = open(bytes).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::MalformedArchive);
}

#[tokio::test]
async fn tiny_input_is_malformed() {
    let err = open(b"PK".to_vec()).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::MalformedArchive);
}

#[tokio::test]
async fn bad_central_directory_signature_is_malformed() {
    let mut bytes = ZipBuilder::new().stored("a.txt", b"a").stored("b.txt", b"b").build();
    let at = cd_offset(&bytes);
    bytes[at] = b'X';
    let err = open(bytes).await.err().unwrap();
    assert!(matches!(err, ZipError::MalformedArchive { offset, .. } if offset == at as u64));
}

#[tokio::test]
async fn entry_count_beyond_directory_is_malformed() {
    let mut bytes = ZipBuilder::new().stored("a.txt", b"a").build();
    let eocd = bytes.len() - 22;
    bytes[eocd + 8..eocd + 10].copy_from_slice(&2u16.to_le_bytes());
    bytes[eocd + 10..eocd + 12].copy_from_slice(&2u16.to_le_bytes());
    let err = open(bytes).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::MalformedArchive);
}

#[tokio::test]
async fn zip64_archives_are_refused() {
    let mut bytes = ZipBuilder::new().stored("a.txt", b"a").build();
    let eocd = bytes.len() - 22;
    bytes[eocd + 16..eocd + 20].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    let err = open(bytes).await.err().unwrap();
    assert!(err.to_string().contains("ZIP64"));
    assert_eq!(err.kind(), ErrorKind::MalformedArchive);
}

#[tokio::test]
async fn zip64_locator_before_eocd_is_refused() {
    let mut bytes = ZipBuilder::new().stored("a.txt", b"a").build();
    let eocd = bytes.len() - 22;
    let mut locator = b"PK\x06\x07".to_vec();
    locator.resize(20, 0);
    bytes.splice(eocd..eocd, locator);

    let err = open(bytes).await.err().unwrap();
    assert!(matches!(
        &err,
        ZipError::MalformedArchive { offset, reason }
            if *offset == (eocd + 20) as u64 && reason.contains("ZIP64")
    ));
}

#[tokio::test]
async fn multi_disk_archives_are_refused() {
    let mut bytes = ZipBuilder::new().stored("a.txt", b"a").build();
    let eocd = bytes.len() - 22;
    bytes[eocd + 4..eocd + 6].copy_from_slice(&1u16.to_le_bytes());

    let err = open(bytes).await.err().unwrap();
    assert!(matches!(
        &err,
        ZipError::MalformedArchive { offset, reason }
            if *offset == eocd as u64 && reason.contains("multi-disk")
    ));
}

#[tokio::test]
async fn central_directory_running_into_eocd_is_malformed() {
    let mut bytes = ZipBuilder::new().stored("a.txt", b"a").build();
    let eocd = bytes.len() - 22;
    let cd_size = u32::from_le_bytes(bytes[eocd + 12..eocd + 16].try_into().unwrap());
    bytes[eocd + 12..eocd + 16].copy_from_slice(&(cd_size + 10).to_le_bytes());

    let err = open(bytes).await.err().unwrap();
    assert!(matches!(
        &err,
        ZipError::MalformedArchive { reason, .. } if reason.contains("overlaps")
    ));
}

#[rstest]
#[case::crc(14, "CRC-32")]
#[case::compressed_size(18, "compressed size")]
#[case::uncompressed_size(22, "uncompressed size")]
#[tokio::test]
async fn local_header_fields_must_match_central_directory(
    #[case] at: usize,
    #[case] expected_field: &str,
) {
    let mut bytes = ZipBuilder::new().stored("a.txt", b"abc").build();
    bytes[at] ^= 0x40;

    let archive = open(bytes).await.unwrap();
    let err = archive.local_header(&archive.entries()[0]).await.unwrap_err();
    match err {
        ZipError::CorruptEntry {
            corruption: Corruption::HeaderMismatch { field, .. },
            ..
        } => assert_eq!(field, expected_field),
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn descriptor_disagreeing_with_central_directory_is_corrupt() {
    let mut bytes = ZipBuilder::new()
        .entry(FixtureEntry::stored("raw.bin", b"0123456789").with_data_descriptor())
        .build();
    // header, name, payload, then signature, CRC and compressed size
    let at = 30 + 7 + 10 + 4 + 4 + 4;
    bytes[at..at + 4].copy_from_slice(&99u32.to_le_bytes());

    let archive = Arc::new(open(bytes).await.unwrap());
    let extractor = ZipExtractor::new(archive.clone(), ExtractOptions::default());
    let err = extractor
        .extract_to_memory(&archive.entries()[0])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ZipError::CorruptEntry {
            corruption: Corruption::DescriptorMismatch {
                field: "uncompressed size",
                central: 10,
                descriptor: 99,
            },
            ..
        }
    ));
}

#[tokio::test]
async fn local_header_method_must_match() {
    let bytes = ZipBuilder::new()
        .entry(FixtureEntry::stored("a.txt", b"abc").with_local_method(8))
        .build();
    let archive = open(bytes).await.unwrap();
    let entry = &archive.entries()[0];
    let err = archive.local_header(entry).await.unwrap_err();
    assert!(matches!(
        err,
        ZipError::CorruptEntry {
            corruption: Corruption::HeaderMismatch {
                field: "compression method",
                ..
            },
            ..
        }
    ));
}

#[tokio::test]
async fn bad_local_signature_is_malformed() {
    let mut bytes = ZipBuilder::new().stored("a.txt", b"abc").build();
    bytes[0] = b'X';
    let archive = open(bytes).await.unwrap();
    let err = archive.local_header(&archive.entries()[0]).await.unwrap_err();
    assert!(matches!(err, ZipError::MalformedArchive { offset: 0, .. }));
}

#[tokio::test]
async fn data_descriptor_entries_use_central_sizes() {
    let data = b"streamed without sizes up front".repeat(20);
    let bytes = ZipBuilder::new()
        .entry(FixtureEntry::deflated("stream.txt", &data).with_data_descriptor())
        .entry(FixtureEntry::stored("raw.bin", b"0123456789").with_data_descriptor())
        .build();

    let archive = Arc::new(open(bytes).await.unwrap());
    let local = archive.local_header(&archive.entries()[0]).await.unwrap();
    assert_eq!(local.compressed_size, 0);
    assert_eq!(local.uncompressed_size, 0);

    let extractor = ZipExtractor::new(archive.clone(), ExtractOptions::default());
    let out = extractor.extract_to_memory(&archive.entries()[0]).await.unwrap();
    assert_eq!(out, data);
    let out = extractor.extract_to_memory(&archive.entries()[1]).await.unwrap();
    assert_eq!(out, b"0123456789");
}

#[tokio::test]
async fn payload_past_end_is_out_of_bounds() {
    let mut bytes = ZipBuilder::new().stored("a.txt", b"abc").build();
    let at = cd_offset(&bytes);
    // Point the entry's local header near the end of the file.
    let fake_offset = (bytes.len() - 10) as u32;
    bytes[at + 42..at + 46].copy_from_slice(&fake_offset.to_le_bytes());
    let archive = open(bytes).await.unwrap();
    let err = archive.local_header(&archive.entries()[0]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfBounds);
}

#[tokio::test]
async fn close_hands_back_reader_for_reopen() {
    let bytes = ZipBuilder::new().stored("hello.txt", b"hi").build();
    let archive = open(bytes).await.unwrap();
    let reader = archive.close();

    let reopened = Archive::open(reader).await.unwrap();
    assert_eq!(reopened.entries()[0].name(), "hello.txt");
    assert!(reopened.by_name(b"hello.txt").is_some());
}

#[tokio::test]
async fn opens_archives_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.zip");
    std::fs::write(&path, ZipBuilder::new().stored("hello.txt", b"hi").build()).unwrap();

    let archive = Archive::open_path(&path).await.unwrap();
    assert_eq!(archive.len(), 1);

    let err = Archive::open_path(&dir.path().join("missing.zip"))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::IoFailure);
}
