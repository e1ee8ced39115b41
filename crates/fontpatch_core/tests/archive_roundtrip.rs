use std::io::{Cursor, Write as _};

use flate2::Compression;
use flate2::write::ZlibEncoder;

use fontpatch_core::archive::{Archive, FLAG_ZLIB};

struct FixtureObject {
    path_id: i64,
    type_tag: &'static str,
    payload: Vec<u8>,
    compressed: bool,
}

fn font_payload(name: &str, data: &[u8], trailer: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(name.len() as u32).to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(trailer);
    out
}

fn build_container(objects: &[FixtureObject]) -> Vec<u8> {
    let stored: Vec<(Vec<u8>, u32)> = objects
        .iter()
        .map(|obj| {
            if obj.compressed {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder
                    .write_all(&obj.payload)
                    .expect("zlib encode should write payload");
                (
                    encoder.finish().expect("zlib encode should finish"),
                    FLAG_ZLIB,
                )
            } else {
                (obj.payload.clone(), 0)
            }
        })
        .collect();

    let header_len = 12usize;
    let table_len: usize = objects.iter().map(|obj| 40 + obj.type_tag.len()).sum();

    let mut table = Vec::new();
    let mut data = Vec::new();
    let mut offset = header_len + table_len;
    for (obj, (stored_bytes, flags)) in objects.iter().zip(&stored) {
        table.extend_from_slice(&obj.path_id.to_le_bytes());
        table.extend_from_slice(&(obj.type_tag.len() as u32).to_le_bytes());
        table.extend_from_slice(obj.type_tag.as_bytes());
        table.extend_from_slice(&flags.to_le_bytes());
        table.extend_from_slice(&(offset as u64).to_le_bytes());
        table.extend_from_slice(&(stored_bytes.len() as u64).to_le_bytes());
        table.extend_from_slice(&(obj.payload.len() as u64).to_le_bytes());
        data.extend_from_slice(stored_bytes);
        offset += stored_bytes.len();
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"ACF1");
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(objects.len() as u32).to_le_bytes());
    out.extend_from_slice(&table);
    out.extend_from_slice(&data);
    out
}

/// Byte position of the `data_offset` field in table record `k`.
fn offset_field_pos(tags: &[&str], k: usize) -> usize {
    let mut pos = 12;
    for tag in &tags[..k] {
        pos += 40 + tag.len();
    }
    pos + 8 + 4 + tags[k].len() + 4
}

fn sample_objects() -> Vec<FixtureObject> {
    vec![
        FixtureObject {
            path_id: 101,
            type_tag: "Font",
            payload: font_payload("OpenSans-Regular", b"OLD-FONT-PROGRAM", b"\x10\x20"),
            compressed: false,
        },
        FixtureObject {
            path_id: 102,
            type_tag: "Texture2D",
            payload: b"PIXELDATA-PIXELDATA".to_vec(),
            compressed: false,
        },
        FixtureObject {
            path_id: 103,
            type_tag: "Font",
            payload: font_payload("OpenSans-Bold", b"BOLD-FONT-PROGRAM", b""),
            compressed: true,
        },
    ]
}

#[test]
fn unmodified_round_trip_is_byte_identical() {
    let bytes = build_container(&sample_objects());
    let archive = Archive::parse(Cursor::new(bytes.clone())).expect("container should parse");

    archive.layout().validate().expect("layout should validate");
    assert_eq!(archive.object_count(), 3);

    let emitted = archive
        .to_bytes_unmodified()
        .expect("unmodified emit should succeed");
    assert_eq!(emitted, bytes);

    let emitted = archive.to_bytes().expect("modified emit should succeed");
    assert_eq!(emitted, bytes);
}

#[test]
fn tail_bytes_survive_round_trip() {
    let mut bytes = build_container(&sample_objects());
    bytes.extend_from_slice(b"\0\0padding after last payload");

    let archive = Archive::parse(Cursor::new(bytes.clone())).expect("container should parse");
    let emitted = archive
        .to_bytes_unmodified()
        .expect("unmodified emit should succeed");
    assert_eq!(emitted, bytes);
}

#[test]
fn rejects_bad_magic() {
    let mut bytes = build_container(&sample_objects());
    bytes[0..4].copy_from_slice(b"NOPE");
    assert!(Archive::parse(Cursor::new(bytes)).is_err());
}

#[test]
fn rejects_unsupported_version() {
    let mut bytes = build_container(&sample_objects());
    bytes[4..8].copy_from_slice(&9u32.to_le_bytes());
    assert!(Archive::parse(Cursor::new(bytes)).is_err());
}

#[test]
fn rejects_truncated_table() {
    let mut bytes = build_container(&sample_objects());
    bytes.truncate(22);
    assert!(Archive::parse(Cursor::new(bytes)).is_err());
}

#[test]
fn rejects_payload_offset_mismatch() {
    let objects = sample_objects();
    let tags: Vec<&str> = objects.iter().map(|o| o.type_tag).collect();
    let mut bytes = build_container(&objects);

    let pos = offset_field_pos(&tags, 1);
    let mut field = [0u8; 8];
    field.copy_from_slice(&bytes[pos..pos + 8]);
    let shifted = u64::from_le_bytes(field) + 1;
    bytes[pos..pos + 8].copy_from_slice(&shifted.to_le_bytes());

    let err = Archive::parse(Cursor::new(bytes)).expect_err("gap should be rejected");
    assert!(err.to_string().contains("gap/overlap"));
}

#[test]
fn rejects_uncompressed_length_mismatch() {
    let objects = sample_objects();
    let tags: Vec<&str> = objects.iter().map(|o| o.type_tag).collect();
    let mut bytes = build_container(&objects);

    // real_len sits right behind data_offset and packed_len.
    let pos = offset_field_pos(&tags, 0) + 16;
    let mut field = [0u8; 8];
    field.copy_from_slice(&bytes[pos..pos + 8]);
    let bumped = u64::from_le_bytes(field) + 1;
    bytes[pos..pos + 8].copy_from_slice(&bumped.to_le_bytes());

    let err = Archive::parse(Cursor::new(bytes)).expect_err("length mismatch should be rejected");
    assert!(err.to_string().contains("lengths disagree"));
}

#[test]
fn compressed_font_materializes_to_real_payload() {
    let bytes = build_container(&sample_objects());
    let archive = Archive::parse(Cursor::new(bytes)).expect("container should parse");

    let handle = archive
        .objects()
        .into_iter()
        .find(|h| h.path_id == 103)
        .expect("compressed font object should be listed");
    let asset = archive.read_font(&handle).expect("font should materialize");

    assert_eq!(asset.name, "OpenSans-Bold");
    assert_eq!(asset.font_data, b"BOLD-FONT-PROGRAM");
}

#[test]
fn read_font_rejects_non_font_object() {
    let bytes = build_container(&sample_objects());
    let archive = Archive::parse(Cursor::new(bytes)).expect("container should parse");

    let handle = archive
        .objects()
        .into_iter()
        .find(|h| h.path_id == 102)
        .expect("texture object should be listed");
    assert!(archive.read_font(&handle).is_err());
}

#[test]
fn commit_shifts_later_payloads() {
    let bytes = build_container(&sample_objects());
    let mut archive = Archive::parse(Cursor::new(bytes)).expect("container should parse");

    let handles = archive.objects();
    let first_font = handles
        .iter()
        .find(|h| h.path_id == 101)
        .expect("first font should be listed");
    let second_font = handles
        .iter()
        .find(|h| h.path_id == 103)
        .expect("second font should be listed");

    let before = archive
        .read_font(second_font)
        .expect("second font should materialize");

    let mut asset = archive
        .read_font(first_font)
        .expect("first font should materialize");
    asset.font_data = vec![0xEE; 64];
    archive
        .write_font(first_font, &asset)
        .expect("commit should succeed");

    let emitted = archive.to_bytes().expect("modified emit should succeed");
    let reloaded = Archive::parse(Cursor::new(emitted.clone())).expect("output should parse");

    let first_after = reloaded
        .objects()
        .into_iter()
        .find(|h| h.path_id == 101)
        .expect("first font should survive");
    assert_eq!(
        reloaded
            .read_font(&first_after)
            .expect("patched font should materialize")
            .font_data,
        vec![0xEE; 64]
    );

    let second_after = reloaded
        .objects()
        .into_iter()
        .find(|h| h.path_id == 103)
        .expect("second font should survive");
    assert_eq!(
        reloaded
            .read_font(&second_after)
            .expect("shifted font should materialize"),
        before
    );

    // The texture payload moved but its bytes are untouched.
    assert!(
        emitted
            .windows(b"PIXELDATA-PIXELDATA".len())
            .any(|w| w == b"PIXELDATA-PIXELDATA")
    );
}
