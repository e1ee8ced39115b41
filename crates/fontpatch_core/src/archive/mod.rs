//! Codec for the serialized asset-container format.
//!
//! A container is a header, an object table, and a data region. Each table
//! record names one embedded object: a stable `path_id`, a type tag string,
//! flags, and the offset/length of its stored payload. Payloads sit
//! contiguously after the table in table order; anything after the last
//! payload is kept as an opaque tail and re-emitted verbatim.
//!
//! Parsing captures the byte range of every section so an unmodified archive
//! re-serializes byte-identically. Committing a font replaces that object's
//! payload blob, shifts the layout of everything behind it, and re-encodes
//! the object table with the new offsets and lengths.

pub mod font;

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::layout::{ByteRange, FileLayout, SectionId, SectionLayout};
use crate::reader::LittleEndianReader;
use font::FontAsset;

pub const MAGIC: [u8; 4] = *b"ACF1";
pub const FORMAT_VERSION: u32 = 1;
pub const FONT_TYPE_TAG: &str = "Font";

/// Table flag bit 0: the stored payload is zlib-compressed.
pub const FLAG_ZLIB: u32 = 1;

#[derive(Debug, Clone)]
struct ObjectEntry {
    path_id: i64,
    type_tag: String,
    flags: u32,
    packed_len: u64,
    real_len: u64,
}

/// Cheap view of one object-table record. Enumerating handles never touches
/// payload bytes; only `Font`-typed objects are ever materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHandle {
    pub slot: usize,
    pub path_id: i64,
    pub type_tag: String,
}

impl ObjectHandle {
    pub fn is_font(&self) -> bool {
        self.type_tag == FONT_TYPE_TAG
    }
}

#[derive(Debug, Clone)]
struct SectionBlob {
    bytes: Vec<u8>,
}

struct Capture<'a> {
    source: &'a [u8],
    sections: Vec<SectionLayout>,
    blobs: Vec<SectionBlob>,
}

impl<'a> Capture<'a> {
    fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            sections: Vec::new(),
            blobs: Vec::new(),
        }
    }

    fn record(&mut self, id: SectionId, start: usize, end: usize) {
        self.sections.push(SectionLayout {
            id,
            range: ByteRange { start, end },
        });
        self.blobs.push(SectionBlob {
            bytes: self.source[start..end].to_vec(),
        });
    }
}

#[derive(Debug)]
pub struct Archive {
    version: u32,
    entries: Vec<ObjectEntry>,
    layout: FileLayout,
    section_blobs: Vec<SectionBlob>,
    original_section_blobs: Vec<SectionBlob>,
    original_file_len: usize,
}

impl Archive {
    pub fn load(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::parse(BufReader::new(file))
    }

    pub fn parse<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let mut capture = Capture::new(&bytes);
        let mut r = LittleEndianReader::new(Cursor::new(bytes.as_slice()));

        let magic = r.read_magic()?;
        if magic != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "not an asset container: bad magic",
            ));
        }
        let version = r.read_u32()?;
        if version != FORMAT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported container version {version}"),
            ));
        }
        let object_count = r.read_u32()? as usize;
        let header_end = r.position()? as usize;
        capture.record(SectionId::Header, 0, header_end);

        struct RawEntry {
            path_id: i64,
            type_tag: String,
            flags: u32,
            data_offset: u64,
            packed_len: u64,
            real_len: u64,
        }

        let table_start = header_end;
        let mut raw_entries = Vec::with_capacity(object_count.min(4096));
        for _ in 0..object_count {
            let path_id = r.read_i64()?;
            let type_tag = r.read_string()?;
            let flags = r.read_u32()?;
            let data_offset = r.read_u64()?;
            let packed_len = r.read_u64()?;
            let real_len = r.read_u64()?;

            if flags & FLAG_ZLIB == 0 && packed_len != real_len {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "object {path_id}: uncompressed payload lengths disagree \
                         (packed {packed_len}, real {real_len})"
                    ),
                ));
            }

            raw_entries.push(RawEntry {
                path_id,
                type_tag,
                flags,
                data_offset,
                packed_len,
                real_len,
            });
        }
        let table_end = r.position()? as usize;
        capture.record(SectionId::ObjectTable, table_start, table_end);

        let mut entries = Vec::with_capacity(raw_entries.len());
        for (slot, raw) in raw_entries.into_iter().enumerate() {
            let expected = r.position()? as usize;
            let offset = usize::try_from(raw.data_offset).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("object {}: payload offset out of range", raw.path_id),
                )
            })?;
            if offset != expected {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "object {}: payload gap/overlap: table says offset {}, data region at {}",
                        raw.path_id, offset, expected
                    ),
                ));
            }
            let packed_len = usize::try_from(raw.packed_len).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("object {}: payload length out of range", raw.path_id),
                )
            })?;
            r.read_bytes(packed_len)?;
            capture.record(SectionId::Payload(slot), offset, offset + packed_len);

            entries.push(ObjectEntry {
                path_id: raw.path_id,
                type_tag: raw.type_tag,
                flags: raw.flags,
                packed_len: raw.packed_len,
                real_len: raw.real_len,
            });
        }

        let consumed = r.position()? as usize;
        let file_len = bytes.len();
        if consumed < file_len {
            capture.record(SectionId::Tail, consumed, file_len);
        }

        let layout = FileLayout {
            file_len,
            sections: capture.sections,
        };
        layout.validate()?;

        let original_section_blobs = capture.blobs.clone();

        Ok(Self {
            version,
            entries,
            layout,
            section_blobs: capture.blobs,
            original_section_blobs,
            original_file_len: file_len,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    pub fn object_count(&self) -> usize {
        self.entries.len()
    }

    pub fn objects(&self) -> Vec<ObjectHandle> {
        self.entries
            .iter()
            .enumerate()
            .map(|(slot, entry)| ObjectHandle {
                slot,
                path_id: entry.path_id,
                type_tag: entry.type_tag.clone(),
            })
            .collect()
    }

    /// Materialize the font object behind `handle`.
    pub fn read_font(&self, handle: &ObjectHandle) -> io::Result<FontAsset> {
        let entry = self.checked_entry(handle)?;

        let blob = self.section_blob(SectionId::Payload(handle.slot))?;
        let payload = if entry.flags & FLAG_ZLIB != 0 {
            let real_len = usize::try_from(entry.real_len).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("object {}: real length out of range", entry.path_id),
                )
            })?;
            decompress_zlib(&blob.bytes, real_len).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("object {}: failed to decompress payload: {e}", entry.path_id),
                )
            })?
        } else {
            blob.bytes.clone()
        };

        FontAsset::decode(&payload).map_err(|e| {
            io::Error::new(e.kind(), format!("object {}: {e}", entry.path_id))
        })
    }

    /// Commit a mutated font object back into the container. The payload blob
    /// is replaced, later payloads shift, and the object table is re-encoded
    /// with the new offsets and lengths.
    pub fn write_font(&mut self, handle: &ObjectHandle, asset: &FontAsset) -> io::Result<()> {
        let entry = self.checked_entry(handle)?;
        let flags = entry.flags;

        let payload = asset.encode();
        let real_len = payload.len() as u64;
        let stored = if flags & FLAG_ZLIB != 0 {
            compress_zlib(&payload)?
        } else {
            payload
        };
        let packed_len = stored.len() as u64;

        self.replace_section_blob(SectionId::Payload(handle.slot), stored)?;

        let entry = &mut self.entries[handle.slot];
        entry.packed_len = packed_len;
        entry.real_len = real_len;

        self.rebuild_table_blob()
    }

    /// Serialize the container with all committed mutations applied.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        self.validate_modified_state()?;
        emit_from_blobs(&self.section_blobs, self.layout.file_len, "modified")
    }

    /// Serialize the container exactly as it was parsed.
    pub fn to_bytes_unmodified(&self) -> io::Result<Vec<u8>> {
        emit_from_blobs(
            &self.original_section_blobs,
            self.original_file_len,
            "unmodified",
        )
    }

    fn checked_entry(&self, handle: &ObjectHandle) -> io::Result<&ObjectEntry> {
        let entry = self.entries.get(handle.slot).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("stale object handle: no slot {}", handle.slot),
            )
        })?;
        if entry.path_id != handle.path_id {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "stale object handle: slot {} holds object {}, handle names {}",
                    handle.slot, entry.path_id, handle.path_id
                ),
            ));
        }
        if entry.type_tag != FONT_TYPE_TAG {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "object {} is {:?}, not a font",
                    entry.path_id, entry.type_tag
                ),
            ));
        }
        Ok(entry)
    }

    fn section_index(&self, id: SectionId) -> io::Result<usize> {
        self.layout
            .sections
            .iter()
            .position(|section| section.id == id)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("missing section {id:?}"),
                )
            })
    }

    fn section_blob(&self, id: SectionId) -> io::Result<&SectionBlob> {
        let section_index = self.section_index(id)?;
        self.section_blobs.get(section_index).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "section blob list does not match recorded layout",
            )
        })
    }

    fn replace_section_blob(&mut self, id: SectionId, bytes: Vec<u8>) -> io::Result<()> {
        let section_index = self.section_index(id)?;
        let section = self.layout.sections.get_mut(section_index).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "section blob list does not match recorded layout",
            )
        })?;
        let old_len = section.range.len();
        let new_len = bytes.len();
        section.range.end = section.range.start + new_len;

        if new_len != old_len {
            if new_len > old_len {
                let delta = new_len - old_len;
                for later in self.layout.sections.iter_mut().skip(section_index + 1) {
                    later.range.start = later.range.start.checked_add(delta).ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, "section start overflow")
                    })?;
                    later.range.end = later.range.end.checked_add(delta).ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, "section end overflow")
                    })?;
                }
                self.layout.file_len =
                    self.layout.file_len.checked_add(delta).ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, "layout file_len overflow")
                    })?;
            } else {
                let delta = old_len - new_len;
                for later in self.layout.sections.iter_mut().skip(section_index + 1) {
                    later.range.start = later.range.start.checked_sub(delta).ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, "section start underflow")
                    })?;
                    later.range.end = later.range.end.checked_sub(delta).ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, "section end underflow")
                    })?;
                }
                self.layout.file_len =
                    self.layout.file_len.checked_sub(delta).ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, "layout file_len underflow")
                    })?;
            }
        }

        let slot = self.section_blobs.get_mut(section_index).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "section blob list does not match recorded layout",
            )
        })?;
        slot.bytes = bytes;

        Ok(())
    }

    /// Re-encode the object table from entry metadata and the current layout.
    /// Record sizes depend only on tag lengths, so the table blob never
    /// changes size and no layout shift is needed here.
    fn rebuild_table_blob(&mut self) -> io::Result<()> {
        let mut table = Vec::new();
        for (slot, entry) in self.entries.iter().enumerate() {
            let section_index = self.section_index(SectionId::Payload(slot))?;
            let range = self.layout.sections[section_index].range;

            table.extend_from_slice(&entry.path_id.to_le_bytes());
            table.extend_from_slice(&(entry.type_tag.len() as u32).to_le_bytes());
            table.extend_from_slice(entry.type_tag.as_bytes());
            table.extend_from_slice(&entry.flags.to_le_bytes());
            table.extend_from_slice(&(range.start as u64).to_le_bytes());
            table.extend_from_slice(&entry.packed_len.to_le_bytes());
            table.extend_from_slice(&entry.real_len.to_le_bytes());
        }

        let table_index = self.section_index(SectionId::ObjectTable)?;
        let expected = self.layout.sections[table_index].range.len();
        if table.len() != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "rebuilt object table length mismatch: got {}, layout expects {}",
                    table.len(),
                    expected
                ),
            ));
        }

        let slot = self.section_blobs.get_mut(table_index).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "section blob list does not match recorded layout",
            )
        })?;
        slot.bytes = table;
        Ok(())
    }

    fn validate_modified_state(&self) -> io::Result<()> {
        if self.layout.sections.len() != self.section_blobs.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "layout/blob section count mismatch: {} layout sections, {} blobs",
                    self.layout.sections.len(),
                    self.section_blobs.len()
                ),
            ));
        }

        for (idx, (section, blob)) in self
            .layout
            .sections
            .iter()
            .zip(self.section_blobs.iter())
            .enumerate()
        {
            let expected = section.range.len();
            let actual = blob.bytes.len();
            if expected != actual {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "section/blob length mismatch at index {idx} ({:?}): layout={}, blob={}",
                        section.id, expected, actual
                    ),
                ));
            }
        }

        for (slot, entry) in self.entries.iter().enumerate() {
            let section_index = self.section_index(SectionId::Payload(slot))?;
            let stored = self.layout.sections[section_index].range.len() as u64;
            if stored != entry.packed_len {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "object {}: table says {} payload bytes, layout holds {}",
                        entry.path_id, entry.packed_len, stored
                    ),
                ));
            }
        }

        self.layout.validate()
    }
}

fn emit_from_blobs(
    blobs: &[SectionBlob],
    expected_len: usize,
    mode_label: &str,
) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len);
    for blob in blobs {
        out.extend_from_slice(&blob.bytes);
    }

    if out.len() != expected_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "{mode_label} emit length mismatch: got {}, expected {}",
                out.len(),
                expected_len
            ),
        ));
    }

    Ok(out)
}

fn decompress_zlib(packed: &[u8], expected_len: usize) -> io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(packed);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    if out.len() != expected_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "decompressed size mismatch: expected {}, got {}",
                expected_len,
                out.len()
            ),
        ));
    }
    Ok(out)
}

fn compress_zlib(raw: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::{compress_zlib, decompress_zlib};

    #[test]
    fn zlib_helpers_round_trip() {
        let raw = b"glyph outlines and hinting tables".to_vec();
        let packed = compress_zlib(&raw).expect("compression should succeed");
        let unpacked = decompress_zlib(&packed, raw.len()).expect("decompression should succeed");
        assert_eq!(unpacked, raw);
    }

    #[test]
    fn decompress_rejects_wrong_expected_length() {
        let packed = compress_zlib(b"abc").expect("compression should succeed");
        assert!(decompress_zlib(&packed, 2).is_err());
    }
}
