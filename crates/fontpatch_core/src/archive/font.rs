use std::io::{self, Cursor};

use crate::reader::LittleEndianReader;

/// Materialized `Font` object payload.
///
/// Only the name and the font program bytes are modeled. Whatever follows
/// them in the payload belongs to engine fields this tool does not touch; it
/// is carried in `trailer` and written back verbatim on commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontAsset {
    pub name: String,
    pub font_data: Vec<u8>,
    pub trailer: Vec<u8>,
}

impl FontAsset {
    pub fn decode(payload: &[u8]) -> io::Result<Self> {
        let mut r = LittleEndianReader::new(Cursor::new(payload));
        let name = r.read_string()?;
        let data_len = r.read_u32()? as usize;
        let font_data = r.read_bytes(data_len)?;
        let consumed = r.position()? as usize;
        let trailer = payload[consumed..].to_vec();

        Ok(Self {
            name,
            font_data,
            trailer,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(8 + self.name.len() + self.font_data.len() + self.trailer.len());
        out.extend_from_slice(&(self.name.len() as u32).to_le_bytes());
        out.extend_from_slice(self.name.as_bytes());
        out.extend_from_slice(&(self.font_data.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.font_data);
        out.extend_from_slice(&self.trailer);
        out
    }
}
