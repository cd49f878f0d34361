//! SDES (202) packets: per-chunk source description items (RFC 3550 §6.5).

use bytes::{BufMut, BytesMut};

use super::header::{PacketType, RtcpHeader};
use crate::error::{Error, Result};

pub const MAX_ITEM_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdesItem {
    Cname(Vec<u8>),
    Name(Vec<u8>),
    Email(Vec<u8>),
    Phone(Vec<u8>),
    Loc(Vec<u8>),
    Tool(Vec<u8>),
    Note(Vec<u8>),
    Priv { prefix: Vec<u8>, value: Vec<u8> },
}

impl SdesItem {
    fn type_id(&self) -> u8 {
        match self {
            SdesItem::Cname(_) => 1,
            SdesItem::Name(_) => 2,
            SdesItem::Email(_) => 3,
            SdesItem::Phone(_) => 4,
            SdesItem::Loc(_) => 5,
            SdesItem::Tool(_) => 6,
            SdesItem::Note(_) => 7,
            SdesItem::Priv { .. } => 8,
        }
    }

    fn value_bytes(&self) -> Vec<u8> {
        match self {
            SdesItem::Cname(v)
            | SdesItem::Name(v)
            | SdesItem::Email(v)
            | SdesItem::Phone(v)
            | SdesItem::Loc(v)
            | SdesItem::Tool(v)
            | SdesItem::Note(v) => v.clone(),
            SdesItem::Priv { prefix, value } => {
                let mut out = Vec::with_capacity(1 + prefix.len() + value.len());
                out.push(prefix.len() as u8);
                out.extend_from_slice(prefix);
                out.extend_from_slice(value);
                out
            }
        }
    }

    fn from_type(type_id: u8, value: &[u8]) -> Result<Self> {
        if value.len() > MAX_ITEM_LEN {
            return Err(Error::BadConstituent("SDES item exceeds 255 bytes"));
        }
        Ok(match type_id {
            1 => SdesItem::Cname(value.to_vec()),
            2 => SdesItem::Name(value.to_vec()),
            3 => SdesItem::Email(value.to_vec()),
            4 => SdesItem::Phone(value.to_vec()),
            5 => SdesItem::Loc(value.to_vec()),
            6 => SdesItem::Tool(value.to_vec()),
            7 => SdesItem::Note(value.to_vec()),
            8 => {
                let prefix_len = *value.first().ok_or(Error::BadConstituent("truncated PRIV item"))? as usize;
                if 1 + prefix_len > value.len() {
                    return Err(Error::BadConstituent("truncated PRIV prefix"));
                }
                SdesItem::Priv {
                    prefix: value[1..1 + prefix_len].to_vec(),
                    value: value[1 + prefix_len..].to_vec(),
                }
            }
            _other => return Err(Error::BadConstituent("unrecognized SDES item type")),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdesChunk {
    pub ssrc: u32,
    pub items: Vec<SdesItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sdes {
    pub chunks: Vec<SdesChunk>,
}

impl Sdes {
    pub(crate) fn parse(header: &RtcpHeader, buf: &[u8]) -> Result<Self> {
        let mut chunks = Vec::with_capacity(header.count as usize);
        let mut offset = 0;

        for _ in 0..header.count {
            if offset + 4 > buf.len() {
                return Err(Error::BadConstituent("truncated SDES chunk"));
            }
            let ssrc = u32::from_be_bytes([
                buf[offset],
                buf[offset + 1],
                buf[offset + 2],
                buf[offset + 3],
            ]);
            offset += 4;

            let mut items = Vec::new();
            loop {
                let type_id = *buf.get(offset).ok_or(Error::BadConstituent("truncated SDES item"))?;
                if type_id == 0 {
                    offset += 1;
                    // 32-bit alignment padding for the chunk.
                    while offset % 4 != 0 {
                        offset += 1;
                    }
                    break;
                }

                let len = *buf
                    .get(offset + 1)
                    .ok_or(Error::BadConstituent("truncated SDES item length"))? as usize;
                let value_start = offset + 2;
                let value_end = value_start + len;
                if value_end > buf.len() {
                    return Err(Error::BadConstituent("SDES item overruns chunk"));
                }

                items.push(SdesItem::from_type(type_id, &buf[value_start..value_end])?);
                offset = value_end;
            }

            chunks.push(SdesChunk { ssrc, items });
        }

        Ok(Sdes { chunks })
    }

    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        let start = buf.len();
        RtcpHeader {
            padding: false,
            count: self.chunks.len() as u8,
            packet_type: PacketType::Sdes.into(),
            length_words: 0, // patched below
        }
        .write(buf);

        for chunk in &self.chunks {
            buf.put_u32(chunk.ssrc);
            for item in &chunk.items {
                let value = item.value_bytes();
                if value.len() > MAX_ITEM_LEN {
                    return Err(Error::Overflow);
                }
                buf.put_u8(item.type_id());
                buf.put_u8(value.len() as u8);
                buf.put_slice(&value);
            }
            buf.put_u8(0);
            while (buf.len() - start) % 4 != 0 {
                buf.put_u8(0);
            }
        }

        let body_words = (buf.len() - start) / 4 - 1;
        let length_words = (body_words as u16).to_be_bytes();
        buf[start + 2] = length_words[0];
        buf[start + 3] = length_words[1];
        Ok(())
    }
}
