//! APP (204) packets: application-defined, exposed verbatim to callers
//! (RFC 3550 §6.7). The core mandates no vendor extensions here.

use bytes::{BufMut, BytesMut};

use super::header::{PacketType, RtcpHeader};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct App {
    pub subtype: u8,
    pub ssrc: u32,
    pub name: [u8; 4],
    pub data: Vec<u8>,
}

impl App {
    pub(crate) fn parse(header: &RtcpHeader, buf: &[u8]) -> Result<Self> {
        if buf.len() < 8 {
            return Err(Error::BadConstituent("truncated APP packet"));
        }
        let ssrc = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let name = [buf[4], buf[5], buf[6], buf[7]];
        Ok(App {
            subtype: header.count,
            ssrc,
            name,
            data: buf[8..].to_vec(),
        })
    }

    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        if self.data.len() % 4 != 0 {
            return Err(Error::BadConstituent("APP data must be 32-bit aligned"));
        }
        let body_words = (8 + self.data.len()) / 4;
        RtcpHeader {
            padding: false,
            count: self.subtype & 0x1F,
            packet_type: PacketType::App.into(),
            length_words: body_words as u16,
        }
        .write(buf);
        buf.put_u32(self.ssrc);
        buf.put_slice(&self.name);
        buf.put_slice(&self.data);
        Ok(())
    }
}
