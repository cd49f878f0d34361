//! RTCP common header (RFC 3550 §6.1), 4 bytes shared by every packet type.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

pub const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpHeader {
    pub padding: bool,
    /// Reception-report count for SR/RR, SDES chunk count, BYE SSRC
    /// count, or APP subtype — the field means different things per
    /// packet type but always occupies these 5 bits.
    pub count: u8,
    pub packet_type: u8,
    /// Length in 32-bit words minus one, *including* this header.
    pub length_words: u16,
}

impl RtcpHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }

        let b0 = buf[0];
        if b0 >> 6 != 2 {
            return Err(Error::BadVersion);
        }

        Ok(RtcpHeader {
            padding: (b0 & 0x20) != 0,
            count: b0 & 0x1F,
            packet_type: buf[1],
            length_words: u16::from_be_bytes([buf[2], buf[3]]),
        })
    }

    /// Total byte length this header declares, header included.
    pub fn declared_len(&self) -> usize {
        (self.length_words as usize + 1) * 4
    }

    pub fn write(&self, buf: &mut BytesMut) {
        let b0 = (2u8 << 6) | if self.padding { 0x20 } else { 0 } | (self.count & 0x1F);
        buf.put_u8(b0);
        buf.put_u8(self.packet_type);
        buf.put_u16(self.length_words);
    }
}

/// Recognized RTCP constituent packet types (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Sr,
    Rr,
    Sdes,
    Bye,
    App,
    Unknown(u8),
}

impl From<u8> for PacketType {
    fn from(v: u8) -> Self {
        match v {
            200 => PacketType::Sr,
            201 => PacketType::Rr,
            202 => PacketType::Sdes,
            203 => PacketType::Bye,
            204 => PacketType::App,
            other => PacketType::Unknown(other),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(v: PacketType) -> u8 {
        match v {
            PacketType::Sr => 200,
            PacketType::Rr => 201,
            PacketType::Sdes => 202,
            PacketType::Bye => 203,
            PacketType::App => 204,
            PacketType::Unknown(v) => v,
        }
    }
}
