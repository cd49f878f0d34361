//! BYE (203) packets (RFC 3550 §6.6).

use bytes::{BufMut, BytesMut};

use super::header::{PacketType, RtcpHeader};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bye {
    pub ssrcs: Vec<u32>,
    /// `Some(reason)` if a reason was present on the wire — a present,
    /// zero-length reason is legal and distinct from no reason at all.
    pub reason: Option<Vec<u8>>,
}

impl Bye {
    pub(crate) fn parse(header: &RtcpHeader, buf: &[u8]) -> Result<Self> {
        let count = header.count as usize;
        if buf.len() < count * 4 {
            return Err(Error::BadConstituent("truncated BYE SSRC list"));
        }

        let mut ssrcs = Vec::with_capacity(count);
        for i in 0..count {
            let o = i * 4;
            ssrcs.push(u32::from_be_bytes([buf[o], buf[o + 1], buf[o + 2], buf[o + 3]]));
        }

        let rest = &buf[count * 4..];
        let reason = if rest.is_empty() {
            None
        } else {
            let len = rest[0] as usize;
            if 1 + len > rest.len() {
                return Err(Error::BadConstituent("truncated BYE reason"));
            }
            Some(rest[1..1 + len].to_vec())
        };

        Ok(Bye { ssrcs, reason })
    }

    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        if self.ssrcs.len() > 31 {
            return Err(Error::Overflow);
        }
        let start = buf.len();
        RtcpHeader {
            padding: false,
            count: self.ssrcs.len() as u8,
            packet_type: PacketType::Bye.into(),
            length_words: 0,
        }
        .write(buf);

        for ssrc in &self.ssrcs {
            buf.put_u32(*ssrc);
        }

        if let Some(reason) = &self.reason {
            if reason.len() > 255 {
                return Err(Error::Overflow);
            }
            buf.put_u8(reason.len() as u8);
            buf.put_slice(reason);
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

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::header::HEADER_LEN;

    #[test]
    fn bye_with_zero_length_reason_round_trips_present() {
        let bye = Bye { ssrcs: vec![0x01], reason: Some(vec![]) };
        let mut buf = BytesMut::new();
        bye.write(&mut buf).unwrap();
        let header = RtcpHeader::parse(&buf).unwrap();
        let parsed = Bye::parse(&header, &buf[HEADER_LEN..]).unwrap();
        assert_eq!(parsed.reason, Some(vec![]));
    }

    #[test]
    fn bye_without_reason_round_trips_none() {
        let bye = Bye { ssrcs: vec![0x01, 0x02], reason: None };
        let mut buf = BytesMut::new();
        bye.write(&mut buf).unwrap();
        let header = RtcpHeader::parse(&buf).unwrap();
        let parsed = Bye::parse(&header, &buf[HEADER_LEN..]).unwrap();
        assert_eq!(parsed.reason, None);
        assert_eq!(parsed.ssrcs, vec![0x01, 0x02]);
    }
}
