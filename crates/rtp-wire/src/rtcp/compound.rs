//! Compound RTCP packet parsing and building (RFC 3550 §6.1, spec.md §4.1).
//!
//! A compound packet is a back-to-back sequence of constituent RTCP
//! packets delivered in a single transport datagram. The first packet
//! must be SR or RR; declared lengths must sum exactly to the datagram
//! length; only the last constituent may carry the padding bit.

use bytes::BytesMut;

use super::header::{HEADER_LEN, PacketType, RtcpHeader};
use super::RtcpPacket;
use crate::error::{Error, Result};

/// Parse every constituent packet out of one compound RTCP datagram.
///
/// Any malformed constituent, or a violation of the compound-level rules
/// above, rejects the whole datagram with [`Error::BadCompound`] or the
/// more specific [`Error::BadConstituent`] that caused it.
pub fn parse(buf: &[u8]) -> Result<Vec<RtcpPacket>> {
    if buf.is_empty() {
        return Err(Error::BadCompound);
    }

    let mut packets = Vec::new();
    let mut offset = 0;
    let mut first = true;

    while offset < buf.len() {
        let header = RtcpHeader::parse(&buf[offset..])?;
        let declared = header.declared_len();
        if offset + declared > buf.len() {
            return Err(Error::BadCompound);
        }

        let packet_type: PacketType = header.packet_type.into();
        if first && !matches!(packet_type, PacketType::Sr | PacketType::Rr) {
            return Err(Error::BadCompound);
        }

        let is_last = offset + declared == buf.len();
        if header.padding && !is_last {
            return Err(Error::BadCompound);
        }

        let body = &buf[offset + HEADER_LEN..offset + declared];
        packets.push(RtcpPacket::parse_constituent(&header, packet_type, body)?);

        offset += declared;
        first = false;
    }

    if offset != buf.len() {
        return Err(Error::BadCompound);
    }

    Ok(packets)
}

/// Serialize a sequence of constituent packets into one compound
/// datagram. The caller is responsible for ordering (SR/RR first) per
/// spec.md §4.4; this function does not reorder, only validates.
pub fn write(packets: &[RtcpPacket]) -> Result<BytesMut> {
    if packets.is_empty() {
        return Err(Error::BadCompound);
    }
    if !matches!(packets[0], RtcpPacket::Sr(_) | RtcpPacket::Rr(_)) {
        return Err(Error::BadCompound);
    }

    let mut buf = BytesMut::new();
    for packet in packets {
        packet.write(&mut buf)?;
    }
    Ok(buf)
}

impl RtcpPacket {
    fn parse_constituent(header: &RtcpHeader, packet_type: PacketType, body: &[u8]) -> Result<Self> {
        Ok(match packet_type {
            PacketType::Sr => RtcpPacket::Sr(super::report::SenderReport::parse(header, body)?),
            PacketType::Rr => RtcpPacket::Rr(super::report::ReceiverReport::parse(header, body)?),
            PacketType::Sdes => RtcpPacket::Sdes(super::sdes::Sdes::parse(header, body)?),
            PacketType::Bye => RtcpPacket::Bye(super::bye::Bye::parse(header, body)?),
            PacketType::App => RtcpPacket::App(super::app::App::parse(header, body)?),
            PacketType::Unknown(code) => RtcpPacket::Unknown { packet_type: code, body: body.to_vec() },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::bye::Bye;
    use super::super::report::{SenderInfo, SenderReport};
    use super::super::sdes::{Sdes, SdesChunk, SdesItem};

    #[test]
    fn sr_sdes_bye_compound_round_trips() {
        let sr = RtcpPacket::Sr(SenderReport {
            ssrc: 0x1111_1111,
            sender_info: SenderInfo {
                ntp_timestamp: 0x1,
                rtp_timestamp: 1000,
                packet_count: 5,
                octet_count: 500,
            },
            reports: vec![],
        });
        let sdes = RtcpPacket::Sdes(Sdes {
            chunks: vec![SdesChunk {
                ssrc: 0x1111_1111,
                items: vec![SdesItem::Cname(b"alice@example.com".to_vec())],
            }],
        });
        let bye = RtcpPacket::Bye(Bye { ssrcs: vec![0x1111_1111], reason: None });

        let packets = vec![sr, sdes, bye];
        let buf = write(&packets).unwrap();
        let parsed = parse(&buf).unwrap();
        assert_eq!(parsed, packets);
    }

    #[test]
    fn rejects_compound_not_starting_with_sr_or_rr() {
        let bye = RtcpPacket::Bye(Bye { ssrcs: vec![1], reason: None });
        let mut buf = BytesMut::new();
        bye.write(&mut buf).unwrap();
        assert_eq!(parse(&buf), Err(Error::BadCompound));
    }

    #[test]
    fn rejects_padding_on_non_last_constituent() {
        let sr = RtcpPacket::Sr(SenderReport {
            ssrc: 1,
            sender_info: SenderInfo { ntp_timestamp: 0, rtp_timestamp: 0, packet_count: 0, octet_count: 0 },
            reports: vec![],
        });
        let bye = RtcpPacket::Bye(Bye { ssrcs: vec![1], reason: None });

        let mut buf = BytesMut::new();
        sr.write(&mut buf).unwrap();
        // flip the padding bit on the SR header we just wrote.
        buf[0] |= 0x20;
        bye.write(&mut buf).unwrap();

        assert_eq!(parse(&buf), Err(Error::BadCompound));
    }

    #[test]
    fn rejects_truncated_declared_length() {
        let sr = RtcpPacket::Sr(SenderReport {
            ssrc: 1,
            sender_info: SenderInfo { ntp_timestamp: 0, rtp_timestamp: 0, packet_count: 0, octet_count: 0 },
            reports: vec![],
        });
        let mut buf = BytesMut::new();
        sr.write(&mut buf).unwrap();
        buf.truncate(buf.len() - 4);
        assert_eq!(parse(&buf), Err(Error::BadCompound));
    }
}
