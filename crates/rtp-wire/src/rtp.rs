//! RTP fixed header (RFC 3550 §5.1) parsing and building.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

const FIXED_HEADER_LEN: usize = 12;
const VERSION: u8 = 2;

/// An RTP header extension: a 16-bit profile-defined identifier plus the
/// raw extension words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpExtension<'a> {
    pub id: u16,
    pub data: &'a [u8],
}

/// A parsed RTP packet borrowing from the buffer it was parsed out of.
///
/// Per DESIGN NOTES (spec.md §9), this borrows for the duration of
/// dispatch; callers that need to hold on to a packet past dispatch copy
/// into an owned buffer (see `rtp-sources`'s queued packet type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrcs: Vec<u32>,
    pub extension: Option<RtpExtension<'a>>,
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Parse a complete RTP packet from `buf`.
    ///
    /// ```
    /// use rtp_wire::rtp::RtpPacket;
    ///
    /// let bytes = [
    ///     0x80, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0xAA, 0xBB, 0xCC,
    ///     0xDD, 0x01, 0x02, 0x03, 0x04,
    /// ];
    ///
    /// let pkt = RtpPacket::parse(&bytes).unwrap();
    /// assert_eq!(pkt.payload_type, 96);
    /// assert_eq!(pkt.sequence, 1);
    /// assert_eq!(pkt.timestamp, 16);
    /// assert_eq!(pkt.ssrc, 0xAABBCCDD);
    /// assert_eq!(pkt.payload, &[1, 2, 3, 4]);
    /// assert!(pkt.extension.is_none());
    /// assert!(!pkt.marker);
    /// ```
    ///
    /// ```
    /// use rtp_wire::{error::Error, rtp::RtpPacket};
    ///
    /// let mut bytes = [
    ///     0x80, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0xAA, 0xBB, 0xCC,
    ///     0xDD, 0x01, 0x02, 0x03, 0x04,
    /// ];
    /// bytes[0] = 0x00;
    /// assert_eq!(RtpPacket::parse(&bytes), Err(Error::BadVersion));
    /// ```
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(Error::Truncated);
        }

        let b0 = buf[0];
        let version = b0 >> 6;
        if version != VERSION {
            return Err(Error::BadVersion);
        }

        let has_padding = (b0 & 0x20) != 0;
        let has_extension = (b0 & 0x10) != 0;
        let csrc_count = (b0 & 0x0F) as usize;

        let b1 = buf[1];
        let marker = (b1 & 0x80) != 0;
        let payload_type = b1 & 0x7F;

        // Conservative RTP/RTCP disambiguation (spec.md §4.1): the low 7
        // bits of RTCP SR/RR's packet-type byte are 72/73.
        if marker && (payload_type == 72 || payload_type == 73) {
            return Err(Error::AmbiguousRtpRtcp);
        }

        let sequence = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        let mut offset = FIXED_HEADER_LEN;
        let csrcs_len = csrc_count * 4;
        if offset + csrcs_len > buf.len() {
            return Err(Error::Overflow);
        }

        let mut csrcs = Vec::with_capacity(csrc_count);
        for i in 0..csrc_count {
            let o = offset + i * 4;
            csrcs.push(u32::from_be_bytes([
                buf[o],
                buf[o + 1],
                buf[o + 2],
                buf[o + 3],
            ]));
        }
        offset += csrcs_len;

        let mut padding_len = 0usize;
        if has_padding {
            if buf.is_empty() || offset >= buf.len() {
                return Err(Error::BadPadding);
            }
            padding_len = *buf.last().unwrap() as usize;
            if padding_len == 0 || padding_len > buf.len() - offset {
                return Err(Error::BadPadding);
            }
        }

        let payload_end = buf.len() - padding_len;
        if payload_end < offset {
            return Err(Error::Overflow);
        }

        let extension = if has_extension {
            if offset + 4 > payload_end {
                return Err(Error::Overflow);
            }
            let id = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
            let words = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
            let ext_len = words * 4;
            let data_start = offset + 4;
            let data_end = data_start + ext_len;
            if data_end > payload_end {
                return Err(Error::Overflow);
            }
            offset = data_end;
            Some(RtpExtension {
                id,
                data: &buf[data_start..data_end],
            })
        } else {
            None
        };

        Ok(RtpPacket {
            marker,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            csrcs,
            extension,
            payload: &buf[offset..payload_end],
        })
    }
}

/// Builds RTP packets into an owned buffer.
///
/// Rejects payload types above 127 and the two ambiguous values 72/73
/// (spec.md §4.1), and CSRC counts above 15. When `max_packet_size` is
/// set, refuses to build a packet that would exceed it.
pub struct RtpBuilder {
    pub max_packet_size: Option<usize>,
}

impl RtpBuilder {
    pub fn new(max_packet_size: Option<usize>) -> Self {
        Self { max_packet_size }
    }

    /// ```
    /// use rtp_wire::rtp::{RtpBuilder, RtpPacket};
    ///
    /// let builder = RtpBuilder::new(None);
    /// let bytes = builder
    ///     .build(false, 96, 1, 16, 0xAABBCCDD, &[], None, &[1, 2, 3, 4])
    ///     .unwrap();
    ///
    /// let pkt = RtpPacket::parse(&bytes).unwrap();
    /// assert_eq!(pkt.payload_type, 96);
    /// assert_eq!(pkt.payload, &[1, 2, 3, 4]);
    /// ```
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        marker: bool,
        payload_type: u8,
        sequence: u16,
        timestamp: u32,
        ssrc: u32,
        csrcs: &[u32],
        extension: Option<RtpExtension<'_>>,
        payload: &[u8],
    ) -> Result<BytesMut> {
        if payload_type > 127 || payload_type == 72 || payload_type == 73 {
            return Err(Error::BadPayloadType);
        }

        if csrcs.len() > 15 {
            return Err(Error::TooManyCsrcs);
        }

        let mut buf = BytesMut::with_capacity(FIXED_HEADER_LEN + csrcs.len() * 4 + payload.len());

        let b0 = (VERSION << 6) | (csrcs.len() as u8 & 0x0F) | if extension.is_some() { 0x10 } else { 0 };
        buf.put_u8(b0);
        buf.put_u8(((marker as u8) << 7) | (payload_type & 0x7F));
        buf.put_u16(sequence);
        buf.put_u32(timestamp);
        buf.put_u32(ssrc);

        for csrc in csrcs {
            buf.put_u32(*csrc);
        }

        if let Some(ext) = extension {
            buf.put_u16(ext.id);
            buf.put_u16((ext.data.len() / 4) as u16);
            buf.put_slice(ext.data);
        }

        buf.put_slice(payload);

        if let Some(max) = self.max_packet_size {
            if buf.len() > max {
                return Err(Error::PacketTooLarge);
            }
        }

        Ok(buf)
    }
}

/// Compares two 16-bit RTP sequence numbers for "which came later",
/// resolving wraparound by picking whichever interpretation has the
/// smaller absolute distance (spec.md §4.2 step 1 / §8 boundary test).
///
/// Returns the signed difference `current - reference` as if both had
/// been extended to 32 bits, choosing the candidate extension that
/// minimizes `|extended - reference|`; ties break toward incrementing the
/// cycle count (i.e. toward the forward interpretation).
pub fn extend_sequence(reference: u32, current_low16: u16) -> u32 {
    let base = reference & !0xFFFF;
    let candidates = [
        base.wrapping_add(current_low16 as u32),
        base.wrapping_add(current_low16 as u32).wrapping_add(0x1_0000),
        base.wrapping_add(current_low16 as u32).wrapping_sub(0x1_0000),
    ];

    let mut best = candidates[0];
    let mut best_dist = (best as i64 - reference as i64).abs();
    for &c in &candidates[1..] {
        let dist = (c as i64 - reference as i64).abs();
        if dist < best_dist || (dist == best_dist && c > best) {
            best = c;
            best_dist = dist;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_truncated() {
        assert_eq!(RtpPacket::parse(&[0x80, 0x60, 0x00]), Err(Error::Truncated));
    }

    #[test]
    fn parse_rejects_ambiguous_rtcp_alias() {
        let mut bytes = [
            0x80, 0x80 | 72, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0xAA, 0xBB, 0xCC, 0xDD,
        ];
        bytes[1] = 0x80 | 72;
        assert_eq!(RtpPacket::parse(&bytes), Err(Error::AmbiguousRtpRtcp));
    }

    #[test]
    fn build_parse_roundtrip_with_csrcs_and_extension() {
        let builder = RtpBuilder::new(None);
        let ext = RtpExtension { id: 0xBEDE, data: &[1, 2, 3, 4] };
        let bytes = builder
            .build(true, 111, 42, 9000, 0x1122_3344, &[1, 2, 3], Some(ext.clone()), b"payload")
            .unwrap();

        let parsed = RtpPacket::parse(&bytes).unwrap();
        assert!(parsed.marker);
        assert_eq!(parsed.payload_type, 111);
        assert_eq!(parsed.csrcs, vec![1, 2, 3]);
        assert_eq!(parsed.extension, Some(ext));
        assert_eq!(parsed.payload, b"payload");
    }

    #[test]
    fn build_rejects_ambiguous_payload_type() {
        let builder = RtpBuilder::new(None);
        assert_eq!(
            builder.build(false, 72, 0, 0, 0, &[], None, &[]),
            Err(Error::BadPayloadType)
        );
    }

    #[test]
    fn build_rejects_oversize_packet() {
        let builder = RtpBuilder::new(Some(16));
        assert_eq!(
            builder.build(false, 96, 0, 0, 0, &[], None, &[0u8; 64]),
            Err(Error::PacketTooLarge)
        );
    }

    #[test]
    fn extend_sequence_no_wrap() {
        assert_eq!(extend_sequence(100, 105), 105);
    }

    #[test]
    fn extend_sequence_forward_wrap() {
        // reference near the top of a cycle, next seq wrapped to a small value.
        assert_eq!(extend_sequence(0xFFFF, 0x0005), 0x1_0005);
    }

    #[test]
    fn extend_sequence_backward_reorder_across_wrap() {
        // a late, reordered packet from just before the wrap.
        assert_eq!(extend_sequence(0x1_0005, 0xFFF0), 0xFFF0);
    }
}
