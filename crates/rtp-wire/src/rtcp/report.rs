//! SR (200) and RR (201) packets and their shared reception report blocks
//! (RFC 3550 §6.4).

use bytes::{BufMut, BytesMut};

use super::header::{HEADER_LEN, PacketType, RtcpHeader};
use crate::error::{Error, Result};

pub const REPORT_BLOCK_LEN: usize = 24;
pub const SENDER_INFO_LEN: usize = 20;
/// At most 31 report blocks fit in the 5-bit reception-report-count field.
pub const MAX_REPORT_BLOCKS: usize = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportBlock {
    pub ssrc: u32,
    pub fraction_lost: u8,
    /// Cumulative number of packets lost, a 24-bit *signed* quantity.
    pub cumulative_lost: i32,
    pub ext_highest_seq: u32,
    pub jitter: u32,
    /// Middle 32 bits of the last SR's NTP timestamp, or 0.
    pub lsr: u32,
    /// Delay since that SR in units of 1/65536s, or 0.
    pub dlsr: u32,
}

impl ReportBlock {
    fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < REPORT_BLOCK_LEN {
            return Err(Error::Truncated);
        }

        let ssrc = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let fraction_lost = buf[4];

        let mut lost = [0u8; 4];
        lost[1..4].copy_from_slice(&buf[5..8]);
        let mut cumulative_lost = i32::from_be_bytes(lost);
        // sign-extend the 24-bit field
        if cumulative_lost & 0x0080_0000 != 0 {
            cumulative_lost |= !0x00FF_FFFFu32 as i32;
        }

        let ext_highest_seq = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let jitter = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);
        let lsr = u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]);
        let dlsr = u32::from_be_bytes([buf[20], buf[21], buf[22], buf[23]]);

        Ok(ReportBlock {
            ssrc,
            fraction_lost,
            cumulative_lost,
            ext_highest_seq,
            jitter,
            lsr,
            dlsr,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32(self.ssrc);
        buf.put_u8(self.fraction_lost);
        let bytes = (self.cumulative_lost & 0x00FF_FFFF).to_be_bytes();
        buf.put_slice(&bytes[1..4]);
        buf.put_u32(self.ext_highest_seq);
        buf.put_u32(self.jitter);
        buf.put_u32(self.lsr);
        buf.put_u32(self.dlsr);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderInfo {
    pub ntp_timestamp: u64,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderInfo {
    fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < SENDER_INFO_LEN {
            return Err(Error::Truncated);
        }
        let ntp_msw = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let ntp_lsw = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok(SenderInfo {
            ntp_timestamp: ((ntp_msw as u64) << 32) | ntp_lsw as u64,
            rtp_timestamp: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            packet_count: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
            octet_count: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32((self.ntp_timestamp >> 32) as u32);
        buf.put_u32(self.ntp_timestamp as u32);
        buf.put_u32(self.rtp_timestamp);
        buf.put_u32(self.packet_count);
        buf.put_u32(self.octet_count);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    pub sender_info: SenderInfo,
    pub reports: Vec<ReportBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverReport {
    pub ssrc: u32,
    pub reports: Vec<ReportBlock>,
}

fn parse_reports(buf: &[u8], count: u8) -> Result<Vec<ReportBlock>> {
    let mut reports = Vec::with_capacity(count as usize);
    let mut offset = 0;
    for _ in 0..count {
        reports.push(ReportBlock::parse(
            buf.get(offset..)
                .ok_or(Error::BadConstituent("truncated report block"))?,
        )?);
        offset += REPORT_BLOCK_LEN;
    }
    Ok(reports)
}

impl SenderReport {
    /// `buf` is the packet body *after* the 4-byte common header.
    pub(crate) fn parse(header: &RtcpHeader, buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 + SENDER_INFO_LEN {
            return Err(Error::BadConstituent("truncated sender report"));
        }
        let ssrc = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let sender_info = SenderInfo::parse(&buf[4..])?;
        let reports = parse_reports(&buf[4 + SENDER_INFO_LEN..], header.count)?;
        Ok(SenderReport { ssrc, sender_info, reports })
    }

    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        if self.reports.len() > MAX_REPORT_BLOCKS {
            return Err(Error::Overflow);
        }
        // `length_words` excludes the header word; body-word count is the
        // value RFC 3550 §6.4.1 wants directly (total_words - 1 == body_words
        // since the header itself is exactly one word).
        let body_words = (4 + SENDER_INFO_LEN + self.reports.len() * REPORT_BLOCK_LEN) / 4;
        RtcpHeader {
            padding: false,
            count: self.reports.len() as u8,
            packet_type: PacketType::Sr.into(),
            length_words: body_words as u16,
        }
        .write(buf);
        buf.put_u32(self.ssrc);
        self.sender_info.write(buf);
        for report in &self.reports {
            report.write(buf);
        }
        Ok(())
    }

    pub fn wire_len(&self) -> usize {
        HEADER_LEN + 4 + SENDER_INFO_LEN + self.reports.len() * REPORT_BLOCK_LEN
    }
}

impl ReceiverReport {
    pub(crate) fn parse(header: &RtcpHeader, buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(Error::BadConstituent("truncated receiver report"));
        }
        let ssrc = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let reports = parse_reports(&buf[4..], header.count)?;
        Ok(ReceiverReport { ssrc, reports })
    }

    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        if self.reports.len() > MAX_REPORT_BLOCKS {
            return Err(Error::Overflow);
        }
        let body_words = (4 + self.reports.len() * REPORT_BLOCK_LEN) / 4;
        RtcpHeader {
            padding: false,
            count: self.reports.len() as u8,
            packet_type: PacketType::Rr.into(),
            length_words: body_words as u16,
        }
        .write(buf);
        buf.put_u32(self.ssrc);
        for report in &self.reports {
            report.write(buf);
        }
        Ok(())
    }

    pub fn wire_len(&self) -> usize {
        HEADER_LEN + 4 + self.reports.len() * REPORT_BLOCK_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_block_roundtrip_negative_cumulative_lost() {
        let block = ReportBlock {
            ssrc: 0x1234_5678,
            fraction_lost: 12,
            cumulative_lost: -5,
            ext_highest_seq: 0x0001_0020,
            jitter: 42,
            lsr: 0x1111_1111,
            dlsr: 0x2222_2222,
        };
        let mut buf = BytesMut::new();
        block.write(&mut buf);
        let parsed = ReportBlock::parse(&buf).unwrap();
        assert_eq!(parsed, block);
    }

    #[test]
    fn sender_report_roundtrip() {
        let sr = SenderReport {
            ssrc: 0x0102_0304,
            sender_info: SenderInfo {
                ntp_timestamp: 0x1122_3344_5566_7788,
                rtp_timestamp: 0xAABB_CCDD,
                packet_count: 10,
                octet_count: 20,
            },
            reports: vec![],
        };
        let mut buf = BytesMut::new();
        sr.write(&mut buf).unwrap();
        let header = RtcpHeader::parse(&buf).unwrap();
        let parsed = SenderReport::parse(&header, &buf[HEADER_LEN..]).unwrap();
        assert_eq!(parsed, sr);
    }
}
