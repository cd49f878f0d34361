//! RTCP compound-packet builder (spec.md §4.4), assembling the next
//! report from source-table and scheduler state.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::BytesMut;
use sources::{PacketBuilder, SourceTable};
use wire::rtcp::header::HEADER_LEN;
use wire::rtcp::report::{REPORT_BLOCK_LEN, SENDER_INFO_LEN};
use wire::rtcp::{
    Bye, ReceiverReport, RtcpPacket, Sdes, SdesChunk, SdesItem, SenderInfo, SenderReport,
    write_compound,
};

use crate::clock::Clock;
use crate::error::{Error, Result};

const MAX_REPORT_BLOCKS_PER_PACKET: usize = 31;
const SSRC_LEN: usize = 4;

fn pad4(n: usize) -> usize {
    (n + 3) / 4 * 4
}

/// Byte length of an SDES item on the wire: 1 type octet + 1 length octet
/// + the value (RFC 3550 §6.5). None of the items this builder emits are
/// PRIV, but the arm is here for completeness against `SdesItem`.
fn sdes_item_wire_len(item: &SdesItem) -> usize {
    match item {
        SdesItem::Cname(v)
        | SdesItem::Name(v)
        | SdesItem::Email(v)
        | SdesItem::Phone(v)
        | SdesItem::Loc(v)
        | SdesItem::Tool(v)
        | SdesItem::Note(v) => 2 + v.len(),
        SdesItem::Priv { prefix, value } => 2 + 1 + prefix.len() + value.len(),
    }
}

/// Byte length of a one-chunk SDES packet carrying `items` (header + SSRC +
/// items + null terminator, padded to a 32-bit boundary).
fn sdes_packet_wire_len(items: &[SdesItem]) -> usize {
    let body: usize = SSRC_LEN + items.iter().map(sdes_item_wire_len).sum::<usize>() + 1;
    HEADER_LEN + pad4(body)
}

/// Byte length of a BYE packet carrying a single SSRC and optional reason.
fn bye_packet_wire_len(reason: Option<&[u8]>) -> usize {
    let body = SSRC_LEN + reason.map_or(0, |r| 1 + r.len());
    HEADER_LEN + pad4(body)
}

/// Per-item SDES inclusion interval: the item is attached every `Ki`'th
/// compound packet. `0` or negative disables it (spec.md §4.4 step 2).
#[derive(Debug, Clone, Copy, Default)]
pub struct SdesIntervals {
    pub name: i32,
    pub email: i32,
    pub loc: i32,
    pub phone: i32,
    pub tool: i32,
    pub note: i32,
}

/// Local SDES items the builder attaches, subject to `SdesIntervals`.
#[derive(Debug, Clone, Default)]
pub struct LocalSdes {
    pub cname: Vec<u8>,
    pub name: Option<Vec<u8>>,
    pub email: Option<Vec<u8>>,
    pub loc: Option<Vec<u8>>,
    pub phone: Option<Vec<u8>>,
    pub tool: Option<Vec<u8>>,
    pub note: Option<Vec<u8>>,
}

/// Resumable cursor over the source table so a size-budgeted build that
/// stops partway can continue where it left off on the next call
/// (spec.md §4.4 "Size budget").
#[derive(Default)]
struct Cursor {
    pending_ssrcs: VecDeque<u32>,
}

pub struct RtcpBuilder {
    local_sdes: LocalSdes,
    intervals: SdesIntervals,
    compound_count: u64,
    cursor: Cursor,
}

impl RtcpBuilder {
    pub fn new(local_sdes: LocalSdes, intervals: SdesIntervals) -> Self {
        RtcpBuilder { local_sdes, intervals, compound_count: 0, cursor: Cursor::default() }
    }

    fn due(interval: i32, count: u64) -> bool {
        interval > 0 && count % interval as u64 == 0
    }

    /// Builds the SDES packet, stopping short of an optional item when
    /// adding it would exceed `budget` bytes (spec.md §4.4 "Size budget").
    /// CNAME is mandatory and always included regardless of budget.
    fn sdes_packet(&self, own_ssrc: u32, budget: Option<usize>) -> RtcpPacket {
        let mut items = vec![SdesItem::Cname(self.local_sdes.cname.clone())];
        let count = self.compound_count;

        let mut candidates = Vec::new();
        if let Some(v) = &self.local_sdes.name {
            if Self::due(self.intervals.name, count) {
                candidates.push(SdesItem::Name(v.clone()));
            }
        }
        if let Some(v) = &self.local_sdes.email {
            if Self::due(self.intervals.email, count) {
                candidates.push(SdesItem::Email(v.clone()));
            }
        }
        if let Some(v) = &self.local_sdes.loc {
            if Self::due(self.intervals.loc, count) {
                candidates.push(SdesItem::Loc(v.clone()));
            }
        }
        if let Some(v) = &self.local_sdes.phone {
            if Self::due(self.intervals.phone, count) {
                candidates.push(SdesItem::Phone(v.clone()));
            }
        }
        if let Some(v) = &self.local_sdes.tool {
            if Self::due(self.intervals.tool, count) {
                candidates.push(SdesItem::Tool(v.clone()));
            }
        }
        if let Some(v) = &self.local_sdes.note {
            if Self::due(self.intervals.note, count) {
                candidates.push(SdesItem::Note(v.clone()));
            }
        }

        for candidate in candidates {
            if let Some(max) = budget {
                let mut projected = items.clone();
                projected.push(candidate.clone());
                if sdes_packet_wire_len(&projected) > max {
                    break;
                }
            }
            items.push(candidate);
        }

        RtcpPacket::Sdes(Sdes { chunks: vec![SdesChunk { ssrc: own_ssrc, items }] })
    }

    /// Refills the report-block cursor with every foreign, non-CSRC
    /// source that has sent validated RTP since the previous build.
    fn refill_cursor(&mut self, sources: &SourceTable, own_ssrc: u32) {
        if !self.cursor.pending_ssrcs.is_empty() {
            return;
        }
        for (&ssrc, record) in sources.iter() {
            if ssrc == own_ssrc || record.is_csrc || !record.validated {
                continue;
            }
            self.cursor.pending_ssrcs.push_back(ssrc);
        }
    }

    /// Builds the next compound packet. `is_sender` selects SR vs RR for
    /// the first packet; `bye` (reason) appends a BYE packet after SDES,
    /// only meaningful on shutdown (spec.md §4.4 step 3).
    #[allow(clippy::too_many_arguments)]
    pub fn build_next(
        &mut self,
        sources: &mut SourceTable,
        packet_builder: &PacketBuilder,
        clock: &Clock,
        is_sender: bool,
        max_size: Option<usize>,
        bye: Option<&[u8]>,
    ) -> Result<BytesMut> {
        let own_ssrc = sources.own_ssrc().ok_or(Error::InvalidState("no own SSRC"))?;
        self.refill_cursor(sources, own_ssrc);

        let now = clock.now();

        // Running size of the compound packet assembled so far. Report
        // blocks and SDES items are added only while there's still room;
        // once the budget is hit, the build stops and leaves the
        // remaining SSRCs on the cursor for the next call (spec.md §4.4
        // "Size budget").
        let mut running = HEADER_LEN + SSRC_LEN + if is_sender { SENDER_INFO_LEN } else { 0 };

        let mut blocks = Vec::new();
        loop {
            if blocks.len() >= MAX_REPORT_BLOCKS_PER_PACKET || self.cursor.pending_ssrcs.is_empty() {
                break;
            }
            let ssrc = *self.cursor.pending_ssrcs.front().unwrap();
            let Some(block) = sources.report_block_for(ssrc, now) else {
                self.cursor.pending_ssrcs.pop_front();
                continue;
            };
            if let Some(max) = max_size {
                if running + REPORT_BLOCK_LEN > max {
                    break;
                }
            }
            running += REPORT_BLOCK_LEN;
            blocks.push(block);
            self.cursor.pending_ssrcs.pop_front();
        }

        let mut packets = Vec::new();
        if is_sender {
            packets.push(RtcpPacket::Sr(SenderReport {
                ssrc: own_ssrc,
                sender_info: SenderInfo {
                    ntp_timestamp: clock.ntp_now(),
                    rtp_timestamp: packet_builder.last_timestamp(),
                    packet_count: packet_builder.packets_sent as u32,
                    octet_count: packet_builder.octets_sent as u32,
                },
                reports: blocks,
            }));
        } else {
            packets.push(RtcpPacket::Rr(ReceiverReport { ssrc: own_ssrc, reports: blocks }));
        }

        let sdes_budget = max_size.map(|max| max.saturating_sub(running));
        let sdes = self.sdes_packet(own_ssrc, sdes_budget);
        if let RtcpPacket::Sdes(Sdes { chunks }) = &sdes {
            running += sdes_packet_wire_len(chunks.first().map(|c| c.items.as_slice()).unwrap_or(&[]));
        }
        packets.push(sdes);

        if let Some(reason) = bye {
            let fits = max_size.map_or(true, |max| running + bye_packet_wire_len(Some(reason)) <= max);
            if fits {
                packets.push(RtcpPacket::Bye(Bye {
                    ssrcs: vec![own_ssrc],
                    reason: Some(reason.to_vec()),
                }));
            }
        }

        let buf = write_compound(&packets).map_err(|e| Error::ProtocolError(e.to_string()))?;

        self.compound_count += 1;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use wire::rtp::{RtpBuilder, RtpPacket};

    fn addr() -> SocketAddr {
        "127.0.0.1:8000".parse().unwrap()
    }

    #[test]
    fn builds_rr_with_sdes_for_non_sender() {
        let mut sources = SourceTable::new(sources::ProbationType::NoProbation, 2, false, 8000.0);
        sources.create_own_source(0x1);

        let bytes = RtpBuilder::new(None).build(false, 0, 1, 0, 0x2, &[], None, b"x").unwrap();
        let pkt = RtpPacket::parse(&bytes).unwrap();
        sources.ingest_rtp(&pkt, addr(), false, Duration::from_secs(0));

        let mut rng = rand::rng();
        let packet_builder = PacketBuilder::new(None, 0x1, &mut rng);
        let clock = Clock::new();
        let mut builder = RtcpBuilder::new(
            LocalSdes { cname: b"alice".to_vec(), ..Default::default() },
            SdesIntervals::default(),
        );

        let compound = builder
            .build_next(&mut sources, &packet_builder, &clock, false, None, None)
            .unwrap();
        let parsed = wire::rtcp::parse_compound(&compound).unwrap();
        assert!(matches!(parsed[0], RtcpPacket::Rr(_)));
        assert!(matches!(parsed[1], RtcpPacket::Sdes(_)));
    }

    #[test]
    fn size_budget_stops_early_and_leaves_cursor_for_next_call() {
        let mut sources = SourceTable::new(sources::ProbationType::NoProbation, 2, false, 8000.0);
        sources.create_own_source(0x1);

        for ssrc in [0x2u32, 0x3, 0x4] {
            let bytes = RtpBuilder::new(None).build(false, 0, 1, 0, ssrc, &[], None, b"x").unwrap();
            let pkt = RtpPacket::parse(&bytes).unwrap();
            sources.ingest_rtp(&pkt, addr(), false, Duration::from_secs(0));
        }

        let mut rng = rand::rng();
        let packet_builder = PacketBuilder::new(None, 0x1, &mut rng);
        let clock = Clock::new();
        let mut builder = RtcpBuilder::new(
            LocalSdes { cname: b"alice".to_vec(), ..Default::default() },
            SdesIntervals::default(),
        );

        // Big enough for the RR header plus one report block and the
        // mandatory CNAME, but not all three sources' blocks.
        let tight_budget = HEADER_LEN + SSRC_LEN + REPORT_BLOCK_LEN + sdes_packet_wire_len(&[
            SdesItem::Cname(b"alice".to_vec()),
        ]);

        let compound = builder
            .build_next(&mut sources, &packet_builder, &clock, false, Some(tight_budget), None)
            .unwrap();
        assert!(compound.len() <= tight_budget);

        let parsed = wire::rtcp::parse_compound(&compound).unwrap();
        let RtcpPacket::Rr(rr) = &parsed[0] else { panic!("expected RR") };
        assert_eq!(rr.reports.len(), 1);
        assert_eq!(builder.cursor.pending_ssrcs.len(), 2);

        // A follow-up call with no budget constraint drains the rest.
        let compound = builder
            .build_next(&mut sources, &packet_builder, &clock, false, None, None)
            .unwrap();
        let parsed = wire::rtcp::parse_compound(&compound).unwrap();
        let RtcpPacket::Rr(rr) = &parsed[0] else { panic!("expected RR") };
        assert_eq!(rr.reports.len(), 2);
        assert!(builder.cursor.pending_ssrcs.is_empty());
    }
}
