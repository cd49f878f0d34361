//! Source table: per-SSRC records, RTP ingestion, probation, jitter,
//! CSRC propagation and collision detection (spec.md §4.2).

use std::net::SocketAddr;
use std::time::Duration;

use wire::rtcp::{ReportBlock, SenderReport};
use wire::rtp::{extend_sequence, RtpPacket};

use crate::record::{
    ByeState, ProbationType, QueuedPacket, ReceiverReportSummary, SenderReportSummary,
    SourceRecord, MAX_SDES_ITEM_LEN, PROBATION_QUEUE_BOUND,
};
use crate::table::Table;

/// Events raised by source-table mutation that the session engine turns
/// into application callbacks. Kept as returned data rather than an
/// injected callback trait (spec.md §9 suggests either; a plain value
/// avoids a dependency cycle back to the session crate that owns the
/// observer type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    NewSource { ssrc: u32 },
    Validated { ssrc: u32 },
    Collision { ssrc: u32, is_own: bool, addr: SocketAddr },
    Bye { ssrc: u32, reason: Option<Vec<u8>> },
}

/// Which logical channel a packet or address observation came from, for
/// collision bookkeeping (spec.md §4.2 "Collision detection").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Rtp,
    Rtcp,
}

pub struct IngestResult {
    pub delivered: Vec<QueuedPacket>,
    pub events: Vec<SourceEvent>,
    /// Set when a collision landed on the local SSRC; the session engine
    /// reacts to this by scheduling an SSRC change (spec.md §4.5).
    pub own_collision: bool,
}

impl IngestResult {
    fn empty() -> Self {
        IngestResult { delivered: Vec::new(), events: Vec::new(), own_collision: false }
    }
}

pub struct SourceTable {
    sources: Table<u32, SourceRecord>,
    own_ssrc: Option<u32>,
    probation_type: ProbationType,
    probation_threshold: u32,
    accept_own_packets: bool,
    /// The session's `own_timestamp_unit` (RTP clock rate in Hz), used to
    /// convert arrival-time deltas into RTP-timestamp ticks for the
    /// jitter estimate (spec.md §4.2 step 3).
    timestamp_rate: f64,

    pub sender_count: u32,
    pub total_count: u32,
    pub active_count: u32,
}

impl Default for SourceTable {
    fn default() -> Self {
        Self::new(ProbationType::ProbationStore, 2, false, 8000.0)
    }
}

impl SourceTable {
    pub fn new(
        probation_type: ProbationType,
        probation_threshold: u32,
        accept_own_packets: bool,
        timestamp_rate: f64,
    ) -> Self {
        SourceTable {
            sources: Table::default(),
            own_ssrc: None,
            probation_type,
            probation_threshold: probation_threshold.max(1),
            accept_own_packets,
            timestamp_rate,
            sender_count: 0,
            total_count: 0,
            active_count: 0,
        }
    }

    pub fn get(&self, ssrc: u32) -> Option<&SourceRecord> {
        self.sources.get(&ssrc)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &SourceRecord)> {
        self.sources.iter()
    }

    pub fn own_ssrc(&self) -> Option<u32> {
        self.own_ssrc
    }

    fn recompute_counts(&mut self) {
        self.sender_count = self.sources.values().filter(|s| s.sender).count() as u32;
        self.total_count = self.sources.len() as u32;
        self.active_count = self.sources.values().filter(|s| s.active).count() as u32;
    }

    /// Insert the local participant's own, pre-validated record (spec.md
    /// §4.2 "Source creation and lookup").
    pub fn create_own_source(&mut self, ssrc: u32) {
        self.sources.insert(ssrc, SourceRecord::new_own(ssrc));
        self.own_ssrc = Some(ssrc);
        self.recompute_counts();
    }

    /// Drops the current own-SSRC record, for collision-driven SSRC
    /// reassignment (spec.md §4.5 step 3).
    pub fn remove_own_source(&mut self) {
        if let Some(ssrc) = self.own_ssrc.take() {
            self.sources.remove(&ssrc);
            self.recompute_counts();
        }
    }

    fn entry(&mut self, ssrc: u32) -> (&mut SourceRecord, bool) {
        let is_new = !self.sources.contains_key(&ssrc);
        let record = self.sources.entry(ssrc).or_insert_with(|| SourceRecord::new(ssrc));
        (record, is_new)
    }

    fn validate(record: &mut SourceRecord, events: &mut Vec<SourceEvent>) {
        if !record.validated {
            record.validated = true;
            record.active = true;
            events.push(SourceEvent::Validated { ssrc: record.ssrc });
        }
    }

    /// spec.md §4.2 "Collision detection", invoked once per received
    /// packet before any other state is touched.
    fn check_collision(
        &mut self,
        ssrc: u32,
        addr: SocketAddr,
        channel: Channel,
        is_local_addr: bool,
        events: &mut Vec<SourceEvent>,
    ) -> bool {
        if self.accept_own_packets && is_local_addr {
            return false;
        }

        let is_own = self.own_ssrc == Some(ssrc);
        let (record, _) = self.entry(ssrc);
        let slot = match channel {
            Channel::Rtp => &mut record.rtp_addr,
            Channel::Rtcp => &mut record.rtcp_addr,
        };

        match slot {
            None => {
                *slot = Some(addr);
                false
            }
            Some(recorded) if *recorded == addr => false,
            Some(_) => {
                events.push(SourceEvent::Collision { ssrc, is_own, addr });
                true
            }
        }
    }

    /// Ingests one validated/pending RTP packet. Returns the packets now
    /// ready for application delivery (strictly ascending, no dupes per
    /// spec.md §3 invariant 5) plus any raised events.
    pub fn ingest_rtp(
        &mut self,
        packet: &RtpPacket<'_>,
        addr: SocketAddr,
        is_local_addr: bool,
        now: Duration,
    ) -> IngestResult {
        let mut result = IngestResult::empty();

        if self.check_collision(packet.ssrc, addr, Channel::Rtp, is_local_addr, &mut result.events) {
            result.own_collision = self.own_ssrc == Some(packet.ssrc);
            return result;
        }

        let probation_type = self.probation_type;
        let probation_threshold = self.probation_threshold;
        let timestamp_rate = self.timestamp_rate;

        let (record, is_new) = self.entry(packet.ssrc);
        if is_new {
            result.events.push(SourceEvent::NewSource { ssrc: packet.ssrc });
        }
        record.last_any_arrival = Some(now);
        record.last_rtp_arrival = Some(now);

        let ext_seq = reconstruct_sequence(record, packet.sequence);

        if !record.validated {
            match probation_type {
                ProbationType::NoProbation => {
                    record.base_seq = ext_seq;
                    record.interval_saved_seq = ext_seq;
                    Self::validate(record, &mut result.events);
                }
                ProbationType::ProbationStore | ProbationType::ProbationDiscard => {
                    let in_sequence = match record.probation_state.last_seq {
                        None => true,
                        Some(last) => packet.sequence == last.wrapping_add(1),
                    };

                    if in_sequence {
                        record.probation_state.consecutive += 1;
                    } else {
                        record.probation_state.consecutive = 1;
                    }
                    record.probation_state.last_seq = Some(packet.sequence);

                    if record.probation_state.consecutive >= probation_threshold {
                        record.base_seq = ext_seq.wrapping_sub(probation_threshold - 1);
                        record.interval_saved_seq = record.base_seq;
                        Self::validate(record, &mut result.events);
                    }
                }
            }
        }

        update_jitter(record, packet.timestamp, now, timestamp_rate);
        record.ext_highest_seq = ext_seq.max(record.ext_highest_seq);
        record.packets_received += 1;
        record.interval_packets += 1;
        if !record.is_own {
            record.sender = true;
        }

        let discard = !record.validated && probation_type == ProbationType::ProbationDiscard;

        if !discard {
            let queued = QueuedPacket::from_parsed(ext_seq, packet);
            let bounded = !record.validated;
            insert_queued(record, queued, bounded);
        }

        if record.validated {
            result.delivered = std::mem::take(&mut record.packet_queue);
        }

        for &csrc in &packet.csrcs {
            let (csrc_record, csrc_new) = self.entry_mut_for_csrc(csrc);
            if csrc_new {
                result.events.push(SourceEvent::NewSource { ssrc: csrc });
            }
            csrc_record.is_csrc = true;
            csrc_record.validated = true;
            csrc_record.active = true;
        }

        self.recompute_counts();
        result
    }

    fn entry_mut_for_csrc(&mut self, csrc: u32) -> (&mut SourceRecord, bool) {
        self.entry(csrc)
    }

    /// spec.md §4.2 "Statistics exposed per source", packaged into a
    /// wire report block ready for the RTCP builder.
    pub fn report_block_for(&mut self, ssrc: u32, now: Duration) -> Option<ReportBlock> {
        let record = self.sources.get_mut(&ssrc)?;
        if record.is_csrc || record.is_own {
            return None;
        }

        // Expected-in-interval is the span of extended sequence numbers
        // since the last report; received-in-interval is the plain count
        // of packets accepted since then (spec.md §4.2 "Statistics").
        let expected_interval = record.ext_highest_seq.wrapping_sub(record.interval_saved_seq) as i64;
        let received_interval = record.interval_packets as i64;
        let lost_interval = expected_interval - received_interval;
        let fraction_lost = if expected_interval > 0 && lost_interval > 0 {
            ((lost_interval * 256) / expected_interval).clamp(0, 255) as u8
        } else {
            0
        };

        let cumulative_expected = record.ext_highest_seq.wrapping_sub(record.base_seq) as i64 + 1;
        let cumulative_lost = (cumulative_expected - record.packets_received as i64)
            .clamp(-(1 << 23), (1 << 23) - 1) as i32;

        let (lsr, dlsr) = match record.sr_current {
            Some(sr) => {
                let lsr = ((sr.ntp_timestamp >> 16) & 0xFFFF_FFFF) as u32;
                let delta = now.saturating_sub(sr.received_at);
                let dlsr = (delta.as_secs_f64() * 65536.0) as u32;
                (lsr, dlsr)
            }
            None => (0, 0),
        };

        record.interval_packets = 0;
        record.interval_saved_seq = record.ext_highest_seq;
        record.processed_in_rtcp = true;

        Some(ReportBlock {
            ssrc,
            fraction_lost,
            cumulative_lost,
            ext_highest_seq: record.ext_highest_seq,
            jitter: record.jitter_q4 >> 4,
            lsr,
            dlsr,
        })
    }

    /// Records an incoming sender report's summary against its source
    /// (spec.md §3 `sr_current`/`sr_previous`).
    pub fn record_sender_report(&mut self, sr: &SenderReport, addr: SocketAddr, is_local_addr: bool, now: Duration) -> Vec<SourceEvent> {
        let mut events = Vec::new();
        if self.check_collision(sr.ssrc, addr, Channel::Rtcp, is_local_addr, &mut events) {
            return events;
        }

        let (record, is_new) = self.entry(sr.ssrc);
        if is_new {
            events.push(SourceEvent::NewSource { ssrc: sr.ssrc });
        }
        record.last_any_arrival = Some(now);
        record.sr_previous = record.sr_current;
        record.sr_current = Some(SenderReportSummary {
            ntp_timestamp: sr.sender_info.ntp_timestamp,
            rtp_timestamp: sr.sender_info.rtp_timestamp,
            packet_count: sr.sender_info.packet_count,
            octet_count: sr.sender_info.octet_count,
            received_at: now,
        });
        events
    }

    /// Records an RR block addressed to our own SSRC (spec.md §3
    /// `rr_current`/`rr_previous`).
    pub fn record_receiver_report(&mut self, block: &ReportBlock, now: Duration) {
        if self.own_ssrc != Some(block.ssrc) {
            return;
        }
        if let Some(record) = self.own_ssrc.and_then(|ssrc| self.sources.get_mut(&ssrc)) {
            record.rr_previous = record.rr_current;
            record.rr_current = Some(ReceiverReportSummary {
                fraction_lost: block.fraction_lost,
                cumulative_lost: block.cumulative_lost,
                ext_highest_seq: block.ext_highest_seq,
                jitter: block.jitter,
                received_at: now,
            });
        }
    }

    /// Applies a validated CNAME item, which immediately validates the
    /// source per spec.md §4.2 lifecycle ("immediately on first CNAME
    /// receipt").
    pub fn record_cname(&mut self, ssrc: u32, cname: Vec<u8>, events: &mut Vec<SourceEvent>) {
        let (record, is_new) = self.entry(ssrc);
        if is_new {
            events.push(SourceEvent::NewSource { ssrc });
        }
        record.cname = Some(truncate_sdes(cname));
        Self::validate(record, events);
    }

    pub fn record_sdes_item(&mut self, ssrc: u32, set: impl FnOnce(&mut SourceRecord, Vec<u8>), value: Vec<u8>) {
        if let Some(record) = self.sources.get_mut(&ssrc) {
            set(record, truncate_sdes(value));
        }
    }

    /// SDES NOTE item: unlike the other items, NOTE carries a timeout
    /// (spec.md §4.6 / jrtplib's `SetLastNoteTime`) so it stamps
    /// `note_last_update` in addition to the value itself.
    pub fn record_note(&mut self, ssrc: u32, value: Vec<u8>, now: Duration) {
        if let Some(record) = self.sources.get_mut(&ssrc) {
            record.note = Some(truncate_sdes(value));
            record.note_last_update = Some(now);
        }
    }

    /// spec.md §3 "BYE state" / lifecycle "BYE timeout".
    pub fn record_bye(&mut self, ssrc: u32, reason: Option<Vec<u8>>, now: Duration) -> SourceEvent {
        if let Some(record) = self.sources.get_mut(&ssrc) {
            record.bye = ByeState { received: true, at: Some(now) };
            record.bye_reason = reason.clone();
            record.active = false;
        }
        self.recompute_counts();
        SourceEvent::Bye { ssrc, reason }
    }

    /// spec.md §4.5 poll cycle step 2: timeout application driven by the
    /// caller's scaled multiplier durations.
    pub fn sweep_timeouts(
        &mut self,
        now: Duration,
        sender_timeout: Duration,
        member_timeout: Duration,
        bye_timeout: Duration,
        note_timeout: Duration,
    ) -> Vec<SourceEvent> {
        let mut events = Vec::new();
        let mut to_remove = Vec::new();

        for (ssrc, record) in self.sources.iter_mut() {
            if record.is_own {
                continue;
            }

            if record.sender {
                if let Some(last) = record.last_rtp_arrival {
                    if now.saturating_sub(last) >= sender_timeout {
                        record.sender = false;
                    }
                }
            }

            if record.bye.received {
                if let Some(at) = record.bye.at {
                    if now.saturating_sub(at) >= bye_timeout {
                        to_remove.push(*ssrc);
                        continue;
                    }
                }
            } else if let Some(last) = record.last_any_arrival {
                if now.saturating_sub(last) >= member_timeout {
                    to_remove.push(*ssrc);
                    continue;
                }
            }

            if let Some(updated) = record.note_last_update {
                if now.saturating_sub(updated) >= note_timeout {
                    record.note = None;
                }
            }
        }

        for ssrc in to_remove {
            self.sources.remove(&ssrc);
            events.push(SourceEvent::Bye { ssrc, reason: None });
        }

        self.recompute_counts();
        events
    }
}

fn truncate_sdes(mut value: Vec<u8>) -> Vec<u8> {
    value.truncate(MAX_SDES_ITEM_LEN);
    value
}

fn reconstruct_sequence(record: &SourceRecord, sequence: u16) -> u32 {
    if record.packets_received == 0 {
        let base = (record.cycles << 16) | sequence as u32;
        base
    } else {
        extend_sequence(record.ext_highest_seq, sequence)
    }
}

/// RFC 3550 §6.4.1 interarrival jitter update, in Q4 fixed point
/// (spec.md §4.2 step 3-4).
///
/// `timestamp_rate` is the session's `own_timestamp_unit` (RTP clock ticks
/// per second); the arrival-time delta is in seconds and must be scaled
/// into the same RTP-timestamp-tick units as `signed_rtp_diff` before the
/// two are compared.
fn update_jitter(record: &mut SourceRecord, timestamp: u32, arrival: Duration, timestamp_rate: f64) {
    if let (Some(prev_ts), Some(prev_arrival)) = (record.prev_rtp_timestamp, record.prev_arrival) {
        let arrival_units = arrival.as_secs_f64();
        let prev_arrival_units = prev_arrival.as_secs_f64();

        let rtp_diff = timestamp.wrapping_sub(prev_ts);
        let magnitude = rtp_diff.min(rtp_diff.wrapping_neg());
        if magnitude < (1u32 << 28) {
            let signed_rtp_diff = if rtp_diff <= i32::MAX as u32 {
                rtp_diff as i64
            } else {
                rtp_diff as i64 - (1i64 << 32)
            };

            let arrival_diff_ticks = (arrival_units - prev_arrival_units).max(0.0) * timestamp_rate;
            let d = (arrival_diff_ticks - signed_rtp_diff as f64).abs();

            let j = record.jitter_q4 as f64 / 16.0;
            let j = j + (d - j) / 16.0;
            record.jitter_q4 = (j * 16.0).round().max(0.0) as u32;
        }
    }

    record.prev_rtp_timestamp = Some(timestamp);
    record.prev_arrival = Some(arrival);
}

/// spec.md §4.2 step 5: ordered insertion from the tail, dropping
/// duplicates, with the 32-packet probation bound.
fn insert_queued(record: &mut SourceRecord, packet: QueuedPacket, bounded: bool) {
    let pos = record
        .packet_queue
        .iter()
        .rposition(|p| p.ext_seq < packet.ext_seq)
        .map(|i| i + 1)
        .unwrap_or(0);

    if pos < record.packet_queue.len() && record.packet_queue[pos].ext_seq == packet.ext_seq {
        return;
    }
    if pos > 0 && record.packet_queue[pos - 1].ext_seq == packet.ext_seq {
        return;
    }

    record.packet_queue.insert(pos, packet);

    if bounded && record.packet_queue.len() > PROBATION_QUEUE_BOUND {
        let evict = record
            .packet_queue
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| p.ext_seq)
            .map(|(i, _)| i);
        if let Some(i) = evict {
            record.packet_queue.remove(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:6000".parse().unwrap()
    }

    fn rtp(seq: u16, ts: u32, ssrc: u32) -> Vec<u8> {
        use wire::rtp::RtpBuilder;
        RtpBuilder::new(None)
            .build(false, 0, seq, ts, ssrc, &[], None, b"x")
            .unwrap()
            .to_vec()
    }

    #[test]
    fn probation_store_holds_first_packet_then_delivers_both() {
        let mut table = SourceTable::new(ProbationType::ProbationStore, 2, false, 8000.0);

        let bytes = rtp(100, 1600, 0xAA);
        let pkt = RtpPacket::parse(&bytes).unwrap();
        let r1 = table.ingest_rtp(&pkt, addr(), false, Duration::from_secs(0));
        assert!(r1.delivered.is_empty());

        let bytes = rtp(101, 1760, 0xAA);
        let pkt = RtpPacket::parse(&bytes).unwrap();
        let r2 = table.ingest_rtp(&pkt, addr(), false, Duration::from_millis(20));
        assert_eq!(r2.delivered.len(), 2);
        assert!(table.get(0xAA).unwrap().validated);
    }

    #[test]
    fn no_probation_validates_immediately() {
        let mut table = SourceTable::new(ProbationType::NoProbation, 2, false, 8000.0);
        let bytes = rtp(5, 800, 0xBB);
        let pkt = RtpPacket::parse(&bytes).unwrap();
        let r = table.ingest_rtp(&pkt, addr(), false, Duration::from_secs(0));
        assert_eq!(r.delivered.len(), 1);
    }

    #[test]
    fn duplicate_packets_are_dropped_from_queue() {
        let mut record = SourceRecord::new(1);
        let queued = |seq: u32| QueuedPacket { ext_seq: seq, marker: false, payload_type: 0, timestamp: 0, payload: vec![] };
        insert_queued(&mut record, queued(5), false);
        insert_queued(&mut record, queued(5), false);
        assert_eq!(record.packet_queue.len(), 1);
    }

    #[test]
    fn collision_on_second_address_is_reported_and_dropped() {
        let mut table = SourceTable::new(ProbationType::NoProbation, 2, false, 8000.0);
        let first: SocketAddr = "127.0.0.1:7000".parse().unwrap();
        let second: SocketAddr = "127.0.0.1:7001".parse().unwrap();

        let bytes = rtp(1, 0, 0xCC);
        let pkt = RtpPacket::parse(&bytes).unwrap();
        table.ingest_rtp(&pkt, first, false, Duration::from_secs(0));

        let bytes = rtp(2, 160, 0xCC);
        let pkt = RtpPacket::parse(&bytes).unwrap();
        let result = table.ingest_rtp(&pkt, second, false, Duration::from_secs(1));
        assert!(result.delivered.is_empty());
        assert!(matches!(result.events[0], SourceEvent::Collision { .. }));
    }
}
