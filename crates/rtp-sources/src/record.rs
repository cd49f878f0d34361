//! Per-SSRC source record (spec.md §3 "Source record").

use std::net::SocketAddr;
use std::time::Duration;

use wire::rtp::RtpPacket;

pub const PROBATION_QUEUE_BOUND: usize = 32;
pub const MAX_SDES_ITEM_LEN: usize = 255;

/// Probation discipline applied to RTP packets from a not-yet-validated
/// SSRC (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub enum ProbationType {
    NoProbation,
    ProbationStore,
    ProbationDiscard,
}

impl Default for ProbationType {
    fn default() -> Self {
        ProbationType::ProbationStore
    }
}

/// Running probation state for a not-yet-validated source.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbationState {
    /// Consecutive in-sequence packets seen so far.
    pub consecutive: u32,
    /// Low 16 bits of the most recently seen sequence, used as the
    /// reference for the next in-sequence check.
    pub last_seq: Option<u16>,
}

/// An RTP packet held in a source's queue, owned (not borrowed) because
/// it may outlive the dispatch that produced it (spec.md §9).
#[derive(Debug, Clone)]
pub struct QueuedPacket {
    pub ext_seq: u32,
    pub marker: bool,
    pub payload_type: u8,
    pub timestamp: u32,
    pub payload: Vec<u8>,
}

impl QueuedPacket {
    pub fn from_parsed(ext_seq: u32, packet: &RtpPacket<'_>) -> Self {
        QueuedPacket {
            ext_seq,
            marker: packet.marker,
            payload_type: packet.payload_type,
            timestamp: packet.timestamp,
            payload: packet.payload.to_vec(),
        }
    }
}

/// Summary of a received sender report, retained two deep per source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SenderReportSummary {
    pub ntp_timestamp: u64,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    pub received_at: Duration,
}

/// Summary of a receiver-report block received *about our own SSRC*.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiverReportSummary {
    pub fraction_lost: u8,
    pub cumulative_lost: i32,
    pub ext_highest_seq: u32,
    pub jitter: u32,
    pub received_at: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ByeState {
    pub received: bool,
    pub at: Option<Duration>,
}

/// One observed SSRC's full state (spec.md §3).
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub ssrc: u32,
    pub is_own: bool,
    pub is_csrc: bool,
    pub validated: bool,
    pub active: bool,
    pub sender: bool,

    pub probation_state: ProbationState,

    pub base_seq: u32,
    pub ext_highest_seq: u32,
    pub cycles: u32,
    pub packets_received: u64,
    /// Q4 fixed-point interarrival jitter estimate.
    pub jitter_q4: u32,
    pub last_rtp_arrival: Option<Duration>,
    pub last_any_arrival: Option<Duration>,

    pub prev_rtp_timestamp: Option<u32>,
    pub prev_arrival: Option<Duration>,

    pub interval_packets: u64,
    pub interval_saved_seq: u32,

    pub sr_current: Option<SenderReportSummary>,
    pub sr_previous: Option<SenderReportSummary>,
    pub rr_current: Option<ReceiverReportSummary>,
    pub rr_previous: Option<ReceiverReportSummary>,

    pub cname: Option<Vec<u8>>,
    pub name: Option<Vec<u8>>,
    pub email: Option<Vec<u8>>,
    pub phone: Option<Vec<u8>>,
    pub location: Option<Vec<u8>>,
    pub tool: Option<Vec<u8>>,
    pub note: Option<Vec<u8>>,
    pub note_last_update: Option<Duration>,

    pub rtp_addr: Option<SocketAddr>,
    pub rtcp_addr: Option<SocketAddr>,

    pub bye: ByeState,
    pub bye_reason: Option<Vec<u8>>,

    pub packet_queue: Vec<QueuedPacket>,

    /// Transient flag the RTCP builder uses to resume iteration across
    /// multiple compound packets (spec.md §4.4).
    pub processed_in_rtcp: bool,
}

impl SourceRecord {
    pub fn new(ssrc: u32) -> Self {
        SourceRecord {
            ssrc,
            is_own: false,
            is_csrc: false,
            validated: false,
            active: false,
            sender: false,
            probation_state: ProbationState::default(),
            base_seq: 0,
            ext_highest_seq: 0,
            cycles: 0,
            packets_received: 0,
            jitter_q4: 0,
            last_rtp_arrival: None,
            last_any_arrival: None,
            prev_rtp_timestamp: None,
            prev_arrival: None,
            interval_packets: 0,
            interval_saved_seq: 0,
            sr_current: None,
            sr_previous: None,
            rr_current: None,
            rr_previous: None,
            cname: None,
            name: None,
            email: None,
            phone: None,
            location: None,
            tool: None,
            note: None,
            note_last_update: None,
            rtp_addr: None,
            rtcp_addr: None,
            bye: ByeState::default(),
            bye_reason: None,
            packet_queue: Vec::new(),
            processed_in_rtcp: false,
        }
    }

    /// Construct the local participant's own, already-validated record.
    pub fn new_own(ssrc: u32) -> Self {
        let mut record = SourceRecord::new(ssrc);
        record.is_own = true;
        record.validated = true;
        record.active = true;
        record
    }

    /// Dequeue the single lowest-sequence packet, if any, for delivery
    /// to the application. The queue is kept ascending by
    /// `SourceTable::insert_queued`, so this is the front element.
    pub fn pop_front(&mut self) -> Option<QueuedPacket> {
        if self.packet_queue.is_empty() {
            None
        } else {
            Some(self.packet_queue.remove(0))
        }
    }
}
