//! Assigns SSRC, sequence number and timestamp to outgoing RTP packets
//! (spec.md §2 "Packet builder").

use rand::Rng;
use wire::rtp::RtpBuilder;

/// Local-send-side counters, generalized from a stateless codec call
/// into a stateful assignment of the fields RFC 3550 requires a sender
/// to maintain across its own packet stream.
pub struct PacketBuilder {
    builder: RtpBuilder,
    ssrc: u32,
    sequence: u16,
    base_timestamp: u32,
    timestamp: u32,
    pub packets_sent: u64,
    pub octets_sent: u64,
}

impl PacketBuilder {
    pub fn new(max_packet_size: Option<usize>, ssrc: u32, rng: &mut impl Rng) -> Self {
        PacketBuilder {
            builder: RtpBuilder::new(max_packet_size),
            ssrc,
            sequence: rng.random(),
            base_timestamp: rng.random(),
            timestamp: 0,
            packets_sent: 0,
            octets_sent: 0,
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Reassigns the SSRC (after collision resolution) and resets the
    /// send counters, per spec.md §4.5 SSRC-collision resolution step 2.
    pub fn reassign_ssrc(&mut self, ssrc: u32, rng: &mut impl Rng) {
        self.ssrc = ssrc;
        self.sequence = rng.random();
        self.base_timestamp = rng.random();
        self.timestamp = 0;
        self.packets_sent = 0;
        self.octets_sent = 0;
    }

    pub fn last_timestamp(&self) -> u32 {
        self.base_timestamp.wrapping_add(self.timestamp)
    }

    pub fn build(
        &mut self,
        marker: bool,
        payload_type: u8,
        ts_increment: u32,
        payload: &[u8],
    ) -> wire::Result<bytes::BytesMut> {
        self.timestamp = self.timestamp.wrapping_add(ts_increment);
        let timestamp = self.base_timestamp.wrapping_add(self.timestamp);
        let sequence = self.sequence;

        let bytes = self.builder.build(
            marker,
            payload_type,
            sequence,
            timestamp,
            self.ssrc,
            &[],
            None,
            payload,
        )?;

        self.sequence = self.sequence.wrapping_add(1);
        self.packets_sent += 1;
        self.octets_sent += payload.len() as u64;

        Ok(bytes)
    }
}
