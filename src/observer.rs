//! Application callback trait (spec.md §5 "Ordering guarantees": callbacks
//! are invoked serially from whichever thread is processing the packet,
//! with the session lock held — no re-entrancy).
//!
//! Unlike the teacher's `turn_rs::Observer`, these callbacks are plain
//! synchronous methods rather than `#[async_trait]`: spec.md §1 states the
//! core "does not assume a specific I/O model for the application", and
//! the poll cycle itself (§4.5, §5) is synchronous throughout, so an
//! async callback would force an executor choice the core doesn't make.

use std::net::SocketAddr;

use wire::rtcp::RtcpPacket;

/// Default no-op implementations mirror the teacher's `Observer`
/// pattern: applications only override the callbacks they care about.
pub trait SessionObserver: Send + Sync {
    /// A new SSRC (own, foreign, or CSRC-only) was first observed.
    #[allow(unused_variables)]
    fn on_new_source(&self, ssrc: u32) {}

    /// One application-visible RTP payload is ready for delivery, in
    /// strictly ascending extended-sequence order for its source.
    #[allow(unused_variables)]
    fn on_rtp_packet(&self, ssrc: u32, payload_type: u8, timestamp: u32, marker: bool, payload: &[u8]) {}

    /// A full compound RTCP packet was received and processed.
    #[allow(unused_variables)]
    fn on_rtcp_compound_packet(&self, from: SocketAddr, packets: &[RtcpPacket]) {}

    /// `ssrc` sent BYE, carrying an optional reason.
    #[allow(unused_variables)]
    fn on_bye(&self, ssrc: u32, reason: Option<&[u8]>) {}

    /// An SSRC collision was detected; `is_own` is true if it landed on
    /// the local participant's own SSRC (triggering reassignment).
    #[allow(unused_variables)]
    fn on_ssrc_collision(&self, ssrc: u32, is_own: bool, addr: SocketAddr) {}

    /// The local SSRC changed as a result of collision resolution.
    #[allow(unused_variables)]
    fn on_own_ssrc_changed(&self, old_ssrc: u32, new_ssrc: u32) {}

    /// The background poll thread exited after a fatal error; invoked at
    /// most once (spec.md §7 "Propagation").
    #[allow(unused_variables)]
    fn on_poll_thread_error(&self, error: &crate::error::Error) {}
}

/// An observer that does nothing, for sessions that poll their own
/// packets out explicitly rather than reacting to callbacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}
