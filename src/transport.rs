//! Transport interface the session engine consumes (spec.md §6).
//!
//! Concrete transports (UDP/IPv4, UDP/IPv6, TCP, user-defined) are
//! external collaborators per spec.md §1 and are not implemented here;
//! this module only defines the contract and the in-memory mock used by
//! the root crate's own integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Whether a transport only accepts/ignores a configured address list,
/// or accepts everything (spec.md §6 "Session parameter surface").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub enum ReceiveMode {
    AcceptAll,
    AcceptSome,
    IgnoreSome,
}

impl Default for ReceiveMode {
    fn default() -> Self {
        ReceiveMode::AcceptAll
    }
}

/// One packet handed back by the transport, carrying everything the
/// session needs to dispatch it (spec.md §6 "GetNextPacket").
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub bytes: Vec<u8>,
    pub sender: SocketAddr,
    pub received_at: Duration,
    /// Set by the transport when the channel is unambiguous, or derived
    /// heuristically from the first byte otherwise (RTCP payload types
    /// 200-204 imply RTCP).
    pub is_rtp: bool,
}

/// Contract consumed by the core (spec.md §6 "Transport interface").
///
/// Every method that isn't meaningful for a given transport (e.g.
/// multicast on a transport that has none) should return
/// `Error::OperationFailed` rather than panic; the default
/// implementations below do exactly that so a minimal transport only
/// needs to implement the data-path methods.
pub trait Transport: Send {
    fn init(&mut self, thread_safe: bool) -> Result<()>;
    fn create(&mut self, max_packet_size: usize) -> Result<()>;
    fn destroy(&mut self) -> Result<()>;

    fn send_rtp_data(&mut self, bytes: &[u8]) -> Result<()>;
    fn send_rtcp_data(&mut self, bytes: &[u8]) -> Result<()>;

    /// Drains sockets into an internal queue; `next_packet` then pops
    /// from that queue.
    fn poll(&mut self) -> Result<()>;

    /// Blocks up to `delay` for new data, interruptible via `abort_wait`.
    fn wait_for_incoming_data(&mut self, delay: Duration) -> Result<bool>;
    fn abort_wait(&mut self) -> Result<()>;

    fn next_packet(&mut self) -> Option<RawPacket>;

    fn add_destination(&mut self, _addr: SocketAddr) -> Result<()> {
        Err(Error::OperationFailed("add_destination not supported".into()))
    }
    fn delete_destination(&mut self, _addr: SocketAddr) -> Result<()> {
        Err(Error::OperationFailed("delete_destination not supported".into()))
    }
    fn clear_destinations(&mut self) -> Result<()> {
        Err(Error::OperationFailed("clear_destinations not supported".into()))
    }

    fn join_multicast_group(&mut self, _addr: SocketAddr) -> Result<()> {
        Err(Error::OperationFailed("multicast not supported".into()))
    }
    fn leave_multicast_group(&mut self, _addr: SocketAddr) -> Result<()> {
        Err(Error::OperationFailed("multicast not supported".into()))
    }
    fn leave_all_multicast_groups(&mut self) -> Result<()> {
        Err(Error::OperationFailed("multicast not supported".into()))
    }

    fn set_receive_mode(&mut self, _mode: ReceiveMode) -> Result<()> {
        Err(Error::OperationFailed("receive mode filtering not supported".into()))
    }
    fn add_to_accept_list(&mut self, _addr: SocketAddr) -> Result<()> {
        Err(Error::OperationFailed("accept list not supported".into()))
    }
    fn add_to_ignore_list(&mut self, _addr: SocketAddr) -> Result<()> {
        Err(Error::OperationFailed("ignore list not supported".into()))
    }
    fn delete_from_accept_list(&mut self, _addr: SocketAddr) -> Result<()> {
        Err(Error::OperationFailed("accept list not supported".into()))
    }
    fn delete_from_ignore_list(&mut self, _addr: SocketAddr) -> Result<()> {
        Err(Error::OperationFailed("ignore list not supported".into()))
    }
    fn clear_accept_list(&mut self) -> Result<()> {
        Err(Error::OperationFailed("accept list not supported".into()))
    }
    fn clear_ignore_list(&mut self) -> Result<()> {
        Err(Error::OperationFailed("ignore list not supported".into()))
    }

    /// Used to build the default CNAME when none is configured.
    fn local_host_name(&self) -> Option<String> {
        None
    }

    /// Filters loopback: true if `addr` is an address this transport
    /// itself sends from.
    fn comes_from_this_transmitter(&self, _addr: SocketAddr) -> bool {
        false
    }

    /// Bytes the transport adds per packet (e.g. UDP/IP headers), used
    /// to parameterize the RTCP scheduler's bandwidth-share math.
    fn header_overhead(&self) -> usize {
        28
    }
}
