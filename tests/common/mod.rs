//! In-memory `Transport` pair used by the root crate's integration
//! tests: two endpoints sharing plain queues instead of real sockets.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rtp_session::{RawPacket, Result, Transport};

type Inbox = Arc<Mutex<VecDeque<RawPacket>>>;

pub struct MockTransport {
    local_addr: SocketAddr,
    start: Instant,
    inbox: Inbox,
    peer_inbox: Inbox,
}

impl MockTransport {
    /// Builds a connected pair sharing one time reference, so
    /// `received_at` values are comparable across both ends.
    pub fn pair(addr_a: SocketAddr, addr_b: SocketAddr) -> (Self, Self) {
        let inbox_a: Inbox = Arc::new(Mutex::new(VecDeque::new()));
        let inbox_b: Inbox = Arc::new(Mutex::new(VecDeque::new()));
        let start = Instant::now();
        (
            MockTransport { local_addr: addr_a, start, inbox: inbox_a.clone(), peer_inbox: inbox_b.clone() },
            MockTransport { local_addr: addr_b, start, inbox: inbox_b, peer_inbox: inbox_a },
        )
    }

    /// A handle onto this end's inbox, kept by the test *before* the
    /// transport is moved into a `Session`, so a third party's traffic
    /// (e.g. an SSRC-colliding sender) can be injected later.
    pub fn inbox_handle(&self) -> Arc<Mutex<VecDeque<RawPacket>>> {
        self.inbox.clone()
    }

    fn send(&self, bytes: &[u8], is_rtp: bool) -> Result<()> {
        self.peer_inbox.lock().unwrap().push_back(RawPacket {
            bytes: bytes.to_vec(),
            sender: self.local_addr,
            received_at: self.start.elapsed(),
            is_rtp,
        });
        Ok(())
    }
}

/// Builds a raw packet as if it arrived from `sender`, for injecting
/// third-party or spoofed traffic directly into an inbox handle.
pub fn raw_packet(bytes: Vec<u8>, sender: SocketAddr, is_rtp: bool) -> RawPacket {
    RawPacket { bytes, sender, received_at: Duration::from_secs(0), is_rtp }
}

impl Transport for MockTransport {
    fn init(&mut self, _thread_safe: bool) -> Result<()> {
        Ok(())
    }

    fn create(&mut self, _max_packet_size: usize) -> Result<()> {
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        Ok(())
    }

    fn send_rtp_data(&mut self, bytes: &[u8]) -> Result<()> {
        self.send(bytes, true)
    }

    fn send_rtcp_data(&mut self, bytes: &[u8]) -> Result<()> {
        self.send(bytes, false)
    }

    fn poll(&mut self) -> Result<()> {
        Ok(())
    }

    fn wait_for_incoming_data(&mut self, delay: Duration) -> Result<bool> {
        let deadline = Instant::now() + delay;
        loop {
            if !self.inbox.lock().unwrap().is_empty() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn abort_wait(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_packet(&mut self) -> Option<RawPacket> {
        self.inbox.lock().unwrap().pop_front()
    }

    fn comes_from_this_transmitter(&self, addr: SocketAddr) -> bool {
        addr == self.local_addr
    }
}
