//! End-to-end tests of the session engine against an in-memory
//! transport pair: RTP probation/ordering, RTCP compound exchange, and
//! SSRC-collision resolution (spec.md §4.5, §8).

mod common;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rtp_session::{RtcpPacket, Session, SessionObserver, SessionParams};

use common::{MockTransport, raw_packet};

#[derive(Default)]
struct Recorded {
    rtp: Vec<(u32, u8, bool, Vec<u8>)>,
    new_sources: Vec<u32>,
    byes: Vec<(u32, Option<Vec<u8>>)>,
    collisions: Vec<(u32, bool)>,
    ssrc_changes: Vec<(u32, u32)>,
    rtcp_compound_count: u32,
}

#[derive(Clone, Default)]
struct RecordingObserver(Arc<Mutex<Recorded>>);

impl SessionObserver for RecordingObserver {
    fn on_new_source(&self, ssrc: u32) {
        self.0.lock().unwrap().new_sources.push(ssrc);
    }

    fn on_rtp_packet(&self, ssrc: u32, payload_type: u8, _timestamp: u32, marker: bool, payload: &[u8]) {
        self.0.lock().unwrap().rtp.push((ssrc, payload_type, marker, payload.to_vec()));
    }

    fn on_rtcp_compound_packet(&self, _from: SocketAddr, _packets: &[RtcpPacket]) {
        self.0.lock().unwrap().rtcp_compound_count += 1;
    }

    fn on_bye(&self, ssrc: u32, reason: Option<&[u8]>) {
        self.0.lock().unwrap().byes.push((ssrc, reason.map(|r| r.to_vec())));
    }

    fn on_ssrc_collision(&self, ssrc: u32, is_own: bool, _addr: SocketAddr) {
        self.0.lock().unwrap().collisions.push((ssrc, is_own));
    }

    fn on_own_ssrc_changed(&self, old_ssrc: u32, new_ssrc: u32) {
        self.0.lock().unwrap().ssrc_changes.push((old_ssrc, new_ssrc));
    }
}

fn test_params() -> SessionParams {
    SessionParams {
        own_timestamp_unit: 8000,
        use_poll_thread: false,
        min_rtcp_interval: Duration::from_millis(15),
        // High enough that the scheduler floors to `min_rtcp_interval`
        // (halved on the first report) instead of the bandwidth-derived
        // interval, keeping the RTCP exchange test fast and deterministic.
        session_bandwidth: 1_000_000.0,
        ..Default::default()
    }
}

fn addrs(a: u16, b: u16) -> (SocketAddr, SocketAddr) {
    (format!("127.0.0.1:{a}").parse().unwrap(), format!("127.0.0.1:{b}").parse().unwrap())
}

#[test]
fn probation_store_orders_and_delivers_rtp() {
    let (addr_a, addr_b) = addrs(16000, 16001);
    let (transport_a, transport_b) = MockTransport::pair(addr_a, addr_b);

    let observer_a = RecordingObserver::default();
    let observer_b = RecordingObserver::default();

    let session_a = Session::create(test_params(), transport_a, observer_a).unwrap();
    let session_b = Session::create(test_params(), transport_b, observer_b.clone()).unwrap();

    session_a.send_packet(b"hello-1", 0, false, 160).unwrap();
    session_b.poll().unwrap();
    assert!(observer_b.0.lock().unwrap().rtp.is_empty(), "first packet should be held during probation");

    session_a.send_packet(b"hello-2", 0, false, 160).unwrap();
    session_b.poll().unwrap();

    let recorded = observer_b.0.lock().unwrap();
    assert_eq!(recorded.rtp.len(), 2, "both probationary packets deliver together once validated");
    assert_eq!(recorded.rtp[0].3, b"hello-1");
    assert_eq!(recorded.rtp[1].3, b"hello-2");
    assert_eq!(recorded.new_sources, vec![session_a.own_ssrc()]);
}

#[test]
fn rtcp_compound_is_exchanged_once_scheduled() {
    let (addr_a, addr_b) = addrs(16010, 16011);
    let (transport_a, transport_b) = MockTransport::pair(addr_a, addr_b);

    let observer_a = RecordingObserver::default();
    let observer_b = RecordingObserver::default();

    let session_a = Session::create(test_params(), transport_a, observer_a).unwrap();
    let session_b = Session::create(test_params(), transport_b, observer_b.clone()).unwrap();

    session_a.send_packet(b"x", 0, false, 160).unwrap();
    session_b.poll().unwrap();

    let mut seen = false;
    for _ in 0..500 {
        session_a.poll().unwrap();
        session_b.poll().unwrap();
        if observer_b.0.lock().unwrap().rtcp_compound_count > 0 {
            seen = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }

    assert!(seen, "expected session B to receive at least one RTCP compound packet");
}

#[test]
fn own_ssrc_collision_triggers_reassignment() {
    let (addr_a, addr_b) = addrs(16020, 16021);
    let (transport_a, _transport_b) = MockTransport::pair(addr_a, addr_b);
    let inbox_a = transport_a.inbox_handle();

    let observer_a = RecordingObserver::default();
    let session_a = Session::create(test_params(), transport_a, observer_a.clone()).unwrap();
    let original_ssrc = session_a.own_ssrc();

    let attacker_one: SocketAddr = "10.0.0.9:5000".parse().unwrap();
    let attacker_two: SocketAddr = "10.0.0.9:5001".parse().unwrap();

    let spoofed_one = wire::rtp::RtpBuilder::new(None)
        .build(false, 0, 1, 0, original_ssrc, &[], None, b"spoof-1")
        .unwrap()
        .to_vec();
    let spoofed_two = wire::rtp::RtpBuilder::new(None)
        .build(false, 0, 2, 160, original_ssrc, &[], None, b"spoof-2")
        .unwrap()
        .to_vec();

    inbox_a.lock().unwrap().push_back(raw_packet(spoofed_one, attacker_one, true));
    inbox_a.lock().unwrap().push_back(raw_packet(spoofed_two, attacker_two, true));

    session_a.poll().unwrap();

    {
        let recorded = observer_a.0.lock().unwrap();
        assert!(recorded.collisions.iter().any(|&(ssrc, is_own)| ssrc == original_ssrc && is_own));
        assert_eq!(recorded.ssrc_changes.len(), 1);
        assert_eq!(recorded.ssrc_changes[0].0, original_ssrc);
    }

    assert_ne!(session_a.own_ssrc(), original_ssrc);
}
