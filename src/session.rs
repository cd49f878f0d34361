//! Session engine (spec.md §4.5): the central orchestrator tying the
//! wire codec, source table, scheduler, collision list, and RTCP builder
//! to a caller-supplied transport.
//!
//! Follows the teacher's `Arc<Self>` + background-thread idiom
//! (`service::session::SessionManager`): the engine is always reached
//! through an `Arc`, and an optional poll thread holds only a `Weak`
//! back-reference so it exits cleanly once every `Arc` is dropped.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;

use sources::{CollisionList, PacketBuilder, RtcpScheduler, SchedulerParams, SourceEvent, SourceTable};
use wire::rtcp::parse_compound;
use wire::rtp::RtpPacket;

use crate::builder::{LocalSdes, RtcpBuilder, SdesIntervals};
use crate::clock::{Clock, Rng_};
use crate::config::SessionParams;
use crate::error::Result;
use crate::observer::SessionObserver;
use crate::transport::{RawPacket, ReceiveMode, Transport};

/// `sources_mtx`: the source table and collision list, read during
/// dispatch and during timeout sweeps.
struct SourcesState {
    table: SourceTable,
    collisions: CollisionList,
}

/// `builder_mtx`: everything needed to produce outgoing RTP/RTCP bytes.
struct BuilderState {
    packets: PacketBuilder,
    rtcp: RtcpBuilder,
    rng: Rng_,
}

fn timeouts(params: &SessionParams, interval: Duration) -> (Duration, Duration, Duration, Duration) {
    let scale = |m: u32| interval.mul_f64(m as f64);
    (
        scale(params.sender_timeout_multiplier),
        scale(params.source_timeout_multiplier),
        scale(params.bye_timeout_multiplier),
        scale(params.note_timeout_multiplier),
    )
}

fn default_cname(transport: &dyn Transport, params: &SessionParams) -> Vec<u8> {
    if let Some(cname) = &params.cname {
        return cname.clone().into_bytes();
    }
    transport
        .local_host_name()
        .unwrap_or_else(|| "anonymous".to_string())
        .into_bytes()
}

/// Coordinates the full session lifecycle. `O` is the application's
/// callback sink, `Tr` the transport it sends and receives through.
pub struct Session<O: SessionObserver, Tr: Transport> {
    params: SessionParams,
    clock: Clock,
    observer: O,
    transport: Mutex<Tr>,

    sources_mtx: Mutex<SourcesState>,
    builder_mtx: Mutex<BuilderState>,
    sched_mtx: Mutex<RtcpScheduler>,
    packsent_mtx: Mutex<bool>,
    wait_mtx: Mutex<()>,

    shutting_down: AtomicBool,
    poll_thread: Mutex<Option<JoinHandle<()>>>,
}

impl<O, Tr> Session<O, Tr>
where
    O: SessionObserver + 'static,
    Tr: Transport + 'static,
{
    /// spec.md §4.5 "Create": initializes every subcomponent, assigns the
    /// own SSRC, and optionally starts the internal poll thread.
    pub fn create(params: SessionParams, mut transport: Tr, observer: O) -> Result<Arc<Self>> {
        transport.init(params.need_thread_safety)?;
        transport.create(params.max_packet_size)?;

        let clock = Clock::new();
        let mut rng = Rng_::new();

        let own_ssrc = if params.use_predefined_ssrc {
            params.predefined_ssrc
        } else {
            ((rng.next_u16() as u32) << 16) | rng.next_u16() as u32
        };

        let mut table = SourceTable::new(
            params.probation_type,
            2,
            params.accept_own_packets,
            params.own_timestamp_unit as f64,
        );
        table.create_own_source(own_ssrc);

        let cname = default_cname(&transport, &params);
        let packets = PacketBuilder::new(Some(params.max_packet_size), own_ssrc, &mut rng);
        let rtcp = RtcpBuilder::new(
            LocalSdes { cname, ..Default::default() },
            SdesIntervals::default(),
        );

        let scheduler_params = SchedulerParams {
            session_bandwidth: params.session_bandwidth,
            control_traffic_fraction: params.control_traffic_fraction,
            sender_control_bandwidth_fraction: params.sender_control_bandwidth_fraction,
            min_rtcp_interval: params.min_rtcp_interval,
            use_half_at_startup: params.use_half_at_startup,
            immediate_bye: params.immediate_bye,
            header_overhead: transport.header_overhead(),
        };

        transport.set_receive_mode(params.receive_mode).ok();

        let start_time = clock.now();
        let use_poll_thread = params.use_poll_thread;
        let session = Arc::new(Session {
            params,
            clock,
            observer,
            transport: Mutex::new(transport),
            sources_mtx: Mutex::new(SourcesState { table, collisions: CollisionList::new() }),
            builder_mtx: Mutex::new(BuilderState { packets, rtcp, rng }),
            sched_mtx: Mutex::new(RtcpScheduler::new(scheduler_params, start_time)),
            packsent_mtx: Mutex::new(false),
            wait_mtx: Mutex::new(()),
            shutting_down: AtomicBool::new(false),
            poll_thread: Mutex::new(None),
        });

        if use_poll_thread {
            let weak = Arc::downgrade(&session);
            let handle = thread::spawn(move || {
                while let Some(session) = weak.upgrade() {
                    if session.shutting_down.load(Ordering::Acquire) {
                        break;
                    }
                    if let Err(err) = session.wait_for_incoming_data(Duration::from_millis(200)) {
                        warn!("poll thread exiting after fatal error: {err}");
                        session.observer.on_poll_thread_error(&err);
                        break;
                    }
                }
            });
            *session.poll_thread.lock() = Some(handle);
        }

        Ok(session)
    }

    pub fn own_ssrc(&self) -> u32 {
        self.sources_mtx.lock().table.own_ssrc().expect("own source always present")
    }

    /// spec.md §4.5 "SendPacket": frames and ships one RTP payload.
    pub fn send_packet(
        &self,
        payload: &[u8],
        payload_type: u8,
        marker: bool,
        ts_increment: u32,
    ) -> Result<()> {
        let bytes = {
            let mut builder = self.builder_mtx.lock();
            builder.packets.build(marker, payload_type, ts_increment, payload)?
        };

        self.transport.lock().send_rtp_data(&bytes)?;
        *self.packsent_mtx.lock() = true;
        Ok(())
    }

    pub fn add_destination(&self, addr: SocketAddr) -> Result<()> {
        self.transport.lock().add_destination(addr)
    }
    pub fn delete_destination(&self, addr: SocketAddr) -> Result<()> {
        self.transport.lock().delete_destination(addr)
    }
    pub fn clear_destinations(&self) -> Result<()> {
        self.transport.lock().clear_destinations()
    }
    pub fn join_multicast_group(&self, addr: SocketAddr) -> Result<()> {
        self.transport.lock().join_multicast_group(addr)
    }
    pub fn leave_multicast_group(&self, addr: SocketAddr) -> Result<()> {
        self.transport.lock().leave_multicast_group(addr)
    }
    pub fn leave_all_multicast_groups(&self) -> Result<()> {
        self.transport.lock().leave_all_multicast_groups()
    }

    pub fn set_receive_mode(&self, mode: ReceiveMode) -> Result<()> {
        self.transport.lock().set_receive_mode(mode)
    }
    pub fn add_to_accept_list(&self, addr: SocketAddr) -> Result<()> {
        self.transport.lock().add_to_accept_list(addr)
    }
    pub fn add_to_ignore_list(&self, addr: SocketAddr) -> Result<()> {
        self.transport.lock().add_to_ignore_list(addr)
    }
    pub fn delete_from_accept_list(&self, addr: SocketAddr) -> Result<()> {
        self.transport.lock().delete_from_accept_list(addr)
    }
    pub fn delete_from_ignore_list(&self, addr: SocketAddr) -> Result<()> {
        self.transport.lock().delete_from_ignore_list(addr)
    }
    pub fn clear_accept_list(&self) -> Result<()> {
        self.transport.lock().clear_accept_list()
    }
    pub fn clear_ignore_list(&self) -> Result<()> {
        self.transport.lock().clear_ignore_list()
    }

    /// spec.md §4.5 "Poll cycle": drains ready packets, times sources
    /// out, and sends RTCP when the scheduler says it's time.
    pub fn poll(&self) -> Result<()> {
        self.transport.lock().poll()?;
        self.drain_packets()?;
        self.sweep_and_maybe_report()
    }

    pub fn wait_for_incoming_data(&self, delay: Duration) -> Result<()> {
        let _guard = self.wait_mtx.lock();
        let had_data = self.transport.lock().wait_for_incoming_data(delay)?;
        if had_data {
            self.drain_packets()?;
        }
        self.sweep_and_maybe_report()
    }

    pub fn abort_wait(&self) -> Result<()> {
        self.transport.lock().abort_wait()
    }

    fn drain_packets(&self) -> Result<()> {
        loop {
            let packet = self.transport.lock().next_packet();
            let Some(raw) = packet else { break };
            self.dispatch(raw);
        }
        Ok(())
    }

    fn dispatch(&self, raw: RawPacket) {
        let is_local = self.transport.lock().comes_from_this_transmitter(raw.sender);

        if raw.is_rtp {
            self.dispatch_rtp(&raw.bytes, raw.sender, is_local, raw.received_at);
        } else {
            self.dispatch_rtcp(&raw.bytes, raw.sender, is_local, raw.received_at);
        }
    }

    fn dispatch_rtp(&self, bytes: &[u8], from: SocketAddr, is_local: bool, received_at: Duration) {
        let packet = match RtpPacket::parse(bytes) {
            Ok(p) => p,
            Err(err) => {
                warn!("dropping malformed RTP packet from {from}: {err}");
                return;
            }
        };

        let (events, own_collision) = {
            let mut sources = self.sources_mtx.lock();
            let result = sources.table.ingest_rtp(&packet, from, is_local, received_at);
            for queued in &result.delivered {
                self.observer.on_rtp_packet(
                    packet.ssrc,
                    queued.payload_type,
                    queued.timestamp,
                    queued.marker,
                    &queued.payload,
                );
            }
            (result.events, result.own_collision)
        };

        self.raise_events(events);
        if own_collision {
            self.resolve_own_collision(from);
        }
    }

    fn dispatch_rtcp(&self, bytes: &[u8], from: SocketAddr, is_local: bool, received_at: Duration) {
        let packets = match parse_compound(bytes) {
            Ok(p) => p,
            Err(err) => {
                warn!("dropping malformed RTCP compound packet from {from}: {err}");
                return;
            }
        };

        self.sched_mtx.lock().on_rtcp_received(bytes.len());

        let mut events = Vec::new();
        let mut own_collision = false;
        {
            let mut sources = self.sources_mtx.lock();
            for packet in &packets {
                match packet {
                    wire::rtcp::RtcpPacket::Sr(sr) => {
                        events.extend(sources.table.record_sender_report(sr, from, is_local, received_at));
                        for block in &sr.reports {
                            sources.table.record_receiver_report(block, received_at);
                        }
                    }
                    wire::rtcp::RtcpPacket::Rr(rr) => {
                        for block in &rr.reports {
                            sources.table.record_receiver_report(block, received_at);
                        }
                    }
                    wire::rtcp::RtcpPacket::Sdes(sdes) => {
                        for chunk in &sdes.chunks {
                            for item in &chunk.items {
                                apply_sdes_item(&mut sources.table, chunk.ssrc, item, &mut events, received_at);
                            }
                        }
                    }
                    wire::rtcp::RtcpPacket::Bye(bye) => {
                        for &ssrc in &bye.ssrcs {
                            events.push(sources.table.record_bye(ssrc, bye.reason.clone(), received_at));
                        }
                    }
                    wire::rtcp::RtcpPacket::App(_) | wire::rtcp::RtcpPacket::Unknown { .. } => {}
                }
            }
            own_collision = events.iter().any(|e| matches!(e, SourceEvent::Collision { is_own: true, .. }));
        }

        self.observer.on_rtcp_compound_packet(from, &packets);
        self.raise_events(events);
        if own_collision {
            self.resolve_own_collision(from);
        }
    }

    fn raise_events(&self, events: Vec<SourceEvent>) {
        for event in events {
            match event {
                SourceEvent::NewSource { ssrc } => {
                    debug!("new source {ssrc:08x}");
                    self.observer.on_new_source(ssrc);
                }
                SourceEvent::Validated { .. } => {}
                SourceEvent::Collision { ssrc, is_own, addr } => {
                    debug!("SSRC collision on {ssrc:08x} from {addr} (own={is_own})");
                    self.observer.on_ssrc_collision(ssrc, is_own, addr);
                }
                SourceEvent::Bye { ssrc, reason } => {
                    debug!("BYE from {ssrc:08x}");
                    self.observer.on_bye(ssrc, reason.as_deref());
                }
            }
        }
    }

    /// spec.md §4.5 "SSRC-collision resolution".
    fn resolve_own_collision(&self, addr: SocketAddr) {
        debug!("own SSRC collided via {addr}, resolving");
        let has_sent = *self.packsent_mtx.lock();
        if has_sent {
            if let Ok(bye) = self.build_bye(b"ssrc collision") {
                let _ = self.transport.lock().send_rtcp_data(&bye);
            }
        }

        let old_ssrc = self.own_ssrc();
        let new_ssrc = {
            let mut sources = self.sources_mtx.lock();
            let mut builder = self.builder_mtx.lock();

            let mut candidate = ((builder.rng.next_u16() as u32) << 16) | builder.rng.next_u16() as u32;
            while sources.table.get(candidate).is_some() {
                candidate = ((builder.rng.next_u16() as u32) << 16) | builder.rng.next_u16() as u32;
            }
            builder.packets.reassign_ssrc(candidate, &mut builder.rng);

            sources.table.remove_own_source();
            sources.table.create_own_source(candidate);
            candidate
        };

        *self.packsent_mtx.lock() = false;
        self.observer.on_own_ssrc_changed(old_ssrc, new_ssrc);
    }

    fn sweep_and_maybe_report(&self) -> Result<()> {
        let now = self.clock.now();

        let (n_members, n_senders) = {
            let mut sources = self.sources_mtx.lock();
            let prev_total = sources.table.total_count;
            let interval = self.sched_mtx.lock().deterministic_interval(
                sources.table.total_count.max(1),
                sources.table.sender_count,
            );
            let (sender_to, member_to, bye_to, note_to) = timeouts(&self.params, interval);
            let events = sources.table.sweep_timeouts(now, sender_to, member_to, bye_to, note_to);
            sources.collisions.timeout(now, member_to);
            self.raise_events(events);

            let new_total = sources.table.total_count;
            if new_total < prev_total {
                // spec.md §4.3 "Reverse reconsideration": a member timed out
                // or BYE'd out of the table, so pull the schedule forward.
                self.sched_mtx.lock().member_left(now, new_total.max(1));
            }

            (new_total.max(1), sources.table.sender_count)
        };

        let is_time = {
            let mut builder = self.builder_mtx.lock();
            let mut sched = self.sched_mtx.lock();
            sched.is_time(now, n_members, n_senders, &mut builder.rng)
        };

        if is_time {
            self.build_and_send_rtcp()?;
        }

        Ok(())
    }

    fn build_and_send_rtcp(&self) -> Result<()> {
        let is_sender = *self.packsent_mtx.lock();
        let compound = {
            let mut sources = self.sources_mtx.lock();
            let mut builder = self.builder_mtx.lock();
            builder.rtcp.build_next(&mut sources.table, &builder.packets, &self.clock, is_sender, Some(self.params.max_packet_size), None)?
        };

        self.transport.lock().send_rtcp_data(&compound)?;
        self.sched_mtx.lock().on_rtcp_sent(compound.len());
        Ok(())
    }

    fn build_bye(&self, reason: &[u8]) -> Result<bytes::BytesMut> {
        let is_sender = *self.packsent_mtx.lock();
        let mut sources = self.sources_mtx.lock();
        let mut builder = self.builder_mtx.lock();
        builder.rtcp.build_next(&mut sources.table, &builder.packets, &self.clock, is_sender, None, Some(reason))
    }

    /// spec.md §4.5 "Destroy": tears down immediately, with no BYE.
    pub fn destroy(&self) -> Result<()> {
        let _guard = self.wait_mtx.lock();
        self.shutting_down.store(true, Ordering::Release);
        self.abort_wait()?;
        self.transport.lock().destroy()
    }

    /// spec.md §4.5 "BYEDestroy": sends a BYE compound before tearing
    /// down, waiting up to `max_wait` for the scheduler to release it.
    pub fn bye_destroy(&self, max_wait: Duration, reason: &[u8]) -> Result<()> {
        let _guard = self.wait_mtx.lock();
        self.shutting_down.store(true, Ordering::Release);

        let n_members = self.sources_mtx.lock().table.total_count.max(1);
        {
            let mut builder = self.builder_mtx.lock();
            let mut sched = self.sched_mtx.lock();
            sched.schedule_bye(self.clock.now(), n_members, &mut builder.rng);
        }

        let deadline = self.clock.now() + max_wait;
        loop {
            if self.sched_mtx.lock().bye_ready(self.clock.now()) {
                if let Ok(bye) = self.build_bye(reason) {
                    let _ = self.transport.lock().send_rtcp_data(&bye);
                    self.sched_mtx.lock().on_bye_sent(bye.len());
                }
                break;
            }
            if self.clock.now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        self.abort_wait()?;
        self.transport.lock().destroy()
    }
}

fn apply_sdes_item(
    table: &mut SourceTable,
    ssrc: u32,
    item: &wire::rtcp::SdesItem,
    events: &mut Vec<SourceEvent>,
    received_at: Duration,
) {
    use wire::rtcp::SdesItem;
    match item {
        SdesItem::Cname(v) => table.record_cname(ssrc, v.clone(), events),
        SdesItem::Name(v) => table.record_sdes_item(ssrc, |r, v| r.name = Some(v), v.clone()),
        SdesItem::Email(v) => table.record_sdes_item(ssrc, |r, v| r.email = Some(v), v.clone()),
        SdesItem::Phone(v) => table.record_sdes_item(ssrc, |r, v| r.phone = Some(v), v.clone()),
        SdesItem::Loc(v) => table.record_sdes_item(ssrc, |r, v| r.location = Some(v), v.clone()),
        SdesItem::Tool(v) => table.record_sdes_item(ssrc, |r, v| r.tool = Some(v), v.clone()),
        SdesItem::Note(v) => table.record_note(ssrc, v.clone(), received_at),
        SdesItem::Priv { .. } => {}
    }
}
