//! RFC 3550 RTP/RTCP session engine.
//!
//! `Session` owns a per-SSRC source table, an adaptive RTCP scheduler,
//! an outgoing packet builder and an application-supplied `Transport`,
//! and drives the poll cycle described in spec.md §4.5. Applications
//! observe incoming traffic through `SessionObserver`.

pub mod builder;
pub mod clock;
pub mod config;
pub mod error;
pub mod observer;
pub mod session;
pub mod transport;

pub use builder::{LocalSdes, RtcpBuilder, SdesIntervals};
pub use clock::Clock;
pub use config::SessionParams;
pub use error::{Error, Result};
pub use observer::{NoopObserver, SessionObserver};
pub use session::Session;
pub use transport::{RawPacket, ReceiveMode, Transport};

pub use sources::{ProbationType, SourceEvent};
pub use wire::rtcp::RtcpPacket;
pub use wire::rtp::RtpPacket;
