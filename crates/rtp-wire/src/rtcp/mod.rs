//! RTCP packet types and compound-packet framing (RFC 3550 §6).

pub mod app;
pub mod bye;
pub mod compound;
pub mod header;
pub mod report;
pub mod sdes;

use bytes::BytesMut;

use crate::error::Result;
use header::PacketType;

pub use app::App;
pub use bye::Bye;
pub use header::RtcpHeader;
pub use report::{ReceiverReport, ReportBlock, SenderInfo, SenderReport};
pub use sdes::{Sdes, SdesChunk, SdesItem};

/// One constituent packet of an RTCP compound datagram.
///
/// `Unknown` carries any recognized-but-unhandled packet type verbatim,
/// per spec.md §4.1 ("any other type is wrapped as `Unknown`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    Sr(SenderReport),
    Rr(ReceiverReport),
    Sdes(Sdes),
    Bye(Bye),
    App(App),
    Unknown { packet_type: u8, body: Vec<u8> },
}

impl RtcpPacket {
    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            RtcpPacket::Sr(sr) => sr.write(buf),
            RtcpPacket::Rr(rr) => rr.write(buf),
            RtcpPacket::Sdes(sdes) => sdes.write(buf),
            RtcpPacket::Bye(bye) => bye.write(buf),
            RtcpPacket::App(app) => app.write(buf),
            RtcpPacket::Unknown { packet_type, body } => {
                let body_words = body.len() / 4;
                RtcpHeader {
                    padding: false,
                    count: 0,
                    packet_type: *packet_type,
                    length_words: body_words as u16,
                }
                .write(buf);
                buf.extend_from_slice(body);
                Ok(())
            }
        }
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            RtcpPacket::Sr(_) => PacketType::Sr,
            RtcpPacket::Rr(_) => PacketType::Rr,
            RtcpPacket::Sdes(_) => PacketType::Sdes,
            RtcpPacket::Bye(_) => PacketType::Bye,
            RtcpPacket::App(_) => PacketType::App,
            RtcpPacket::Unknown { packet_type, .. } => PacketType::Unknown(*packet_type),
        }
    }
}

pub use compound::{parse as parse_compound, write as write_compound};
