use rtp_wire::rtcp::{
    self, Bye, ReceiverReport, ReportBlock, RtcpPacket, Sdes, SdesChunk, SdesItem, SenderInfo,
    SenderReport,
};

#[test]
fn sr_with_report_blocks_and_rr_both_round_trip() {
    let sr = RtcpPacket::Sr(SenderReport {
        ssrc: 0xCAFEBABE,
        sender_info: SenderInfo {
            ntp_timestamp: 0x00000001_00000002,
            rtp_timestamp: 160_000,
            packet_count: 1000,
            octet_count: 160_000,
        },
        reports: vec![ReportBlock {
            ssrc: 0x1234_5678,
            fraction_lost: 3,
            cumulative_lost: -2,
            ext_highest_seq: 70_000,
            jitter: 12,
            lsr: 0,
            dlsr: 0,
        }],
    });

    let buf = rtcp::write_compound(&[sr.clone()]).unwrap();
    let parsed = rtcp::parse_compound(&buf).unwrap();
    assert_eq!(parsed, vec![sr]);

    let rr = RtcpPacket::Rr(ReceiverReport { ssrc: 0x1111, reports: vec![] });
    let buf = rtcp::write_compound(&[rr.clone()]).unwrap();
    assert_eq!(rtcp::parse_compound(&buf).unwrap(), vec![rr]);
}

#[test]
fn four_packet_compound_with_padding_on_last() {
    let sr = RtcpPacket::Sr(SenderReport {
        ssrc: 1,
        sender_info: SenderInfo { ntp_timestamp: 0, rtp_timestamp: 0, packet_count: 0, octet_count: 0 },
        reports: vec![],
    });
    let sdes = RtcpPacket::Sdes(Sdes {
        chunks: vec![SdesChunk { ssrc: 1, items: vec![SdesItem::Cname(b"a@b.com".to_vec())] }],
    });
    let app = RtcpPacket::App(rtp_wire::rtcp::App {
        subtype: 0,
        ssrc: 1,
        name: *b"TEST",
        data: vec![1, 2, 3, 4],
    });
    let bye = RtcpPacket::Bye(Bye { ssrcs: vec![1], reason: Some(b"done".to_vec()) });

    let packets = vec![sr, sdes, app, bye];
    let buf = rtcp::write_compound(&packets).unwrap();
    let parsed = rtcp::parse_compound(&buf).unwrap();
    assert_eq!(parsed, packets);
}
