use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rtp_wire::rtp::{RtpBuilder, RtpPacket};

fn criterion_benchmark(c: &mut Criterion) {
    let builder = RtpBuilder::new(None);
    let payload = vec![0u8; 160];
    let samples: Vec<_> = (0..16u16)
        .map(|seq| {
            builder
                .build(false, 0, seq, seq as u32 * 160, 0xAABB_CCDD, &[], None, &payload)
                .unwrap()
        })
        .collect();

    let mut rtp_criterion = c.benchmark_group("rtp");
    rtp_criterion.throughput(Throughput::Elements(1));

    let mut cycle = (0..).map(|i| i % samples.len());
    rtp_criterion.bench_function("parse_fixed_header", |bencher| {
        bencher.iter(|| {
            let idx = cycle.next().unwrap();
            RtpPacket::parse(&samples[idx]).unwrap();
        })
    });

    rtp_criterion.bench_function("build_no_extension", |bencher| {
        bencher.iter(|| {
            builder
                .build(false, 0, 1, 160, 0xAABB_CCDD, &[], None, &payload)
                .unwrap()
        })
    });

    rtp_criterion.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
