//! Criterion benchmarks for the LanLink package codec.
//!
//! Announcements are decoded for every datagram that reaches the discovery
//! port, so decode cost bounds how fast a busy LAN can be drained.
//!
//! Run with:
//! ```bash
//! cargo bench --package lanlink-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lanlink_core::{
    decode, decode_datagram, encode, DeviceType, IdentityPackage, NetworkPackage, PeerIdentity,
};

// ── Package fixtures ──────────────────────────────────────────────────────────

fn make_identity() -> NetworkPackage {
    IdentityPackage::new(
        PeerIdentity::new("3f2c0b8a_d1e4_4c33_9a51_7f0e6b2d9c10").unwrap(),
        "benchmark-desktop",
        DeviceType::Desktop,
    )
    .with_tcp_port(1716)
    .to_package()
}

fn make_ping() -> NetworkPackage {
    NetworkPackage::new("kdeconnect.ping")
}

fn make_mousepad() -> NetworkPackage {
    NetworkPackage::new("kdeconnect.mousepad.request")
        .with_field("dx", 12.5)
        .with_field("dy", -3.0)
}

fn make_large_body() -> NetworkPackage {
    (0..64).fold(NetworkPackage::new("kdeconnect.notification"), |np, i| {
        np.with_field(format!("field{i:02}"), "x".repeat(32))
    })
}

fn fixtures() -> Vec<(&'static str, NetworkPackage)> {
    vec![
        ("Identity", make_identity()),
        ("Ping", make_ping()),
        ("Mousepad", make_mousepad()),
        ("LargeBody", make_large_body()),
    ]
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for (name, np) in fixtures() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &np, |b, np| {
            b.iter(|| encode(black_box(np)).unwrap());
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for (name, np) in fixtures() {
        let bytes = encode(&np).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &bytes, |b, bytes| {
            b.iter(|| decode(black_box(bytes)).unwrap());
        });
    }
    group.finish();
}

fn bench_decode_announcement_datagram(c: &mut Criterion) {
    let bytes = encode(&make_identity()).unwrap();
    c.bench_function("decode_datagram/Identity", |b| {
        b.iter(|| {
            let np = decode_datagram(black_box(&bytes)).unwrap();
            IdentityPackage::from_package(&np).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_decode_announcement_datagram
);
criterion_main!(benches);
