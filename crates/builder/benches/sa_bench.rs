//! SA and token builder benchmarks
//!
//! Measures record compilation, context compilation and per-packet
//! token generation. The per-packet path is the one that matters: it
//! runs once per packet on the data plane.
//!
//! Run with: `cargo bench --bench sa_bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use sabre_builder::sa::{ipsec_flags, Direction, SaBuilder, SaParams, TlsVersion};
use sabre_builder::token::{build_context, build_token, token_word_count, TokenParams};

fn esp_outbound_params() -> SaParams {
    let mut params = SaParams::init_esp(
        0x11223344,
        ipsec_flags::TUNNEL,
        ipsec_flags::IPV4,
        Direction::Outbound,
    )
    .unwrap();
    params.set_aes_cbc(&[0x42u8; 16]);
    params.set_hmac_sha1(&[0x11u8; 20], &[0x22u8; 20]);
    params
}

fn esp_gcm_inbound_params() -> SaParams {
    let mut params = SaParams::init_esp(
        0xcafef00d,
        ipsec_flags::TUNNEL,
        ipsec_flags::IPV4,
        Direction::Inbound,
    )
    .unwrap();
    params.set_aes_gcm(&[0u8; 16], &[1, 2, 3, 4]);
    params
}

/// Benchmark SA record sizing and building.
fn bench_sa_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("sa_build");
    let builder = SaBuilder::new();

    group.bench_function("get_sizes_esp", |b| {
        let params = esp_outbound_params();
        b.iter(|| black_box(builder.get_sizes(&params).unwrap()));
    });

    group.bench_function("build_esp_cbc_sha1", |b| {
        let mut record = vec![0u32; 64];
        b.iter(|| {
            let mut params = esp_outbound_params();
            builder.build_sa(&mut params, &mut record).unwrap();
            black_box(record[0])
        });
    });

    group.bench_function("build_esp_gcm", |b| {
        let mut record = vec![0u32; 64];
        b.iter(|| {
            let mut params = esp_gcm_inbound_params();
            builder.build_sa(&mut params, &mut record).unwrap();
            black_box(record[0])
        });
    });

    group.bench_function("build_tls12_cbc", |b| {
        let mut record = vec![0u32; 64];
        b.iter(|| {
            let mut params = SaParams::init_ssltls(TlsVersion::Tls1_2, Direction::Outbound);
            params.set_aes_cbc(&[0u8; 16]);
            params.set_hmac_sha2_256(&[0u8; 32], &[0u8; 32]);
            builder.build_sa(&mut params, &mut record).unwrap();
            black_box(record[0])
        });
    });

    group.finish();
}

/// Benchmark token context compilation (once per SA).
fn bench_token_context(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_context");
    let builder = SaBuilder::new();

    let mut params = esp_outbound_params();
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut params, &mut record).unwrap();

    group.bench_function("build_context_esp", |b| {
        b.iter(|| black_box(build_context(&params).unwrap()));
    });

    group.finish();
}

/// Benchmark per-packet token generation at typical packet sizes.
fn bench_token_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_build");
    let builder = SaBuilder::new();

    let mut params = esp_outbound_params();
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut params, &mut record).unwrap();
    let ctx = build_context(&params).unwrap();
    let mut words = vec![0u32; token_word_count(&ctx)];

    for len in [64usize, 512, 1500] {
        let packet = vec![0x42u8; len];
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_function(format!("esp_out_{len}bytes"), |b| {
            b.iter(|| {
                black_box(
                    build_token(&ctx, &packet, &TokenParams::default(), &mut words).unwrap(),
                )
            });
        });
    }

    let mut params = esp_gcm_inbound_params();
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut params, &mut record).unwrap();
    let ctx = build_context(&params).unwrap();
    let mut words = vec![0u32; token_word_count(&ctx)];
    let packet = vec![0x42u8; 1500];

    group.throughput(Throughput::Bytes(1500));
    group.bench_function("esp_gcm_in_1500bytes", |b| {
        b.iter(|| {
            black_box(build_token(&ctx, &packet, &TokenParams::default(), &mut words).unwrap())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_sa_build, bench_token_context, bench_token_build);

criterion_main!(benches);
