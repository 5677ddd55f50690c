// Session cipher benchmarks: key derivation and envelope seal/open at the
// payload sizes devices typically exchange.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tapo_session::crypto::{credential_hash, SessionCipher};

const LOCAL: [u8; 16] = [0x11; 16];
const REMOTE: [u8; 16] = [0x22; 16];

fn bench_derive(c: &mut Criterion) {
    let auth = credential_hash("user@example.com", "secret");
    c.bench_function("session_cipher_derive", |b| {
        b.iter(|| black_box(SessionCipher::new(black_box(&LOCAL), &REMOTE, &auth)));
    });
}

fn bench_envelope(c: &mut Criterion) {
    let auth = credential_hash("user@example.com", "secret");
    let mut group = c.benchmark_group("session_cipher_envelope");

    for size in [64usize, 512, 4096] {
        let payload = vec![0x7bu8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encrypt", size), &payload, |b, p| {
            let mut cipher = SessionCipher::new(&LOCAL, &REMOTE, &auth);
            b.iter(|| black_box(cipher.encrypt(black_box(p))));
        });

        let mut sender = SessionCipher::new(&LOCAL, &REMOTE, &auth);
        let receiver = SessionCipher::new(&LOCAL, &REMOTE, &auth);
        let (envelope, seq) = sender.encrypt(&payload);
        group.bench_with_input(BenchmarkId::new("decrypt", size), &envelope, |b, e| {
            b.iter(|| black_box(receiver.decrypt(seq, black_box(e)).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_derive, bench_envelope);
criterion_main!(benches);
