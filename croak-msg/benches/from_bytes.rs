use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use croak_msg::{Message, TryFromBytes};

fn message_from_bytes(c: &mut Criterion) {
  let mut group = c.benchmark_group("msg/from_bytes");
  group.measurement_time(std::time::Duration::from_secs(5));

  for inp in bench_input::inputs().iter() {
    let bytes = inp.get_bytes();

    group.bench_with_input(BenchmarkId::new("croak_msg/size", bytes.len()),
                           &bytes,
                           |b, bytes| b.iter(|| Message::try_from_bytes(black_box(bytes)).unwrap()));

    group.bench_with_input(BenchmarkId::new("coap_lite/size", bytes.len()),
                           &bytes,
                           |b, bytes| {
                             b.iter(|| coap_lite::Packet::from_bytes(black_box(bytes)).unwrap())
                           });
  }
  group.finish();
}

criterion_group!(benches, message_from_bytes);
criterion_main!(benches);
