use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ringfan::{Daemon, FanoutRing, MpscRing, PushVec, SpscRing};
use std::sync::Arc;
use std::thread;

const MESSAGES: u64 = 1_000_000;

fn bench_spsc(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc");
    group.throughput(Throughput::Elements(MESSAGES));

    group.bench_function("push_pop", |b| {
        b.iter(|| {
            let ring = Arc::new(SpscRing::<u64>::new(1, 4096));

            let producer = {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    for value in 0..MESSAGES {
                        ring.push(value);
                    }
                })
            };

            let mut received = 0;
            while received < MESSAGES {
                if let Some(value) = ring.pop() {
                    black_box(value);
                    received += 1;
                } else {
                    std::hint::spin_loop();
                }
            }

            producer.join().unwrap();
        });
    });

    group.finish();
}

fn bench_mpsc(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpsc");

    for producers in [2u64, 4, 8] {
        let per_producer = MESSAGES / producers;
        group.throughput(Throughput::Elements(per_producer * producers));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{producers}P_1C")),
            &producers,
            |b, &producers| {
                b.iter(|| {
                    let ring = Arc::new(MpscRing::<u64>::new(1, 4096));

                    let handles: Vec<_> = (0..producers)
                        .map(|id| {
                            let ring = Arc::clone(&ring);
                            thread::spawn(move || {
                                for seq in 0..per_producer {
                                    ring.push((id << 32) | seq);
                                }
                            })
                        })
                        .collect();

                    let mut received = 0;
                    while received < per_producer * producers {
                        if let Some(value) = ring.pop() {
                            black_box(value);
                            received += 1;
                        } else {
                            std::hint::spin_loop();
                        }
                    }

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");
    let count = MESSAGES / 10;

    for subscribers in [1usize, 2, 4] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("1P_{subscribers}S")),
            &subscribers,
            |b, &subscribers| {
                b.iter(|| {
                    let daemon = Daemon::new();
                    let queue = FanoutRing::<u64>::new_in(&daemon.handle(), 1, 4096);
                    let mut subs: Vec<_> = (0..subscribers).map(|_| queue.subscribe()).collect();

                    thread::scope(|scope| {
                        for sub in &mut subs {
                            scope.spawn(move || {
                                let mut received = 0;
                                while received < count {
                                    if let Some(value) = sub.pop() {
                                        black_box(value);
                                        received += 1;
                                    } else {
                                        std::hint::spin_loop();
                                    }
                                }
                            });
                        }

                        for value in 0..count {
                            queue.push(value);
                        }
                    });
                });
            },
        );
    }

    group.finish();
}

fn bench_push_vec(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_vec");
    let count = MESSAGES / 10;
    group.throughput(Throughput::Elements(count));

    group.bench_function("append", |b| {
        b.iter(|| {
            let mut vec = PushVec::<u64>::new(1024);
            for value in 0..count {
                vec.push_back(value);
            }
            black_box(vec.len());
        });
    });

    group.bench_function("read_while_appending", |b| {
        b.iter(|| {
            let mut vec = PushVec::<u64>::new(1024);
            let reader = vec.reader();

            thread::scope(|scope| {
                scope.spawn(|| {
                    let mut sum = 0u64;
                    while reader.len() < count as usize {
                        for value in reader.iter() {
                            sum = sum.wrapping_add(*value);
                        }
                    }
                    black_box(sum);
                });

                for value in 0..count {
                    vec.push_back(value);
                }
            });
        });
    });

    group.finish();
}

criterion_group!(benches, bench_spsc, bench_mpsc, bench_fanout, bench_push_vec);
criterion_main!(benches);
