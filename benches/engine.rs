use std::sync::Arc;

use chrono::{Duration, Utc};
use coupon_admission::{AccountId, AdmissionMode, Command, Engine, EventId, NewEvent};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

/// Generates apply commands for benchmarking.
///
/// Accounts `1..=applicants` each apply once to every event, round-robin
/// over events so contention is spread the way concurrent traffic would be.
pub struct ApplyGenerator {
    events: Vec<EventId>,
    applicants: AccountId,
    current_account: AccountId,
    current_event: usize,
}

impl ApplyGenerator {
    pub fn new(events: Vec<EventId>, applicants: AccountId) -> Self {
        Self {
            events,
            applicants,
            current_account: 1,
            current_event: 0,
        }
    }
}

impl Iterator for ApplyGenerator {
    type Item = Command;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_account > self.applicants || self.events.is_empty() {
            return None;
        }

        let command = Command::Apply {
            account: self.current_account,
            event: self.events[self.current_event],
        };

        self.current_event += 1;
        if self.current_event == self.events.len() {
            self.current_event = 0;
            self.current_account += 1;
        }

        Some(command)
    }
}

fn new_event(total: u32) -> NewEvent {
    let now = Utc::now();
    NewEvent {
        title: "bench".to_string(),
        description: String::new(),
        reward_description: String::new(),
        total_coupons: total,
        start_at: now - Duration::hours(1),
        end_at: now + Duration::days(1),
    }
}

async fn setup(mode: AdmissionMode, events: usize, total: u32) -> (Engine, Vec<EventId>) {
    let engine = Engine::builder().mode(mode).build();
    let mut ids = Vec::with_capacity(events);
    for _ in 0..events {
        ids.push(engine.register_event(new_event(total)).await.unwrap().id);
    }
    (engine, ids)
}

/// Sequential throughput of the command stream, with half the applicants
/// over capacity.
fn bench_stream(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("stream");

    for mode in [AdmissionMode::Durable, AdmissionMode::FastPath] {
        for applicants in [100u64, 1_000] {
            group.bench_with_input(
                BenchmarkId::new(format!("{mode:?}"), applicants),
                &applicants,
                |b, &applicants| {
                    b.iter(|| {
                        rt.block_on(async {
                            let capacity = u32::try_from(applicants / 2).unwrap();
                            let (engine, events) = setup(mode, 4, capacity).await;
                            let commands = ApplyGenerator::new(events, applicants);
                            engine.run(tokio_stream::iter(commands)).await;
                            black_box(engine)
                        })
                    })
                },
            );
        }
    }

    group.finish();
}

/// Many tasks racing on a single event.
fn bench_contention(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("contention");

    for mode in [AdmissionMode::Durable, AdmissionMode::FastPath] {
        group.bench_function(format!("{mode:?}"), |b| {
            b.iter(|| {
                rt.block_on(async {
                    let (engine, events) = setup(mode, 1, 100).await;
                    let engine = Arc::new(engine);
                    let event = events[0];
                    let handles: Vec<_> = (1..=500)
                        .map(|account| {
                            let engine = Arc::clone(&engine);
                            tokio::spawn(async move {
                                let _ = engine.apply_for_coupon(account, event).await;
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.await.unwrap();
                    }
                    black_box(engine)
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_stream, bench_contention);
criterion_main!(benches);
