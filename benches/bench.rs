use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use reclaim_stack::reclaim::{Hazard, RefCount};
use reclaim_stack::Stack;
use std::{
    sync::{Arc, Barrier, Mutex},
    thread,
    time::{Duration, Instant},
};

/// The mutex-guarded baseline the lock-free stacks are measured against.
trait Lifo: Send + Sync + 'static {
    fn push(&self, value: u64);
    fn pop(&self) -> Option<u64>;
}

impl Lifo for Stack<u64, RefCount> {
    fn push(&self, value: u64) {
        Stack::push(self, value)
    }
    fn pop(&self) -> Option<u64> {
        Stack::pop(self)
    }
}

impl Lifo for Stack<u64, Hazard> {
    fn push(&self, value: u64) {
        Stack::push(self, value)
    }
    fn pop(&self) -> Option<u64> {
        Stack::pop(self)
    }
}

impl Lifo for Mutex<Vec<u64>> {
    fn push(&self, value: u64) {
        self.lock().unwrap().push(value);
    }
    fn pop(&self) -> Option<u64> {
        self.lock().unwrap().pop()
    }
}

#[derive(Clone)]
struct MultithreadedBench<T> {
    start: Arc<Barrier>,
    end: Arc<Barrier>,
    stack: Arc<T>,
}

impl<T: Lifo> MultithreadedBench<T> {
    fn new(stack: Arc<T>) -> Self {
        Self {
            start: Arc::new(Barrier::new(5)),
            end: Arc::new(Barrier::new(5)),
            stack,
        }
    }

    fn thread(&self, f: impl FnOnce(&Barrier, &T) + Send + 'static) -> &Self {
        let start = self.start.clone();
        let end = self.end.clone();
        let stack = self.stack.clone();
        thread::spawn(move || {
            f(&*start, &*stack);
            end.wait();
        });
        self
    }

    fn run(&self) -> Duration {
        self.start.wait();
        let t0 = Instant::now();
        self.end.wait();
        t0.elapsed()
    }
}

fn push_pop(c: &mut Criterion) {
    fn bench_case<T: Lifo>(ops: u64, mk: impl Fn() -> T) -> Duration {
        let bench = MultithreadedBench::new(Arc::new(mk()));
        for _ in 0..4 {
            bench.thread(move |start, stack| {
                start.wait();
                for i in 0..ops {
                    stack.push(i);
                    stack.pop();
                }
            });
        }
        bench.run()
    }

    fn bench_impl<T: Lifo>(
        group: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>,
        name: &str,
        i: &u64,
        mk: impl Fn() -> T + Copy,
    ) {
        group.bench_with_input(BenchmarkId::new(name, i), i, |b, &i| {
            b.iter_custom(|iters| {
                let mut total = Duration::from_secs(0);
                for _ in 0..iters {
                    total += bench_case(i, mk);
                }
                total
            })
        });
    }

    let mut group = c.benchmark_group("push_pop");
    for i in [100u64, 500, 1000, 5000].iter() {
        bench_impl(&mut group, "ref_count", i, Stack::<u64, RefCount>::new);
        bench_impl(&mut group, "hazard", i, || {
            Stack::<u64, Hazard>::with_reclaimer(Hazard::new())
        });
        bench_impl(&mut group, "mutex_vec", i, || Mutex::new(Vec::new()));
    }
    group.finish();
}

fn push_then_pop(c: &mut Criterion) {
    fn bench_case<T: Lifo>(ops: u64, mk: impl Fn() -> T) -> Duration {
        let bench = MultithreadedBench::new(Arc::new(mk()));
        // two pushers fill while two poppers drain
        for _ in 0..2 {
            bench.thread(move |start, stack| {
                start.wait();
                for i in 0..ops {
                    stack.push(i);
                }
            });
        }
        for _ in 0..2 {
            bench.thread(move |start, stack| {
                start.wait();
                let mut drained = 0;
                while drained < ops {
                    if stack.pop().is_some() {
                        drained += 1;
                    }
                }
            });
        }
        bench.run()
    }

    let mut group = c.benchmark_group("push_then_pop");
    for i in [100u64, 500, 1000, 5000].iter() {
        group.bench_with_input(BenchmarkId::new("ref_count", i), i, |b, &i| {
            b.iter_custom(|iters| {
                (0..iters)
                    .map(|_| bench_case(i, Stack::<u64, RefCount>::new))
                    .sum()
            })
        });
        group.bench_with_input(BenchmarkId::new("hazard", i), i, |b, &i| {
            b.iter_custom(|iters| {
                (0..iters)
                    .map(|_| {
                        bench_case(i, || Stack::<u64, Hazard>::with_reclaimer(Hazard::new()))
                    })
                    .sum()
            })
        });
        group.bench_with_input(BenchmarkId::new("mutex_vec", i), i, |b, &i| {
            b.iter_custom(|iters| {
                (0..iters)
                    .map(|_| bench_case(i, || Mutex::new(Vec::new())))
                    .sum()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, push_pop, push_then_pop);
criterion_main!(benches);
