use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::LctrError;

#[derive(Debug)]
pub struct RateGate {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        let slot = {
            let mut next = self.next_slot.lock();
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };
        let now = Instant::now();
        if slot > now {
            thread::sleep(slot - now);
        }
    }
}

pub struct LookupDispatcher {
    pool: ThreadPool,
    workers: usize,
    gate: RateGate,
}

impl LookupDispatcher {
    pub fn new(workers: usize, min_interval: Duration) -> Result<Self, LctrError> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("kira-lctr-lookup-{index}"))
            .build()
            .map_err(|err| LctrError::WorkerPool(err.to_string()))?;
        Ok(Self {
            pool,
            workers,
            gate: RateGate::new(min_interval),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn min_interval(&self) -> Duration {
        self.gate.interval()
    }

    pub fn map<T, R, F>(&self, items: &[T], task: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        let gate = &self.gate;
        self.pool.install(|| {
            items
                .par_iter()
                .with_max_len(1)
                .map(|item| {
                    gate.wait();
                    task(item)
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn map_preserves_input_order() {
        let dispatcher = LookupDispatcher::new(3, Duration::ZERO).unwrap();
        let items: Vec<u32> = (0..20).collect();
        let doubled = dispatcher.map(&items, |value| value * 2);
        assert_eq!(doubled, (0..20).map(|value| value * 2).collect::<Vec<_>>());
    }

    #[test]
    fn zero_workers_clamps_to_one() {
        let dispatcher = LookupDispatcher::new(0, Duration::ZERO).unwrap();
        assert_eq!(dispatcher.workers(), 1);
    }

    #[test]
    fn concurrency_never_exceeds_worker_count() {
        let dispatcher = LookupDispatcher::new(2, Duration::ZERO).unwrap();
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<u32> = (0..12).collect();
        dispatcher.map(&items, |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            active.fetch_sub(1, Ordering::SeqCst);
        });
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn gate_spaces_task_starts() {
        let gate = RateGate::new(Duration::from_millis(20));
        let start = Instant::now();
        for _ in 0..4 {
            gate.wait();
        }
        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
