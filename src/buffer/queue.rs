use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::ts::TsPacket;

/// Bounded FIFO between an ingest driver and a source's indexer. On
/// overflow the oldest packet is dropped and counted; ingest never blocks.
pub struct PacketQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

struct QueueState {
    packets: VecDeque<TsPacket>,
    closed: bool,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                packets: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            cond: Condvar::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, pkt: TsPacket) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        if state.packets.len() >= self.capacity {
            state.packets.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        state.packets.push_back(pkt);
        drop(state);
        self.cond.notify_one();
    }

    /// Pops up to `max` packets, blocking up to `timeout` while empty.
    pub fn pop_batch(&self, max: usize, timeout: Duration) -> Vec<TsPacket> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        while state.packets.is_empty() && !state.closed {
            let now = Instant::now();
            if now >= deadline {
                return Vec::new();
            }
            let (next, wait) = self.cond.wait_timeout(state, deadline - now).unwrap();
            state = next;
            if wait.timed_out() && state.packets.is_empty() {
                return Vec::new();
            }
        }
        let take = state.packets.len().min(max);
        state.packets.drain(..take).collect()
    }

    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.cond.notify_all();
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::testutil;

    #[test]
    fn overflow_drops_oldest() {
        let queue = PacketQueue::new(3);
        for cc in 0..5u8 {
            queue.push(testutil::raw_packet(0x100, false, cc, &[0u8; 10]));
        }
        assert_eq!(queue.dropped(), 2);
        let batch = queue.pop_batch(10, Duration::from_millis(1));
        let ccs: Vec<u8> = batch.iter().map(|p| p.continuity_counter()).collect();
        assert_eq!(ccs, vec![2, 3, 4]);
    }

    #[test]
    fn pop_times_out_when_empty() {
        let queue = PacketQueue::new(4);
        let start = Instant::now();
        let batch = queue.pop_batch(1, Duration::from_millis(20));
        assert!(batch.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn close_unblocks_consumer() {
        let queue = std::sync::Arc::new(PacketQueue::new(4));
        let q = queue.clone();
        let handle = std::thread::spawn(move || q.pop_batch(1, Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(10));
        queue.close();
        assert!(handle.join().unwrap().is_empty());
    }
}
