use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

/// Relays waiting to be probed, plus every relay ever enqueued.
///
/// A relay enters the visited set at most once per crawl and the queue only
/// ever holds visited relays, so nothing is probed twice. All access goes
/// through one lock.
#[derive(Debug, Default)]
pub struct Frontier {
    inner: Mutex<FrontierState>,
}

#[derive(Debug, Default)]
struct FrontierState {
    /// FIFO so shallower relays are probed before deeper ones
    queue: VecDeque<String>,
    visited: HashSet<String>,
}

impl FrontierState {
    fn try_enqueue(&mut self, url: &str) -> bool {
        if self.visited.contains(url) {
            return false;
        }
        self.visited.insert(url.to_string());
        self.queue.push_back(url.to_string());
        true
    }
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a relay unless it was seen before. Returns whether it was queued.
    pub fn try_enqueue(&self, url: &str) -> bool {
        self.inner.lock().try_enqueue(url)
    }

    /// Queue every unseen relay under a single lock, keeping input order.
    /// Returns how many were queued.
    pub fn enqueue_all<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.inner.lock();
        urls.into_iter()
            .filter(|url| state.try_enqueue(url.as_ref()))
            .count()
    }

    /// Take up to `max` relays from the front of the queue
    pub fn drain_batch(&self, max: usize) -> Vec<String> {
        let mut state = self.inner.lock();
        let take = max.min(state.queue.len());
        state.queue.drain(..take).collect()
    }

    /// Relays still waiting, in probe order
    pub fn pending(&self) -> Vec<String> {
        self.inner.lock().queue.iter().cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn visited_len(&self) -> usize {
        self.inner.lock().visited.len()
    }
}
