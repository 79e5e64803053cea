//! Bounded blocking connection pool.
//!
//! Both backend tiers keep their connections in a `ConnPool`: a fixed set
//! of pre-built connections handed out one at a time, with timeout-bounded
//! acquire and release. The pool never creates a connection beyond its
//! capacity, so a full complement of `get`s blocks further callers until
//! someone `put`s a connection back.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub struct ConnPool<T> {
    conns: Mutex<VecDeque<T>>,
    available: Condvar,
    space: Condvar,
    capacity: usize,
}

impl<T> ConnPool<T> {
    /// Builds a pool of `capacity` connections by calling `init` eagerly.
    ///
    /// The first `init` failure aborts construction; a host that cannot
    /// reach its backend at startup fails fast.
    pub fn new<F, E>(capacity: usize, mut init: F) -> Result<Self, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        assert!(capacity > 0, "pool capacity must be at least 1");
        let mut conns = VecDeque::with_capacity(capacity);
        for _ in 0..capacity {
            conns.push_back(init()?);
        }
        Ok(Self {
            conns: Mutex::new(conns),
            available: Condvar::new(),
            space: Condvar::new(),
            capacity,
        })
    }

    /// Takes a connection, waiting up to `timeout` for one to be returned.
    ///
    /// Returns `None` on timeout. Callers must hand the connection back via
    /// [`ConnPool::put`] on every exit path; the pool does not detect leaks.
    pub fn get(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut conns = self.conns.lock().unwrap();
        loop {
            if let Some(conn) = conns.pop_front() {
                self.space.notify_one();
                return Some(conn);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .available
                .wait_timeout(conns, deadline - now)
                .unwrap();
            conns = guard;
        }
    }

    /// Returns a connection to the pool, waiting up to `timeout` for space.
    ///
    /// A full pool (which only happens when a caller puts a connection it
    /// did not take from this pool) yields `false` after the timeout.
    pub fn put(&self, conn: T, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut conns = self.conns.lock().unwrap();
        while conns.len() >= self.capacity {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.space.wait_timeout(conns, deadline - now).unwrap();
            conns = guard;
        }
        conns.push_back(conn);
        self.available.notify_one();
        true
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn eager_init_failure_aborts_construction() {
        let mut calls = 0;
        let result: Result<ConnPool<u32>, &str> = ConnPool::new(3, || {
            calls += 1;
            if calls == 2 { Err("backend down") } else { Ok(calls) }
        });
        assert!(result.is_err());
    }

    #[test]
    fn get_and_put_round_trip() {
        let pool: ConnPool<u32> = ConnPool::new(2, || Ok::<_, ()>(7)).unwrap();
        let a = pool.get(SHORT).unwrap();
        let b = pool.get(SHORT).unwrap();
        assert_eq!((a, b), (7, 7));
        assert!(pool.get(SHORT).is_none());
        assert!(pool.put(a, SHORT));
        assert!(pool.get(SHORT).is_some());
    }

    #[test]
    fn put_into_full_pool_times_out() {
        let pool: ConnPool<u32> = ConnPool::new(1, || Ok::<_, ()>(1)).unwrap();
        assert!(!pool.put(99, SHORT));
    }

    #[test]
    fn capacity_one_is_shared_by_two_threads() {
        let pool: Arc<ConnPool<u32>> = Arc::new(ConnPool::new(1, || Ok::<_, ()>(0)).unwrap());
        let mut handles = Vec::new();
        for _ in 0..2 {
            let pool = pool.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    let conn = pool.get(Duration::from_secs(5)).expect("starved waiter");
                    assert!(pool.put(conn, Duration::from_secs(5)));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
