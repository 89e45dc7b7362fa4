use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

#[derive(Debug)]
struct PoolState<T> {
    objects: VecDeque<T>,
    finished: bool,
}

/// A blocking FIFO pool of reusable objects.
///
/// Objects are moved in and out, so an object is owned either by the pool or by exactly one
/// acquirer. `acquire_object` blocks while the pool is empty; after [`finish`](Self::finish)
/// every blocked and future acquire returns `None`.
#[derive(Debug)]
pub struct ResourcePool<T> {
    state: Mutex<PoolState<T>>,
    available: Condvar,
}

impl<T> Default for ResourcePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResourcePool<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState {
                objects: VecDeque::new(),
                finished: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn with_objects<I: IntoIterator<Item = T>>(objects: I) -> Self {
        let pool = Self::new();
        pool.state.lock().objects.extend(objects);
        pool
    }

    /// Returns an object to the pool and wakes one waiter.
    pub fn push_object(&self, object: T) {
        self.state.lock().objects.push_back(object);
        self.available.notify_one();
    }

    /// Takes the oldest object, blocking until one is available. Returns `None` once the
    /// pool is finished.
    pub fn acquire_object(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if state.finished {
                return None;
            }
            if let Some(object) = state.objects.pop_front() {
                return Some(object);
            }
            self.available.wait(&mut state);
        }
    }

    /// Signals shutdown: wakes every waiter and makes all further acquires return `None`.
    pub fn finish(&self) {
        self.state.lock().finished = true;
        self.available.notify_all();
    }

    /// Removes and returns every object currently held by the pool.
    pub fn drain(&self) -> Vec<T> {
        self.state.lock().objects.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn objects_are_handed_out_in_fifo_order() {
        let pool = ResourcePool::with_objects([1, 2, 3]);
        assert_eq!(pool.acquire_object(), Some(1));
        pool.push_object(4);
        assert_eq!(pool.acquire_object(), Some(2));
        assert_eq!(pool.acquire_object(), Some(3));
        assert_eq!(pool.acquire_object(), Some(4));
        assert!(pool.is_empty());
    }

    #[test]
    fn acquire_blocks_until_an_object_is_pushed() {
        let pool = Arc::new(ResourcePool::new());
        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.acquire_object())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        pool.push_object("segment");
        assert_eq!(waiter.join().unwrap(), Some("segment"));
    }

    #[test]
    fn finish_releases_blocked_acquirers_with_none() {
        let pool: Arc<ResourcePool<u32>> = Arc::new(ResourcePool::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || pool.acquire_object())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));

        pool.finish();
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), None);
        }
        pool.push_object(1);
        assert_eq!(pool.acquire_object(), None);
    }

    #[test]
    fn drain_empties_the_pool() {
        let pool = ResourcePool::with_objects([5, 6]);
        pool.finish();
        assert_eq!(pool.drain(), vec![5, 6]);
        assert!(pool.is_empty());
    }

    #[test]
    fn an_object_is_never_held_by_two_acquirers() {
        const OBJECTS: usize = 4;
        const THREADS: usize = 8;
        const ROUNDS: usize = 500;

        let pool = Arc::new(ResourcePool::with_objects(0..OBJECTS));
        let held = Arc::new(Mutex::new(HashSet::new()));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let held = Arc::clone(&held);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..ROUNDS {
                        let object = pool.acquire_object().unwrap();
                        assert!(held.lock().insert(object), "object {object} acquired twice");
                        thread::yield_now();
                        assert!(held.lock().remove(&object));
                        pool.push_object(object);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.len(), OBJECTS);
        assert!(held.lock().is_empty());
    }
}
