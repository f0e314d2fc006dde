//! A cache for values which are expensive to generate on demand.
//!
//! A [`RequestCache`] sits in front of a processing function. When a value is requested, the cache
//! tiers are consulted in order:
//!
//! 1. an in-memory least-recently-used cache
//! 2. an optional persistent store (local disk, HTTP or cloud object storage)
//! 3. the processing function itself
//!
//! Concurrent requests for the same key are collapsed so that the processing function runs at most
//! once per key at any one time, and every waiting caller receives the same result. A computed value
//! is written to the persistent store and the memory cache before any caller is handed the result.
//! Failures are passed to all waiting callers but are not cached, so a later request will try again.
use crate::error::{ComputationError, EioError};
use anyhow::Result;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

pub mod codec;
pub mod store;
use store::ObjectStore;

/// Index into [`RequestCache::requests`] for requests received by the memory tier
pub const MEMORY_TIER: usize = 0;
/// Index into [`RequestCache::requests`] for requests received by the persistent tier
pub const PERSISTENT_TIER: usize = 1;
/// Index into [`RequestCache::requests`] for requests received by the processing function
pub const PROCESSOR_TIER: usize = 2;

/// Lock a mutex, ignoring poisoning.
///
/// None of the data guarded in this module can be left in an inconsistent state by a panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A token which can be used to cancel requests before they are dispatched.
///
/// Cancellation is only checked when a request is submitted. A computation which is already running
/// is never interrupted, because other callers may be waiting on its result.
#[derive(Clone, Debug, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// A context which is never cancelled (unless [`Context::cancel`] is called on it)
    pub fn background() -> Self {
        Self::default()
    }

    /// Cancel this context and every clone of it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The signature of functions which generate cached values
pub type ProcessFn<R, T> = Box<dyn Fn(&Context, &R) -> Result<T> + Send + Sync>;

type EncodeFn<T> = Box<dyn Fn(&T) -> Result<Vec<u8>> + Send + Sync>;
type DecodeFn<T> = Box<dyn Fn(&[u8]) -> Result<T> + Send + Sync>;

/// A persistent cache tier: an object store plus the encoding of values as bytes
pub struct Persistence<T> {
    store: Arc<dyn ObjectStore>,
    encode: EncodeFn<T>,
    decode: DecodeFn<T>,
}

impl<T> Persistence<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    /// Create a new persistent tier which stores values in `store`
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            encode: Box::new(|value: &T| codec::encode(value)),
            decode: Box::new(|bytes: &[u8]| codec::decode(bytes)),
        }
    }
}

impl<T> Persistence<T> {
    fn load(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key)? {
            Some(bytes) => Ok(Some((self.decode)(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, value: &T) -> Result<()> {
        let bytes = (self.encode)(value)?;
        self.store.put(key, &bytes)
    }
}

/// A bounded in-memory cache which evicts the least recently used entry when full.
///
/// A capacity of zero means the cache is unbounded.
struct MemoryCache<T> {
    max_entries: usize,
    entries: IndexMap<String, T>,
}

impl<T: Clone> MemoryCache<T> {
    fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: IndexMap::new(),
        }
    }

    /// Look up a value, marking it as the most recently used
    fn get(&mut self, key: &str) -> Option<T> {
        let index = self.entries.get_index_of(key)?;
        let last = self.entries.len() - 1;
        self.entries.move_index(index, last);
        self.entries.get_index(last).map(|(_, value)| value.clone())
    }

    fn add(&mut self, key: String, value: T) {
        let (index, _) = self.entries.insert_full(key, value);
        let last = self.entries.len() - 1;
        self.entries.move_index(index, last);
        if self.max_entries > 0 {
            while self.entries.len() > self.max_entries {
                self.entries.shift_remove_index(0);
            }
        }
    }
}

/// A computation which is currently running, which other requests for the same key can wait on
struct InFlight<T> {
    result: Mutex<Option<Result<T, EioError>>>,
    ready: Condvar,
}

impl<T: Clone> InFlight<T> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<T, EioError> {
        let mut result = lock(&self.result);
        loop {
            if let Some(result) = result.as_ref() {
                return result.clone();
            }
            result = self
                .ready
                .wait(result)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn complete(&self, value: Result<T, EioError>) {
        *lock(&self.result) = Some(value);
        self.ready.notify_all();
    }
}

/// Limits the number of processing functions which may run at once
struct WorkerPool {
    available: Mutex<usize>,
    released: Condvar,
}

impl WorkerPool {
    fn new(workers: usize) -> Self {
        Self {
            available: Mutex::new(workers.max(1)),
            released: Condvar::new(),
        }
    }

    fn acquire(&self) -> WorkerPermit<'_> {
        let mut available = lock(&self.available);
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        WorkerPermit(self)
    }
}

/// Returns a worker to the pool when dropped
struct WorkerPermit<'a>(&'a WorkerPool);

impl Drop for WorkerPermit<'_> {
    fn drop(&mut self) {
        *lock(&self.0.available) += 1;
        self.0.released.notify_one();
    }
}

/// Held by the request which is computing a value.
///
/// If the computation panics, waiting requests are released with an error rather than blocking
/// forever.
struct Leader<'a, R, T: Clone> {
    cache: &'a RequestCache<R, T>,
    key: &'a str,
    flight: Arc<InFlight<T>>,
    finished: bool,
}

impl<R, T: Clone> Leader<'_, R, T> {
    fn finish(mut self, result: &Result<T, EioError>) {
        if let Ok(value) = result {
            lock(&self.cache.memory).add(self.key.to_string(), value.clone());
        }
        lock(&self.cache.in_flight).remove(self.key);
        self.flight.complete(result.clone());
        self.finished = true;
    }
}

impl<R, T: Clone> Drop for Leader<'_, R, T> {
    fn drop(&mut self) {
        if !self.finished {
            lock(&self.cache.in_flight).remove(self.key);
            self.flight.complete(Err(computation_error(
                self.key,
                anyhow::anyhow!("computation panicked"),
            )));
        }
    }
}

/// A cache of values of type `T` generated from request payloads of type `R`.
pub struct RequestCache<R, T> {
    name: String,
    process: ProcessFn<R, T>,
    memory: Mutex<MemoryCache<T>>,
    persistence: Option<Persistence<T>>,
    in_flight: Mutex<HashMap<String, Arc<InFlight<T>>>>,
    workers: WorkerPool,
    requests: [AtomicUsize; 3],
}

impl<R, T: Clone> RequestCache<R, T> {
    /// Create a new cache.
    ///
    /// # Arguments
    ///
    /// * `name` - A name for the cache, used in log messages
    /// * `process` - The function which generates values on a cache miss
    /// * `workers` - The maximum number of distinct keys which may be processed at once
    /// * `memory_entries` - Capacity of the memory tier (zero for unbounded)
    /// * `persistence` - An optional persistent tier
    pub fn new<F>(
        name: &str,
        process: F,
        workers: usize,
        memory_entries: usize,
        persistence: Option<Persistence<T>>,
    ) -> Self
    where
        F: Fn(&Context, &R) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            process: Box::new(process),
            memory: Mutex::new(MemoryCache::new(memory_entries)),
            persistence,
            in_flight: Mutex::new(HashMap::new()),
            workers: WorkerPool::new(workers),
            requests: Default::default(),
        }
    }

    /// Create a request for the value identified by `key`, generated from `payload` on a miss.
    ///
    /// `key` must uniquely identify `payload`.
    pub fn new_request(
        &self,
        ctx: &Context,
        payload: R,
        key: impl Into<String>,
    ) -> Request<'_, R, T> {
        Request {
            cache: self,
            ctx: ctx.clone(),
            payload,
            key: key.into(),
        }
    }

    /// The number of requests which have reached each tier.
    ///
    /// Indexed by [`MEMORY_TIER`], [`PERSISTENT_TIER`] and [`PROCESSOR_TIER`]. The miss rate of the
    /// memory tier, for example, is the number of persistent (or processor) requests divided by the
    /// number of memory requests.
    pub fn requests(&self) -> [usize; 3] {
        [MEMORY_TIER, PERSISTENT_TIER, PROCESSOR_TIER].map(|i| self.requests[i].load(Ordering::SeqCst))
    }

    fn count(&self, tier: usize) {
        self.requests[tier].fetch_add(1, Ordering::SeqCst);
    }

    fn resolve(&self, ctx: &Context, payload: &R, key: &str) -> Result<T, EioError> {
        if ctx.is_cancelled() {
            return Err(EioError::Cancelled(key.to_string()));
        }

        let flight = {
            let mut in_flight = lock(&self.in_flight);
            self.count(MEMORY_TIER);
            if let Some(value) = lock(&self.memory).get(key) {
                debug!("{}: memory hit for {key}", self.name);
                return Ok(value);
            }
            if let Some(flight) = in_flight.get(key) {
                let flight = Arc::clone(flight);
                drop(in_flight);
                debug!("{}: waiting on running computation for {key}", self.name);
                return flight.wait();
            }
            let flight = Arc::new(InFlight::new());
            in_flight.insert(key.to_string(), Arc::clone(&flight));
            flight
        };

        let leader = Leader {
            cache: self,
            key,
            flight,
            finished: false,
        };
        let result = self.fetch_or_process(ctx, payload, key);
        leader.finish(&result);
        result
    }

    fn fetch_or_process(&self, ctx: &Context, payload: &R, key: &str) -> Result<T, EioError> {
        if let Some(persistence) = &self.persistence {
            self.count(PERSISTENT_TIER);
            match persistence.load(key) {
                Ok(Some(value)) => {
                    debug!("{}: persistent hit for {key}", self.name);
                    return Ok(value);
                }
                Ok(None) => {}
                Err(err) => warn!(
                    "{}: could not read {key} from persistent cache; regenerating: {err:#}",
                    self.name
                ),
            }
        }

        let _permit = self.workers.acquire();
        self.count(PROCESSOR_TIER);
        debug!("{}: generating {key}", self.name);
        let value = (self.process)(ctx, payload).map_err(|err| computation_error(key, err))?;

        if let Some(persistence) = &self.persistence {
            persistence
                .save(key, &value)
                .map_err(|err| computation_error(key, err))?;
        }
        Ok(value)
    }
}

fn computation_error(key: &str, err: anyhow::Error) -> EioError {
    EioError::Computation(ComputationError::new(key, err))
}

/// A pending request for a value from a [`RequestCache`]
pub struct Request<'a, R, T> {
    cache: &'a RequestCache<R, T>,
    ctx: Context,
    payload: R,
    key: String,
}

impl<R, T: Clone> Request<'_, R, T> {
    /// The key identifying this request
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Block until the value is available, then return it
    pub fn result(self) -> Result<T> {
        Ok(self.cache.resolve(&self.ctx, &self.payload, &self.key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::store::DiskStore;
    use super::*;
    use crate::error::error_kind;
    use ndarray::Array1;
    use anyhow::{Context as _, bail};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn counting_cache(
        calls: &Arc<AtomicUsize>,
        memory_entries: usize,
    ) -> RequestCache<u32, u32> {
        let calls = Arc::clone(calls);
        RequestCache::new(
            "test",
            move |_ctx: &Context, x: &u32| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(x * 2)
            },
            1,
            memory_entries,
            None,
        )
    }

    #[test]
    fn test_deduplicate_concurrent_requests() {
        const N: usize = 8;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = RequestCache::new(
            "test",
            move |_ctx: &Context, x: &u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(200));
                Ok(x + 1)
            },
            4,
            10,
            None,
        );
        let barrier = Barrier::new(N);
        let ctx = Context::background();
        let results: Vec<u32> = thread::scope(|s| {
            let handles: Vec<_> = (0..N)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.new_request(&ctx, 41, "key").result().unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| *r == 42));
        assert_eq!(results.len(), N);
    }

    #[test]
    fn test_failure_shared_but_not_cached() {
        const N: usize = 4;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache: RequestCache<(), u32> = RequestCache::new(
            "test",
            move |_ctx: &Context, _: &()| {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(200));
                if call == 0 {
                    bail!("transient failure");
                }
                Ok(7)
            },
            1,
            10,
            None,
        );
        let barrier = Barrier::new(N);
        let ctx = Context::background();
        let errors: Vec<anyhow::Error> = thread::scope(|s| {
            let handles: Vec<_> = (0..N)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache
                            .new_request(&ctx, (), "key")
                            .result()
                            .unwrap_err()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for err in &errors {
            assert_eq!(format!("{err:#}"), "computing key: transient failure");
            assert!(matches!(error_kind(err), Some(EioError::Computation(_))));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The failure was not cached, so the value is recomputed
        assert_eq!(cache.new_request(&ctx, (), "key").result().unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_keeps_cause() {
        let cache: RequestCache<(), u32> = RequestCache::new(
            "test",
            |_ctx: &Context, _: &()| {
                Err(EioError::not_found("population", "Martian")).context("Reading surrogate")
            },
            1,
            10,
            None,
        );
        let err = cache
            .new_request(&Context::background(), (), "key")
            .result()
            .unwrap_err();
        assert_eq!(
            format!("{err:#}"),
            "computing key: Reading surrogate: population not found: Martian"
        );
        assert_eq!(
            error_kind(&err),
            Some(&EioError::not_found("population", "Martian"))
        );
    }

    #[test]
    fn test_memory_hit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(&calls, 10);
        let ctx = Context::background();
        assert_eq!(cache.new_request(&ctx, 2, "2").result().unwrap(), 4);
        assert_eq!(cache.new_request(&ctx, 2, "2").result().unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.requests(), [2, 0, 1]);
    }

    #[test]
    fn test_memory_evicts_least_recently_used() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(&calls, 2);
        let ctx = Context::background();
        for x in [1, 2, 1, 3] {
            cache.new_request(&ctx, x, x.to_string()).result().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // 1 was used more recently than 2, so 2 was evicted
        cache.new_request(&ctx, 1, "1").result().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        cache.new_request(&ctx, 2, "2").result().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_cancelled_context_not_dispatched() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(&calls, 2);
        let ctx = Context::background();
        ctx.cancel();
        let err = cache.new_request(&ctx, 1, "1").result().unwrap_err();
        assert_eq!(error_kind(&err), Some(&EioError::Cancelled("1".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_worker_limit() {
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));
        let (r, m) = (Arc::clone(&running), Arc::clone(&max_running));
        let cache = RequestCache::new(
            "test",
            move |_ctx: &Context, x: &u32| {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                r.fetch_sub(1, Ordering::SeqCst);
                Ok(*x)
            },
            1,
            10,
            None,
        );
        let ctx = Context::background();
        thread::scope(|s| {
            for x in 0..4_u32 {
                let (cache, ctx) = (&cache, &ctx);
                s.spawn(move || cache.new_request(ctx, x, x.to_string()).result().unwrap());
            }
        });
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_persistent_tier() {
        let dir = tempdir().unwrap();
        let make_cache = |calls: &Arc<AtomicUsize>| {
            let calls = Arc::clone(calls);
            RequestCache::new(
                "test",
                move |_ctx: &Context, n: &usize| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(Array1::from_elem(*n, 0.1)))
                },
                1,
                1,
                Some(Persistence::new(Arc::new(
                    DiskStore::new(dir.path()).unwrap(),
                ))),
            )
        };
        let ctx = Context::background();

        let calls = Arc::new(AtomicUsize::new(0));
        let first = make_cache(&calls);
        let value = first.new_request(&ctx, 3, "vec3").result().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("vec3.dat").is_file());

        // A new cache (e.g. after a restart) finds the value on disk
        let calls2 = Arc::new(AtomicUsize::new(0));
        let second = make_cache(&calls2);
        let restored = second.new_request(&ctx, 3, "vec3").result().unwrap();
        assert_eq!(calls2.load(Ordering::SeqCst), 0);
        assert_eq!(restored, value);
        assert_eq!(second.requests(), [1, 1, 0]);
    }

    #[test]
    fn test_corrupt_persistent_value_regenerated() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("bad.dat"), b"junk").unwrap();
        let cache = RequestCache::new(
            "test",
            |_ctx: &Context, _: &()| Ok(Arc::new(Array1::from_vec(vec![1.0, 2.0]))),
            1,
            1,
            Some(Persistence::new(Arc::new(
                DiskStore::new(dir.path()).unwrap(),
            ))),
        );
        let value = cache
            .new_request(&Context::background(), (), "bad")
            .result()
            .unwrap();
        assert_eq!(value.to_vec(), vec![1.0, 2.0]);
        assert_eq!(cache.requests(), [1, 1, 1]);
    }
}
