use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, warn};

use crate::container::Container;
use crate::error::LakeError;
use crate::traits::{Pool, ReadSeek, WritablePool};

// ---------------------------------------------------------------------------
// Gates
// ---------------------------------------------------------------------------

/// Per-file completion state. Moves forward only: `Unset -> Claimed -> Set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    /// Nobody has started materializing this file.
    Unset,
    /// A `preload` call owns the copy; others wait for its outcome.
    Claimed,
    /// The file is fully in the cache.
    Set,
}

/// Outcome of trying to claim a gate.
enum Claim {
    /// The caller owns the copy and must report back through `complete`.
    Acquired,
    /// The file is already in the cache.
    Done,
}

struct GateState {
    gates:    Vec<Gate>,
    shutdown: Option<Arc<LakeError>>,
}

impl GateState {
    /// `None` while file `index` is still pending.
    ///
    /// Once the coordinator is shut down every gate that is not `Set`
    /// resolves to the shutdown error. A failure shutdown also poisons the
    /// `Set` ones, since a half-filled cache cannot be trusted; a plain
    /// `close` keeps serving what was fully materialized before it.
    fn outcome(&self, index: usize) -> Option<Result<(), LakeError>> {
        let set = self.gates[index] == Gate::Set;
        match &self.shutdown {
            Some(cause) if set && matches!(**cause, LakeError::Closed) => Some(Ok(())),
            Some(cause) => Some(Err(LakeError::Shutdown { cause: Arc::clone(cause) })),
            None if set => Some(Ok(())),
            None => None,
        }
    }
}

/// One-shot gates for every file, plus the shared shutdown cell, all behind
/// a single mutex.
struct GateTable {
    state:    Mutex<GateState>,
    released: Condvar,
}

impl GateTable {
    fn new(len: usize) -> Self {
        Self {
            state: Mutex::new(GateState {
                gates:    vec![Gate::Unset; len],
                shutdown: None,
            }),
            released: Condvar::new(),
        }
    }

    /// Claim file `index`, or wait for whoever already has. A gate that is
    /// already set reports `Done` even after a shutdown.
    fn claim(&self, index: usize) -> Result<Claim, LakeError> {
        let mut state = self.state.lock();
        loop {
            if state.gates[index] == Gate::Set {
                return Ok(Claim::Done);
            }
            if let Some(outcome) = state.outcome(index) {
                return outcome.map(|()| Claim::Done);
            }
            if state.gates[index] == Gate::Unset {
                state.gates[index] = Gate::Claimed;
                return Ok(Claim::Acquired);
            }
            self.released.wait(&mut state);
        }
    }

    /// Block until file `index` is materialized or the table shuts down.
    fn wait(&self, index: usize) -> Result<(), LakeError> {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = state.outcome(index) {
                return outcome;
            }
            self.released.wait(&mut state);
        }
    }

    /// Mark a claimed file as materialized. A shutdown that happened while
    /// the copy was in flight wins over the copy.
    fn complete(&self, index: usize) -> Result<(), LakeError> {
        let mut state = self.state.lock();
        if let Some(cause) = &state.shutdown {
            return Err(LakeError::Shutdown { cause: Arc::clone(cause) });
        }
        state.gates[index] = Gate::Set;
        drop(state);

        self.released.notify_all();
        Ok(())
    }

    /// Record `cause` and release every waiter. Only the first cause sticks.
    fn shutdown(&self, cause: Arc<LakeError>) {
        let mut state = self.state.lock();
        if state.shutdown.is_some() {
            return;
        }
        warn!(cause = %cause, "cache pool shutting down");
        state.shutdown = Some(cause);
        drop(state);

        self.released.notify_all();
    }
}

// ---------------------------------------------------------------------------
// CachePool
// ---------------------------------------------------------------------------

/// Serves files from `cache`, filling it from `source` on demand.
///
/// Each file is copied at most once: [`preload`](CachePool::preload) claims
/// a per-file gate before copying, and concurrent calls for the same index
/// wait for the first one's outcome instead of starting a second copy.
/// Readers block until their file's gate opens.
///
/// Any materialization failure shuts the whole pool down: every pending and
/// future reader, for every index, fails with [`LakeError::Shutdown`]
/// wrapping the first error. There is no retry; build a new pool instead.
///
/// # Sharing
///
/// `preload`, [`open_shared`](CachePool::open_shared), and `size` take
/// `&self`, so the pool can be shared through an `Arc` between a set of
/// preloading workers and any number of readers. The [`Pool`] methods take
/// `&mut self` and are meant for a single owner.
pub struct CachePool {
    container: Arc<Container>,
    source:    Mutex<Box<dyn Pool>>,
    cache:     RwLock<Box<dyn WritablePool>>,
    gates:     GateTable,
}

impl CachePool {
    /// Create a pool reading from `source` and storing in `cache`. Both must
    /// describe the same container.
    pub fn new(
        container: Arc<Container>,
        source: Box<dyn Pool>,
        cache: Box<dyn WritablePool>,
    ) -> Self {
        let gates = GateTable::new(container.files.len());
        Self {
            container,
            source: Mutex::new(source),
            cache: RwLock::new(cache),
            gates,
        }
    }

    /// Copy file `index` from source to cache unless that already happened.
    ///
    /// Returns `Ok` immediately, with no I/O, if the file is already cached,
    /// even when the pool has since shut down. Waits if another caller is
    /// copying it right now. On failure the pool shuts down and the error is
    /// returned wrapped in [`LakeError::Materialize`].
    ///
    /// Copies for different indices are not serialized against each other
    /// by the gates, but they do share the single source pool, which is
    /// locked for the duration of each copy.
    pub fn preload(&self, index: usize) -> Result<(), LakeError> {
        self.container.file(index)?;

        match self.gates.claim(index)? {
            Claim::Done => return Ok(()),
            Claim::Acquired => {}
        }

        match self.materialize(index) {
            Ok(bytes) => {
                debug!(index, bytes, "materialized file");
                self.gates.complete(index)
            }
            Err(err) => {
                let err = Arc::new(err);
                self.gates.shutdown(Arc::clone(&err));
                Err(LakeError::Materialize { index, source: err })
            }
        }
    }

    fn materialize(&self, index: usize) -> Result<u64, LakeError> {
        let path = &self.container.file(index)?.path;
        let mut source = self.source.lock();

        let copied = (|| -> Result<u64, LakeError> {
            let reader = source.reader(index)?;
            let cache = self.cache.read();
            let mut writer = cache.writer(index)?;
            let bytes = io::copy(reader, &mut writer).map_err(LakeError::io("copy", path))?;
            writer.close()?;
            Ok(bytes)
        })();

        let closed = source.close();
        let bytes = copied?;
        closed?;
        Ok(bytes)
    }

    /// Wait for file `index`, then return a reader over its cached copy,
    /// positioned at the start.
    ///
    /// Safe to call from many threads at once, and a caller may hold any
    /// number of these readers. The gate is the only thing it waits on; the
    /// cache lock is taken per `read` or `seek` call, never across calls.
    pub fn open_shared(&self, index: usize) -> Result<SharedReader<'_>, LakeError> {
        self.container.file(index)?;
        self.gates.wait(index)?;

        self.cache.write().reader(index)?;
        Ok(SharedReader { cache: &self.cache, index, pos: 0 })
    }
}

impl Pool for CachePool {
    /// Answered from the container; never waits for materialization.
    fn size(&self, index: usize) -> u64 {
        self.container.files[index].size
    }

    fn reader(&mut self, index: usize) -> Result<&mut dyn Read, LakeError> {
        self.container.file(index)?;
        self.gates.wait(index)?;
        self.cache.get_mut().reader(index)
    }

    fn seekable_reader(&mut self, index: usize) -> Result<&mut dyn ReadSeek, LakeError> {
        self.container.file(index)?;
        self.gates.wait(index)?;
        self.cache.get_mut().seekable_reader(index)
    }

    /// Shut down with [`LakeError::Closed`], releasing anyone still waiting,
    /// then close source and cache. Both are closed even if the first fails;
    /// the first error is returned.
    ///
    /// Files fully materialized before the close stay readable.
    fn close(&mut self) -> Result<(), LakeError> {
        self.gates.shutdown(Arc::new(LakeError::Closed));

        let source = self.source.get_mut().close();
        let cache = self.cache.get_mut().close();
        source.and(cache)
    }
}

// ---------------------------------------------------------------------------
// SharedReader
// ---------------------------------------------------------------------------

/// A reader over one cached file, returned by [`CachePool::open_shared`].
///
/// Tracks its own position and borrows the cache only for the duration of
/// each call, so it never blocks a preload or another reader between calls.
pub struct SharedReader<'a> {
    cache: &'a RwLock<Box<dyn WritablePool>>,
    index: usize,
    pos:   u64,
}

impl SharedReader<'_> {
    /// Run `f` on the cache's reader for this file, moved to our position.
    fn with_inner<T>(
        &mut self,
        f: impl FnOnce(&mut dyn ReadSeek) -> io::Result<T>,
    ) -> io::Result<T> {
        let mut cache = self.cache.write();
        let inner = cache.seekable_reader(self.index).map_err(io::Error::other)?;
        inner.seek(SeekFrom::Start(self.pos))?;

        let out = f(&mut *inner)?;
        self.pos = inner.stream_position()?;
        Ok(out)
    }
}

impl Read for SharedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.with_inner(|inner| inner.read(buf))
    }
}

impl Seek for SharedReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.with_inner(|inner| inner.seek(pos))
    }
}
