//! The queue core: lifecycle gate, ordered index, blocking hand-off.

use crate::errors::{QueueError, QueueResult};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use store::{Store, StoreMap, StoreResult, StoreSet};
use sync_types::{BlockHash, QueuedBlock};

const BLOCKS_MAP: &str = "blocks";
const HASHES_SET: &str = "hashes";

/// Durable FIFO-by-number block buffer shared between network producers
/// and import consumers.
///
/// Every operation gates on the background initialization started by
/// [`open`](BlockQueue::open). Mutations update the in-memory index and
/// the durable containers in the same critical section and issue exactly
/// one store commit per call, so mutators serialize on the commit.
pub struct BlockQueue {
    shared: Arc<Shared>,
    path: PathBuf,
}

struct Shared {
    state: Mutex<State>,
    /// Signaled when loading finishes (either way) and on close
    ready: Condvar,
    /// Signaled when blocks are inserted and on close
    not_empty: Condvar,
}

enum State {
    Unopened,
    Loading,
    Ready(ReadyQueue),
    Failed(String),
    Closed,
}

/// Queue state once the store is loaded. The sorted map doubles as the
/// block table and the ordered index; the hash set mirrors its contents.
struct ReadyQueue {
    store: Store,
    block_map: StoreMap<u64, QueuedBlock>,
    hash_set: StoreSet<BlockHash>,
    blocks: BTreeMap<u64, QueuedBlock>,
    hashes: HashSet<BlockHash>,
}

impl ReadyQueue {
    fn load(path: &Path) -> StoreResult<Self> {
        let store = Store::open(path, &[BLOCKS_MAP, HASHES_SET])?;
        let block_map = store.map::<u64, QueuedBlock>(BLOCKS_MAP)?;
        let hash_set = store.set::<BlockHash>(HASHES_SET)?;
        let blocks: BTreeMap<u64, QueuedBlock> = block_map.entries()?.into_iter().collect();
        let hashes: HashSet<BlockHash> = hash_set.items()?.into_iter().collect();
        tracing::debug!("block queue loaded with {} pending blocks", blocks.len());
        Ok(Self {
            store,
            block_map,
            hash_set,
            blocks,
            hashes,
        })
    }

    /// Inserts unless the number is already queued. Returns whether the
    /// block landed.
    fn insert(&mut self, block: QueuedBlock) -> QueueResult<bool> {
        if self.blocks.contains_key(&block.number) {
            tracing::trace!("block {} already queued, skipping", block.number);
            return Ok(false);
        }
        self.block_map.put(&block.number, &block)?;
        self.hash_set.insert(&block.hash)?;
        self.hashes.insert(block.hash);
        self.blocks.insert(block.number, block);
        Ok(true)
    }

    /// Removes and returns the lowest-numbered block, if any.
    fn pop_first(&mut self) -> QueueResult<Option<QueuedBlock>> {
        let (number, block) = match self.blocks.pop_first() {
            Some(entry) => entry,
            None => return Ok(None),
        };
        self.block_map.remove(&number)?;
        self.hash_set.remove(&block.hash)?;
        self.hashes.remove(&block.hash);
        Ok(Some(block))
    }
}

impl BlockQueue {
    /// Creates a queue over the store directory at `path`. Nothing is
    /// touched on disk until [`open`](BlockQueue::open) is called.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Unopened),
                ready: Condvar::new(),
                not_empty: Condvar::new(),
            }),
            path: path.into(),
        }
    }

    /// Starts background loading of the store and returns immediately.
    /// A second call while loading or ready is a no-op; calling again
    /// after `close` (or a failed load) restarts loading.
    pub fn open(&self) {
        {
            let mut state = self.shared.state.lock();
            match *state {
                State::Unopened | State::Closed | State::Failed(_) => *state = State::Loading,
                State::Loading | State::Ready(_) => return,
            }
        }

        let shared = Arc::clone(&self.shared);
        let path = self.path.clone();
        thread::spawn(move || {
            let loaded = ReadyQueue::load(&path);
            let mut state = shared.state.lock();
            *state = match loaded {
                Ok(queue) => State::Ready(queue),
                Err(e) => {
                    tracing::warn!("block queue failed to open: {}", e);
                    State::Failed(e.to_string())
                }
            };
            drop(state);
            shared.ready.notify_all();
        });
    }

    /// Waits for any in-flight load, releases the store, and wakes every
    /// blocked caller with [`QueueError::Closed`].
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        while matches!(*state, State::Loading) {
            self.shared.ready.wait(&mut state);
        }
        if let State::Ready(queue) = &*state {
            queue.store.close();
        }
        *state = State::Closed;
        drop(state);
        self.shared.ready.notify_all();
        self.shared.not_empty.notify_all();
    }

    /// Waits until background loading completes. Returns the load error
    /// if the store could not be opened. Unbounded if `open` is never
    /// called; see [`wait_ready_for`](BlockQueue::wait_ready_for).
    pub fn wait_ready(&self) -> QueueResult<()> {
        self.with_ready(|_, _| Ok(()))
    }

    /// Bounded readiness wait; returns `false` if the queue is still not
    /// ready when the timeout elapses.
    pub fn wait_ready_for(&self, timeout: Duration) -> QueueResult<bool> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            match &*state {
                State::Unopened | State::Loading => {
                    if Instant::now() >= deadline {
                        return Ok(false);
                    }
                    self.shared.ready.wait_until(&mut state, deadline);
                }
                State::Ready(_) => return Ok(true),
                State::Failed(reason) => return Err(QueueError::InitFailed(reason.clone())),
                State::Closed => return Err(QueueError::Closed),
            }
        }
    }

    /// Queues one block. A block whose number is already queued is
    /// silently skipped, never overwritten.
    pub fn add(&self, block: QueuedBlock) -> QueueResult<()> {
        self.with_ready(|shared, queue| {
            if queue.insert(block)? {
                queue.store.commit()?;
                shared.not_empty.notify_all();
            }
            Ok(())
        })
    }

    /// Queues a batch as one critical section and one commit; a partially
    /// applied batch is never observable. Duplicate numbers, against
    /// existing state or within the batch itself, keep the first block.
    pub fn add_all(&self, batch: Vec<QueuedBlock>) -> QueueResult<()> {
        self.with_ready(|shared, queue| {
            let mut inserted = 0usize;
            for block in batch {
                if queue.insert(block)? {
                    inserted += 1;
                }
            }
            if inserted > 0 {
                queue.store.commit()?;
                tracing::debug!("queued {} new blocks", inserted);
                shared.not_empty.notify_all();
            }
            Ok(())
        })
    }

    /// Removes and returns the lowest-numbered block, or `None` if the
    /// queue is empty. Never blocks beyond the readiness gate.
    pub fn poll(&self) -> QueueResult<Option<QueuedBlock>> {
        self.with_ready(|_, queue| match queue.pop_first()? {
            Some(block) => {
                queue.store.commit()?;
                Ok(Some(block))
            }
            None => Ok(None),
        })
    }

    /// Returns the lowest-numbered block without removing it.
    pub fn peek(&self) -> QueueResult<Option<QueuedBlock>> {
        self.with_ready(|_, queue| Ok(queue.blocks.values().next().cloned()))
    }

    /// Removes and returns the lowest-numbered block, blocking until one
    /// is available. Each wake re-checks under the lock, so racing
    /// consumers never receive the same block. Returns
    /// [`QueueError::Closed`] if the queue is closed while waiting; use
    /// [`take_for`](BlockQueue::take_for) for a bounded wait.
    pub fn take(&self) -> QueueResult<QueuedBlock> {
        let mut state = self.shared.state.lock();
        loop {
            match &mut *state {
                State::Unopened | State::Loading => self.shared.ready.wait(&mut state),
                State::Ready(queue) => match queue.pop_first()? {
                    Some(block) => {
                        queue.store.commit()?;
                        return Ok(block);
                    }
                    None => self.shared.not_empty.wait(&mut state),
                },
                State::Failed(reason) => return Err(QueueError::InitFailed(reason.clone())),
                State::Closed => return Err(QueueError::Closed),
            }
        }
    }

    /// Bounded [`take`](BlockQueue::take): returns `None` if no block
    /// arrives before the timeout elapses. The timeout covers the
    /// readiness wait as well.
    pub fn take_for(&self, timeout: Duration) -> QueueResult<Option<QueuedBlock>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            match &mut *state {
                State::Unopened | State::Loading => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    self.shared.ready.wait_until(&mut state, deadline);
                }
                State::Ready(queue) => match queue.pop_first()? {
                    Some(block) => {
                        queue.store.commit()?;
                        return Ok(Some(block));
                    }
                    None => {
                        if Instant::now() >= deadline {
                            return Ok(None);
                        }
                        self.shared.not_empty.wait_until(&mut state, deadline);
                    }
                },
                State::Failed(reason) => return Err(QueueError::InitFailed(reason.clone())),
                State::Closed => return Err(QueueError::Closed),
            }
        }
    }

    /// Number of pending blocks.
    pub fn len(&self) -> QueueResult<usize> {
        self.with_ready(|_, queue| Ok(queue.blocks.len()))
    }

    /// Whether no blocks are pending.
    pub fn is_empty(&self) -> QueueResult<bool> {
        self.with_ready(|_, queue| Ok(queue.blocks.is_empty()))
    }

    /// Drops every pending block in one commit. Consumers are not woken.
    pub fn clear(&self) -> QueueResult<()> {
        self.with_ready(|_, queue| {
            queue.block_map.clear()?;
            queue.hash_set.clear()?;
            queue.blocks.clear();
            queue.hashes.clear();
            queue.store.commit()?;
            Ok(())
        })
    }

    /// Returns the candidates whose hash is not already queued, input
    /// order preserved. The download layer uses this to avoid
    /// re-requesting buffered blocks.
    pub fn filter_existing(&self, candidates: &[BlockHash]) -> QueueResult<Vec<BlockHash>> {
        self.with_ready(|_, queue| {
            Ok(candidates
                .iter()
                .filter(|hash| !queue.hashes.contains(hash))
                .copied()
                .collect())
        })
    }

    /// Snapshot of the identifiers currently queued. Detached from the
    /// live set.
    pub fn hashes(&self) -> QueueResult<HashSet<BlockHash>> {
        self.with_ready(|_, queue| Ok(queue.hashes.clone()))
    }

    /// Runs `f` on the ready queue state, waiting out initialization
    /// first. Failed initialization and close are surfaced as errors.
    fn with_ready<R>(
        &self,
        f: impl FnOnce(&Shared, &mut ReadyQueue) -> QueueResult<R>,
    ) -> QueueResult<R> {
        let mut state = self.shared.state.lock();
        loop {
            match &mut *state {
                State::Unopened | State::Loading => self.shared.ready.wait(&mut state),
                State::Ready(queue) => return f(&self.shared, queue),
                State::Failed(reason) => return Err(QueueError::InitFailed(reason.clone())),
                State::Closed => return Err(QueueError::Closed),
            }
        }
    }
}

impl Clone for BlockQueue {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            path: self.path.clone(),
        }
    }
}
