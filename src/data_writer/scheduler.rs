//! Bounded work queue shared by the submitting thread and the compression workers.
//!
//! All shared state lives in one [`State`] behind a single mutex. `queue_cond` wakes workers
//! when a unit is queued or on shutdown, `done_cond` wakes the submitter whenever a unit has
//! been written or an error was recorded.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{trace, warn};

use super::block::Block;
use super::config::DataWriterConfig;
use super::dedup::{DedupKey, DedupTable};
use super::hooks::WriterHooks;
use super::table::{BlockLocation, BlockTable, FragmentLocation, FragmentTable};
use super::worker;
use super::WriterStats;
use crate::compressors::Compress;
use crate::error::{Error, Result};
use crate::fragments::FragmentEntry;

pub(crate) struct State<W> {
    pub queue: VecDeque<Block>,
    pub done: BTreeMap<u64, Block>,
    pub enqueue_id: u64,
    pub dequeue_id: u64,
    pub backlog: usize,
    pub status: Option<Error>,
    pub shutdown: bool,

    pub output: Option<W>,
    /// Offset the next append lands at
    pub offset: u64,
    pub device_block_size: u64,
    pub hooks: Arc<dyn WriterHooks>,

    pub blocks: BlockTable,
    pub block_dedup: DedupTable<BlockLocation>,
    /// Blocks submitted but not written yet, by content: table row and sequence id
    pub blocks_in_flight: HashMap<DedupKey, (usize, u64)>,
    pub fragment_blocks: Vec<FragmentEntry>,
    pub fragments: FragmentTable,
    pub fragment_dedup: DedupTable<FragmentLocation>,
    pub stats: WriterStats,
}

impl<W> State<W> {
    fn new(output: W, offset: u64, device_block_size: u64, hooks: Arc<dyn WriterHooks>) -> Self {
        Self {
            queue: VecDeque::new(),
            done: BTreeMap::new(),
            enqueue_id: 0,
            dequeue_id: 0,
            backlog: 0,
            status: None,
            shutdown: false,
            output: Some(output),
            offset,
            device_block_size,
            hooks,
            blocks: BlockTable::default(),
            block_dedup: DedupTable::new(),
            blocks_in_flight: HashMap::new(),
            fragment_blocks: Vec::new(),
            fragments: FragmentTable::default(),
            fragment_dedup: DedupTable::new(),
            stats: WriterStats::default(),
        }
    }

    pub fn check_status(&self) -> Result<()> {
        match &self.status {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Records `err` unless an earlier error is already set.
    pub fn set_status(&mut self, err: Error) {
        match &self.status {
            None => {
                tracing::error!(error = %err, "data writer failed");
                self.status = Some(err);
            }
            Some(first) => warn!(error = %err, first = %first, "discarding later error"),
        }
    }
}

pub(crate) struct Shared<W> {
    pub state: Mutex<State<W>>,
    pub queue_cond: Condvar,
    pub done_cond: Condvar,
}

pub(crate) struct Scheduler<W> {
    shared: Arc<Shared<W>>,
    workers: Vec<JoinHandle<()>>,
    max_backlog: usize,
}

impl<W: Write + Send + 'static> Scheduler<W> {
    pub fn start<C>(
        config: &DataWriterConfig,
        compressor: &C,
        output: W,
        offset: u64,
        hooks: Arc<dyn WriterHooks>,
    ) -> Result<Self>
    where
        C: Compress + Clone + Send + 'static,
    {
        let state = State::new(output, offset, config.device_block_size as u64, hooks);
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            queue_cond: Condvar::new(),
            done_cond: Condvar::new(),
        });

        let mut scheduler = Self {
            shared,
            workers: Vec::with_capacity(config.num_workers),
            max_backlog: config.max_backlog,
        };
        for i in 0..config.num_workers {
            let shared = Arc::clone(&scheduler.shared);
            let compressor = compressor.clone();
            let block_size = config.block_size;
            let handle = thread::Builder::new()
                .name(format!("sqfs-compress-{}", i))
                .spawn(move || worker::run(shared, compressor, block_size))?;
            scheduler.workers.push(handle);
        }
        Ok(scheduler)
    }
}

impl<W> Scheduler<W> {
    pub fn lock(&self) -> MutexGuard<'_, State<W>> {
        self.shared.state.lock()
    }

    pub fn status(&self) -> Result<()> {
        self.lock().check_status()
    }

    /// Queues `block` for compression and returns its sequence id.
    ///
    /// Blocks while the backlog is full. Fails without queueing once an error was recorded.
    pub fn submit(&self, mut block: Block) -> Result<u64> {
        let mut state = self.lock();
        loop {
            state.check_status()?;
            if state.backlog < self.max_backlog {
                break;
            }
            self.shared.done_cond.wait(&mut state);
        }

        block.sequence = state.enqueue_id;
        state.enqueue_id += 1;
        state.backlog += 1;
        state.stats.units_submitted += 1;
        trace!(
            sequence = block.sequence,
            kind = ?block.kind,
            size = block.size,
            backlog = state.backlog,
            "queued block"
        );

        let sequence = block.sequence;
        state.queue.push_back(block);
        self.shared.queue_cond.notify_one();
        Ok(sequence)
    }

    /// Waits until the unit with `sequence` has been written.
    pub fn wait_for(&self, sequence: u64) -> Result<()> {
        let mut state = self.lock();
        loop {
            state.check_status()?;
            if state.dequeue_id > sequence {
                return Ok(());
            }
            self.shared.done_cond.wait(&mut state);
        }
    }

    /// Waits until every submitted unit has been written.
    pub fn wait_idle(&self) -> Result<()> {
        let mut state = self.lock();
        loop {
            state.check_status()?;
            if state.dequeue_id == state.enqueue_id {
                if !state.done.is_empty() {
                    let found = state.done.keys().next().copied().unwrap_or_default();
                    let err = Error::OutOfOrder {
                        expected: state.dequeue_id,
                        found,
                    };
                    state.set_status(err.clone());
                    return Err(err);
                }
                return Ok(());
            }
            self.shared.done_cond.wait(&mut state);
        }
    }

    /// Stops the workers once the queue is drained and joins them.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.lock().shutdown = true;
        self.shared.queue_cond.notify_all();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("compression worker panicked");
            }
        }
    }
}

impl<W> Drop for Scheduler<W> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
