use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::error::{RaggedError, Result};
use crate::host::backend::HostBackend;
use crate::host::executor::HostExecutor;
use crate::host::stream::HostStream;
use crate::types::Rank;

static NEXT_COMM_ID: AtomicU64 = AtomicU64::new(1);

/// Device context, stream and communicator of one in-process rank.
#[derive(Debug, Clone)]
pub struct HostParticipant {
    rank: Rank,
    executor: Arc<HostExecutor>,
    stream: Arc<HostStream>,
    backend: Arc<HostBackend>,
}

impl HostParticipant {
    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn executor(&self) -> &HostExecutor {
        &self.executor
    }

    pub fn stream(&self) -> &HostStream {
        &self.stream
    }

    pub fn backend(&self) -> Arc<HostBackend> {
        Arc::clone(&self.backend)
    }
}

/// A fully connected set of in-process participants sharing one
/// communicator. Rank `i` runs on device `i`.
#[derive(Debug)]
pub struct HostWorld {
    comm_id: u64,
    participants: Vec<HostParticipant>,
}

impl HostWorld {
    pub fn new(size: usize, config: EngineConfig) -> Result<Self> {
        if size == 0 {
            return Err(RaggedError::ReplicaGroup(
                "host world needs at least one participant".into(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("ragged-a2a-host")
            .enable_time()
            .build()
            .map_err(|e| RaggedError::device_with_source("failed to start host runtime", e))?;
        let runtime = Arc::new(runtime);

        // senders[src][dst] feeds receivers[dst][src].
        let mut senders: Vec<Vec<mpsc::UnboundedSender<Vec<u8>>>> = Vec::with_capacity(size);
        let mut receivers: Vec<Vec<Option<mpsc::UnboundedReceiver<Vec<u8>>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        for src in 0..size {
            let mut row = Vec::with_capacity(size);
            for dst_inboxes in receivers.iter_mut() {
                let (tx, rx) = mpsc::unbounded_channel();
                row.push(tx);
                dst_inboxes[src] = Some(rx);
            }
            senders.push(row);
        }

        let comm_id = NEXT_COMM_ID.fetch_add(1, Ordering::Relaxed);
        let participants = senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| {
                let rank = rank as Rank;
                let device = u64::from(rank);
                let backend = HostBackend::new(
                    rank,
                    comm_id,
                    outboxes,
                    inboxes.into_iter().flatten().collect(),
                    Arc::clone(&runtime),
                    config.host_timeout,
                );
                HostParticipant {
                    rank,
                    executor: Arc::new(HostExecutor::new(device)),
                    stream: Arc::new(HostStream::new(device)),
                    backend: Arc::new(backend),
                }
            })
            .collect();

        tracing::debug!(size, comm_id, "created host world");
        Ok(Self {
            comm_id,
            participants,
        })
    }

    pub fn comm_id(&self) -> u64 {
        self.comm_id
    }

    pub fn size(&self) -> usize {
        self.participants.len()
    }

    /// Participant of rank `rank`.
    ///
    /// # Panics
    /// If `rank >= self.size()`.
    pub fn participant(&self, rank: usize) -> &HostParticipant {
        &self.participants[rank]
    }

    pub fn participants(&self) -> &[HostParticipant] {
        &self.participants
    }
}
