use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::collective::{Collectives, Communicator};
use crate::device::Stream;
use crate::error::{RaggedError, Result};
use crate::memory::DeviceMemory;
use crate::types::{DataType, Rank};

/// Direction of a point-to-point operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOpKind {
    Send,
    Recv,
}

/// A send or receive as the engine issued it, in issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedOp {
    pub kind: HostOpKind,
    pub peer: Rank,
    pub bytes: usize,
}

#[derive(Debug, Clone, Copy)]
struct PendingOp {
    kind: HostOpKind,
    peer: Rank,
    addr: u64,
    len: usize,
}

#[derive(Debug, Default)]
struct GroupState {
    depth: usize,
    pending: Vec<PendingOp>,
}

/// Fault hooks, each consumed by the next matching call.
#[derive(Debug, Default)]
struct Faults {
    group_start: AtomicBool,
    group_end: AtomicBool,
    send: AtomicBool,
    num_ranks: AtomicBool,
}

/// One participant's view of an in-process communicator.
///
/// Implements both [`Communicator`] and [`Collectives`]. Every ordered pair of
/// ranks has its own FIFO mailbox, so messages between two ranks match in
/// issue order. Inside a group region sends and receives are only recorded;
/// `group_end` posts every send before waiting on any receive, which lets all
/// participants enter the exchange in the same peer order without deadlock.
///
/// Receives block the calling thread on the world's runtime, so the backend
/// must be driven from plain threads rather than from async tasks.
pub struct HostBackend {
    rank: Rank,
    world_size: usize,
    comm_id: u64,
    outboxes: Vec<mpsc::UnboundedSender<Vec<u8>>>,
    inboxes: Vec<tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
    runtime: Arc<Runtime>,
    timeout: Duration,
    group: Mutex<GroupState>,
    issued: Mutex<Vec<IssuedOp>>,
    registered: Mutex<Vec<DeviceMemory>>,
    requires_registration: AtomicBool,
    faults: Faults,
    groups_completed: AtomicUsize,
    groups_aborted: AtomicUsize,
}

impl std::fmt::Debug for HostBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBackend")
            .field("rank", &self.rank)
            .field("world_size", &self.world_size)
            .field("comm_id", &self.comm_id)
            .finish()
    }
}

impl HostBackend {
    pub(crate) fn new(
        rank: Rank,
        comm_id: u64,
        outboxes: Vec<mpsc::UnboundedSender<Vec<u8>>>,
        inboxes: Vec<mpsc::UnboundedReceiver<Vec<u8>>>,
        runtime: Arc<Runtime>,
        timeout: Duration,
    ) -> Self {
        Self {
            rank,
            world_size: outboxes.len(),
            comm_id,
            outboxes,
            inboxes: inboxes.into_iter().map(tokio::sync::Mutex::new).collect(),
            runtime,
            timeout,
            group: Mutex::new(GroupState::default()),
            issued: Mutex::new(Vec::new()),
            registered: Mutex::new(Vec::new()),
            requires_registration: AtomicBool::new(false),
            faults: Faults::default(),
            groups_completed: AtomicUsize::new(0),
            groups_aborted: AtomicUsize::new(0),
        }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Make this backend report that buffers need registration.
    pub fn set_requires_registration(&self, required: bool) {
        self.requires_registration.store(required, Ordering::Release);
    }

    /// Buffers registered so far, in registration order.
    pub fn registered_buffers(&self) -> Vec<DeviceMemory> {
        self.registered.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Sends and receives issued so far, in issue order.
    pub fn issued_ops(&self) -> Vec<IssuedOp> {
        self.issued.lock().map(|i| i.clone()).unwrap_or_default()
    }

    pub fn clear_issued_ops(&self) {
        if let Ok(mut issued) = self.issued.lock() {
            issued.clear();
        }
    }

    /// Nesting depth of the currently open group region.
    pub fn group_depth(&self) -> usize {
        self.group.lock().map(|g| g.depth).unwrap_or(0)
    }

    pub fn groups_completed(&self) -> usize {
        self.groups_completed.load(Ordering::Acquire)
    }

    pub fn groups_aborted(&self) -> usize {
        self.groups_aborted.load(Ordering::Acquire)
    }

    pub fn fail_next_group_start(&self) {
        self.faults.group_start.store(true, Ordering::Release);
    }

    /// Make the next outermost `group_end` fail without launching its batch.
    pub fn fail_next_group_end(&self) {
        self.faults.group_end.store(true, Ordering::Release);
    }

    pub fn fail_next_send(&self) {
        self.faults.send.store(true, Ordering::Release);
    }

    pub fn fail_next_num_ranks(&self) {
        self.faults.num_ranks.store(true, Ordering::Release);
    }

    fn lock_group(&self) -> Result<std::sync::MutexGuard<'_, GroupState>> {
        self.group
            .lock()
            .map_err(|_| RaggedError::LockPoisoned("host group state"))
    }

    fn record(&self, kind: HostOpKind, peer: Rank, bytes: usize) {
        if let Ok(mut issued) = self.issued.lock() {
            issued.push(IssuedOp { kind, peer, bytes });
        }
    }

    fn check_peer(&self, peer: Rank) -> Result<usize> {
        let p = peer as usize;
        if p >= self.world_size {
            return Err(RaggedError::InvalidRank {
                rank: peer,
                world_size: self.world_size as u32,
            });
        }
        Ok(p)
    }

    /// Queue `op` if a group is open, otherwise run it now.
    unsafe fn submit(&self, op: PendingOp) -> Result<()> {
        {
            let mut group = self.lock_group()?;
            if group.depth > 0 {
                group.pending.push(op);
                return Ok(());
            }
        }
        unsafe {
            match op.kind {
                HostOpKind::Send => self.post(&op),
                HostOpKind::Recv => self.deliver(&op),
            }
        }
    }

    unsafe fn post(&self, op: &PendingOp) -> Result<()> {
        let payload = if op.len == 0 {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(op.addr as *const u8, op.len) }.to_vec()
        };
        self.outboxes[op.peer as usize]
            .send(payload)
            .map_err(|_| RaggedError::CollectiveFailed {
                operation: "send",
                rank: op.peer,
                reason: "peer mailbox closed".into(),
            })
    }

    unsafe fn deliver(&self, op: &PendingOp) -> Result<()> {
        let inbox = &self.inboxes[op.peer as usize];
        let received = self.runtime.block_on(async {
            let mut rx = inbox.lock().await;
            tokio::time::timeout(self.timeout, rx.recv()).await
        });

        let payload = match received {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                return Err(RaggedError::CollectiveFailed {
                    operation: "recv",
                    rank: op.peer,
                    reason: "peer mailbox closed".into(),
                });
            }
            Err(_) => {
                return Err(RaggedError::CollectiveFailed {
                    operation: "recv",
                    rank: op.peer,
                    reason: format!("no message within {:?}", self.timeout),
                });
            }
        };

        if payload.len() != op.len {
            return Err(RaggedError::CollectiveFailed {
                operation: "recv",
                rank: op.peer,
                reason: format!("expected {} bytes, got {}", op.len, payload.len()),
            });
        }
        if op.len > 0 {
            unsafe {
                std::ptr::copy_nonoverlapping(payload.as_ptr(), op.addr as *mut u8, op.len);
            }
        }
        Ok(())
    }

    /// Launch a closed group batch: all sends first, then all receives.
    unsafe fn flush(&self, ops: &[PendingOp]) -> Result<()> {
        let sends = ops.iter().filter(|op| op.kind == HostOpKind::Send);
        let recvs = ops.iter().filter(|op| op.kind == HostOpKind::Recv);
        tracing::trace!(
            rank = self.rank,
            sends = sends.clone().count(),
            recvs = recvs.clone().count(),
            "host group launch"
        );
        for op in sends {
            unsafe { self.post(op)? };
        }
        for op in recvs {
            unsafe { self.deliver(op)? };
        }
        Ok(())
    }

    unsafe fn point_to_point(
        &self,
        kind: HostOpKind,
        buf: DeviceMemory,
        dtype: DataType,
        count: usize,
        peer: Rank,
    ) -> Result<()> {
        self.check_peer(peer)?;
        let len = count * dtype.size_in_bytes();
        if len > buf.len_bytes() {
            return Err(RaggedError::BufferSizeMismatch {
                expected: len,
                actual: buf.len_bytes(),
            });
        }
        self.record(kind, peer, len);
        unsafe {
            self.submit(PendingOp {
                kind,
                peer,
                addr: buf.as_u64(),
                len,
            })
        }
    }
}

impl Communicator for HostBackend {
    fn comm_id(&self) -> u64 {
        self.comm_id
    }

    fn num_ranks(&self) -> Result<usize> {
        if self.faults.num_ranks.swap(false, Ordering::AcqRel) {
            return Err(RaggedError::device("injected communicator size failure"));
        }
        Ok(self.world_size)
    }

    unsafe fn send(
        &self,
        buf: DeviceMemory,
        dtype: DataType,
        count: usize,
        peer: Rank,
        _stream: &dyn Stream,
    ) -> Result<()> {
        if self.faults.send.swap(false, Ordering::AcqRel) {
            return Err(RaggedError::CollectiveFailed {
                operation: "send",
                rank: peer,
                reason: "injected send failure".into(),
            });
        }
        unsafe { self.point_to_point(HostOpKind::Send, buf, dtype, count, peer) }
    }

    unsafe fn recv(
        &self,
        buf: DeviceMemory,
        dtype: DataType,
        count: usize,
        peer: Rank,
        _stream: &dyn Stream,
    ) -> Result<()> {
        unsafe { self.point_to_point(HostOpKind::Recv, buf, dtype, count, peer) }
    }
}

impl Collectives for HostBackend {
    fn group_start(&self) -> Result<()> {
        if self.faults.group_start.swap(false, Ordering::AcqRel) {
            return Err(RaggedError::GroupFailed {
                operation: "group_start",
                reason: "injected failure".into(),
            });
        }
        self.lock_group()?.depth += 1;
        Ok(())
    }

    fn group_end(&self) -> Result<()> {
        let ops = {
            let mut group = self.lock_group()?;
            if group.depth == 0 {
                return Err(RaggedError::GroupFailed {
                    operation: "group_end",
                    reason: "no open group".into(),
                });
            }
            group.depth -= 1;
            if group.depth > 0 {
                return Ok(());
            }
            std::mem::take(&mut group.pending)
        };

        if self.faults.group_end.swap(false, Ordering::AcqRel) {
            self.groups_aborted.fetch_add(1, Ordering::AcqRel);
            return Err(RaggedError::GroupFailed {
                operation: "group_end",
                reason: format!("injected failure, {} operations dropped", ops.len()),
            });
        }

        // SAFETY: callers of `send`/`recv` guaranteed the buffers outlive the
        // stream, and the batch runs before this call returns.
        unsafe { self.flush(&ops) }.map_err(|e| RaggedError::GroupFailed {
            operation: "group_end",
            reason: e.to_string(),
        })?;
        self.groups_completed.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn group_abort(&self) -> Result<()> {
        let mut group = self.lock_group()?;
        group.depth = group.depth.saturating_sub(1);
        if group.depth == 0 {
            let dropped = std::mem::take(&mut group.pending).len();
            tracing::debug!(rank = self.rank, dropped, "host group aborted");
        }
        self.groups_aborted.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn requires_buffer_registration(&self) -> bool {
        self.requires_registration.load(Ordering::Acquire)
    }

    unsafe fn register_buffer(&self, comm: &dyn Communicator, buf: DeviceMemory) -> Result<()> {
        if comm.comm_id() != self.comm_id {
            return Err(RaggedError::device(format!(
                "communicator {} does not belong to this backend",
                comm.comm_id()
            )));
        }
        self.registered
            .lock()
            .map_err(|_| RaggedError::LockPoisoned("host registrations"))?
            .push(buf);
        Ok(())
    }
}
