use std::ops::Range;

use crate::collective::{BufferRegistry, Collectives, Communicator};
use crate::config::EngineConfig;
use crate::device::Stream;
use crate::error::{RaggedError, Result};
use crate::memory::{DeviceBufferPair, DeviceMemory};
use crate::ragged::config::RAGGED_BUFFER_COUNT;
use crate::ragged::index::IndexView;
use crate::ragged::loader::{RaggedIndices, load_offsets_and_sizes};
use crate::ragged::scratch::ScratchLease;
use crate::types::Rank;

/// Send and receive ranges exchanged with one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerTransfer {
    pub peer: Rank,
    /// Element range of the payload source sent to `peer`.
    pub send_elements: Range<usize>,
    /// Element range of the payload destination filled by `peer`.
    pub recv_elements: Range<usize>,
    pub send: DeviceMemory,
    pub recv: DeviceMemory,
}

impl PeerTransfer {
    pub fn send_count(&self) -> usize {
        self.send_elements.len()
    }

    pub fn recv_count(&self) -> usize {
        self.recv_elements.len()
    }
}

/// Collaborators an exchange runs against.
#[derive(Clone, Copy)]
pub struct ExchangeContext<'a> {
    pub collectives: &'a dyn Collectives,
    pub comm: &'a dyn Communicator,
    pub stream: &'a dyn Stream,
    pub registry: &'a BufferRegistry,
    pub config: &'a EngineConfig,
}

fn table_entry(table: &IndexView<'_>, name: &str, peer: usize) -> Result<usize> {
    let value = table
        .try_get(peer)
        .ok_or_else(|| RaggedError::InvalidRaggedIndex {
            peer,
            reason: format!("{name} has only {} rows", table.len()),
        })?;
    usize::try_from(value).map_err(|_| RaggedError::InvalidRaggedIndex {
        peer,
        reason: format!("{name} entry is negative ({value})"),
    })
}

fn element_range(
    offset_rows: usize,
    size_rows: usize,
    row_element_size: usize,
    peer: usize,
) -> Result<Range<usize>> {
    let overflow = || RaggedError::InvalidRaggedIndex {
        peer,
        reason: "element range overflows usize".into(),
    };
    let start = offset_rows
        .checked_mul(row_element_size)
        .ok_or_else(overflow)?;
    let len = size_rows.checked_mul(row_element_size).ok_or_else(overflow)?;
    let end = start.checked_add(len).ok_or_else(overflow)?;
    Ok(start..end)
}

/// Byte end of `range`; the start is no larger, so it cannot overflow either.
fn byte_end(range: &Range<usize>, elem: usize, what: &str, peer: usize) -> Result<usize> {
    range
        .end
        .checked_mul(elem)
        .ok_or_else(|| RaggedError::InvalidRaggedIndex {
            peer,
            reason: format!("{what} byte range overflows usize"),
        })
}

fn check_extent(
    range: &Range<usize>,
    end_bytes: usize,
    buf: DeviceMemory,
    what: &str,
    peer: usize,
) -> Result<()> {
    if end_bytes <= buf.len_bytes() {
        return Ok(());
    }
    Err(RaggedError::InvalidRaggedIndex {
        peer,
        reason: format!(
            "{what} elements {}..{} exceed buffer of {} bytes",
            range.start,
            range.end,
            buf.len_bytes()
        ),
    })
}

/// Compute the send and receive slices for every peer in `0..num_ranks`.
///
/// Peer `p` gets `send_sizes[p] * row_element_size` elements of the payload
/// source starting at element `input_offsets[p] * row_element_size`, and
/// fills `recv_sizes[p] * row_element_size` elements of the destination
/// starting at `output_offsets[p] * row_element_size`.
pub fn plan_peer_transfers(
    collectives: &dyn Collectives,
    payload: &DeviceBufferPair,
    row_element_size: usize,
    indices: &RaggedIndices<'_>,
    num_ranks: usize,
    bounds_check: bool,
) -> Result<Vec<PeerTransfer>> {
    let dtype = payload.element_type;
    let elem = dtype.size_in_bytes();
    let mut plan = Vec::with_capacity(num_ranks);

    for peer in 0..num_ranks {
        let input_offset = table_entry(&indices.input_offsets, "input_offsets", peer)?;
        let send_size = table_entry(&indices.send_sizes, "send_sizes", peer)?;
        let output_offset = table_entry(&indices.output_offsets, "output_offsets", peer)?;
        let recv_size = table_entry(&indices.recv_sizes, "recv_sizes", peer)?;

        let send_elements = element_range(input_offset, send_size, row_element_size, peer)?;
        let recv_elements = element_range(output_offset, recv_size, row_element_size, peer)?;

        let send_end = byte_end(&send_elements, elem, "send", peer)?;
        let recv_end = byte_end(&recv_elements, elem, "recv", peer)?;
        if bounds_check {
            check_extent(&send_elements, send_end, payload.source, "send", peer)?;
            check_extent(&recv_elements, recv_end, payload.destination, "recv", peer)?;
        }

        let send = collectives.slice(
            payload.source,
            dtype,
            send_elements.start,
            send_elements.len(),
        );
        let recv = collectives.slice(
            payload.destination,
            dtype,
            recv_elements.start,
            recv_elements.len(),
        );

        tracing::trace!(
            peer,
            send_start = send_elements.start,
            send_len = send_elements.len(),
            recv_start = recv_elements.start,
            recv_len = recv_elements.len(),
            "ragged peer slices"
        );

        plan.push(PeerTransfer {
            peer: peer as Rank,
            send_elements,
            recv_elements,
            send,
            recv,
        });
    }
    Ok(plan)
}

/// Run one ragged all-to-all.
///
/// `buffers` are the payload pair followed by the four metadata tables.
/// Metadata is staged through `scratch`, slices are planned for every peer,
/// and the sends/receives are issued peer-ascending inside one group region.
/// The outcome of `group_end` is the outcome of the exchange.
///
/// # Safety
/// Every buffer in `buffers` must be valid device memory of the size it
/// declares, and the payload buffers must stay valid until the stream has
/// drained.
pub unsafe fn run_ragged_all_to_all(
    ctx: &ExchangeContext<'_>,
    row_element_size: usize,
    buffers: &[DeviceBufferPair],
    scratch: &ScratchLease,
) -> Result<()> {
    if buffers.len() != RAGGED_BUFFER_COUNT {
        return Err(RaggedError::OperandCountMismatch {
            expected: RAGGED_BUFFER_COUNT,
            actual: buffers.len(),
        });
    }
    let payload = &buffers[0];

    if ctx.config.register_buffers {
        unsafe {
            ctx.registry.maybe_register(
                ctx.collectives,
                ctx.comm,
                &[payload.source, payload.destination],
            )?;
        }
    }

    let num_ranks = ctx.comm.num_ranks()?;
    tracing::debug!(
        ordinal = ctx.stream.device_ordinal(),
        device = ctx.stream.device_id(),
        num_ranks,
        "performing ragged all-to-all"
    );

    let indices = load_offsets_and_sizes(ctx.stream, &buffers[1..], scratch)?;
    let plan = plan_peer_transfers(
        ctx.collectives,
        payload,
        row_element_size,
        &indices,
        num_ranks,
        ctx.config.bounds_check,
    )?;

    ctx.collectives.group_start()?;

    if let Err(e) = unsafe { issue_transfers(ctx, payload, &plan) } {
        tracing::warn!(error = %e, "ragged all-to-all failed inside group; closing group");
        if let Err(close) = ctx.collectives.group_abort() {
            tracing::warn!(error = %close, "closing ragged all-to-all group failed");
        }
        return Err(e);
    }

    ctx.collectives.group_end()
}

unsafe fn issue_transfers(
    ctx: &ExchangeContext<'_>,
    payload: &DeviceBufferPair,
    plan: &[PeerTransfer],
) -> Result<()> {
    let dtype = payload.element_type;
    for t in plan {
        unsafe {
            ctx.comm
                .send(t.send, dtype, t.send_count(), t.peer, ctx.stream)?;
            ctx.comm
                .recv(t.recv, dtype, t.recv_count(), t.peer, ctx.stream)?;
        }
    }
    Ok(())
}
