//! The ragged all-to-all engine: config resolution, metadata staging, slice
//! planning and the thunk lifecycle that sequences them.

mod config;
mod exchange;
mod index;
mod loader;
mod scratch;
mod thunk;

pub use config::{RAGGED_BUFFER_COUNT, RaggedAllToAllConfig};
pub use exchange::{ExchangeContext, PeerTransfer, plan_peer_transfers, run_ragged_all_to_all};
pub use index::{IndexView, IndexWidth};
pub use loader::{RaggedIndices, load_offsets_and_sizes};
pub use scratch::{HostScratch, HostScratchCache, SCRATCH_SLOT_BYTES, SCRATCH_TABLES, ScratchLease};
pub use thunk::{ExecuteParams, InitializeParams, RaggedAllToAllThunk};
