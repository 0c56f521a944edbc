//! CUDA and NCCL implementations of the ragged all-to-all engine's device,
//! stream and collective seams.
//!
//! Everything here needs the CUDA driver and NCCL at run time and is only
//! compiled with the `cuda` feature.

#[cfg(feature = "cuda")]
pub mod comm;
#[cfg(feature = "cuda")]
pub mod error;
#[cfg(feature = "cuda")]
pub mod executor;
#[cfg(feature = "cuda")]
pub mod group;
#[cfg(feature = "cuda")]
pub mod stream;
#[cfg(feature = "cuda")]
pub mod types;

#[cfg(feature = "cuda")]
pub use comm::{NcclComm, id_from_bytes, id_to_bytes};
#[cfg(feature = "cuda")]
pub use error::{NcclCommError, Result};
#[cfg(feature = "cuda")]
pub use executor::CudaExecutor;
#[cfg(feature = "cuda")]
pub use group::NcclCollectives;
#[cfg(feature = "cuda")]
pub use stream::CudaStreamHandle;
#[cfg(feature = "cuda")]
pub use types::to_nccl_dtype;
