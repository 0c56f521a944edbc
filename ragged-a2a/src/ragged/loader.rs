use crate::device::Stream;
use crate::error::{RaggedError, Result};
use crate::memory::DeviceBufferPair;
use crate::ragged::index::IndexView;
use crate::ragged::scratch::{SCRATCH_TABLES, ScratchLease};

/// The four offset/size tables of one invocation, read from host scratch.
#[derive(Debug, Clone, Copy)]
pub struct RaggedIndices<'a> {
    pub input_offsets: IndexView<'a>,
    pub send_sizes: IndexView<'a>,
    pub output_offsets: IndexView<'a>,
    pub recv_sizes: IndexView<'a>,
}

/// Copy the metadata tables from device memory into `scratch` and wait for
/// them to land.
///
/// `tables` are, in order: input offsets, send sizes, output offsets, recv
/// sizes. Each goes into its own fixed-stride region of `scratch`. All four
/// copies are enqueued before the single blocking wait.
pub fn load_offsets_and_sizes<'a>(
    stream: &dyn Stream,
    tables: &[DeviceBufferPair],
    scratch: &'a ScratchLease,
) -> Result<RaggedIndices<'a>> {
    if tables.len() != SCRATCH_TABLES {
        return Err(RaggedError::OperandCountMismatch {
            expected: SCRATCH_TABLES,
            actual: tables.len(),
        });
    }

    let rows = scratch.rows();
    for (i, table) in tables.iter().enumerate() {
        let region = scratch
            .region(i)
            .ok_or_else(|| RaggedError::device(format!("scratch region {i} unavailable")))?;
        let bytes = table.size_in_bytes();
        if table.element_count > rows || bytes > region.len_bytes() {
            return Err(RaggedError::BufferSizeMismatch {
                expected: region.len_bytes(),
                actual: bytes,
            });
        }
        let src = table
            .source
            .slice(0, bytes)
            .ok_or(RaggedError::BufferSizeMismatch {
                expected: bytes,
                actual: table.source.len_bytes(),
            })?;
        let dst = region.slice_unchecked(0, bytes);
        unsafe { stream.memcpy_d2h(dst, src)? };
    }

    stream
        .block_host_until_done()
        .map_err(|e| RaggedError::transfer(stream.label(), e.to_string()))?;

    let view = move |i: usize| -> Result<IndexView<'a>> {
        // SAFETY: the stream was synchronized above and the lease is exclusive.
        let bytes = unsafe { scratch.region_bytes(i) }
            .ok_or_else(|| RaggedError::device(format!("scratch region {i} unavailable")))?;
        let table = &tables[i];
        IndexView::new(table.element_type, bytes, table.element_count)
    };

    Ok(RaggedIndices {
        input_offsets: view(0)?,
        send_sizes: view(1)?,
        output_offsets: view(2)?,
        recv_sizes: view(3)?,
    })
}
