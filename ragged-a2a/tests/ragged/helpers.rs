use ragged_a2a::{
    DataType, DeviceBufferPair, DeviceMemory, EngineConfig, ExecuteParams, HostWorld,
    InitializeParams, PrimitiveType, RaggedAllToAllOp, RaggedAllToAllThunk, Result, Shape,
};

/// Marker written to every output element before an exchange.
pub const UNTOUCHED: f32 = -1.0;

/// An offset/size table stored in "device" memory.
#[derive(Debug, Clone)]
pub struct IndexTable {
    pub dtype: DataType,
    pub bytes: Vec<u8>,
    pub len: usize,
}

impl IndexTable {
    pub fn new(dtype: DataType, values: &[i64]) -> Self {
        let bytes = values
            .iter()
            .flat_map(|&v| match dtype {
                DataType::I32 => (v as i32).to_ne_bytes().to_vec(),
                DataType::U32 => (v as u32).to_ne_bytes().to_vec(),
                DataType::I64 => v.to_ne_bytes().to_vec(),
                DataType::U64 => (v as u64).to_ne_bytes().to_vec(),
                other => panic!("{other} is not an index type"),
            })
            .collect();
        Self {
            dtype,
            bytes,
            len: values.len(),
        }
    }

    pub fn pair(&self) -> DeviceBufferPair {
        let mem = unsafe { DeviceMemory::new(self.bytes.as_ptr() as u64, self.bytes.len()) };
        DeviceBufferPair::new(self.dtype, self.len, mem, mem)
    }
}

/// Everything one rank hands to `execute`.
#[derive(Debug, Clone)]
pub struct RankBuffers {
    pub input: Vec<f32>,
    pub output: Vec<f32>,
    pub input_offsets: IndexTable,
    pub send_sizes: IndexTable,
    pub output_offsets: IndexTable,
    pub recv_sizes: IndexTable,
}

impl RankBuffers {
    /// Payload pair followed by the four tables.
    pub fn device_buffers(&mut self) -> Vec<DeviceBufferPair> {
        let source =
            unsafe { DeviceMemory::new(self.input.as_ptr() as u64, self.input.len() * 4) };
        let destination =
            unsafe { DeviceMemory::new(self.output.as_mut_ptr() as u64, self.output.len() * 4) };
        vec![
            DeviceBufferPair::new(DataType::F32, self.input.len(), source, destination),
            self.input_offsets.pair(),
            self.send_sizes.pair(),
            self.output_offsets.pair(),
            self.recv_sizes.pair(),
        ]
    }
}

/// Element `e` of row `r` sent from rank `p` to rank `q`.
pub fn value(p: usize, q: usize, r: usize, e: usize) -> f32 {
    (p * 1_000_000 + q * 10_000 + r * 100 + e) as f32
}

fn prefix_sums(counts: impl Iterator<Item = usize>) -> Vec<i64> {
    let mut acc = 0i64;
    counts
        .map(|c| {
            let start = acc;
            acc += c as i64;
            start
        })
        .collect()
}

/// An exchange where rank `p` sends `counts[p][q]` rows to rank `q`.
///
/// Senders pack rows by destination, receivers unpack by source, both in
/// rank order.
pub struct Scenario {
    pub counts: Vec<Vec<usize>>,
    pub row_len: usize,
    pub index_type: PrimitiveType,
}

impl Scenario {
    pub fn new(counts: Vec<Vec<usize>>, row_len: usize, index_type: PrimitiveType) -> Self {
        let n = counts.len();
        assert!(counts.iter().all(|row| row.len() == n), "counts must be square");
        Self {
            counts,
            row_len,
            index_type,
        }
    }

    pub fn world_size(&self) -> usize {
        self.counts.len()
    }

    fn rows_sent(&self, p: usize) -> usize {
        self.counts[p].iter().sum()
    }

    fn rows_received(&self, q: usize) -> usize {
        self.counts.iter().map(|row| row[q]).sum()
    }

    /// Largest per-rank row count, used as every rank's leading dimension.
    pub fn capacity_rows(&self) -> usize {
        (0..self.world_size())
            .map(|r| self.rows_sent(r).max(self.rows_received(r)))
            .max()
            .unwrap_or(0)
    }

    pub fn op(&self) -> RaggedAllToAllOp {
        let rows = self.capacity_rows();
        RaggedAllToAllOp::new(
            "ragged-all-to-all",
            Shape::array(PrimitiveType::F32, [rows, self.row_len]),
            Shape::array(PrimitiveType::F32, [rows, self.row_len]),
            Shape::array(self.index_type, [self.world_size()]),
        )
    }

    pub fn thunk(&self, config: EngineConfig) -> RaggedAllToAllThunk {
        RaggedAllToAllThunk::new(&self.op(), config).unwrap()
    }

    pub fn rank_buffers(&self) -> Vec<RankBuffers> {
        let n = self.world_size();
        let dtype = self.index_type.to_data_type().unwrap();
        let cap = self.capacity_rows() * self.row_len;

        (0..n)
            .map(|p| {
                let mut input = vec![0f32; cap];
                let offsets = prefix_sums(self.counts[p].iter().copied());
                for q in 0..n {
                    for r in 0..self.counts[p][q] {
                        for e in 0..self.row_len {
                            let row = offsets[q] as usize + r;
                            input[row * self.row_len + e] = value(p, q, r, e);
                        }
                    }
                }
                let send_sizes: Vec<i64> = self.counts[p].iter().map(|&c| c as i64).collect();
                let recv: Vec<i64> = (0..n).map(|src| self.counts[src][p] as i64).collect();
                let out_offsets = prefix_sums(recv.iter().map(|&c| c as usize));

                RankBuffers {
                    input,
                    output: vec![UNTOUCHED; cap],
                    input_offsets: IndexTable::new(dtype, &offsets),
                    send_sizes: IndexTable::new(dtype, &send_sizes),
                    output_offsets: IndexTable::new(dtype, &out_offsets),
                    recv_sizes: IndexTable::new(dtype, &recv),
                }
            })
            .collect()
    }

    /// What rank `q`'s output must hold after the exchange.
    pub fn expected_output(&self, q: usize) -> Vec<f32> {
        let mut out = vec![UNTOUCHED; self.capacity_rows() * self.row_len];
        let mut row = 0;
        for p in 0..self.world_size() {
            for r in 0..self.counts[p][q] {
                for e in 0..self.row_len {
                    out[row * self.row_len + e] = value(p, q, r, e);
                }
                row += 1;
            }
        }
        out
    }
}

pub fn initialize_all(world: &HostWorld, thunk: &RaggedAllToAllThunk) {
    for p in world.participants() {
        thunk
            .initialize(&InitializeParams {
                executor: p.executor(),
            })
            .unwrap();
    }
}

/// Execute `thunk` on every rank at once, one thread per rank.
pub fn execute_all(
    world: &HostWorld,
    thunk: &RaggedAllToAllThunk,
    ranks: &mut [RankBuffers],
) -> Vec<Result<()>> {
    assert_eq!(world.size(), ranks.len());
    std::thread::scope(|s| {
        let workers: Vec<_> = world
            .participants()
            .iter()
            .zip(ranks.iter_mut())
            .map(|(p, bufs)| s.spawn(move || execute_one(p, thunk, bufs)))
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    })
}

/// Execute `thunk` on a single participant from the calling thread.
pub fn execute_one(
    participant: &ragged_a2a::host::HostParticipant,
    thunk: &RaggedAllToAllThunk,
    bufs: &mut RankBuffers,
) -> Result<()> {
    let buffers = bufs.device_buffers();
    let backend = participant.backend();
    unsafe {
        thunk.execute(&ExecuteParams {
            buffers: &buffers,
            stream: participant.stream(),
            collectives: &*backend,
            comm: &*backend,
        })
    }
}
