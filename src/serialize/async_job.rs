//! Fire-and-forget background serialization. A caller that has just
//! finished a dominator pass on a large graph can hand it off here and
//! keep processing the next input file while the write happens on a
//! rayon worker.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::concurrency::ConcurrentMap;
use crate::config::SerializerOptions;
use crate::heap::reference_graph::ReferenceGraph;

use super::GraphSerializer;

#[derive(Debug, Clone)]
pub enum JobStatus {
    Pending,
    Running,
    Done { bytes_written: u64 },
    Failed(String),
}

pub struct AsyncSerializer {
    statuses: Arc<ConcurrentMap<u64, JobStatus>>,
    next_id: AtomicU64,
    events: (Sender<u64>, Receiver<u64>),
}

impl Default for AsyncSerializer {
    fn default() -> Self {
        AsyncSerializer {
            statuses: Arc::new(ConcurrentMap::new()),
            next_id: AtomicU64::new(1),
            events: unbounded(),
        }
    }
}

impl AsyncSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `graph` for serialization to `output_path`. Returns
    /// immediately with a job id; [`Self::status`] and
    /// [`Self::wait_for_next`] observe completion.
    pub fn submit(
        &self,
        graph: ReferenceGraph,
        options: SerializerOptions,
        output_path: PathBuf,
        source_filename: String,
        created_millis: u64,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.statuses.insert(id, JobStatus::Pending);

        let statuses = self.statuses.clone();
        let done_tx = self.events.0.clone();

        rayon::spawn(move || {
            statuses.insert(id, JobStatus::Running);
            let result = GraphSerializer::serialize(&graph, &options, &source_filename, created_millis)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    std::fs::write(&output_path, &bytes)
                        .map(|_| bytes.len() as u64)
                        .map_err(|e| e.to_string())
                });
            match result {
                Ok(bytes_written) => statuses.insert(id, JobStatus::Done { bytes_written }),
                Err(message) => statuses.insert(id, JobStatus::Failed(message)),
            }
            let _ = done_tx.send(id);
        });

        id
    }

    pub fn status(&self, id: u64) -> Option<JobStatus> {
        self.statuses.get(&id)
    }

    /// Block until the next job finishes, returning its id. Useful for
    /// a caller that submitted a batch and wants to drain completions.
    pub fn wait_for_next(&self) -> Option<u64> {
        self.events.1.recv().ok()
    }
}
