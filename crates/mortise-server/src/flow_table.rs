//! The shared map from flow id to its live worker handle.
//!
//! Guarded by `dashmap`, the same concurrent-map crate the teacher uses for
//! its agent registry (`strata-control`'s `AppState::agents`): each key's
//! shard lock stands in for the per-slot mutex the spec calls for, so
//! replacement, teardown, and data-ingress send all serialize against each
//! other per flow id without a process-wide lock.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mortise_proto::control::Envelope;
use mortise_core::flow::ReportEntry;

/// A command to a running flow worker.
pub enum WorkerMsg {
    Report(ReportEntry),
}

/// A live flow's handle: the channel to feed it reports, and its task.
pub struct FlowHandle {
    pub tx: mpsc::Sender<WorkerMsg>,
    pub task: JoinHandle<()>,
}

/// The flow table: `flow_id -> FlowHandle`.
#[derive(Default, Clone)]
pub struct FlowTable {
    inner: std::sync::Arc<DashMap<u32, FlowHandle>>,
}

/// Function signature a worker task is spawned with: consumes its report
/// queue until the channel closes, emitting outbound envelopes as it goes.
pub type SpawnWorker =
    std::sync::Arc<dyn Fn(u32, mpsc::Receiver<WorkerMsg>) -> JoinHandle<()> + Send + Sync>;

impl FlowTable {
    pub fn new() -> Self {
        FlowTable { inner: std::sync::Arc::new(DashMap::new()) }
    }

    /// Creates a fresh worker for `flow_id`, tearing down any existing one
    /// first (the Connect-on-live-flow replacement case).
    pub async fn connect(&self, flow_id: u32, spawn: &SpawnWorker, channel_capacity: usize) {
        self.disconnect(flow_id).await;
        let (tx, rx) = mpsc::channel(channel_capacity);
        let task = spawn(flow_id, rx);
        self.inner.insert(flow_id, FlowHandle { tx, task });
        tracing::info!(flow_id, "flow connected");
    }

    /// Tears down `flow_id`'s worker, if one is live. Dropping the sender
    /// closes the worker's queue; the worker observes end-of-stream, closes
    /// its agent socket, and exits on its own, so this only waits for that
    /// exit to keep replacement and shutdown race-free.
    pub async fn disconnect(&self, flow_id: u32) {
        if let Some((_, handle)) = self.inner.remove(&flow_id) {
            drop(handle.tx);
            let _ = handle.task.await;
            tracing::info!(flow_id, "flow disconnected");
        }
    }

    /// Routes a data frame to its flow's worker, dropping it silently if the
    /// flow id is unknown or the worker has already exited.
    pub fn route(&self, entry: ReportEntry) {
        let flow_id = entry.flow_id;
        if let Some(handle) = self.inner.get(&flow_id) {
            if handle.tx.try_send(WorkerMsg::Report(entry)).is_err() {
                tracing::debug!(flow_id, "flow queue full or closed, dropping report");
            }
        } else {
            tracing::debug!(flow_id, "report for unknown flow, dropping");
        }
    }

    pub fn is_live(&self, flow_id: u32) -> bool {
        self.inner.contains_key(&flow_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Builds the `SkStgMapUpdate` envelope for a freshly-decided trade-off and
/// serializes it to JSON, the payload a worker writes to its agent socket.
pub fn encode_decision(flow_id: u32, trade_off: i64) -> serde_json::Result<Vec<u8>> {
    let envelope = Envelope::sk_stg_map_update(flow_id, trade_off);
    serde_json::to_vec(&envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_spawn() -> SpawnWorker {
        std::sync::Arc::new(|_flow_id, mut rx: mpsc::Receiver<WorkerMsg>| {
            tokio::spawn(async move { while rx.recv().await.is_some() {} })
        })
    }

    #[tokio::test]
    async fn connect_then_disconnect_clears_the_table() {
        let table = FlowTable::new();
        let spawn = noop_spawn();
        table.connect(7, &spawn, 8).await;
        assert!(table.is_live(7));
        table.disconnect(7).await;
        assert!(!table.is_live(7));
    }

    #[tokio::test]
    async fn connect_on_live_flow_replaces_it_exactly_once() {
        let table = FlowTable::new();
        let spawn = noop_spawn();
        table.connect(7, &spawn, 8).await;
        table.connect(7, &spawn, 8).await;
        assert_eq!(table.len(), 1);
        assert!(table.is_live(7));
    }

    #[tokio::test]
    async fn route_to_unknown_flow_is_a_noop() {
        let table = FlowTable::new();
        let entry = ReportEntry { flow_id: 99, chunk_id: 0, chunk_len: 0, data_array: vec![] };
        table.route(entry); // must not panic
        assert!(!table.is_live(99));
    }

    #[test]
    fn encode_decision_shapes_the_flow_envelope() {
        let bytes = encode_decision(7, 123).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["Flow"]["flow_id"], 7);
    }
}
