//! The inbound listener: binds the well-known socket, accepts one handler
//! task per connection, and dispatches each connection's frames by size —
//! short frames are Control JSON, everything else is a binary report.

use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};

use mortise_core::AppType;
use mortise_proto::control::Control;
use mortise_proto::wire::decode_report_entry;

use crate::flow_table::{FlowTable, SpawnWorker};
use crate::framing::read_frame;
use crate::worker;

/// Control frames are JSON and always shorter than this; anything at or
/// above it is treated as a binary data frame. Matches the convention the
/// agent and this service agree on out of band.
const CONTROL_FRAME_MAX_LEN: usize = 64;

/// Binds `inbound_sock` (unlinking any stale socket file first) and accepts
/// connections forever, spawning one handler task per connection. Returns
/// only on a bind error.
pub async fn serve(inbound_sock: &str, outbound_sock: &str, app_type: AppType, table: FlowTable) -> std::io::Result<()> {
    let _ = std::fs::remove_file(inbound_sock);
    let listener = UnixListener::bind(inbound_sock)?;
    tracing::info!(sock = inbound_sock, "listening");

    let spawn: SpawnWorker = {
        let outbound_sock = outbound_sock.to_string();
        Arc::new(move |flow_id, rx| {
            let outbound_sock = outbound_sock.clone();
            tokio::spawn(worker::run(flow_id, app_type, outbound_sock, rx))
        })
    };

    loop {
        let (stream, _addr) = listener.accept().await?;
        let table = table.clone();
        let spawn = spawn.clone();
        tokio::spawn(async move {
            handle_connection(stream, table, spawn).await;
        });
    }
}

/// One accepted connection's frame loop: reads frames until EOF or an
/// unrecoverable framing error, routing each to a control or data handler.
async fn handle_connection(mut stream: UnixStream, table: FlowTable, spawn: SpawnWorker) {
    loop {
        let frame = match read_frame(&mut stream).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(%err, "framing error on inbound connection, closing");
                break;
            }
        };

        if frame.len() < CONTROL_FRAME_MAX_LEN {
            handle_control_frame(&frame, &table, &spawn).await;
        } else {
            handle_data_frame(&frame, &table);
        }
    }
}

/// Parses and applies one Control frame. Malformed JSON or an unrecognised
/// shape is logged and dropped; the connection stays open.
async fn handle_control_frame(payload: &[u8], table: &FlowTable, spawn: &SpawnWorker) {
    let control: Control = match serde_json::from_slice(payload) {
        Ok(control) => control,
        Err(err) => {
            tracing::debug!(%err, "malformed control frame, dropping");
            return;
        }
    };

    match control {
        Control::Connect { flow_id } => table.connect(flow_id, spawn, REPORT_QUEUE_CAPACITY).await,
        Control::Disconnect { flow_id } => table.disconnect(flow_id).await,
    }
}

/// Decodes and routes one Data frame. A malformed body for a known flow is
/// discarded without advancing any flow's state.
fn handle_data_frame(payload: &[u8], table: &FlowTable) {
    match decode_report_entry(payload) {
        Ok(entry) => table.route(entry),
        Err(err) => tracing::debug!(%err, "malformed data frame, dropping"),
    }
}

/// Bound on each flow worker's report queue. Ingress is lossless under
/// normal load; this only guards against a worker wedged on agent I/O.
const REPORT_QUEUE_CAPACITY: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;
    use mortise_core::flow::{ReportDataElem, ReportEntry};
    use mortise_proto::wire::encode_report_entry;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream as ClientStream;

    fn test_sock_path(tag: &str) -> String {
        static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        std::env::temp_dir().join(format!("mortise-demux-test-{tag}-{}-{n}.sock", std::process::id())).display().to_string()
    }

    async fn write_framed(stream: &mut ClientStream, payload: &[u8]) {
        stream.write_all(&(payload.len() as u32).to_be_bytes()).await.unwrap();
        stream.write_all(payload).await.unwrap();
        stream.flush().await.unwrap();
    }

    #[tokio::test]
    async fn connect_then_data_frame_populates_the_flow_table() {
        let inbound = test_sock_path("inbound");
        let outbound = test_sock_path("outbound");
        let _ = std::fs::remove_file(&outbound);
        let agent_listener = UnixListener::bind(&outbound).unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((_s, _)) = agent_listener.accept().await else { break };
            }
        });

        let table = FlowTable::new();
        let inbound_clone = inbound.clone();
        let outbound_clone = outbound.clone();
        let table_clone = table.clone();
        tokio::spawn(async move {
            let _ = serve(&inbound_clone, &outbound_clone, AppType::Streaming, table_clone).await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut client = ClientStream::connect(&inbound).await.unwrap();
        write_framed(&mut client, br#"{"Connect":{"flow_id":7}}"#).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(table.is_live(7));

        let entry = ReportEntry {
            flow_id: 7,
            chunk_id: 0,
            chunk_len: 1,
            data_array: vec![ReportDataElem { rtt: 60_000, acked_bytes: 1448, lost_bytes: 0, timestamp: 1_000_000 }],
        };
        write_framed(&mut client, &encode_report_entry(&entry)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(table.is_live(7));

        write_framed(&mut client, br#"{"Disconnect":{"flow_id":7}}"#).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!table.is_live(7));

        let _ = std::fs::remove_file(&inbound);
        let _ = std::fs::remove_file(&outbound);
    }

    #[tokio::test]
    async fn data_frame_for_unknown_flow_is_dropped_without_panicking() {
        let table = FlowTable::new();
        let entry = ReportEntry { flow_id: 404, chunk_id: 0, chunk_len: 0, data_array: vec![] };
        handle_data_frame(&encode_report_entry(&entry), &table);
        assert!(!table.is_live(404));
    }

    #[tokio::test]
    async fn malformed_control_frame_is_dropped() {
        let table = FlowTable::new();
        let spawn: SpawnWorker = Arc::new(|_flow_id, mut rx| {
            tokio::spawn(async move { while rx.recv().await.is_some() {} })
        });
        handle_control_frame(br#"{"Reconnect":{"flow_id":7}}"#, &table, &spawn).await;
        assert_eq!(table.len(), 0);
    }
}
