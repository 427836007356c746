//! Per-flow worker: a serial actor owning one `FlowCtrl` and one outbound
//! connection to the agent's command socket.
//!
//! `loop { recv report; feed FlowCtrl; maybe send command }` — message
//! passing over a bounded channel gives backpressure from the flow table
//! into this task, and because exactly one task ever touches a given
//! `FlowCtrl`, the numeric core stays lock-free.

use quanta::Instant;
use tokio::net::UnixStream;
use tokio::sync::mpsc;

use mortise_core::{AppType, FlowCtrl};

use crate::flow_table::{encode_decision, WorkerMsg};
use crate::framing::{read_frame, write_frame};

/// Runs one flow's worker loop to completion: connects to the agent's
/// outbound socket, then consumes `rx` until it closes (Disconnect or
/// replacement), feeding every report into `FlowCtrl` and pushing a
/// trade-off decision out whenever one fires.
pub async fn run(flow_id: u32, app_type: AppType, outbound_sock: String, mut rx: mpsc::Receiver<WorkerMsg>) {
    let mut agent = match UnixStream::connect(&outbound_sock).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(flow_id, %err, sock = %outbound_sock, "worker could not reach agent socket, exiting");
            return;
        }
    };

    let mut flow = FlowCtrl::new(app_type);
    let start = Instant::now();

    while let Some(WorkerMsg::Report(entry)) = rx.recv().await {
        let now = start.elapsed().as_secs_f64();
        flow.add_data(&entry, now);

        if let Some(decision) = flow.process() {
            tracing::debug!(flow_id, trade_off = decision.trade_off, "emitting decision");
            if let Err(err) = send_decision(&mut agent, decision.flow_id, decision.trade_off).await {
                tracing::warn!(flow_id, %err, "agent socket failed, worker exiting");
                return;
            }
        }
    }

    tracing::debug!(flow_id, "worker exiting");
}

/// Encodes and writes one `SkStgMapUpdate` command, then reads (and
/// discards) the agent's reply — the reply is never validated, matching
/// the original service's behaviour (see DESIGN.md).
async fn send_decision(stream: &mut UnixStream, flow_id: u32, trade_off: i64) -> anyhow::Result<()> {
    let payload = encode_decision(flow_id, trade_off)?;
    write_frame(stream, &payload).await?;
    let _reply = read_frame(stream).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mortise_core::flow::{ReportDataElem, ReportEntry};
    use tokio::net::UnixListener;

    fn test_sock_path(tag: &str) -> String {
        static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        std::env::temp_dir().join(format!("mortise-worker-test-{tag}-{}-{n}.sock", std::process::id())).display().to_string()
    }

    fn sample(ts_us: u32, rtt_us: u32) -> ReportDataElem {
        ReportDataElem { rtt: rtt_us, acked_bytes: 1448, lost_bytes: 0, timestamp: ts_us }
    }

    #[tokio::test]
    async fn worker_exits_when_queue_closes() {
        let sock_path = test_sock_path("exit");
        let _ = std::fs::remove_file(&sock_path);
        let listener = UnixListener::bind(&sock_path).unwrap();
        let accept_task = tokio::spawn(async move { listener.accept().await });

        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(run(1, AppType::Streaming, sock_path.clone(), rx));
        let _ = accept_task.await;

        drop(tx);
        tokio::time::timeout(std::time::Duration::from_secs(2), handle).await.unwrap().unwrap();
        let _ = std::fs::remove_file(&sock_path);
    }

    #[tokio::test]
    async fn worker_ingests_reports_and_eventually_emits_a_decision() {
        let sock_path = test_sock_path("decide");
        let _ = std::fs::remove_file(&sock_path);
        let listener = UnixListener::bind(&sock_path).unwrap();

        let agent_task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut decisions = Vec::new();
            loop {
                match read_frame(&mut stream).await {
                    Ok(Some(payload)) => {
                        decisions.push(payload);
                        write_frame(&mut stream, b"{}").await.unwrap();
                    }
                    _ => break,
                }
            }
            decisions
        });

        let (tx, rx) = mpsc::channel(256);
        let worker = tokio::spawn(run(3, AppType::Streaming, sock_path.clone(), rx));

        let mut t = 0u32;
        for interval in 0..40 {
            let mut samples = Vec::new();
            for i in 0..10 {
                t += 10_000;
                samples.push(sample(t, 55_000 + (i % 3) * 500));
            }
            let entry = ReportEntry { flow_id: 3, chunk_id: -1, chunk_len: samples.len() as u16, data_array: samples };
            tx.send(WorkerMsg::Report(entry)).await.unwrap();
            let _ = interval;
        }
        drop(tx);

        tokio::time::timeout(std::time::Duration::from_secs(5), worker).await.unwrap().unwrap();
        let decisions = tokio::time::timeout(std::time::Duration::from_secs(5), agent_task).await.unwrap().unwrap();
        assert!(!decisions.is_empty(), "expected at least one decision after 40 intervals");

        let json: serde_json::Value = serde_json::from_slice(&decisions[0]).unwrap();
        let val = json["Flow"]["op"]["SkStgMapUpdate"]["val"].as_array().unwrap();
        let req = u64::from_le_bytes(
            val[0..8].iter().map(|v| v.as_u64().unwrap() as u8).collect::<Vec<_>>().try_into().unwrap(),
        );
        assert!((10..=500).contains(&req));

        let _ = std::fs::remove_file(&sock_path);
    }
}
