//! Binary wire codec for report frames exchanged on the inbound agent
//! socket, plus the little-endian `AppInfo` payload embedded in outbound
//! commands.
//!
//! Report frame layout (all integers little-endian):
//!
//! ```text
//! header: u32 flow_id | i16 chunk_id | u16 chunk_len   (8 bytes)
//! body:   chunk_len * (u32 rtt | u32 acked | u32 lost | u32 timestamp)
//! ```
//!
//! A frame with fewer than 8 header bytes, or a body shorter than
//! `chunk_len * 16` bytes, is rejected rather than partially decoded.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use mortise_core::flow::{ReportDataElem, ReportEntry};
use thiserror::Error;

/// Size in bytes of one report frame's fixed header.
pub const HEADER_LEN: usize = 8;
/// Size in bytes of one encoded [`ReportDataElem`].
pub const ELEM_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("report frame too short: need at least {need} bytes, got {got}")]
    ShortHeader { need: usize, got: usize },
    #[error("report frame body too short: need {need} bytes for {chunk_len} elements, got {got}")]
    ShortBody { need: usize, chunk_len: u16, got: usize },
}

/// Decodes a single report frame's header and `chunk_len` data elements from
/// `buf`. Trailing bytes beyond the declared body length are left in `buf`
/// untouched (the caller is expected to have already sliced off exactly the
/// frame's declared length).
pub fn decode_report_entry(buf: &[u8]) -> Result<ReportEntry, WireError> {
    let mut cur: Bytes = Bytes::copy_from_slice(buf);

    if cur.remaining() < HEADER_LEN {
        return Err(WireError::ShortHeader { need: HEADER_LEN, got: cur.remaining() });
    }
    let flow_id = cur.get_u32_le();
    let chunk_id = cur.get_i16_le();
    let chunk_len = cur.get_u16_le();

    let need = chunk_len as usize * ELEM_LEN;
    if cur.remaining() < need {
        return Err(WireError::ShortBody { need, chunk_len, got: cur.remaining() });
    }

    let mut data_array = Vec::with_capacity(chunk_len as usize);
    for _ in 0..chunk_len {
        let rtt = cur.get_u32_le();
        let acked_bytes = cur.get_u32_le();
        let lost_bytes = cur.get_u32_le();
        let timestamp = cur.get_u32_le();
        data_array.push(ReportDataElem { rtt, acked_bytes, lost_bytes, timestamp });
    }

    Ok(ReportEntry { flow_id, chunk_id, chunk_len, data_array })
}

/// Encodes a report frame's payload (header + elements), the inverse of
/// [`decode_report_entry`]. Used by tests and any synthetic-agent tooling.
pub fn encode_report_entry(entry: &ReportEntry) -> Bytes {
    let mut out = BytesMut::with_capacity(HEADER_LEN + entry.chunk_len as usize * ELEM_LEN);
    out.put_u32_le(entry.flow_id);
    out.put_i16_le(entry.chunk_id);
    out.put_u16_le(entry.chunk_len);
    for elem in entry.data_array.iter().take(entry.chunk_len as usize) {
        out.put_u32_le(elem.rtt);
        out.put_u32_le(elem.acked_bytes);
        out.put_u32_le(elem.lost_bytes);
        out.put_u32_le(elem.timestamp);
    }
    out.freeze()
}

/// The 16-byte payload an `SkStgMapUpdate` command carries: a per-socket
/// storage map entry of two u64 fields, `req` (the new trade-off) and
/// `resp` (always zero — this service never reports a response size back
/// through this channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppInfo {
    pub req: u64,
    pub resp: u64,
}

impl AppInfo {
    /// Encodes as `req.to_le_bytes() ++ resp.to_le_bytes()`.
    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..8].copy_from_slice(&self.req.to_le_bytes());
        out[8..16].copy_from_slice(&self.resp.to_le_bytes());
        out
    }
}
