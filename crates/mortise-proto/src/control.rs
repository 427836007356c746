//! JSON control and command envelopes exchanged with the agent.
//!
//! `Control` messages arrive on the inbound socket as short JSON frames
//! (`length < 64`, see [`crate::wire`]) and tell the demultiplexer to
//! create or tear down a per-flow worker. `Command` messages are emitted on
//! the outbound socket by a flow worker to push a freshly-decided trade-off
//! back into the agent's per-socket storage map.

use serde::{Deserialize, Serialize};

use crate::wire::AppInfo;

/// A control message from the agent, tagged by its single variant's name —
/// `{"Connect":{"flow_id":7}}` or `{"Disconnect":{"flow_id":7}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Control {
    Connect { flow_id: u32 },
    Disconnect { flow_id: u32 },
}

impl Control {
    pub fn flow_id(&self) -> u32 {
        match self {
            Control::Connect { flow_id } | Control::Disconnect { flow_id } => *flow_id,
        }
    }
}

/// The well-known storage map name every `SkStgMapUpdate` targets.
pub const SK_STG_MAP_NAME: &str = "sk_stg_map";

/// A per-socket storage map update, the only command this service emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkStgMapUpdate {
    pub map_name: String,
    #[serde(with = "serde_bytes_array")]
    pub val: [u8; 16],
    pub flag: u32,
}

/// A command sent to the agent, tagged by variant name —
/// `{"SkStgMapUpdate":{...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    SkStgMapUpdate(SkStgMapUpdate),
}

/// The outer envelope wrapping a [`Command`] with the flow it targets:
/// `{"Flow":{"flow_id":N,"op":{"SkStgMapUpdate":{...}}}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Envelope {
    Flow { flow_id: u32, op: Command },
}

impl Envelope {
    /// Builds the envelope for a freshly-decided trade-off, encoding it as
    /// the little-endian `AppInfo { req: trade_off, resp: 0 }` payload.
    pub fn sk_stg_map_update(flow_id: u32, trade_off: i64) -> Self {
        let val = AppInfo { req: trade_off as u64, resp: 0 }.to_bytes();
        Envelope::Flow {
            flow_id,
            op: Command::SkStgMapUpdate(SkStgMapUpdate { map_name: SK_STG_MAP_NAME.to_string(), val, flag: 0 }),
        }
    }
}

/// `serde` doesn't derive array (de)serialization as a byte string by
/// default, which would otherwise emit/expect a JSON array of 16 numbers —
/// exactly what the wire format wants, so this just threads through
/// `serde`'s native fixed-size-array support explicitly for clarity.
mod serde_bytes_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 16], serializer: S) -> Result<S::Ok, S::Error> {
        bytes.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 16], D::Error> {
        <[u8; 16]>::deserialize(deserializer)
    }
}
