//! # mortise-proto
//!
//! Wire format and JSON control/command envelopes for the Mortise control
//! plane.
//!
//! - [`wire`] — binary report-frame codec and the `AppInfo` payload
//! - [`control`] — JSON `Control` (inbound) and `Command`/`Envelope` (outbound) types

pub mod control;
pub mod wire;

pub use control::{Command, Control, Envelope, SkStgMapUpdate};
pub use wire::{decode_report_entry, encode_report_entry, AppInfo, WireError};
