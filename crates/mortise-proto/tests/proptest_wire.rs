//! Property-based tests for the report-frame wire codec.

use mortise_core::flow::{ReportDataElem, ReportEntry};
use mortise_proto::wire::{decode_report_entry, encode_report_entry};
use proptest::prelude::*;

fn elem_strategy() -> impl Strategy<Value = ReportDataElem> {
    (any::<u32>(), any::<u32>(), any::<u32>(), any::<u32>()).prop_map(|(rtt, acked_bytes, lost_bytes, timestamp)| {
        ReportDataElem { rtt, acked_bytes, lost_bytes, timestamp }
    })
}

proptest! {
    #[test]
    fn report_entry_roundtrip(
        flow_id in any::<u32>(),
        chunk_id in any::<i16>(),
        elems in prop::collection::vec(elem_strategy(), 0..50),
    ) {
        let chunk_len = elems.len() as u16;
        let entry = ReportEntry { flow_id, chunk_id, chunk_len, data_array: elems };

        let encoded = encode_report_entry(&entry);
        let decoded = decode_report_entry(&encoded).unwrap();

        prop_assert_eq!(decoded.flow_id, entry.flow_id);
        prop_assert_eq!(decoded.chunk_id, entry.chunk_id);
        prop_assert_eq!(decoded.chunk_len, entry.chunk_len);
        prop_assert_eq!(decoded.data_array.len(), entry.data_array.len());
        for (got, want) in decoded.data_array.iter().zip(entry.data_array.iter()) {
            prop_assert_eq!(got.rtt, want.rtt);
            prop_assert_eq!(got.acked_bytes, want.acked_bytes);
            prop_assert_eq!(got.lost_bytes, want.lost_bytes);
            prop_assert_eq!(got.timestamp, want.timestamp);
        }
    }

    #[test]
    fn truncated_body_is_rejected_not_panicked(
        flow_id in any::<u32>(),
        chunk_id in any::<i16>(),
        chunk_len in 1u16..50,
        truncate_to in 0usize..16,
    ) {
        let entry = ReportEntry {
            flow_id,
            chunk_id,
            chunk_len,
            data_array: vec![ReportDataElem { rtt: 1, acked_bytes: 1, lost_bytes: 0, timestamp: 1 }; chunk_len as usize],
        };
        let mut encoded = encode_report_entry(&entry);
        encoded.truncate(8 + truncate_to);
        prop_assert!(decode_report_entry(&encoded).is_err());
    }
}
