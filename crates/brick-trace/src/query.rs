//! Queries over trace records

use brick_core::Branch;

use crate::record::TraceRecord;

/// Most recent execution of a step: the record with the greatest branch
/// path. Branch counters compare numerically; equal paths resolve to the
/// record appended last.
pub fn get_latest_call(records: &[TraceRecord]) -> Option<&TraceRecord> {
    records
        .iter()
        .max_by(|left, right| left.branches.cmp(&right.branches))
}

/// Records whose branch path starts with `prefix`, in insertion order
pub fn filter_traces_by_call<'r>(records: &'r [TraceRecord], prefix: &[Branch]) -> Vec<&'r TraceRecord> {
    records
        .iter()
        .filter(|record| record.branches.starts_with(prefix))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TraceOutcome;
    use brick_core::BrickId;
    use serde_json::json;
    use uuid::Uuid;

    fn record(branches: Vec<Branch>, output: i64) -> TraceRecord {
        TraceRecord::new(
            Uuid::nil(),
            branches,
            BrickId::from("test/echo"),
            Uuid::nil(),
            json!({}),
            TraceOutcome::output(json!(output), None),
        )
    }

    #[test]
    fn test_latest_of_three_iterations() {
        let records: Vec<_> = (0..3)
            .map(|i| record(vec![Branch::new("body", i)], i as i64))
            .collect();
        assert_eq!(get_latest_call(&records).unwrap().output(), Some(&json!(2)));
    }

    #[test]
    fn test_ties_go_to_later_insertion() {
        let records = vec![
            record(vec![Branch::new("body", 1)], 1),
            record(vec![Branch::new("body", 1)], 2),
        ];
        assert_eq!(get_latest_call(&records).unwrap().output(), Some(&json!(2)));
    }

    #[test]
    fn test_empty_records() {
        assert!(get_latest_call(&[]).is_none());
    }

    #[test]
    fn test_filter_by_call() {
        let records = vec![
            record(vec![Branch::new("body", 0)], 0),
            record(vec![Branch::new("body", 0), Branch::new("try", 0)], 1),
            record(vec![Branch::new("body", 1), Branch::new("try", 0)], 2),
            record(vec![], 3),
        ];

        let first_iteration = filter_traces_by_call(&records, &[Branch::new("body", 0)]);
        assert_eq!(first_iteration.len(), 2);
        assert_eq!(filter_traces_by_call(&records, &[]).len(), 4);
    }
}
