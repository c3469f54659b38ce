use causality_rs::{ChangeKind, Job, RowChange, TableRef, UniqueIndex};

/// A change whose causality keys are given directly.
#[allow(dead_code)]
pub fn keyed(keys: &[&str]) -> Job {
    Job::change(RowChange::with_keys(
        TableRef::new("db", "t"),
        ChangeKind::Update,
        keys.iter().copied(),
    ))
}

/// Table `t(id primary key, a unique, b unique)`.
#[allow(dead_code)]
pub fn two_unique_table() -> (TableRef, Vec<String>, Vec<UniqueIndex>) {
    (
        TableRef::new("shop", "t"),
        vec!["id".to_string(), "a".to_string(), "b".to_string()],
        vec![
            UniqueIndex::primary(["id"]),
            UniqueIndex::new("uk_a", ["a"]),
            UniqueIndex::new("uk_b", ["b"]),
        ],
    )
}

#[allow(dead_code)]
pub fn image(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|v| Some(v.to_string())).collect()
}

#[allow(dead_code)]
pub fn with_indexes(mut change: RowChange, indexes: &[UniqueIndex]) -> RowChange {
    for index in indexes {
        change = change.with_unique_index(index.clone());
    }
    change
}

/// Drain a receiver, collecting `(kind, label)` pairs.
#[allow(dead_code)]
pub fn labels(jobs: impl IntoIterator<Item = Job>) -> Vec<(String, Option<String>)> {
    jobs.into_iter()
        .map(|job| {
            (
                job.kind().as_str().to_string(),
                job.queue_key().map(str::to_string),
            )
        })
        .collect()
}
