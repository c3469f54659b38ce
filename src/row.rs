//! # Row Changes
//!
//! Row-level change events as handed over by the upstream decoder, and the
//! derivation of their causality keys. One key is produced per unique index
//! (primary key included) per row image, so a single change may touch several
//! keys and an update contributes the keys of both its before and after image.

use rustc_hash::FxHashSet;
use std::fmt;

/// Fully qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`.`{}`", self.schema, self.name)
    }
}

/// A unique index (or primary key) on the target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIndex {
    pub name: String,
    /// Indexed column names, in index order
    pub columns: Vec<String>,
}

impl UniqueIndex {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn primary<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("PRIMARY", columns)
    }
}

/// Kind of row-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column values of one row image. `None` is SQL NULL.
pub type RowImage = Vec<Option<String>>;

/// A single row-level insert/update/delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowChange {
    pub table: TableRef,
    pub kind: ChangeKind,
    /// Column names, positionally matching the images
    pub columns: Vec<String>,
    pub before: Option<RowImage>,
    pub after: Option<RowImage>,
    pub unique_indexes: Vec<UniqueIndex>,
    /// Keys supplied by a decoder that derives them itself
    explicit_keys: Option<Vec<String>>,
}

impl RowChange {
    pub fn insert(table: TableRef, columns: Vec<String>, after: RowImage) -> Self {
        Self {
            table,
            kind: ChangeKind::Insert,
            columns,
            before: None,
            after: Some(after),
            unique_indexes: Vec::new(),
            explicit_keys: None,
        }
    }

    pub fn update(
        table: TableRef,
        columns: Vec<String>,
        before: RowImage,
        after: RowImage,
    ) -> Self {
        Self {
            table,
            kind: ChangeKind::Update,
            columns,
            before: Some(before),
            after: Some(after),
            unique_indexes: Vec::new(),
            explicit_keys: None,
        }
    }

    pub fn delete(table: TableRef, columns: Vec<String>, before: RowImage) -> Self {
        Self {
            table,
            kind: ChangeKind::Delete,
            columns,
            before: Some(before),
            after: None,
            unique_indexes: Vec::new(),
            explicit_keys: None,
        }
    }

    /// A change whose causality keys were derived upstream.
    pub fn with_keys<I, S>(table: TableRef, kind: ChangeKind, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table,
            kind,
            columns: Vec::new(),
            before: None,
            after: None,
            unique_indexes: Vec::new(),
            explicit_keys: Some(keys.into_iter().map(Into::into).collect()),
        }
    }

    /// Attach a unique index used for key derivation.
    pub fn with_unique_index(mut self, index: UniqueIndex) -> Self {
        self.unique_indexes.push(index);
        self
    }

    /// Keys identifying every unique value combination this change touches.
    ///
    /// Deduplicated, in first-seen order: explicit keys, or else before-image
    /// keys followed by after-image keys. Index tuples containing NULL, and
    /// indexes that cannot be resolved against the image, yield no key. Empty
    /// keys are malformed and dropped, since the empty label means untracked.
    pub fn causality_keys(&self) -> Vec<String> {
        let candidates = match &self.explicit_keys {
            Some(explicit) => explicit.clone(),
            None => {
                let images = [self.before.as_ref(), self.after.as_ref()];
                let mut derived = Vec::new();
                for image in images.into_iter().flatten() {
                    for index in &self.unique_indexes {
                        if let Some(key) = self.index_key(index, image) {
                            derived.push(key);
                        }
                    }
                }
                derived
            }
        };

        let mut seen: FxHashSet<String> = FxHashSet::default();
        candidates
            .into_iter()
            .filter(|key| !key.is_empty() && seen.insert(key.clone()))
            .collect()
    }

    fn index_key(&self, index: &UniqueIndex, image: &RowImage) -> Option<String> {
        if index.columns.is_empty() {
            return None;
        }
        let mut values = Vec::with_capacity(index.columns.len());
        for column in &index.columns {
            let pos = self.columns.iter().position(|c| c == column)?;
            let value = image.get(pos)?.as_deref()?;
            values.push(value);
        }
        Some(format!("{}.{}:{}", self.table, index.name, values.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["id".to_string(), "a".to_string(), "b".to_string()]
    }

    fn row(values: &[Option<&str>]) -> RowImage {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    fn table() -> TableRef {
        TableRef::new("db", "t")
    }

    #[test]
    fn test_insert_keys_per_unique_index() {
        let change = RowChange::insert(table(), columns(), row(&[Some("1"), Some("10"), Some("20")]))
            .with_unique_index(UniqueIndex::primary(["id"]))
            .with_unique_index(UniqueIndex::new("uk_a", ["a"]));

        assert_eq!(
            change.causality_keys(),
            vec!["`db`.`t`.PRIMARY:1", "`db`.`t`.uk_a:10"]
        );
    }

    #[test]
    fn test_update_includes_both_images_once() {
        let change = RowChange::update(
            table(),
            columns(),
            row(&[Some("1"), Some("10"), Some("20")]),
            row(&[Some("1"), Some("11"), Some("20")]),
        )
        .with_unique_index(UniqueIndex::primary(["id"]))
        .with_unique_index(UniqueIndex::new("uk_a", ["a"]));

        assert_eq!(
            change.causality_keys(),
            vec![
                "`db`.`t`.PRIMARY:1",
                "`db`.`t`.uk_a:10",
                "`db`.`t`.uk_a:11"
            ]
        );
    }

    #[test]
    fn test_composite_index_and_null_skip() {
        let change = RowChange::delete(table(), columns(), row(&[Some("1"), None, Some("20")]))
            .with_unique_index(UniqueIndex::new("uk_ab", ["a", "b"]))
            .with_unique_index(UniqueIndex::new("uk_bid", ["b", "id"]));

        assert_eq!(change.causality_keys(), vec!["`db`.`t`.uk_bid:20,1"]);
    }

    #[test]
    fn test_unresolvable_index_yields_no_key() {
        let change = RowChange::insert(table(), columns(), row(&[Some("1")]))
            .with_unique_index(UniqueIndex::new("uk_missing", ["missing"]))
            .with_unique_index(UniqueIndex::new("uk_b", ["b"]));

        assert!(change.causality_keys().is_empty());
    }

    #[test]
    fn test_no_unique_index_is_untracked() {
        let change = RowChange::insert(table(), columns(), row(&[Some("1"), Some("2"), Some("3")]));
        assert!(change.causality_keys().is_empty());
    }

    #[test]
    fn test_explicit_keys_deduplicated() {
        let change = RowChange::with_keys(table(), ChangeKind::Update, ["x", "y", "x"]);
        assert_eq!(change.causality_keys(), vec!["x", "y"]);
    }

    #[test]
    fn test_empty_explicit_keys_are_dropped() {
        let change = RowChange::with_keys(table(), ChangeKind::Update, ["", "x", ""]);
        assert_eq!(change.causality_keys(), vec!["x"]);

        let change = RowChange::with_keys(table(), ChangeKind::Update, [""]);
        assert!(change.causality_keys().is_empty());
    }
}
