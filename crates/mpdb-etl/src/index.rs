//! Relationship indices over row sequences.
//!
//! Indices store row positions rather than rows, so one row vector can back
//! any number of indices.

use std::collections::HashMap;

use crate::reader::{field_str, Row};

/// Parent business id to child row positions, grouped by a foreign-key field.
#[derive(Debug, Clone, Default)]
pub struct OneToManyIndex {
    groups: HashMap<String, Vec<usize>>,
    /// Children whose foreign key is null or missing.
    orphans: Vec<usize>,
}

impl OneToManyIndex {
    #[must_use]
    pub fn build(rows: &[Row], foreign_key: &str) -> Self {
        Self::build_at(rows, 0..rows.len(), foreign_key)
    }

    /// Index only the rows at `positions`. Positions stay relative to `rows`.
    #[must_use]
    pub fn build_at(
        rows: &[Row],
        positions: impl IntoIterator<Item = usize>,
        foreign_key: &str,
    ) -> Self {
        let mut index = Self::default();
        for pos in positions {
            let Some(row) = rows.get(pos) else {
                continue;
            };
            match field_str(row, foreign_key) {
                Some(parent) => index.groups.entry(parent).or_default().push(pos),
                None => index.orphans.push(pos),
            }
        }
        index
    }

    /// Child positions for `parent_id`, in source order.
    #[must_use]
    pub fn children(&self, parent_id: &str) -> &[usize] {
        self.groups.get(parent_id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn orphans(&self) -> &[usize] {
        &self.orphans
    }
}

/// Business id to the position of its row.
///
/// The first row for an id is the one indexed; later rows with the same id
/// are counted as duplicates.
#[derive(Debug, Clone, Default)]
pub struct PointIndex {
    positions: HashMap<String, usize>,
    duplicates: Vec<(String, usize)>,
}

impl PointIndex {
    #[must_use]
    pub fn build(rows: &[Row], id_field: &str) -> Self {
        Self::build_at(rows, 0..rows.len(), id_field)
    }

    /// Index only the rows at `positions`. Positions stay relative to `rows`.
    #[must_use]
    pub fn build_at(
        rows: &[Row],
        positions: impl IntoIterator<Item = usize>,
        id_field: &str,
    ) -> Self {
        let mut index = Self::default();
        for pos in positions {
            let Some(id) = rows.get(pos).and_then(|row| field_str(row, id_field)) else {
                continue;
            };
            if index.positions.contains_key(&id) {
                index.duplicates.push((id, pos));
            } else {
                index.positions.insert(id, pos);
            }
        }
        index
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Later rows that repeat an already-indexed id, as `(id, position)`.
    #[must_use]
    pub fn duplicates(&self) -> &[(String, usize)] {
        &self.duplicates
    }
}

/// Positions of the rows that stand for their business id: the last row for
/// each id, in source order. Rows without an id are left out.
///
/// These are the rows that end up as documents, so roll-ups built over them
/// count each stored record once.
#[must_use]
pub fn latest_positions(rows: &[Row], id_field: &str) -> Vec<usize> {
    let mut last: HashMap<String, usize> = HashMap::new();
    for (pos, row) in rows.iter().enumerate() {
        if let Some(id) = field_str(row, id_field) {
            last.insert(id, pos);
        }
    }
    let mut positions: Vec<usize> = last.into_values().collect();
    positions.sort_unstable();
    positions
}

/// Resolve `id` through `index` to its row.
#[must_use]
pub fn lookup<'a>(rows: &'a [Row], index: &PointIndex, id: &str) -> Option<&'a Row> {
    index.get(id).and_then(|pos| rows.get(pos))
}
