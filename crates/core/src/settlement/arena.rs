//! Row storage for the settlement form.
//!
//! Payment and return rows are addressed by handles that stay valid for
//! the lifetime of the form. A removed row's handle is never handed out
//! again, so a late response addressed to it cannot land on a different row.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable handle of a form row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowHandle(u32);

impl RowHandle {
    /// Returns the raw handle value.
    #[must_use]
    pub fn into_inner(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Insertion-ordered rows indexed by [`RowHandle`].
#[derive(Debug, Clone)]
pub struct RowArena<T> {
    next: u32,
    rows: BTreeMap<RowHandle, T>,
}

impl<T> Default for RowArena<T> {
    fn default() -> Self {
        Self {
            next: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> RowArena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row and returns its handle.
    pub fn insert(&mut self, row: T) -> RowHandle {
        let handle = RowHandle(self.next);
        self.next += 1;
        self.rows.insert(handle, row);
        handle
    }

    /// Removes a row.
    pub fn remove(&mut self, handle: RowHandle) -> Option<T> {
        self.rows.remove(&handle)
    }

    /// Looks up a row.
    #[must_use]
    pub fn get(&self, handle: RowHandle) -> Option<&T> {
        self.rows.get(&handle)
    }

    /// Looks up a row for modification.
    pub fn get_mut(&mut self, handle: RowHandle) -> Option<&mut T> {
        self.rows.get_mut(&handle)
    }

    /// Returns true if the handle addresses a live row.
    #[must_use]
    pub fn contains(&self, handle: RowHandle) -> bool {
        self.rows.contains_key(&handle)
    }

    /// The first live row in insertion order.
    #[must_use]
    pub fn first(&self) -> Option<(RowHandle, &T)> {
        self.rows.iter().next().map(|(h, r)| (*h, r))
    }

    /// Iterates over live rows in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (RowHandle, &T)> {
        self.rows.iter().map(|(h, r)| (*h, r))
    }

    /// Iterates mutably over live rows in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RowHandle, &mut T)> {
        self.rows.iter_mut().map(|(h, r)| (*h, r))
    }

    /// Iterates over row values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    /// Number of live rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no live rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
