//! Addressing primitives: positions, ranges and the low level position
//! transformations every operation transform is built from.
//!
//! A [`Position`] is a root name plus a path of offsets. Every element of the
//! path but the last addresses an element (each element occupies one offset);
//! the last element is the offset inside that parent. Text nodes occupy one
//! offset per grapheme cluster, so a position may point inside a text node.

pub mod range;

use crate::ops::{Operation, OperationKind};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use range::Range;

/// Relation between two positions in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionRelation {
    Before,
    After,
    Same,
    /// The positions live in different roots and are not comparable.
    Different,
}

/// Relation between two offset paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRelation {
    Same,
    /// The first path is a proper prefix of the second one.
    Prefix,
    /// The first path extends the second one.
    Extension,
    Different,
}

/// Which neighbour a position (or an insertion point) is attached to when
/// that neighbour is moved somewhere else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stickiness {
    /// Stays where it is and never follows moved content at its boundary.
    #[default]
    None,
    /// Attached to the content before it: follows a moved range that ends here.
    ToPrevious,
    /// Attached to the content after it: follows a moved range that starts here.
    ToNext,
}

pub fn compare_paths(a: &[usize], b: &[usize]) -> PathRelation {
    for (left, right) in a.iter().zip(b) {
        if left != right {
            return PathRelation::Different;
        }
    }
    match a.len().cmp(&b.len()) {
        std::cmp::Ordering::Equal => PathRelation::Same,
        std::cmp::Ordering::Less => PathRelation::Prefix,
        std::cmp::Ordering::Greater => PathRelation::Extension,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub root: String,
    pub path: Vec<usize>,
}

impl Position {
    pub fn new(root: impl Into<String>, path: Vec<usize>) -> Self {
        Self {
            root: root.into(),
            path,
        }
    }

    /// Offset inside the parent.
    pub fn offset(&self) -> usize {
        self.path.last().copied().unwrap_or(0)
    }

    pub fn parent_path(&self) -> &[usize] {
        &self.path[..self.path.len().saturating_sub(1)]
    }

    /// Position of the parent element itself (one level up).
    pub fn parent_position(&self) -> Position {
        Position::new(self.root.clone(), self.parent_path().to_vec())
    }

    pub fn with_offset(&self, offset: usize) -> Position {
        let mut path = self.path.clone();
        if let Some(last) = path.last_mut() {
            *last = offset;
        }
        Position::new(self.root.clone(), path)
    }

    pub fn shifted(&self, shift: usize) -> Position {
        self.with_offset(self.offset() + shift)
    }

    /// Position of the first child slot inside the node that starts here.
    pub fn child(&self, offset: usize) -> Position {
        let mut path = self.path.clone();
        path.push(offset);
        Position::new(self.root.clone(), path)
    }

    pub fn has_same_parent_as(&self, other: &Position) -> bool {
        self.root == other.root && self.parent_path() == other.parent_path()
    }

    pub fn compare(&self, other: &Position) -> PositionRelation {
        if self.root != other.root {
            return PositionRelation::Different;
        }
        for (left, right) in self.path.iter().zip(&other.path) {
            if left < right {
                return PositionRelation::Before;
            }
            if left > right {
                return PositionRelation::After;
            }
        }
        match self.path.len().cmp(&other.path.len()) {
            std::cmp::Ordering::Equal => PositionRelation::Same,
            std::cmp::Ordering::Less => PositionRelation::Before,
            std::cmp::Ordering::Greater => PositionRelation::After,
        }
    }

    pub fn is_before(&self, other: &Position) -> bool {
        self.compare(other) == PositionRelation::Before
    }

    pub fn is_after(&self, other: &Position) -> bool {
        self.compare(other) == PositionRelation::After
    }

    /// Transforms the position by `how_many` offsets inserted at `at`.
    ///
    /// When the insertion happens exactly at this position, `insert_before`
    /// decides whether the inserted content lands before it (the position
    /// shifts) or after it.
    pub fn transformed_by_insertion(
        &self,
        at: &Position,
        how_many: usize,
        insert_before: bool,
    ) -> Position {
        let mut transformed = self.clone();
        if self.root != at.root || self.path.is_empty() || at.path.is_empty() {
            return transformed;
        }
        match compare_paths(at.parent_path(), self.parent_path()) {
            PathRelation::Same => {
                if at.offset() < self.offset() || (at.offset() == self.offset() && insert_before)
                {
                    let last = transformed.path.len() - 1;
                    transformed.path[last] += how_many;
                }
            }
            PathRelation::Prefix => {
                let level = at.path.len() - 1;
                if at.offset() <= self.path[level] {
                    transformed.path[level] += how_many;
                }
            }
            PathRelation::Extension | PathRelation::Different => {}
        }
        transformed
    }

    /// Transforms the position by removing `how_many` offsets starting at
    /// `at`. Returns `None` when the position was inside the removed nodes.
    pub fn transformed_by_deletion(&self, at: &Position, how_many: usize) -> Option<Position> {
        let mut transformed = self.clone();
        if self.root != at.root || self.path.is_empty() || at.path.is_empty() {
            return Some(transformed);
        }
        match compare_paths(at.parent_path(), self.parent_path()) {
            PathRelation::Same => {
                let offset = self.offset();
                if at.offset() < offset {
                    if at.offset() + how_many > offset {
                        return None;
                    }
                    let last = transformed.path.len() - 1;
                    transformed.path[last] -= how_many;
                }
            }
            PathRelation::Prefix => {
                let level = at.path.len() - 1;
                if at.offset() <= self.path[level] {
                    if at.offset() + how_many > self.path[level] {
                        return None;
                    }
                    transformed.path[level] -= how_many;
                }
            }
            PathRelation::Extension | PathRelation::Different => {}
        }
        Some(transformed)
    }

    /// Transforms the position by moving `how_many` offsets from `source` to
    /// `target` (`target` given before the source nodes are detached).
    ///
    /// Positions strictly inside the moved nodes travel with them. A position
    /// on the boundary of the moved range travels when `stickiness` attaches
    /// it to the moved content.
    pub fn transformed_by_move(
        &self,
        source: &Position,
        target: &Position,
        how_many: usize,
        insert_before: bool,
        stickiness: Stickiness,
    ) -> Position {
        let landing = target
            .transformed_by_deletion(source, how_many)
            .unwrap_or_else(|| target.clone());
        let Some(detached) = self.transformed_by_deletion(source, how_many) else {
            return self.combined(source, &landing);
        };
        let at_start = self == source;
        let at_end =
            self.has_same_parent_as(source) && self.offset() == source.offset() + how_many;
        if (at_start && stickiness == Stickiness::ToNext)
            || (at_end && stickiness == Stickiness::ToPrevious)
        {
            return self.combined(source, &landing);
        }
        detached.transformed_by_insertion(&landing, how_many, insert_before)
    }

    /// Relocates a position that lies in (or on the boundary of) nodes moved
    /// from `source` so that it keeps its place relative to them at `target`.
    pub fn combined(&self, source: &Position, target: &Position) -> Position {
        let Some(level) = source.path.len().checked_sub(1) else {
            return target.clone();
        };
        let mut path = target.path.clone();
        if let Some(last) = path.last_mut() {
            *last += self.path[level].saturating_sub(source.offset());
        }
        path.extend_from_slice(&self.path[level + 1..]);
        Position::new(target.root.clone(), path)
    }

    /// Every place this position may end up at after `operation`, ordered
    /// `[ToPrevious, ToNext]`. A single candidate means no ambiguity.
    pub fn transformed_by_operation(&self, operation: &Operation) -> Vec<Position> {
        let previous = self.transformed_by_operation_with(operation, Stickiness::ToPrevious);
        let next = self.transformed_by_operation_with(operation, Stickiness::ToNext);
        if previous == next {
            vec![previous]
        } else {
            vec![previous, next]
        }
    }

    pub fn transformed_by_operation_with(
        &self,
        operation: &Operation,
        stickiness: Stickiness,
    ) -> Position {
        self.transformed_by(&operation.kind, stickiness == Stickiness::ToNext, stickiness)
    }

    pub(crate) fn transformed_by(
        &self,
        operation: &OperationKind,
        insert_before: bool,
        stickiness: Stickiness,
    ) -> Position {
        match operation {
            OperationKind::Insert(insert) => {
                self.transformed_by_insertion(&insert.position, insert.offset_size(), insert_before)
            }
            OperationKind::Move(moved) | OperationKind::Remove(moved) => self.transformed_by_move(
                &moved.source,
                &moved.target,
                moved.how_many,
                insert_before,
                stickiness,
            ),
            OperationKind::Rename(_)
            | OperationKind::Attribute(_)
            | OperationKind::Marker(_)
            | OperationKind::NoOp => self.clone(),
        }
    }

    /// Whether the node addressed by this position is removed together with
    /// `how_many` nodes detached from `at`, either directly or as a
    /// descendant.
    pub fn is_detached_by(&self, at: &Position, how_many: usize) -> bool {
        if self.has_same_parent_as(at) {
            return self.offset() >= at.offset() && self.offset() < at.offset() + how_many;
        }
        self.transformed_by_deletion(at, how_many).is_none()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.root, self.path)
    }
}
