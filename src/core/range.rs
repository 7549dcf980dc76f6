use super::{Position, PositionRelation, Stickiness};
use crate::ops::{Operation, OperationKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A range between two positions of the same root, `start` not after `end`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn collapsed(position: Position) -> Self {
        Self {
            start: position.clone(),
            end: position,
        }
    }

    /// Flat range covering `shift` offsets after `start`.
    pub fn from_position_and_shift(start: Position, shift: usize) -> Self {
        let end = start.shifted(shift);
        Self { start, end }
    }

    pub fn root(&self) -> &str {
        &self.start.root
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Both ends share the same parent.
    pub fn is_flat(&self) -> bool {
        !self.start.path.is_empty() && self.start.has_same_parent_as(&self.end)
    }

    /// Number of offsets covered by a flat range.
    pub fn len(&self) -> usize {
        self.end.offset().saturating_sub(self.start.offset())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `position` is strictly between the range boundaries.
    pub fn contains_position(&self, position: &Position) -> bool {
        position.is_after(&self.start) && position.is_before(&self.end)
    }

    pub fn contains_range(&self, other: &Range) -> bool {
        self.start.root == other.start.root
            && !other.start.is_before(&self.start)
            && !other.end.is_after(&self.end)
    }

    /// Whether the node starting at `position` lies inside this flat range.
    pub fn contains_node_at(&self, position: &Position) -> bool {
        self.is_flat()
            && position.has_same_parent_as(&self.start)
            && position.offset() >= self.start.offset()
            && position.offset() < self.end.offset()
    }

    pub fn intersection(&self, other: &Range) -> Option<Range> {
        if self.start.root != other.start.root {
            return None;
        }
        let start = if self.start.is_before(&other.start) {
            other.start.clone()
        } else {
            self.start.clone()
        };
        let end = if self.end.is_before(&other.end) {
            self.end.clone()
        } else {
            other.end.clone()
        };
        start.is_before(&end).then(|| Range::new(start, end))
    }

    /// Parts of this range not covered by `other`, in document order.
    pub fn difference(&self, other: &Range) -> Vec<Range> {
        if self.intersection(other).is_none() {
            return vec![self.clone()];
        }
        let mut parts = Vec::new();
        if self.start.is_before(&other.start) {
            parts.push(Range::new(self.start.clone(), other.start.clone()));
        }
        if other.end.is_before(&self.end) {
            parts.push(Range::new(other.end.clone(), self.end.clone()));
        }
        parts
    }

    /// Transforms the range by an insertion of `how_many` offsets at `at`.
    ///
    /// Content inserted strictly inside the range becomes part of it, unless
    /// `spread` is set, in which case the range is cut in two around it.
    /// Content inserted at either boundary always stays outside.
    pub fn transformed_by_insertion(
        &self,
        at: &Position,
        how_many: usize,
        spread: bool,
    ) -> Vec<Range> {
        if spread
            && self.is_flat()
            && at.has_same_parent_as(&self.start)
            && at.offset() > self.start.offset()
            && at.offset() < self.end.offset()
        {
            return vec![
                Range::new(self.start.clone(), at.clone()),
                Range::new(at.shifted(how_many), self.end.shifted(how_many)),
            ];
        }
        let start = self.start.transformed_by_insertion(at, how_many, true);
        let end = self.end.transformed_by_insertion(at, how_many, false);
        if end.is_before(&start) {
            return vec![Range::collapsed(start)];
        }
        vec![Range::new(start, end)]
    }

    /// Transforms a flat range by a move of `how_many` offsets from `source`
    /// to `target`. Returns the part that stayed (cut around the landing
    /// point) followed by the part that travelled with the moved nodes.
    pub fn transformed_by_move(
        &self,
        source: &Position,
        target: &Position,
        how_many: usize,
    ) -> Vec<Range> {
        let landing = target
            .transformed_by_deletion(source, how_many)
            .unwrap_or_else(|| target.clone());

        if self.is_flat() && self.start.has_same_parent_as(source) {
            let (start, end) = (self.start.offset(), self.end.offset());
            let (moved_start, moved_end) = (source.offset(), source.offset() + how_many);
            let common_start = start.max(moved_start);
            let common_len = end.min(moved_end).saturating_sub(common_start);
            let rest_len = (end - start).saturating_sub(common_len);

            let mut result = Vec::new();
            if rest_len > 0 {
                let rest_start = if start <= moved_start {
                    start
                } else if start >= moved_end {
                    start - how_many
                } else {
                    moved_start
                };
                let rest = Range::new(
                    self.start.with_offset(rest_start),
                    self.start.with_offset(rest_start + rest_len),
                );
                result.extend(rest.transformed_by_insertion(&landing, how_many, true));
            }
            if common_len > 0 {
                let common = self
                    .start
                    .with_offset(common_start)
                    .combined(source, &landing);
                result.push(Range::from_position_and_shift(common, common_len));
            }
            return result;
        }

        match (
            self.start.transformed_by_deletion(source, how_many),
            self.end.transformed_by_deletion(source, how_many),
        ) {
            (Some(start), Some(end)) => {
                Range::new(start, end).transformed_by_insertion(&landing, how_many, true)
            }
            _ => vec![Range::new(
                self.start.combined(source, &landing),
                self.end.combined(source, &landing),
            )],
        }
    }

    /// Transforms the range as a whole by `operation`, the way live markers
    /// follow the document: content inserted at a boundary stays outside and
    /// a range that loses its shape collapses onto its start.
    pub fn transformed_by_operation(&self, operation: &Operation) -> Range {
        self.transformed_by_kind(&operation.kind)
    }

    pub(crate) fn transformed_by_kind(&self, operation: &OperationKind) -> Range {
        if matches!(
            operation,
            OperationKind::Rename(_)
                | OperationKind::Attribute(_)
                | OperationKind::Marker(_)
                | OperationKind::NoOp
        ) {
            return self.clone();
        }
        if self.is_collapsed() {
            let position = self.start.transformed_by(operation, false, Stickiness::None);
            return Range::collapsed(position);
        }
        let start = self.start.transformed_by(operation, true, Stickiness::None);
        let end = self.end.transformed_by(operation, false, Stickiness::None);
        match start.compare(&end) {
            PositionRelation::Before | PositionRelation::Same => Range::new(start, end),
            PositionRelation::After | PositionRelation::Different => Range::collapsed(start),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
