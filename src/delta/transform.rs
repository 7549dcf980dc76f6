//! Delta transformation.
//!
//! Most delta pairs transform operation by operation. Pairs that change the
//! same element structurally (splitting an element that is being unwrapped,
//! merging an element that is being split, ...) would diverge that way, and
//! are resolved here by dropping one side or by undoing the other side first.

use super::{Delta, DeltaKind};
use crate::core::{Position, Range};
use crate::doc::{Document, Node};
use crate::ops::transform::transform_operation_lists;
use crate::ops::{Operation, OperationKind};

/// Parameters of one transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformContext {
    /// Whether `a` wins symmetric conflicts.
    pub is_strong: bool,
    /// Both deltas come from the same editing session, as when rebasing an
    /// undo. Structural special cases are skipped.
    pub same_session: bool,
    pub graveyard: String,
}

impl TransformContext {
    pub fn new(is_strong: bool, graveyard: impl Into<String>) -> Self {
        Self {
            is_strong,
            same_session: false,
            graveyard: graveyard.into(),
        }
    }

    pub fn for_document(document: &Document, is_strong: bool) -> Self {
        Self::new(is_strong, document.graveyard())
    }

    pub fn same_session(mut self, same_session: bool) -> Self {
        self.same_session = same_session;
        self
    }

    /// Context for transforming in the other direction.
    pub fn flipped(&self) -> Self {
        Self {
            is_strong: !self.is_strong,
            ..self.clone()
        }
    }
}

/// Rewrites `a` so that it applies after `b`. Both must be based on the same
/// document version. The result is based on the version that follows `b`.
///
/// Between different sessions, edits that end up addressing content in the
/// graveyard are dropped: each replica stacks removed content in its own
/// order, and nothing in the graveyard takes part in convergence.
///
/// Two moves that each put the other's nodes inside their own (`x` into `y`
/// while `y` goes into `x`) cannot both happen. The strong side first moves
/// the other nodes back and then performs its move; the weak side is
/// dropped.
pub fn transform(a: &Delta, b: &Delta, context: &TransformContext) -> Vec<Delta> {
    let special = if context.same_session || a.is_compensating() || b.is_compensating() {
        None
    } else {
        special_case(a, b, context)
    };
    let mut deltas = special.unwrap_or_else(|| vec![default_transform(a, b, context)]);
    if !context.same_session {
        deltas = deltas
            .into_iter()
            .map(|delta| without_graveyard_edits(delta, &context.graveyard))
            .collect();
    }
    renumber(deltas, b.next_version())
}

/// Transforms two sequences of deltas based on the same version against each
/// other. Returns `a` rebased past all of `b` and `b` rebased past all of `a`.
pub fn transform_delta_sets(
    a: &[Delta],
    b: &[Delta],
    context: &TransformContext,
) -> (Vec<Delta>, Vec<Delta>) {
    let a_start = start_after(b, a);
    let b_start = start_after(a, b);
    let (a_after, b_after) = transform_sets(a.to_vec(), b.to_vec(), context);
    (renumber(a_after, a_start), renumber(b_after, b_start))
}

/// First version of `deltas` once rebased past `other`.
fn start_after(other: &[Delta], deltas: &[Delta]) -> u64 {
    match (other.last(), deltas.first()) {
        (Some(last), _) => last.next_version(),
        (None, Some(first)) => first.base_version(),
        (None, None) => 0,
    }
}

fn transform_sets(
    a: Vec<Delta>,
    b: Vec<Delta>,
    context: &TransformContext,
) -> (Vec<Delta>, Vec<Delta>) {
    if a.is_empty() || b.is_empty() {
        return (a, b);
    }
    if a.len() == 1 && b.len() == 1 {
        let a_after = transform(&a[0], &b[0], context);
        let b_after = transform(&b[0], &a[0], &context.flipped());
        return (a_after, b_after);
    }
    if a.len() > 1 {
        let mut a = a;
        let a_tail = a.split_off(1);
        let (mut a_head, b_after_head) = transform_sets(a, b, context);
        let (a_tail, b_after_all) = transform_sets(a_tail, b_after_head, context);
        a_head.extend(a_tail);
        return (a_head, b_after_all);
    }
    let mut b = b;
    let b_tail = b.split_off(1);
    let (a_after_head, mut b_head) = transform_sets(a, b, context);
    let (a_after_all, b_tail) = transform_sets(a_after_head, b_tail, context);
    b_head.extend(b_tail);
    (a_after_all, b_head)
}

fn renumber(deltas: Vec<Delta>, base_version: u64) -> Vec<Delta> {
    let mut next = base_version;
    deltas
        .into_iter()
        .map(|delta| {
            let delta = delta.renumbered(next);
            next = delta.next_version();
            delta
        })
        .collect()
}

/// Replaces operations that only touch graveyard content by no-ops.
/// Restoring content from the graveyard is kept.
fn without_graveyard_edits(delta: Delta, graveyard: &str) -> Delta {
    let in_graveyard = |position: &Position| position.root == graveyard;
    let edits_graveyard = |operation: &Operation| match &operation.kind {
        OperationKind::Insert(insert) => in_graveyard(&insert.position),
        OperationKind::Move(moved) | OperationKind::Remove(moved) => {
            in_graveyard(&moved.source) && in_graveyard(&moved.target)
        }
        OperationKind::Rename(rename) => in_graveyard(&rename.position),
        OperationKind::Attribute(attribute) => in_graveyard(&attribute.range.start),
        OperationKind::Marker(_) | OperationKind::NoOp => false,
    };
    if !delta.operations().iter().any(edits_graveyard) {
        return delta;
    }
    tracing::debug!(kind = ?delta.kind(), "graveyard edits dropped");
    let operations = delta
        .operations()
        .iter()
        .map(|operation| {
            if edits_graveyard(operation) {
                Operation::no_op(operation.base_version)
            } else {
                operation.clone()
            }
        })
        .collect();
    delta.with_operations(operations)
}

fn default_transform(a: &Delta, b: &Delta, context: &TransformContext) -> Delta {
    let (operations, _) = transform_operation_lists(a.operations(), b.operations(), context.is_strong);
    a.with_operations(operations)
}

fn special_case(a: &Delta, b: &Delta, context: &TransformContext) -> Option<Vec<Delta>> {
    use DeltaKind as Kind;

    let undo_other_first = || {
        Some(vec![
            b.reversed(&context.graveyard).compensating(),
            a.clone(),
        ])
    };
    let drop_mine = || {
        tracing::debug!(
            a = ?a.kind(),
            b = ?b.kind(),
            "delta dropped in favour of a concurrent structural change"
        );
        Some(vec![a.to_no_op()])
    };

    match (a.kind(), b.kind()) {
        (Kind::Attribute, Kind::Split) => attribute_by_split(a, b, context),
        (Kind::Split, Kind::Attribute) => split_by_attribute(a, b),
        (Kind::Rename, Kind::Split) => rename_by_split(a, b, context),
        (Kind::Split, Kind::Rename) => split_by_rename(a, b),
        (Kind::Split, Kind::Split) => split_by_split(a, b, drop_mine),
        (Kind::Split, Kind::Wrap) => split_by_wrap(a, b),
        (Kind::Wrap, Kind::Split) => wrap_by_split(a, b),

        (Kind::Insert, Kind::Merge) if a.insert_position()? == b.merge_position()? => {
            undo_other_first()
        }
        (Kind::Merge, Kind::Insert) if a.merge_position()? == b.insert_position()? => drop_mine(),
        (Kind::Move | Kind::Remove, Kind::Merge) if touches_merge(&a.moved_range()?, b)? => {
            undo_other_first()
        }
        (Kind::Merge, Kind::Move | Kind::Remove) if touches_merge(&b.moved_range()?, a)? => {
            drop_mine()
        }

        (Kind::Split, Kind::Unwrap) if a.split_element()? == *b.unwrap_position()? => drop_mine(),
        (Kind::Unwrap, Kind::Split) if *a.unwrap_position()? == b.split_element()? => {
            undo_other_first()
        }
        (Kind::Split, Kind::Merge) if a.split_element()? == *b.merge_position()? => drop_mine(),
        (Kind::Merge, Kind::Split) if *a.merge_position()? == b.split_element()? => {
            undo_other_first()
        }
        (Kind::Unwrap, Kind::Merge) if a.unwrap_position()? == b.merge_position()? => {
            undo_other_first()
        }
        (Kind::Merge, Kind::Unwrap) if a.merge_position()? == b.unwrap_position()? => drop_mine(),

        (Kind::Split, Kind::Remove) if removes(b, &a.split_element()?) => drop_mine(),
        (Kind::Unwrap, Kind::Remove) if removes(b, a.unwrap_position()?) => drop_mine(),

        (Kind::Unwrap, Kind::Unwrap) if a.unwrap_position()? == b.unwrap_position()? => drop_mine(),
        (Kind::Merge, Kind::Merge) if a.merge_position()? == b.merge_position()? => drop_mine(),
        _ => None,
    }
}

/// Whether `range` includes the merged element or the one it merges into.
fn touches_merge(range: &Range, merge: &Delta) -> Option<bool> {
    let position = merge.merge_position()?;
    let previous = position.with_offset(position.offset().checked_sub(1)?);
    Some(range.contains_node_at(position) || range.contains_node_at(&previous))
}

/// Whether a removal of `delta` takes the node at `position` with it.
fn removes(delta: &Delta, position: &Position) -> bool {
    delta
        .removals()
        .any(|removed| position.is_detached_by(&removed.source, removed.how_many))
}

/// The insert and move operations of a split that still moves content.
fn split_parts(delta: &Delta) -> Option<(&Operation, &Operation)> {
    delta.split_position()?;
    match delta.operations() {
        [insert, moved] => Some((insert, moved)),
        _ => None,
    }
}

/// The attribute change also reaches the copy a concurrent split creates.
fn attribute_by_split(a: &Delta, b: &Delta, context: &TransformContext) -> Option<Vec<Delta>> {
    let element = b.split_element()?;
    let clone = b.split_clone()?;
    let copy = b.split_copy_position()?;
    let rebased = default_transform(a, b, context);
    let covers_copy = rebased.operations().iter().any(|operation| match &operation.kind {
        OperationKind::Attribute(attribute) => attribute.range.contains_node_at(copy),
        _ => false,
    });
    if covers_copy {
        return Some(vec![rebased]);
    }

    let mut extra = Delta::builder(DeltaKind::Attribute, 0).batch(a.batch());
    let mut has_extra = false;
    for operation in a.operations() {
        if let OperationKind::Attribute(attribute) = &operation.kind
            && attribute.range.contains_node_at(&element)
        {
            let old_value = clone.attributes.get(&attribute.key).cloned();
            if old_value == attribute.new_value {
                continue;
            }
            let range = Range::from_position_and_shift(copy.clone(), 1);
            extra = extra.push(
                Operation::attribute(
                    range,
                    attribute.key.clone(),
                    old_value,
                    attribute.new_value.clone(),
                    0,
                )
                .ok()?,
            );
            has_extra = true;
        }
    }

    let mut deltas = vec![rebased];
    if has_extra {
        deltas.push(extra.build().ok()?);
    }
    Some(deltas)
}

/// The copy inserted by the split takes the attributes set concurrently on
/// the split element.
fn split_by_attribute(a: &Delta, b: &Delta) -> Option<Vec<Delta>> {
    let element = a.split_element()?;
    let (insert, moved) = split_parts(a)?;
    let mut insert = insert.clone();
    let OperationKind::Insert(inserted) = &mut insert.kind else {
        return None;
    };
    let Some(Node::Element(clone)) = inserted.nodes.first_mut() else {
        return None;
    };

    let mut changed = false;
    for operation in b.operations() {
        if let OperationKind::Attribute(attribute) = &operation.kind
            && attribute.range.contains_node_at(&element)
        {
            match &attribute.new_value {
                Some(value) => clone.attributes.insert(attribute.key.clone(), value.clone()),
                None => clone.attributes.remove(&attribute.key),
            };
            changed = true;
        }
    }
    changed.then(|| vec![a.with_operations(vec![insert, moved.clone()])])
}

/// The rename also reaches the copy a concurrent split creates.
fn rename_by_split(a: &Delta, b: &Delta, context: &TransformContext) -> Option<Vec<Delta>> {
    let element = b.split_element()?;
    let clone = b.split_clone()?;
    let copy = b.split_copy_position()?;
    let OperationKind::Rename(rename) = &a.operations().first()?.kind else {
        return None;
    };
    if rename.position != element {
        return None;
    }
    let extra = Delta::rename(copy.clone(), clone.name.clone(), rename.new_name.clone(), 0)
        .ok()?
        .with_batch(a.batch());
    Some(vec![default_transform(a, b, context), extra])
}

fn split_by_rename(a: &Delta, b: &Delta) -> Option<Vec<Delta>> {
    let element = a.split_element()?;
    let OperationKind::Rename(rename) = &b.operations().first()?.kind else {
        return None;
    };
    if rename.position != element {
        return None;
    }
    let (insert, moved) = split_parts(a)?;
    let mut insert = insert.clone();
    if let OperationKind::Insert(inserted) = &mut insert.kind
        && let Some(Node::Element(clone)) = inserted.nodes.first_mut()
    {
        clone.name = rename.new_name.clone();
    }
    Some(vec![a.with_operations(vec![insert, moved.clone()])])
}

/// Two splits of the same element at different offsets both happen; the
/// element ends up in three parts.
fn split_by_split(
    a: &Delta,
    b: &Delta,
    drop_mine: impl FnOnce() -> Option<Vec<Delta>>,
) -> Option<Vec<Delta>> {
    let mine = a.split_position()?;
    let theirs = b.split_position()?;
    if !mine.has_same_parent_as(theirs) {
        return None;
    }
    if mine == theirs {
        return drop_mine();
    }
    let their_copy = b.split_copy_position()?;

    let (insert, moved) = split_parts(a)?;
    let (mut insert, mut moved) = (insert.clone(), moved.clone());
    let (OperationKind::Insert(inserted), OperationKind::Move(content)) =
        (&mut insert.kind, &mut moved.kind)
    else {
        return None;
    };
    if mine.offset() < theirs.offset() {
        // The other copy took everything from their offset on.
        inserted.position = inserted.position.transformed_by_insertion(their_copy, 1, false);
        content.how_many = theirs.offset() - mine.offset();
    } else {
        // This split continues inside the other copy.
        inserted.position = inserted.position.transformed_by_insertion(their_copy, 1, true);
        content.source = their_copy.child(mine.offset() - theirs.offset());
    }
    content.target = inserted.position.child(0);
    Some(vec![a.with_operations(vec![insert, moved])])
}

/// Whether `position` lies inside `range` or on one of its boundaries.
fn within(range: &Range, position: &Position) -> bool {
    range.is_flat()
        && position.has_same_parent_as(&range.start)
        && (range.start.offset()..=range.end.offset()).contains(&position.offset())
}

/// The split element was wrapped concurrently: split it inside the wrapper.
fn split_by_wrap(a: &Delta, b: &Delta) -> Option<Vec<Delta>> {
    let element = a.split_element()?;
    let wrapped = b.wrap_move()?;
    let range = wrapped.source_range();
    if !range.contains_node_at(&element) || !within(&range, a.split_copy_position()?) {
        return None;
    }
    let source = &wrapped.source;
    let target = wrapped.landing();
    let (insert, moved) = split_parts(a)?;
    let (mut insert, mut moved) = (insert.clone(), moved.clone());
    if let OperationKind::Insert(inserted) = &mut insert.kind {
        inserted.position = inserted.position.combined(source, &target);
    }
    if let OperationKind::Move(content) = &mut moved.kind {
        content.source = content.source.combined(source, &target);
        content.target = content.target.combined(source, &target);
    }
    Some(vec![a.with_operations(vec![insert, moved])])
}

/// A concurrent split of a wrapped element adds its copy to the wrapped
/// range.
fn wrap_by_split(a: &Delta, b: &Delta) -> Option<Vec<Delta>> {
    let range = a.wrap_range()?;
    let element = b.split_element()?;
    let copy = b.split_copy_position()?;
    if !range.contains_node_at(&element) || !within(&range, copy) {
        return None;
    }
    let [insert, moved] = a.operations() else {
        return None;
    };
    let (mut insert, mut moved) = (insert.clone(), moved.clone());
    let OperationKind::Insert(wrapper) = &mut insert.kind else {
        return None;
    };
    wrapper.position = wrapper.position.transformed_by_insertion(copy, 1, true);
    if let OperationKind::Move(content) = &mut moved.kind {
        content.how_many += 1;
        content.target = wrapper.position.child(0);
    }
    Some(vec![a.with_operations(vec![insert, moved])])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::{DEFAULT_GRAVEYARD, Element};

    fn pos(path: &[usize]) -> Position {
        Position::new("main", path.to_vec())
    }

    fn context(is_strong: bool) -> TransformContext {
        TransformContext::new(is_strong, DEFAULT_GRAVEYARD)
    }

    #[test]
    fn same_split_twice_is_dropped() {
        let a = Delta::split(pos(&[0, 2]), Element::new("p"), 3, 0).unwrap();
        let b = Delta::split(pos(&[0, 2]), Element::new("p"), 3, 0).unwrap();
        let result = transform(&a, &b, &context(true));
        assert_eq!(result.len(), 1);
        assert!(result[0].is_no_op());
        assert_eq!(result[0].base_version(), 2);
    }

    #[test]
    fn same_session_skips_special_cases() {
        let a = Delta::split(pos(&[0, 2]), Element::new("p"), 3, 0).unwrap();
        let b = Delta::split(pos(&[0, 2]), Element::new("p"), 3, 0).unwrap();
        let result = transform(&a, &b, &context(true).same_session(true));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].kind(), DeltaKind::Split);
    }

    #[test]
    fn earlier_split_stops_at_later_one() {
        let a = Delta::split(pos(&[0, 1]), Element::new("p"), 4, 0).unwrap();
        let b = Delta::split(pos(&[0, 3]), Element::new("p"), 2, 0).unwrap();
        let result = transform(&a, &b, &context(true));
        let OperationKind::Move(moved) = &result[0].operations()[1].kind else {
            panic!("expected a move");
        };
        assert_eq!(moved.source, pos(&[0, 1]));
        assert_eq!(moved.how_many, 2);
    }

    #[test]
    fn flipped_context_inverts_strength_only() {
        let context = context(true).same_session(true);
        let flipped = context.flipped();
        assert!(!flipped.is_strong);
        assert!(flipped.same_session);
        assert_eq!(flipped.graveyard, DEFAULT_GRAVEYARD);
    }
}
