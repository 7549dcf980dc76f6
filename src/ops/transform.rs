//! Pairwise transformation of operations.
//!
//! `transform(a, b, strong)` rewrites `a`, created against the same version
//! as `b`, so that it applies after `b` and both application orders reach the
//! same document. `strong` decides symmetric ties in favour of `a`.

use super::{
    AttributeOperation, InsertOperation, MarkerOperation, MoveOperation, Operation,
    OperationKind, RenameOperation,
};
use crate::core::{Position, Range, Stickiness};

pub fn transform(a: &Operation, b: &Operation, strong: bool) -> Vec<Operation> {
    let mut kinds = transform_kind(&a.kind, &b.kind, strong);
    if kinds.is_empty() {
        kinds.push(OperationKind::NoOp);
    }
    tracing::trace!(
        a = a.kind_name(),
        b = b.kind_name(),
        strong,
        results = kinds.len(),
        "transformed operation"
    );
    let base_version = b.base_version + 1;
    kinds
        .into_iter()
        .zip(base_version..)
        .map(|(kind, base_version)| Operation { base_version, kind })
        .collect()
}

/// Transforms two operation lists based on the same version against each
/// other. Returns `a` rebased past `b` and `b` rebased past `a`.
pub fn transform_operation_lists(
    a: &[Operation],
    b: &[Operation],
    strong: bool,
) -> (Vec<Operation>, Vec<Operation>) {
    if a.is_empty() || b.is_empty() {
        return (a.to_vec(), b.to_vec());
    }
    if a.len() == 1 && b.len() == 1 {
        return (
            transform(&a[0], &b[0], strong),
            transform(&b[0], &a[0], !strong),
        );
    }
    if a.len() > 1 {
        let (mut a_head, b_after_head) = transform_operation_lists(&a[..1], b, strong);
        let (a_tail, b_after_all) = transform_operation_lists(&a[1..], &b_after_head, strong);
        a_head.extend(a_tail);
        return (a_head, b_after_all);
    }
    let (a_after_head, mut b_head) = transform_operation_lists(a, &b[..1], strong);
    let (a_after_all, b_tail) = transform_operation_lists(&a_after_head, &b[1..], strong);
    b_head.extend(b_tail);
    (a_after_all, b_head)
}

fn transform_kind(a: &OperationKind, b: &OperationKind, strong: bool) -> Vec<OperationKind> {
    use OperationKind as Kind;

    match (a, b) {
        (Kind::NoOp, _) => vec![Kind::NoOp],
        (_, Kind::NoOp) => vec![a.clone()],

        (Kind::Insert(insert), Kind::Insert(other)) => {
            let position =
                insert
                    .position
                    .transformed_by_insertion(&other.position, other.offset_size(), !strong);
            vec![Kind::Insert(InsertOperation {
                position,
                ..insert.clone()
            })]
        }
        (Kind::Insert(insert), Kind::Move(other) | Kind::Remove(other)) => {
            let position = insert.position.transformed_by_move(
                &other.source,
                &other.target,
                other.how_many,
                !strong,
                insert.stickiness,
            );
            vec![Kind::Insert(InsertOperation {
                position,
                ..insert.clone()
            })]
        }
        (Kind::Insert(_), Kind::Rename(_) | Kind::Attribute(_) | Kind::Marker(_)) => {
            vec![a.clone()]
        }

        (Kind::Move(moved), Kind::Insert(other)) => {
            vec![Kind::Move(move_by_insertion(moved, other, strong))]
        }
        (Kind::Remove(moved), Kind::Insert(other)) => {
            vec![Kind::Remove(move_by_insertion(moved, other, strong))]
        }
        (Kind::Move(moved), Kind::Move(other)) => {
            let result = move_by_move(moved, false, other, false, strong);
            if strong
                && result.is_empty()
                && move_by_move(other, false, moved, false, false).is_empty()
            {
                // Each move puts the other's nodes inside its own. The weak
                // side is dropped, so take the other nodes back out first.
                vec![Kind::Move(other.reversed()), a.clone()]
            } else {
                result
            }
        }
        (Kind::Move(moved), Kind::Remove(other)) => move_by_move(moved, false, other, true, strong),
        (Kind::Remove(moved), Kind::Move(other)) => move_by_move(moved, true, other, false, strong),
        (Kind::Remove(moved), Kind::Remove(other)) => move_by_move(moved, true, other, true, strong),
        (
            Kind::Move(_) | Kind::Remove(_),
            Kind::Rename(_) | Kind::Attribute(_) | Kind::Marker(_),
        ) => vec![a.clone()],

        (Kind::Rename(rename), Kind::Insert(other)) => {
            let position =
                rename
                    .position
                    .transformed_by_insertion(&other.position, other.offset_size(), true);
            vec![Kind::Rename(RenameOperation {
                position,
                ..rename.clone()
            })]
        }
        (Kind::Rename(rename), Kind::Move(other) | Kind::Remove(other)) => {
            let position = rename.position.transformed_by_move(
                &other.source,
                &other.target,
                other.how_many,
                true,
                Stickiness::ToNext,
            );
            vec![Kind::Rename(RenameOperation {
                position,
                ..rename.clone()
            })]
        }
        (Kind::Rename(rename), Kind::Rename(other)) => {
            if rename.position != other.position {
                vec![a.clone()]
            } else if strong {
                vec![Kind::Rename(RenameOperation {
                    old_name: other.new_name.clone(),
                    ..rename.clone()
                })]
            } else {
                vec![Kind::NoOp]
            }
        }
        (Kind::Rename(_), Kind::Attribute(_) | Kind::Marker(_)) => vec![a.clone()],

        (Kind::Attribute(attribute), Kind::Insert(other)) => attribute_pieces(
            attribute,
            attribute
                .range
                .transformed_by_insertion(&other.position, other.offset_size(), true),
        ),
        (Kind::Attribute(attribute), Kind::Move(other) | Kind::Remove(other)) => attribute_pieces(
            attribute,
            attribute
                .range
                .transformed_by_move(&other.source, &other.target, other.how_many),
        ),
        (Kind::Attribute(attribute), Kind::Attribute(other)) => {
            attribute_by_attribute(attribute, other, strong)
        }
        (Kind::Attribute(_), Kind::Rename(_) | Kind::Marker(_)) => vec![a.clone()],

        (Kind::Marker(marker), Kind::Insert(_) | Kind::Move(_) | Kind::Remove(_)) => {
            vec![Kind::Marker(MarkerOperation {
                name: marker.name.clone(),
                old_range: marker.old_range.as_ref().map(|r| r.transformed_by_kind(b)),
                new_range: marker.new_range.as_ref().map(|r| r.transformed_by_kind(b)),
            })]
        }
        (Kind::Marker(marker), Kind::Marker(other)) => {
            if marker.name != other.name {
                vec![a.clone()]
            } else if strong {
                vec![Kind::Marker(MarkerOperation {
                    old_range: other.new_range.clone(),
                    ..marker.clone()
                })]
            } else {
                vec![Kind::NoOp]
            }
        }
        (Kind::Marker(_), Kind::Rename(_) | Kind::Attribute(_)) => vec![a.clone()],
    }
}

/// A moved range grows over content inserted strictly inside it, and over
/// content inserted at a boundary when that content is attached to it.
fn range_by_insertion(
    range: &Range,
    at: &Position,
    how_many: usize,
    stickiness: Stickiness,
) -> Range {
    let start = range
        .start
        .transformed_by_insertion(at, how_many, stickiness != Stickiness::ToNext);
    let end = range
        .end
        .transformed_by_insertion(at, how_many, stickiness == Stickiness::ToPrevious);
    Range::new(start, end)
}

fn move_by_insertion(
    moved: &MoveOperation,
    insert: &InsertOperation,
    strong: bool,
) -> MoveOperation {
    let how_many = insert.offset_size();
    let range = range_by_insertion(
        &moved.source_range(),
        &insert.position,
        how_many,
        insert.stickiness,
    );
    MoveOperation {
        how_many: range.len(),
        source: range.start,
        target: moved
            .target
            .transformed_by_insertion(&insert.position, how_many, !strong),
        stickiness: moved.stickiness,
    }
}

/// Part of a moved range that `other` did not move: it keeps its place and
/// may grow over nodes `other` dropped into it.
fn staying_piece(start: Position, how_many: usize, other: &MoveOperation) -> Range {
    let end = start.shifted(how_many);
    let start = start
        .transformed_by_deletion(&other.source, other.how_many)
        .unwrap_or(start);
    let end = end
        .transformed_by_deletion(&other.source, other.how_many)
        .unwrap_or(end);
    range_by_insertion(
        &Range::new(start, end),
        &other.landing(),
        other.how_many,
        other.stickiness,
    )
}

fn move_by_move(
    moved: &MoveOperation,
    is_remove: bool,
    other: &MoveOperation,
    other_is_remove: bool,
    strong: bool,
) -> Vec<OperationKind> {
    // Removals win over plain moves regardless of the tie-break.
    let strong = match (is_remove, other_is_remove) {
        (true, false) => true,
        (false, true) => false,
        _ => strong,
    };
    let landing = other.landing();
    let target = moved.target.transformed_by_move(
        &other.source,
        &other.target,
        other.how_many,
        !strong,
        moved.stickiness,
    );

    let mut pieces = Vec::new();
    if moved.source.has_same_parent_as(&other.source) {
        let (start, end) = (moved.source.offset(), moved.source.offset() + moved.how_many);
        let (other_start, other_end) = (
            other.source.offset(),
            other.source.offset() + other.how_many,
        );
        let common_start = start.max(other_start);
        let common_end = end.min(other_end);
        if common_start < common_end {
            let mut staying = Vec::new();
            if start < other_start {
                staying.push(staying_piece(
                    moved.source.clone(),
                    other_start - start,
                    other,
                ));
            }
            if other_end < end {
                staying.push(staying_piece(
                    moved.source.with_offset(other_end),
                    end - other_end,
                    other,
                ));
            }
            let staying_len: usize = staying.iter().map(Range::len).sum();
            let grown = staying_len > moved.how_many - (common_end - common_start);
            let mut staying = staying.into_iter();
            if start < other_start {
                pieces.extend(staying.next());
            }
            // A staying piece that grew over the landing point already
            // carries the common nodes.
            if strong && !grown {
                let common = moved
                    .source
                    .with_offset(common_start)
                    .combined(&other.source, &landing);
                pieces.push(Range::from_position_and_shift(
                    common,
                    common_end - common_start,
                ));
            }
            pieces.extend(staying);
        } else {
            pieces.push(staying_piece(moved.source.clone(), moved.how_many, other));
        }
    } else if moved
        .source
        .transformed_by_deletion(&other.source, other.how_many)
        .is_none()
    {
        // Nested inside the nodes `other` moved: travels with them.
        let start = moved.source.combined(&other.source, &landing);
        pieces.push(Range::from_position_and_shift(start, moved.how_many));
    } else {
        pieces.push(staying_piece(moved.source.clone(), moved.how_many, other));
    }

    emit_moves(merge_adjacent(pieces), target, moved.stickiness)
        .into_iter()
        .map(|piece| {
            if is_remove {
                OperationKind::Remove(piece)
            } else {
                OperationKind::Move(piece)
            }
        })
        .collect()
}

fn merge_adjacent(pieces: Vec<Range>) -> Vec<Range> {
    let mut merged: Vec<Range> = Vec::with_capacity(pieces.len());
    for piece in pieces {
        if piece.is_empty() {
            continue;
        }
        if let Some(previous) = merged.last_mut()
            && previous.end == piece.start
        {
            previous.end = piece.end;
            continue;
        }
        merged.push(piece);
    }
    merged
}

/// Emits one move per piece so that the pieces land next to each other at
/// `target`, in their original order.
fn emit_moves(
    mut pieces: Vec<Range>,
    target: Position,
    stickiness: Stickiness,
) -> Vec<MoveOperation> {
    let mut moves = Vec::with_capacity(pieces.len());
    let mut cursor = target;
    for index in 0..pieces.len() {
        let piece = pieces[index].clone();
        let how_many = piece.len();
        let Some(landing) = cursor.transformed_by_deletion(&piece.start, how_many) else {
            tracing::debug!(source = %piece.start, target = %cursor, "dropped move into its own range");
            continue;
        };
        for later in &mut pieces[index + 1..] {
            let start = later.start.transformed_by_move(
                &piece.start,
                &cursor,
                how_many,
                true,
                Stickiness::None,
            );
            *later = Range::from_position_and_shift(start, later.len());
        }
        moves.push(MoveOperation {
            source: piece.start,
            how_many,
            target: cursor,
            stickiness,
        });
        cursor = landing.shifted(how_many);
    }
    moves
}

fn attribute_pieces(attribute: &AttributeOperation, ranges: Vec<Range>) -> Vec<OperationKind> {
    ranges
        .into_iter()
        .filter(|range| !range.is_empty())
        .map(|range| {
            OperationKind::Attribute(AttributeOperation {
                range,
                ..attribute.clone()
            })
        })
        .collect()
}

fn attribute_by_attribute(
    attribute: &AttributeOperation,
    other: &AttributeOperation,
    strong: bool,
) -> Vec<OperationKind> {
    let overlap = (attribute.key == other.key
        && attribute.range.start.has_same_parent_as(&other.range.start))
    .then(|| attribute.range.intersection(&other.range))
    .flatten();
    let Some(common) = overlap else {
        return vec![OperationKind::Attribute(attribute.clone())];
    };

    let mut result = attribute_pieces(attribute, attribute.range.difference(&other.range));
    if strong {
        result.push(OperationKind::Attribute(AttributeOperation {
            range: common,
            old_value: other.new_value.clone(),
            ..attribute.clone()
        }));
    }
    result
}
