//! Deltas: ordered operation groups with a semantic tag.
//!
//! A delta is what a command produces and what the transformation engine
//! reasons about. Its operations apply in order, each one version after the
//! previous, and the whole delta applies atomically.

pub mod transform;

use crate::core::{Position, Range, Stickiness};
use crate::doc::{Document, Element, Node};
use crate::error::{ModelError, Result};
use crate::ops::{MoveOperation, Operation, OperationKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use transform::{TransformContext, transform, transform_delta_sets};

/// Groups deltas that one user action produced, for undo.
pub type BatchId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeltaKind {
    Insert,
    Remove,
    Move,
    Split,
    Merge,
    Wrap,
    Unwrap,
    Rename,
    Attribute,
    Marker,
    NoOp,
}

impl DeltaKind {
    /// Kind of the delta that undoes a delta of this kind.
    pub fn reversed(self) -> DeltaKind {
        match self {
            DeltaKind::Insert => DeltaKind::Remove,
            DeltaKind::Remove => DeltaKind::Move,
            DeltaKind::Split => DeltaKind::Merge,
            DeltaKind::Merge => DeltaKind::Split,
            DeltaKind::Wrap => DeltaKind::Unwrap,
            DeltaKind::Unwrap => DeltaKind::Wrap,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "DeltaWire")]
pub struct Delta {
    kind: DeltaKind,
    batch: BatchId,
    operations: Vec<Operation>,
    /// Set on deltas that revert a concurrent change during transformation.
    /// Such deltas never trigger structural special cases again.
    #[serde(skip)]
    compensating: bool,
}

/// Wire shape of [`Delta`], checked before it is accepted.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeltaWire {
    kind: DeltaKind,
    batch: BatchId,
    operations: Vec<Operation>,
}

impl TryFrom<DeltaWire> for Delta {
    type Error = ModelError;

    fn try_from(wire: DeltaWire) -> Result<Self> {
        let delta = Delta {
            kind: wire.kind,
            batch: wire.batch,
            operations: wire.operations,
            compensating: false,
        };
        delta.validate()?;
        Ok(delta)
    }
}

/// Collects operations for one delta and numbers their base versions.
#[derive(Debug, Clone)]
pub struct DeltaBuilder {
    kind: DeltaKind,
    batch: BatchId,
    next_version: u64,
    operations: Vec<Operation>,
}

impl DeltaBuilder {
    pub fn new(kind: DeltaKind, base_version: u64) -> Self {
        Self {
            kind,
            batch: Uuid::new_v4(),
            next_version: base_version,
            operations: Vec::new(),
        }
    }

    pub fn batch(mut self, batch: BatchId) -> Self {
        self.batch = batch;
        self
    }

    pub fn push(mut self, mut operation: Operation) -> Self {
        operation.base_version = self.next_version;
        self.next_version += 1;
        self.operations.push(operation);
        self
    }

    pub fn build(self) -> Result<Delta> {
        if self.operations.is_empty() {
            return Err(ModelError::EmptyDelta);
        }
        Ok(Delta {
            kind: self.kind,
            batch: self.batch,
            operations: self.operations,
            compensating: false,
        })
    }
}

/// A command-level request, resolved against the current document by
/// [`Delta::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DeltaRequest {
    Insert { position: Position, nodes: Vec<Node> },
    Remove { range: Range },
    Move { range: Range, target: Position },
    Split { position: Position },
    Merge { position: Position },
    Wrap { range: Range, wrapper: Element },
    Unwrap { position: Position },
    Rename { position: Position, name: String },
    Attribute { range: Range, key: String, value: Option<Value> },
    Marker { name: String, range: Option<Range> },
}

impl Delta {
    pub fn builder(kind: DeltaKind, base_version: u64) -> DeltaBuilder {
        DeltaBuilder::new(kind, base_version)
    }

    pub fn kind(&self) -> DeltaKind {
        self.kind
    }

    pub fn batch(&self) -> BatchId {
        self.batch
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn base_version(&self) -> u64 {
        self.operations.first().map_or(0, |op| op.base_version)
    }

    /// Version of the document right after this delta.
    pub fn next_version(&self) -> u64 {
        self.operations
            .last()
            .map_or(0, |op| op.base_version + 1)
    }

    pub fn with_batch(mut self, batch: BatchId) -> Self {
        self.batch = batch;
        self
    }

    pub fn is_no_op(&self) -> bool {
        self.operations.iter().all(Operation::is_no_op)
    }

    /// Checks a delta that arrived from outside: it has operations, they
    /// are valid and numbered consecutively, and a split moves content out
    /// of an element rather than out of a root.
    pub fn validate(&self) -> Result<()> {
        let first = self.operations.first().ok_or(ModelError::EmptyDelta)?;
        for (operation, expected) in self.operations.iter().zip(first.base_version..) {
            operation.validate()?;
            if operation.base_version != expected {
                return Err(ModelError::VersionMismatch {
                    expected,
                    actual: operation.base_version,
                });
            }
        }
        if let Some(position) = self.split_position()
            && position.path.len() < 2
        {
            return Err(ModelError::InvalidPosition(position.clone()));
        }
        Ok(())
    }

    pub fn insert(position: Position, nodes: Vec<Node>, base_version: u64) -> Result<Delta> {
        Self::builder(DeltaKind::Insert, base_version)
            .push(Operation::insert(position, nodes, base_version)?)
            .build()
    }

    /// Removes the nodes of a flat range into the graveyard.
    pub fn remove(range: Range, graveyard: &str, base_version: u64) -> Result<Delta> {
        let how_many = flat_len(&range)?;
        Self::builder(DeltaKind::Remove, base_version)
            .push(Operation::remove(range.start, how_many, graveyard, base_version)?)
            .build()
    }

    pub fn move_range(range: Range, target: Position, base_version: u64) -> Result<Delta> {
        let how_many = flat_len(&range)?;
        Self::builder(DeltaKind::Move, base_version)
            .push(Operation::move_nodes(range.start, how_many, target, base_version)?)
            .build()
    }

    /// Splits the element containing `position`: `clone` is inserted right
    /// after it and receives the `how_many` offsets that follow `position`.
    pub fn split(
        position: Position,
        clone: Element,
        how_many: usize,
        base_version: u64,
    ) -> Result<Delta> {
        if position.path.len() < 2 {
            return Err(ModelError::InvalidPosition(position));
        }
        let sibling = position.parent_position().shifted(1);
        let builder = Self::builder(DeltaKind::Split, base_version).push(
            Operation::insert(sibling.clone(), vec![Node::Element(clone)], base_version)?
                .with_stickiness(Stickiness::ToPrevious),
        );
        let content = if how_many == 0 {
            Operation::no_op(base_version)
        } else {
            Operation::move_nodes(position, how_many, sibling.child(0), base_version)?
        };
        builder.push(content).build()
    }

    /// Merges the element at `position` into its previous sibling.
    /// `previous_len` and `len` are the child offset counts of both elements.
    pub fn merge(
        position: Position,
        previous_len: usize,
        len: usize,
        graveyard: &str,
        base_version: u64,
    ) -> Result<Delta> {
        if position.path.is_empty() || position.offset() == 0 {
            return Err(ModelError::InvalidPosition(position));
        }
        let previous = position.with_offset(position.offset() - 1);
        let content = if len == 0 {
            Operation::no_op(base_version)
        } else {
            Operation::move_nodes(
                position.child(0),
                len,
                previous.child(previous_len),
                base_version,
            )?
        };
        Self::builder(DeltaKind::Merge, base_version)
            .push(content)
            .push(Operation::remove(position, 1, graveyard, base_version)?)
            .build()
    }

    /// Wraps the nodes of a flat range in `wrapper`.
    pub fn wrap(range: Range, wrapper: Element, base_version: u64) -> Result<Delta> {
        let how_many = flat_len(&range)?;
        Self::builder(DeltaKind::Wrap, base_version)
            .push(
                Operation::insert(range.end.clone(), vec![Node::Element(wrapper)], base_version)?
                    .with_stickiness(Stickiness::ToPrevious),
            )
            .push(Operation::move_nodes(
                range.start,
                how_many,
                range.end.child(0),
                base_version,
            )?)
            .build()
    }

    /// Replaces the element at `position` by its `how_many` child offsets.
    pub fn unwrap(
        position: Position,
        how_many: usize,
        graveyard: &str,
        base_version: u64,
    ) -> Result<Delta> {
        let content = if how_many == 0 {
            Operation::no_op(base_version)
        } else {
            Operation::move_nodes(position.child(0), how_many, position.clone(), base_version)?
                .with_stickiness(Stickiness::ToNext)
        };
        Self::builder(DeltaKind::Unwrap, base_version)
            .push(content)
            .push(Operation::remove(
                position.shifted(how_many),
                1,
                graveyard,
                base_version,
            )?)
            .build()
    }

    pub fn rename(
        position: Position,
        old_name: impl Into<String>,
        new_name: impl Into<String>,
        base_version: u64,
    ) -> Result<Delta> {
        Self::builder(DeltaKind::Rename, base_version)
            .push(Operation::rename(position, old_name, new_name, base_version)?)
            .build()
    }

    pub fn attribute(
        range: Range,
        key: impl Into<String>,
        old_value: Option<Value>,
        new_value: Option<Value>,
        base_version: u64,
    ) -> Result<Delta> {
        Self::builder(DeltaKind::Attribute, base_version)
            .push(Operation::attribute(range, key, old_value, new_value, base_version)?)
            .build()
    }

    pub fn marker(
        name: impl Into<String>,
        old_range: Option<Range>,
        new_range: Option<Range>,
        base_version: u64,
    ) -> Result<Delta> {
        Self::builder(DeltaKind::Marker, base_version)
            .push(Operation::marker(name, old_range, new_range, base_version))
            .build()
    }

    /// Builds the delta for `request` against the current state of
    /// `document`, without changing it.
    pub fn create(document: &Document, request: DeltaRequest) -> Result<Delta> {
        let version = document.version();
        let graveyard = document.graveyard();
        match request {
            DeltaRequest::Insert { position, nodes } => {
                document.validate_position(&position)?;
                Self::insert(position, nodes, version)
            }
            DeltaRequest::Remove { range } => {
                document.validate_range(&range)?;
                Self::remove(range, graveyard, version)
            }
            DeltaRequest::Move { range, target } => {
                document.validate_range(&range)?;
                document.validate_position(&target)?;
                Self::move_range(range, target, version)
            }
            DeltaRequest::Split { position } => {
                if position.path.len() < 2 {
                    return Err(ModelError::InvalidPosition(position));
                }
                let element = document.parent_element(&position)?;
                let how_many = element.children.max_offset() - position.offset();
                Self::split(position, element.shallow_clone(), how_many, version)
            }
            DeltaRequest::Merge { position } => {
                if position.offset() == 0 {
                    return Err(ModelError::InvalidPosition(position));
                }
                let previous = document.element_at(&position.with_offset(position.offset() - 1))?;
                let element = document.element_at(&position)?;
                Self::merge(
                    position.clone(),
                    previous.children.max_offset(),
                    element.children.max_offset(),
                    graveyard,
                    version,
                )
            }
            DeltaRequest::Wrap { range, wrapper } => {
                document.validate_range(&range)?;
                Self::wrap(range, wrapper, version)
            }
            DeltaRequest::Unwrap { position } => {
                let element = document.element_at(&position)?;
                Self::unwrap(position.clone(), element.children.max_offset(), graveyard, version)
            }
            DeltaRequest::Rename { position, name } => {
                let element = document.element_at(&position)?;
                Self::rename(position.clone(), element.name.clone(), name, version)
            }
            DeltaRequest::Attribute { range, key, value } => {
                create_attribute(document, range, key, value)
            }
            DeltaRequest::Marker { name, range } => {
                if let Some(range) = &range {
                    document.validate_range(range)?;
                }
                let old_range = document.marker(&name).cloned();
                Self::marker(name, old_range, range, version)
            }
        }
    }

    /// The delta that undoes this one once it has been applied.
    pub fn reversed(&self, graveyard: &str) -> Delta {
        let operations = self
            .operations
            .iter()
            .rev()
            .zip(self.next_version()..)
            .map(|(operation, base_version)| Operation {
                base_version,
                ..operation.reversed(graveyard)
            })
            .collect();
        Delta {
            kind: self.kind.reversed(),
            batch: self.batch,
            operations,
            compensating: self.compensating,
        }
    }

    pub(crate) fn with_operations(&self, operations: Vec<Operation>) -> Delta {
        Delta {
            kind: self.kind,
            batch: self.batch,
            operations,
            compensating: self.compensating,
        }
    }

    pub(crate) fn to_no_op(&self) -> Delta {
        Delta {
            kind: DeltaKind::NoOp,
            batch: self.batch,
            operations: vec![Operation::no_op(self.base_version())],
            compensating: self.compensating,
        }
    }

    pub(crate) fn compensating(mut self) -> Delta {
        self.compensating = true;
        self
    }

    pub(crate) fn is_compensating(&self) -> bool {
        self.compensating
    }

    /// Renumbers base versions from `base_version` on.
    pub(crate) fn renumbered(mut self, base_version: u64) -> Delta {
        for (operation, version) in self.operations.iter_mut().zip(base_version..) {
            operation.base_version = version;
        }
        self
    }

    /// Where a split happens, while the split still moves content.
    pub fn split_position(&self) -> Option<&Position> {
        if self.kind != DeltaKind::Split {
            return None;
        }
        match self.operations.as_slice() {
            [first, second] if !first.is_no_op() => match &second.kind {
                OperationKind::Move(moved) => Some(&moved.source),
                _ => None,
            },
            _ => None,
        }
    }

    /// The element being split.
    pub fn split_element(&self) -> Option<Position> {
        self.split_position().map(Position::parent_position)
    }

    /// Where the copy of the split element is inserted.
    pub fn split_copy_position(&self) -> Option<&Position> {
        self.split_position()?;
        match &self.operations.first()?.kind {
            OperationKind::Insert(insert) => Some(&insert.position),
            _ => None,
        }
    }

    /// The inserted copy of the split element.
    pub(crate) fn split_clone(&self) -> Option<&Element> {
        self.split_position()?;
        match &self.operations.first()?.kind {
            OperationKind::Insert(insert) => insert.nodes.first()?.as_element(),
            _ => None,
        }
    }

    /// Position of the element merged into its previous sibling.
    pub fn merge_position(&self) -> Option<&Position> {
        if self.kind != DeltaKind::Merge {
            return None;
        }
        match self.operations.as_slice() {
            [_, second] => match &second.kind {
                OperationKind::Remove(removed) => Some(&removed.source),
                _ => None,
            },
            _ => None,
        }
    }

    /// Position of the unwrapped element.
    pub fn unwrap_position(&self) -> Option<&Position> {
        if self.kind != DeltaKind::Unwrap {
            return None;
        }
        match self.operations.as_slice() {
            [first, second] => match (&first.kind, &second.kind) {
                (OperationKind::Move(moved), _) => Some(&moved.target),
                (OperationKind::NoOp, OperationKind::Remove(removed)) => Some(&removed.source),
                _ => None,
            },
            _ => None,
        }
    }

    /// The wrapped range, in coordinates before the wrap.
    pub fn wrap_range(&self) -> Option<Range> {
        self.wrap_move().map(MoveOperation::source_range)
    }

    /// The move that puts the wrapped nodes into the wrapper.
    pub(crate) fn wrap_move(&self) -> Option<&MoveOperation> {
        if self.kind != DeltaKind::Wrap {
            return None;
        }
        match self.operations.as_slice() {
            [first, second] if !first.is_no_op() => match &second.kind {
                OperationKind::Move(moved) => Some(moved),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn insert_position(&self) -> Option<&Position> {
        if self.kind != DeltaKind::Insert {
            return None;
        }
        match &self.operations.first()?.kind {
            OperationKind::Insert(insert) => Some(&insert.position),
            _ => None,
        }
    }

    /// Source range of a move or remove delta.
    pub fn moved_range(&self) -> Option<Range> {
        if !matches!(self.kind, DeltaKind::Move | DeltaKind::Remove) {
            return None;
        }
        match &self.operations.first()?.kind {
            OperationKind::Move(moved) | OperationKind::Remove(moved) => {
                Some(moved.source_range())
            }
            _ => None,
        }
    }

    /// Removal operations of the delta, in order.
    pub(crate) fn removals(&self) -> impl Iterator<Item = &MoveOperation> {
        self.operations
            .iter()
            .filter_map(|operation| match &operation.kind {
                OperationKind::Remove(removed) => Some(removed),
                _ => None,
            })
    }
}

fn flat_len(range: &Range) -> Result<usize> {
    if !range.is_flat() || range.end.offset() <= range.start.offset() {
        return Err(ModelError::InvalidRange(range.clone()));
    }
    Ok(range.len())
}

/// One attribute operation per run of nodes sharing the same current value,
/// skipping runs that already hold `value`.
fn create_attribute(
    document: &Document,
    range: Range,
    key: String,
    value: Option<Value>,
) -> Result<Delta> {
    flat_len(&range)?;
    document.validate_range(&range)?;
    let (start, end) = (range.start.offset(), range.end.offset());
    let nodes = document
        .parent_element(&range.start)?
        .children
        .slice(start, end)
        .ok_or_else(|| ModelError::InvalidRange(range.clone()))?;

    let version = document.version();
    let mut builder = Delta::builder(DeltaKind::Attribute, version);
    let mut changed = false;
    let mut run_start = start;
    let mut offset = start;
    let mut nodes = nodes.iter().peekable();
    while let Some(node) = nodes.next() {
        offset += node.offset_size();
        let current = node.attributes().get(&key);
        let run_ends = nodes
            .peek()
            .is_none_or(|next| next.attributes().get(&key) != current);
        if !run_ends {
            continue;
        }
        if current != value.as_ref() {
            let run = Range::new(
                range.start.with_offset(run_start),
                range.start.with_offset(offset),
            );
            builder = builder.push(Operation::attribute(
                run,
                key.clone(),
                current.cloned(),
                value.clone(),
                version,
            )?);
            changed = true;
        }
        run_start = offset;
    }
    if !changed {
        builder = builder.push(Operation::no_op(version));
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::DEFAULT_GRAVEYARD;
    use serde_json::json;

    fn pos(path: &[usize]) -> Position {
        Position::new("main", path.to_vec())
    }

    #[test]
    fn builder_numbers_versions_consecutively() {
        let delta = Delta::builder(DeltaKind::NoOp, 4)
            .push(Operation::no_op(0))
            .push(Operation::no_op(0))
            .build()
            .unwrap();
        assert_eq!(delta.base_version(), 4);
        assert_eq!(delta.next_version(), 6);
        assert_eq!(
            Delta::builder(DeltaKind::Insert, 0).build(),
            Err(ModelError::EmptyDelta)
        );
    }

    #[test]
    fn split_accessors_degrade_with_its_operations() {
        let delta = Delta::split(pos(&[1, 3]), Element::new("p"), 2, 0).unwrap();
        assert_eq!(delta.split_position(), Some(&pos(&[1, 3])));
        assert_eq!(delta.split_element(), Some(pos(&[1])));
        let at_end = Delta::split(pos(&[1, 5]), Element::new("p"), 0, 0).unwrap();
        assert_eq!(at_end.split_position(), None);
    }

    #[test]
    fn reversed_kinds_pair_up() {
        let split = Delta::split(pos(&[0, 2]), Element::new("p"), 3, 5).unwrap();
        let merge = split.reversed(DEFAULT_GRAVEYARD);
        assert_eq!(merge.kind(), DeltaKind::Merge);
        assert_eq!(merge.base_version(), 7);
        assert_eq!(merge.merge_position(), Some(&pos(&[1])));

        let wrap = Delta::wrap(
            Range::new(pos(&[1]), pos(&[3])),
            Element::new("blockquote"),
            0,
        )
        .unwrap();
        let unwrap = wrap.reversed(DEFAULT_GRAVEYARD);
        assert_eq!(unwrap.kind(), DeltaKind::Unwrap);
        assert_eq!(unwrap.unwrap_position(), Some(&pos(&[1])));
    }

    #[test]
    fn attribute_request_emits_one_operation_per_run() {
        let document = Document::from_nodes(vec![
            Node::element("p", vec![]),
            Node::Element(Element::new("p").with_attribute("align", json!("left"))),
            Node::element("p", vec![]),
        ]);
        let delta = Delta::create(
            &document,
            DeltaRequest::Attribute {
                range: Range::new(pos(&[0]), pos(&[3])),
                key: "align".into(),
                value: Some(json!("left")),
            },
        )
        .unwrap();
        assert_eq!(delta.operations().len(), 2);
        assert_eq!(delta.next_version(), 2);
    }
}
