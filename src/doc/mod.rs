//! The document tree: named roots of nodes, the graveyard root that keeps
//! removed content, live markers and the version counter that orders every
//! applied operation.

pub mod node;

pub use node::{Attributes, Element, Node, NodeId, NodeList, Text, offset_size_of};

use crate::core::{Position, Range};
use crate::delta::Delta;
use crate::error::{ModelError, Result};
use crate::ops::{
    AttributeOperation, InsertOperation, MarkerOperation, MoveOperation, Operation,
    OperationKind, RenameOperation,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_ROOT: &str = "main";
pub const DEFAULT_GRAVEYARD: &str = "$graveyard";

/// Roots created with a new document and the name of its graveyard root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentConfig {
    pub roots: Vec<String>,
    pub graveyard: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            roots: vec![DEFAULT_ROOT.to_string()],
            graveyard: DEFAULT_GRAVEYARD.to_string(),
        }
    }
}

impl DocumentConfig {
    pub fn with_roots<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn graveyard(mut self, name: impl Into<String>) -> Self {
        self.graveyard = name.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Insert,
    Move,
    Remove,
    Rename,
    Attribute,
    Marker,
}

/// What one applied operation changed, for views that re-render
/// incrementally. Ranges are in the coordinates right before and right after
/// the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub version: u64,
    pub kind: ChangeKind,
    pub before: Option<Range>,
    pub after: Option<Range>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    version: u64,
    graveyard: String,
    roots: BTreeMap<String, Element>,
    #[serde(default)]
    markers: BTreeMap<String, Range>,
    #[serde(skip)]
    changes: Vec<Change>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(DocumentConfig::default())
    }
}

impl Document {
    pub fn new(config: DocumentConfig) -> Self {
        let mut roots = BTreeMap::new();
        for name in config.roots.iter().chain([&config.graveyard]) {
            roots.insert(name.clone(), Element::new(name.clone()));
        }
        Self {
            version: 0,
            graveyard: config.graveyard,
            roots,
            markers: BTreeMap::new(),
            changes: Vec::new(),
        }
    }

    /// Default document whose main root holds `children`.
    pub fn from_nodes(children: Vec<Node>) -> Self {
        let mut document = Self::default();
        document.load_root(DEFAULT_ROOT, children);
        document
    }

    /// Replaces the content of a root, creating it when missing. Loading is
    /// not an operation and does not advance the version.
    pub fn load_root(&mut self, name: impl Into<String>, children: Vec<Node>) {
        let name = name.into();
        let root = self
            .roots
            .entry(name.clone())
            .or_insert_with(|| Element::new(name));
        root.children = NodeList::new(children);
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn graveyard(&self) -> &str {
        &self.graveyard
    }

    pub fn root(&self, name: &str) -> Option<&Element> {
        self.roots.get(name)
    }

    pub fn root_names(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    pub fn markers(&self) -> &BTreeMap<String, Range> {
        &self.markers
    }

    pub fn marker(&self, name: &str) -> Option<&Range> {
        self.markers.get(name)
    }

    /// Drains the changes recorded since the last call.
    pub fn take_changes(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }

    /// The element that contains `position`, checking that the offset is in
    /// bounds.
    pub fn parent_element(&self, position: &Position) -> Result<&Element> {
        let root = self
            .roots
            .get(&position.root)
            .ok_or_else(|| ModelError::UnknownRoot(position.root.clone()))?;
        if position.path.is_empty() {
            return Err(ModelError::InvalidPosition(position.clone()));
        }
        let mut element = root;
        for &offset in position.parent_path() {
            element = element
                .children
                .element_at(offset)
                .ok_or_else(|| ModelError::InvalidPosition(position.clone()))?;
        }
        if position.offset() > element.children.max_offset() {
            return Err(ModelError::InvalidPosition(position.clone()));
        }
        Ok(element)
    }

    fn parent_element_mut(&mut self, position: &Position) -> Result<&mut Element> {
        let root = self
            .roots
            .get_mut(&position.root)
            .ok_or_else(|| ModelError::UnknownRoot(position.root.clone()))?;
        if position.path.is_empty() {
            return Err(ModelError::InvalidPosition(position.clone()));
        }
        let mut element = root;
        for &offset in position.parent_path() {
            element = element
                .children
                .element_at_mut(offset)
                .ok_or_else(|| ModelError::InvalidPosition(position.clone()))?;
        }
        if position.offset() > element.children.max_offset() {
            return Err(ModelError::InvalidPosition(position.clone()));
        }
        Ok(element)
    }

    /// The node that starts at, or for text contains, `position`.
    pub fn node_at(&self, position: &Position) -> Option<&Node> {
        self.parent_element(position)
            .ok()?
            .children
            .node_at(position.offset())
    }

    /// The element that starts exactly at `position`.
    pub fn element_at(&self, position: &Position) -> Result<&Element> {
        self.parent_element(position)?
            .children
            .element_at(position.offset())
            .ok_or_else(|| ModelError::NotAnElement(position.clone()))
    }

    fn element_at_mut(&mut self, position: &Position) -> Result<&mut Element> {
        self.parent_element_mut(position)?
            .children
            .element_at_mut(position.offset())
            .ok_or_else(|| ModelError::NotAnElement(position.clone()))
    }

    pub fn validate_position(&self, position: &Position) -> Result<()> {
        self.parent_element(position).map(|_| ())
    }

    pub fn validate_range(&self, range: &Range) -> Result<()> {
        self.validate_position(&range.start)?;
        self.validate_position(&range.end)?;
        if range.start.root != range.end.root || range.end.is_before(&range.start) {
            return Err(ModelError::InvalidRange(range.clone()));
        }
        Ok(())
    }

    /// Applies one operation based on the current version.
    ///
    /// On error the document is left unchanged.
    pub fn apply_operation(&mut self, operation: &Operation) -> Result<()> {
        if operation.base_version != self.version {
            tracing::error!(
                expected = self.version,
                actual = operation.base_version,
                kind = operation.kind_name(),
                "operation based on a different document version"
            );
            return Err(ModelError::VersionMismatch {
                expected: self.version,
                actual: operation.base_version,
            });
        }

        let change = match &operation.kind {
            OperationKind::Insert(insert) => Some(self.apply_insert(insert)?),
            OperationKind::Move(moved) => Some(self.apply_move(moved, ChangeKind::Move)?),
            OperationKind::Remove(moved) => {
                if moved.target.root != self.graveyard {
                    return Err(ModelError::NotGraveyard(self.graveyard.clone()));
                }
                Some(self.apply_move(moved, ChangeKind::Remove)?)
            }
            OperationKind::Rename(rename) => Some(self.apply_rename(rename)?),
            OperationKind::Attribute(attribute) => Some(self.apply_attribute(attribute)?),
            OperationKind::Marker(marker) => Some(self.apply_marker(marker)?),
            OperationKind::NoOp => None,
        };

        if !matches!(operation.kind, OperationKind::Marker(_)) {
            for range in self.markers.values_mut() {
                *range = range.transformed_by_operation(operation);
            }
        }
        if let Some((kind, before, after)) = change {
            self.changes.push(Change {
                version: self.version,
                kind,
                before,
                after,
            });
        }
        self.version += 1;
        Ok(())
    }

    /// Applies every operation of `delta` or none of them.
    pub fn apply_delta(&mut self, delta: &Delta) -> Result<()> {
        if delta.operations().is_empty() {
            return Err(ModelError::EmptyDelta);
        }
        let mut working = self.clone();
        for operation in delta.operations() {
            working.apply_operation(operation)?;
        }
        tracing::debug!(
            kind = ?delta.kind(),
            operations = delta.operations().len(),
            version = working.version,
            "applied delta"
        );
        *self = working;
        Ok(())
    }

    /// Compares every root but the graveyard by names, attributes, text and
    /// shape. Element identities are ignored.
    pub fn structurally_eq(&self, other: &Document) -> bool {
        let mine: Vec<_> = self
            .roots
            .iter()
            .filter(|(name, _)| **name != self.graveyard)
            .collect();
        let theirs: Vec<_> = other
            .roots
            .iter()
            .filter(|(name, _)| **name != other.graveyard)
            .collect();
        mine.len() == theirs.len()
            && mine
                .iter()
                .zip(&theirs)
                .all(|((left_name, left), (right_name, right))| {
                    left_name == right_name && left.same_structure(right)
                })
    }

    fn apply_insert(&mut self, insert: &InsertOperation) -> Result<ChangeRecord> {
        let how_many = insert.offset_size();
        if how_many == 0 {
            return Err(ModelError::EmptyOperation);
        }
        let position = &insert.position;
        self.parent_element_mut(position)?
            .children
            .insert(position.offset(), insert.nodes.clone())
            .ok_or_else(|| ModelError::InvalidPosition(position.clone()))?;
        let inserted = Range::from_position_and_shift(position.clone(), how_many);
        Ok((ChangeKind::Insert, None, Some(inserted)))
    }

    fn apply_move(&mut self, moved: &MoveOperation, kind: ChangeKind) -> Result<ChangeRecord> {
        if moved.how_many == 0 {
            return Err(ModelError::EmptyOperation);
        }
        let source_range = moved.source_range();
        if moved.source.offset() + moved.how_many
            > self.parent_element(&moved.source)?.children.max_offset()
        {
            return Err(ModelError::InvalidRange(source_range));
        }
        self.validate_position(&moved.target)?;
        let Some(landing) = moved
            .target
            .transformed_by_deletion(&moved.source, moved.how_many)
        else {
            return Err(ModelError::MoveIntoItself);
        };

        let start = moved.source.offset();
        let nodes = self
            .parent_element_mut(&moved.source)?
            .children
            .remove(start, start + moved.how_many)
            .ok_or_else(|| ModelError::InvalidRange(source_range.clone()))?;
        self.parent_element_mut(&landing)?
            .children
            .insert(landing.offset(), nodes)
            .ok_or_else(|| ModelError::InvalidPosition(landing.clone()))?;

        let moved_range = Range::from_position_and_shift(landing, moved.how_many);
        Ok((kind, Some(source_range), Some(moved_range)))
    }

    fn apply_rename(&mut self, rename: &RenameOperation) -> Result<ChangeRecord> {
        let element = self.element_at_mut(&rename.position)?;
        if element.name != rename.old_name {
            return Err(ModelError::NameMismatch {
                position: rename.position.clone(),
                expected: rename.old_name.clone(),
                found: element.name.clone(),
            });
        }
        element.name = rename.new_name.clone();
        let range = Range::from_position_and_shift(rename.position.clone(), 1);
        Ok((ChangeKind::Rename, Some(range.clone()), Some(range)))
    }

    fn apply_attribute(&mut self, attribute: &AttributeOperation) -> Result<ChangeRecord> {
        let range = &attribute.range;
        if !range.is_flat() || range.start.offset() >= range.end.offset() {
            return Err(ModelError::InvalidRange(range.clone()));
        }
        let (start, end) = (range.start.offset(), range.end.offset());
        let parent = self.parent_element_mut(&range.start)?;
        if end > parent.children.max_offset() {
            return Err(ModelError::InvalidRange(range.clone()));
        }

        let matches_old = parent
            .children
            .nodes_mut(start, end)
            .ok_or_else(|| ModelError::InvalidRange(range.clone()))?
            .iter()
            .all(|node| node.attributes().get(&attribute.key) == attribute.old_value.as_ref());
        if !matches_old {
            parent.children.normalize();
            return Err(ModelError::AttributeMismatch {
                key: attribute.key.clone(),
            });
        }

        if let Some(nodes) = parent.children.nodes_mut(start, end) {
            for node in nodes {
                match &attribute.new_value {
                    Some(value) => {
                        node.attributes_mut()
                            .insert(attribute.key.clone(), value.clone());
                    }
                    None => {
                        node.attributes_mut().remove(&attribute.key);
                    }
                }
            }
        }
        parent.children.normalize();
        Ok((ChangeKind::Attribute, Some(range.clone()), Some(range.clone())))
    }

    fn apply_marker(&mut self, marker: &MarkerOperation) -> Result<ChangeRecord> {
        if let Some(range) = &marker.new_range {
            self.validate_range(range)?;
        }
        let previous = match &marker.new_range {
            Some(range) => self.markers.insert(marker.name.clone(), range.clone()),
            None => self.markers.remove(&marker.name),
        };
        Ok((ChangeKind::Marker, previous, marker.new_range.clone()))
    }
}

type ChangeRecord = (ChangeKind, Option<Range>, Option<Range>);
