//! Atomic, invertible document operations.
//!
//! Every operation records the document version it was created against.
//! Insert and move operations also carry the [`Stickiness`] of their
//! insertion point: the neighbour the inserted content is attached to when a
//! concurrent operation moves that neighbour away.

pub mod transform;

use crate::core::{Position, Range, Stickiness};
use crate::doc::{Node, offset_size_of};
use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "OperationWire")]
pub struct Operation {
    pub base_version: u64,
    #[serde(flatten)]
    pub kind: OperationKind,
}

/// Wire shape of [`Operation`], checked before it is accepted.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationWire {
    base_version: u64,
    #[serde(flatten)]
    kind: OperationKind,
}

impl TryFrom<OperationWire> for Operation {
    type Error = ModelError;

    fn try_from(wire: OperationWire) -> Result<Self> {
        let operation = Operation {
            base_version: wire.base_version,
            kind: wire.kind,
        };
        operation.validate()?;
        Ok(operation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OperationKind {
    Insert(InsertOperation),
    Move(MoveOperation),
    /// A move whose target is in the graveyard root.
    Remove(MoveOperation),
    Rename(RenameOperation),
    Attribute(AttributeOperation),
    Marker(MarkerOperation),
    NoOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOperation {
    pub position: Position,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub stickiness: Stickiness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOperation {
    pub source: Position,
    pub how_many: usize,
    /// Insertion point, addressed before the moved nodes are detached.
    pub target: Position,
    #[serde(default)]
    pub stickiness: Stickiness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameOperation {
    pub position: Position,
    pub old_name: String,
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeOperation {
    pub range: Range,
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerOperation {
    pub name: String,
    pub old_range: Option<Range>,
    pub new_range: Option<Range>,
}

impl InsertOperation {
    pub fn offset_size(&self) -> usize {
        offset_size_of(&self.nodes)
    }
}

impl MoveOperation {
    pub fn source_range(&self) -> Range {
        Range::from_position_and_shift(self.source.clone(), self.how_many)
    }

    /// Where the first moved node ends up.
    pub fn landing(&self) -> Position {
        self.target
            .transformed_by_deletion(&self.source, self.how_many)
            .unwrap_or_else(|| self.target.clone())
    }

    /// The move that puts the nodes back where they came from.
    pub fn reversed(&self) -> MoveOperation {
        let landing = self.landing();
        let target = self
            .source
            .transformed_by_insertion(&landing, self.how_many, false);
        MoveOperation {
            source: landing,
            how_many: self.how_many,
            target,
            stickiness: Stickiness::None,
        }
    }

    fn validate(&self) -> Result<()> {
        check_path(&self.source)?;
        check_path(&self.target)?;
        if self.how_many == 0 {
            return Err(ModelError::EmptyOperation);
        }
        if self
            .target
            .transformed_by_deletion(&self.source, self.how_many)
            .is_none()
        {
            return Err(ModelError::MoveIntoItself);
        }
        Ok(())
    }
}

fn check_path(position: &Position) -> Result<()> {
    if position.path.is_empty() {
        return Err(ModelError::InvalidPosition(position.clone()));
    }
    Ok(())
}

fn check_attribute_range(range: &Range) -> Result<()> {
    if !range.is_flat() || range.start.offset() >= range.end.offset() {
        return Err(ModelError::InvalidRange(range.clone()));
    }
    Ok(())
}

impl Operation {
    pub fn insert(position: Position, nodes: Vec<Node>, base_version: u64) -> Result<Self> {
        check_path(&position)?;
        if offset_size_of(&nodes) == 0 {
            return Err(ModelError::EmptyOperation);
        }
        Ok(Self {
            base_version,
            kind: OperationKind::Insert(InsertOperation {
                position,
                nodes,
                stickiness: Stickiness::None,
            }),
        })
    }

    pub fn move_nodes(
        source: Position,
        how_many: usize,
        target: Position,
        base_version: u64,
    ) -> Result<Self> {
        let moved = MoveOperation {
            source,
            how_many,
            target,
            stickiness: Stickiness::None,
        };
        moved.validate()?;
        Ok(Self {
            base_version,
            kind: OperationKind::Move(moved),
        })
    }

    /// Moves `how_many` offsets at `source` to the start of the graveyard.
    pub fn remove(
        source: Position,
        how_many: usize,
        graveyard: &str,
        base_version: u64,
    ) -> Result<Self> {
        let moved = MoveOperation {
            source,
            how_many,
            target: Position::new(graveyard, vec![0]),
            stickiness: Stickiness::None,
        };
        moved.validate()?;
        Ok(Self {
            base_version,
            kind: OperationKind::Remove(moved),
        })
    }

    pub fn rename(
        position: Position,
        old_name: impl Into<String>,
        new_name: impl Into<String>,
        base_version: u64,
    ) -> Result<Self> {
        check_path(&position)?;
        Ok(Self {
            base_version,
            kind: OperationKind::Rename(RenameOperation {
                position,
                old_name: old_name.into(),
                new_name: new_name.into(),
            }),
        })
    }

    pub fn attribute(
        range: Range,
        key: impl Into<String>,
        old_value: Option<Value>,
        new_value: Option<Value>,
        base_version: u64,
    ) -> Result<Self> {
        check_attribute_range(&range)?;
        Ok(Self {
            base_version,
            kind: OperationKind::Attribute(AttributeOperation {
                range,
                key: key.into(),
                old_value,
                new_value,
            }),
        })
    }

    pub fn marker(
        name: impl Into<String>,
        old_range: Option<Range>,
        new_range: Option<Range>,
        base_version: u64,
    ) -> Self {
        Self {
            base_version,
            kind: OperationKind::Marker(MarkerOperation {
                name: name.into(),
                old_range,
                new_range,
            }),
        }
    }

    pub fn no_op(base_version: u64) -> Self {
        Self {
            base_version,
            kind: OperationKind::NoOp,
        }
    }

    /// Sets the stickiness of the insertion point of an insert or move.
    pub fn with_stickiness(mut self, stickiness: Stickiness) -> Self {
        match &mut self.kind {
            OperationKind::Insert(insert) => insert.stickiness = stickiness,
            OperationKind::Move(moved) | OperationKind::Remove(moved) => {
                moved.stickiness = stickiness
            }
            _ => {}
        }
        self
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self.kind, OperationKind::NoOp)
    }

    /// Checks the invariants the constructors enforce, for operations that
    /// arrive from outside.
    pub fn validate(&self) -> Result<()> {
        match &self.kind {
            OperationKind::Insert(insert) => {
                check_path(&insert.position)?;
                if insert.offset_size() == 0 {
                    return Err(ModelError::EmptyOperation);
                }
                Ok(())
            }
            OperationKind::Move(moved) | OperationKind::Remove(moved) => moved.validate(),
            OperationKind::Rename(rename) => check_path(&rename.position),
            OperationKind::Attribute(attribute) => check_attribute_range(&attribute.range),
            OperationKind::Marker(marker) => {
                for range in marker.old_range.iter().chain(&marker.new_range) {
                    check_path(&range.start)?;
                    check_path(&range.end)?;
                }
                Ok(())
            }
            OperationKind::NoOp => Ok(()),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            OperationKind::Insert(_) => "insert",
            OperationKind::Move(_) => "move",
            OperationKind::Remove(_) => "remove",
            OperationKind::Rename(_) => "rename",
            OperationKind::Attribute(_) => "attribute",
            OperationKind::Marker(_) => "marker",
            OperationKind::NoOp => "noOp",
        }
    }

    /// The operation that undoes this one once it has been applied.
    ///
    /// Removed content is looked up at the start of `graveyard`, where the
    /// removal put it.
    pub fn reversed(&self, graveyard: &str) -> Operation {
        let kind = match &self.kind {
            OperationKind::Insert(insert) => OperationKind::Remove(MoveOperation {
                source: insert.position.clone(),
                how_many: insert.offset_size(),
                target: Position::new(graveyard, vec![0]),
                stickiness: Stickiness::None,
            }),
            OperationKind::Move(moved) | OperationKind::Remove(moved) => {
                let reversed = moved.reversed();
                if reversed.target.root == graveyard {
                    OperationKind::Remove(reversed)
                } else {
                    OperationKind::Move(reversed)
                }
            }
            OperationKind::Rename(rename) => OperationKind::Rename(RenameOperation {
                position: rename.position.clone(),
                old_name: rename.new_name.clone(),
                new_name: rename.old_name.clone(),
            }),
            OperationKind::Attribute(attribute) => OperationKind::Attribute(AttributeOperation {
                range: attribute.range.clone(),
                key: attribute.key.clone(),
                old_value: attribute.new_value.clone(),
                new_value: attribute.old_value.clone(),
            }),
            OperationKind::Marker(marker) => OperationKind::Marker(MarkerOperation {
                name: marker.name.clone(),
                old_range: marker.new_range.clone(),
                new_range: marker.old_range.clone(),
            }),
            OperationKind::NoOp => OperationKind::NoOp,
        };
        Operation {
            base_version: self.base_version + 1,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(path: &[usize]) -> Position {
        Position::new("main", path.to_vec())
    }

    #[test]
    fn construction_rejects_degenerate_operations() {
        assert_eq!(
            Operation::insert(pos(&[]), vec![Node::text("x")], 0),
            Err(ModelError::InvalidPosition(pos(&[])))
        );
        assert_eq!(
            Operation::insert(pos(&[0]), vec![Node::text("")], 0),
            Err(ModelError::EmptyOperation)
        );
        assert_eq!(
            Operation::move_nodes(pos(&[1]), 3, pos(&[2, 0]), 0),
            Err(ModelError::MoveIntoItself)
        );
        let collapsed = Range::collapsed(pos(&[0, 1]));
        assert!(matches!(
            Operation::attribute(collapsed, "bold", None, Some(Value::Bool(true)), 0),
            Err(ModelError::InvalidRange(_))
        ));
    }

    #[test]
    fn move_reversal_returns_nodes_to_source() {
        let op = Operation::move_nodes(pos(&[1]), 2, pos(&[4]), 7).unwrap();
        let reversed = op.reversed("$graveyard");
        assert_eq!(reversed.base_version, 8);
        let OperationKind::Move(moved) = reversed.kind else {
            panic!("expected a move");
        };
        assert_eq!(moved.source, pos(&[2]));
        assert_eq!(moved.how_many, 2);
        assert_eq!(moved.target, pos(&[1]));
    }

    #[test]
    fn wire_format_is_flat_and_tagged() {
        let op = Operation::rename(pos(&[0]), "p", "h1", 3).unwrap();
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["baseVersion"], 3);
        assert_eq!(json["kind"], "rename");
        assert_eq!(json["newName"], "h1");
        let back: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn deserializing_checks_the_operation() {
        let empty_move = serde_json::json!({
            "baseVersion": 0,
            "kind": "move",
            "source": { "root": "main", "path": [0] },
            "howMany": 0,
            "target": { "root": "main", "path": [2] },
        });
        let err = serde_json::from_value::<Operation>(empty_move).unwrap_err();
        assert!(err.to_string().contains("no content"), "{err}");

        let root_rename = serde_json::json!({
            "baseVersion": 0,
            "kind": "rename",
            "position": { "root": "main", "path": [] },
            "oldName": "p",
            "newName": "h1",
        });
        assert!(serde_json::from_value::<Operation>(root_rename).is_err());
    }
}
