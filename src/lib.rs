//! tree-ot: operational transformation for collaboratively edited document
//! trees.
//!
//! A document is a set of named roots of elements and text. Every change is
//! expressed as invertible operations grouped into deltas, and concurrent
//! deltas are transformed against each other so that every replica converges
//! on the same tree. It includes:
//!
//! - **Positions and ranges** - tree addresses and how edits move them
//! - **Document model** - roots, the graveyard root, markers and versioning
//! - **Operations** - insert, move, remove, rename, attribute and marker
//! - **Deltas** - split, merge, wrap, unwrap and friends, with their
//!   structural transformation rules
//! - **History** - rebasing against applied deltas and undo
//!
//! # Quick Start
//!
//! ```rust
//! use tree_ot::{Delta, DeltaRequest, Document, Node, Position, TransformContext, transform};
//!
//! let doc = Document::from_nodes(vec![Node::element("p", vec![Node::text("hello")])]);
//! let mine = Delta::create(&doc, DeltaRequest::Split { position: Position::new("main", vec![0, 2]) }).unwrap();
//! let theirs = Delta::create(&doc, DeltaRequest::Insert {
//!     position: Position::new("main", vec![0, 5]),
//!     nodes: vec![Node::text("!")],
//! }).unwrap();
//!
//! let rebased = transform(&mine, &theirs, &TransformContext::for_document(&doc, true));
//! let mut replica = doc.clone();
//! replica.apply_delta(&theirs).unwrap();
//! for delta in &rebased {
//!     replica.apply_delta(delta).unwrap();
//! }
//! ```
//!
//! # Features
//!
//! - `cli` (default) - builds the `tree-ot` command line tool

// Positions and ranges
pub mod core;

// Document tree and nodes
pub mod doc;

// Atomic operations and their pairwise transformation
pub mod ops;

// Deltas and delta transformation
pub mod delta;

// Version ledger, rebase and undo
pub mod history;

pub mod error;

pub use core::{PathRelation, Position, PositionRelation, Range, Stickiness, compare_paths};

pub use doc::{
    Attributes, Change, ChangeKind, DEFAULT_GRAVEYARD, DEFAULT_ROOT, Document, DocumentConfig,
    Element, Node, NodeId, NodeList, Text,
};

pub use ops::{
    AttributeOperation, InsertOperation, MarkerOperation, MoveOperation, Operation,
    OperationKind, RenameOperation,
};

pub use delta::{
    BatchId, Delta, DeltaBuilder, DeltaKind, DeltaRequest, TransformContext, transform,
    transform_delta_sets,
};

pub use history::{EditingSession, History, HistoryConfig};

pub use error::{ModelError, Result};
