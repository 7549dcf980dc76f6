//! Version ledger and editing session.
//!
//! [`History`] keeps the deltas applied to a document in version order so
//! that a delta based on an older version can be rebased against everything
//! applied since. [`EditingSession`] ties a document to its history and
//! implements rebasing of remote deltas and undo of local batches.

use crate::delta::{BatchId, Delta, TransformContext, transform_delta_sets};
use crate::doc::Document;
use crate::error::{ModelError, Result};
use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Number of deltas kept; 0 keeps all of them.
    pub max_deltas: usize,
}

impl HistoryConfig {
    pub fn with_max_deltas(max_deltas: usize) -> Self {
        Self { max_deltas }
    }
}

#[derive(Debug, Clone)]
pub struct History {
    config: HistoryConfig,
    deltas: VecDeque<Delta>,
    /// Version the oldest retained delta is based on.
    start_version: u64,
    /// Batches that lost deltas to trimming but still have retained ones.
    trimmed: HashSet<BatchId>,
}

impl History {
    /// Empty history of a document currently at `version`.
    pub fn new(config: HistoryConfig, version: u64) -> Self {
        Self {
            config,
            deltas: VecDeque::new(),
            start_version: version,
            trimmed: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delta> {
        self.deltas.iter()
    }

    /// Oldest version that can still be rebased from.
    pub fn start_version(&self) -> u64 {
        self.start_version
    }

    /// Version reached after the latest recorded delta.
    pub fn end_version(&self) -> u64 {
        self.deltas
            .back()
            .map_or(self.start_version, Delta::next_version)
    }

    pub fn record(&mut self, delta: Delta) {
        self.deltas.push_back(delta);
        if self.config.max_deltas == 0 {
            return;
        }
        while self.deltas.len() > self.config.max_deltas {
            if let Some(dropped) = self.deltas.pop_front() {
                self.start_version = dropped.next_version();
                self.trimmed.insert(dropped.batch());
            }
        }
        if !self.trimmed.is_empty() {
            let deltas = &self.deltas;
            self.trimmed
                .retain(|batch| deltas.iter().any(|delta| delta.batch() == *batch));
        }
    }

    /// Whether `batch` lost some of its deltas to trimming while others are
    /// still retained.
    pub fn is_partially_trimmed(&self, batch: BatchId) -> bool {
        self.trimmed.contains(&batch)
    }

    /// Deltas applied from `version` on, oldest first.
    pub fn deltas_since(&self, version: u64) -> Result<Vec<Delta>> {
        if version < self.start_version || version > self.end_version() {
            return Err(ModelError::HistoryUnavailable(version));
        }
        let mut since = Vec::new();
        for delta in &self.deltas {
            if delta.base_version() >= version {
                since.push(delta.clone());
            } else if delta.next_version() > version {
                // `version` falls inside this delta.
                return Err(ModelError::HistoryUnavailable(version));
            }
        }
        Ok(since)
    }

    /// Deltas of `batch`, oldest first.
    pub fn batch(&self, batch: BatchId) -> impl Iterator<Item = &Delta> {
        self.deltas.iter().filter(move |delta| delta.batch() == batch)
    }
}

/// A document together with the history of the deltas applied to it.
#[derive(Debug, Clone)]
pub struct EditingSession {
    document: Document,
    history: History,
}

impl EditingSession {
    pub fn new(document: Document, config: HistoryConfig) -> Self {
        let history = History::new(config, document.version());
        Self { document, history }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    /// Applies a delta based on the current version.
    pub fn apply(&mut self, delta: Delta) -> Result<()> {
        self.document.apply_delta(&delta)?;
        self.history.record(delta);
        Ok(())
    }

    /// Applies a delta based on any retained version, rebasing it over the
    /// deltas applied since. Returns the deltas actually applied.
    pub fn receive(&mut self, delta: Delta, context: &TransformContext) -> Result<Vec<Delta>> {
        let concurrent = self.history.deltas_since(delta.base_version())?;
        let (rebased, _) = transform_delta_sets(std::slice::from_ref(&delta), &concurrent, context);
        tracing::debug!(
            base_version = delta.base_version(),
            concurrent = concurrent.len(),
            rebased = rebased.len(),
            "received delta"
        );
        self.commit(rebased.clone())?;
        Ok(rebased)
    }

    /// Reverts every delta of `batch`, latest first, on top of whatever was
    /// applied after it. The reverting deltas share a new batch, which is
    /// returned; `None` when no retained delta belongs to `batch`. A batch
    /// that was partly trimmed from the history cannot be undone.
    pub fn undo(&mut self, batch: BatchId) -> Result<Option<BatchId>> {
        if self.history.is_partially_trimmed(batch) {
            return Err(ModelError::HistoryUnavailable(self.history.start_version()));
        }
        let targets: Vec<Delta> = self.history.batch(batch).cloned().collect();
        if targets.is_empty() {
            return Ok(None);
        }
        let undo_batch = Uuid::new_v4();
        let graveyard = self.document.graveyard().to_string();
        let context = TransformContext::new(true, graveyard.as_str()).same_session(true);

        let mut working = self.clone();
        for delta in targets.iter().rev() {
            let reversal = delta.reversed(&graveyard).with_batch(undo_batch);
            let later = working.history.deltas_since(reversal.base_version())?;
            let (rebased, _) = transform_delta_sets(&[reversal], &later, &context);
            for delta in rebased {
                working.apply(delta.with_batch(undo_batch))?;
            }
        }
        tracing::debug!(%batch, %undo_batch, deltas = targets.len(), "undid batch");
        *self = working;
        Ok(Some(undo_batch))
    }

    /// Applies `deltas` in order, all or none.
    fn commit(&mut self, deltas: Vec<Delta>) -> Result<()> {
        let mut working = self.document.clone();
        for delta in &deltas {
            working.apply_delta(delta)?;
        }
        self.document = working;
        for delta in deltas {
            self.history.record(delta);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Position;
    use crate::delta::DeltaKind;
    use crate::ops::Operation;

    fn no_op_delta(base_version: u64) -> Delta {
        Delta::builder(DeltaKind::NoOp, base_version)
            .push(Operation::no_op(0))
            .push(Operation::no_op(0))
            .build()
            .unwrap()
    }

    #[test]
    fn trimming_moves_the_start_version() {
        let mut history = History::new(HistoryConfig::with_max_deltas(2), 0);
        for base in [0, 2, 4] {
            history.record(no_op_delta(base));
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.start_version(), 2);
        assert_eq!(history.end_version(), 6);
        assert_eq!(
            history.deltas_since(0).unwrap_err(),
            ModelError::HistoryUnavailable(0)
        );
        assert_eq!(history.deltas_since(4).unwrap().len(), 1);
        assert!(history.deltas_since(6).unwrap().is_empty());
    }

    #[test]
    fn versions_inside_a_delta_are_rejected() {
        let mut history = History::new(HistoryConfig::default(), 0);
        history.record(no_op_delta(0));
        assert_eq!(
            history.deltas_since(1).unwrap_err(),
            ModelError::HistoryUnavailable(1)
        );
    }

    #[test]
    fn undo_of_unknown_batch_does_nothing() {
        let mut session = EditingSession::new(Document::default(), HistoryConfig::default());
        let insert = Delta::insert(
            Position::new("main", vec![0]),
            vec![crate::doc::Node::text("a")],
            0,
        )
        .unwrap();
        session.apply(insert).unwrap();
        assert_eq!(session.undo(Uuid::new_v4()).unwrap(), None);
        assert_eq!(session.document().version(), 1);
    }

    #[test]
    fn trimmed_batches_are_forgotten_once_fully_gone() {
        let mut history = History::new(HistoryConfig::with_max_deltas(1), 0);
        let batch = Uuid::new_v4();
        history.record(no_op_delta(0).with_batch(batch));
        history.record(no_op_delta(2).with_batch(batch));
        assert!(history.is_partially_trimmed(batch));

        history.record(no_op_delta(4));
        assert!(!history.is_partially_trimmed(batch));
        assert_eq!(history.batch(batch).count(), 0);
    }
}
