//! Tree nodes and the offset arithmetic of child lists.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

pub type NodeId = Uuid;
pub type Attributes = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Node {
    Element(Element),
    Text(Text),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(default = "Uuid::new_v4")]
    pub id: NodeId,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    #[serde(default)]
    pub children: NodeList,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub data: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
}

/// Ordered children of an element. Adjacent text nodes with equal attributes
/// are kept merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeList(Vec<Node>);

impl Node {
    pub fn text(data: impl Into<String>) -> Self {
        Node::Text(Text::new(data))
    }

    pub fn element(name: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Element(Element::with_children(name, children))
    }

    /// Number of offsets the node occupies in its parent.
    pub fn offset_size(&self) -> usize {
        match self {
            Node::Element(_) => 1,
            Node::Text(text) => text.len(),
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Node::Element(element) => &element.attributes,
            Node::Text(text) => &text.attributes,
        }
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            Node::Element(element) => &mut element.attributes,
            Node::Text(text) => &mut text.attributes,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        }
    }

    /// Structural equality: names, attributes, text and shape, ignoring ids.
    pub fn same_structure(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Element(left), Node::Element(right)) => left.same_structure(right),
            (Node::Text(left), Node::Text(right)) => left == right,
            _ => false,
        }
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            attributes: Attributes::new(),
            children: NodeList::default(),
        }
    }

    pub fn with_children(name: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            children: NodeList::new(children),
            ..Self::new(name)
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Empty element with the same name and attributes but a fresh identity.
    pub fn shallow_clone(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            children: NodeList::default(),
        }
    }

    pub fn same_structure(&self, other: &Element) -> bool {
        self.name == other.name
            && self.attributes == other.attributes
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(other.children.iter())
                .all(|(left, right)| left.same_structure(right))
    }
}

impl Text {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            attributes: Attributes::new(),
        }
    }

    /// Length in grapheme clusters.
    pub fn len(&self) -> usize {
        self.data.graphemes(true).count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Splits off everything after `offset` graphemes.
    fn split_off(&mut self, offset: usize) -> Option<Text> {
        let byte_offset = grapheme_offset_to_byte(&self.data, offset)?;
        Some(Text {
            data: self.data.split_off(byte_offset),
            attributes: self.attributes.clone(),
        })
    }
}

pub fn offset_size_of(nodes: &[Node]) -> usize {
    nodes.iter().map(Node::offset_size).sum()
}

impl NodeList {
    pub fn new(nodes: Vec<Node>) -> Self {
        let mut list = Self(nodes);
        list.normalize();
        list
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Node] {
        &self.0
    }

    pub fn max_offset(&self) -> usize {
        offset_size_of(&self.0)
    }

    /// Index and starting offset of the node covering `offset`.
    pub fn node_at_offset(&self, offset: usize) -> Option<(usize, usize)> {
        let mut start = 0;
        for (index, node) in self.0.iter().enumerate() {
            let size = node.offset_size();
            if offset < start + size {
                return Some((index, start));
            }
            start += size;
        }
        None
    }

    /// The node starting exactly at `offset`, or the text node containing it.
    pub fn node_at(&self, offset: usize) -> Option<&Node> {
        self.node_at_offset(offset).map(|(index, _)| &self.0[index])
    }

    /// The element starting exactly at `offset`.
    pub fn element_at(&self, offset: usize) -> Option<&Element> {
        match self.node_at_offset(offset)? {
            (index, start) if start == offset => self.0[index].as_element(),
            _ => None,
        }
    }

    pub fn element_at_mut(&mut self, offset: usize) -> Option<&mut Element> {
        match self.node_at_offset(offset)? {
            (index, start) if start == offset => match &mut self.0[index] {
                Node::Element(element) => Some(element),
                Node::Text(_) => None,
            },
            _ => None,
        }
    }

    /// Ensures a node boundary at `offset` by splitting the text node that
    /// spans it. Returns the index of the first node at or after `offset`.
    fn split_at(&mut self, offset: usize) -> Option<usize> {
        if offset == self.max_offset() {
            return Some(self.0.len());
        }
        let (index, start) = self.node_at_offset(offset)?;
        if start == offset {
            return Some(index);
        }
        let Node::Text(text) = &mut self.0[index] else {
            return None;
        };
        let tail = text.split_off(offset - start)?;
        self.0.insert(index + 1, Node::Text(tail));
        Some(index + 1)
    }

    pub(crate) fn insert(&mut self, offset: usize, nodes: Vec<Node>) -> Option<()> {
        let index = self.split_at(offset)?;
        self.0.splice(index..index, nodes);
        self.normalize();
        Some(())
    }

    pub(crate) fn remove(&mut self, start: usize, end: usize) -> Option<Vec<Node>> {
        if start > end || end > self.max_offset() {
            return None;
        }
        let first = self.split_at(start)?;
        let last = self.split_at(end)?;
        let removed = self.0.drain(first..last).collect();
        self.normalize();
        Some(removed)
    }

    /// Nodes covering `[start, end)`, split out of their text nodes so that
    /// they can be changed independently. The list must be normalized after.
    pub(crate) fn nodes_mut(&mut self, start: usize, end: usize) -> Option<&mut [Node]> {
        if start > end || end > self.max_offset() {
            return None;
        }
        let first = self.split_at(start)?;
        let last = self.split_at(end)?;
        Some(&mut self.0[first..last])
    }

    /// Nodes covering `[start, end)`, cloned and cut at the boundaries.
    pub fn slice(&self, start: usize, end: usize) -> Option<Vec<Node>> {
        let mut copy = self.clone();
        copy.nodes_mut(start, end).map(|nodes| nodes.to_vec())
    }

    pub(crate) fn normalize(&mut self) {
        let mut merged: Vec<Node> = Vec::with_capacity(self.0.len());
        for node in self.0.drain(..) {
            if let Node::Text(text) = &node {
                if text.is_empty() {
                    continue;
                }
                if let Some(Node::Text(previous)) = merged.last_mut()
                    && previous.attributes == text.attributes
                    && !fuses(&previous.data, &text.data)
                {
                    previous.data.push_str(&text.data);
                    continue;
                }
            }
            merged.push(node);
        }
        self.0 = merged;
    }
}

impl From<Vec<Node>> for NodeList {
    fn from(nodes: Vec<Node>) -> Self {
        Self::new(nodes)
    }
}

/// Whether joining the two strings turns the graphemes on either side of the
/// seam into one. Such texts stay separate nodes so offsets remain additive.
fn fuses(left: &str, right: &str) -> bool {
    let (Some(last), Some(first)) = (left.graphemes(true).next_back(), right.graphemes(true).next())
    else {
        return false;
    };
    let mut seam = String::with_capacity(last.len() + first.len());
    seam.push_str(last);
    seam.push_str(first);
    seam.graphemes(true).nth(1).is_none()
}

fn grapheme_offset_to_byte(text: &str, grapheme_offset: usize) -> Option<usize> {
    if grapheme_offset == 0 {
        return Some(0);
    }

    let mut count = 0;
    for (byte_index, _) in text.grapheme_indices(true) {
        if count == grapheme_offset {
            return Some(byte_index);
        }
        count += 1;
    }
    if count == grapheme_offset {
        Some(text.len())
    } else {
        None
    }
}
