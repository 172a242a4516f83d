#![forbid(unsafe_code)]

//! Deterministic in-memory DOM.
//!
//! [`MemoryDom`] implements [`HostDom`] without a browser so the engine can be
//! driven step by step in tests and headless tools. It models just enough of
//! a page:
//!
//! - an element tree with attributes, rooted at `<html>` with a `<body>`;
//! - block layout: leaves have an intrinsic height, parents are as tall as
//!   their children, scroll containers have a fixed client height and a
//!   clamped `scrollTop`;
//! - compound selectors: `tag`, `#id`, `.class`, `[attr]`, `[attr="v"]`,
//!   `[attr^="v"]`, and comma-separated groups (no combinators);
//! - child-list mutation records, drained through
//!   [`HostDom::take_mutations`], like a `MutationObserver` on `<body>`;
//! - a write counter, so tests can assert that a pass touched nothing.
//!
//! Handles are plain indices; the tree lives behind `Rc<RefCell<_>>` so clones
//! of a `MemoryDom` share one document.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::host::{HostDom, MutationBatch, ScrollMetrics};

/// Element handle inside a [`MemoryDom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy)]
struct ScrollBox {
    client_height: f64,
    scroll_top: f64,
}

#[derive(Debug)]
struct NodeData {
    tag: String,
    attrs: BTreeMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    own_height: f64,
    scroll: Option<ScrollBox>,
}

#[derive(Debug)]
struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
    body: NodeId,
    location: String,
    writes: u64,
    pending: MutationBatch<NodeId>,
}

/// Shared handle to an in-memory document.
#[derive(Debug, Clone)]
pub struct MemoryDom {
    tree: Rc<RefCell<Tree>>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    /// Create a document containing `<html><body></body></html>`.
    #[must_use]
    pub fn new() -> Self {
        let mut tree = Tree {
            nodes: Vec::new(),
            root: NodeId(0),
            body: NodeId(1),
            location: "about:blank".to_string(),
            writes: 0,
            pending: MutationBatch::default(),
        };
        let root = tree.alloc("html");
        let body = tree.alloc("body");
        tree.nodes[body.0].parent = Some(root);
        tree.nodes[root.0].children.push(body);
        tree.root = root;
        tree.body = body;
        Self {
            tree: Rc::new(RefCell::new(tree)),
        }
    }

    #[must_use]
    pub fn body(&self) -> NodeId {
        self.tree.borrow().body
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.tree.borrow_mut().alloc(tag)
    }

    /// Create an element, give it attributes and a height, and append it.
    pub fn append_element(
        &self,
        parent: NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
        height: f64,
    ) -> NodeId {
        let node = self.create_element(tag);
        {
            let mut tree = self.tree.borrow_mut();
            let data = &mut tree.nodes[node.0];
            for (name, value) in attrs {
                data.attrs.insert((*name).to_string(), (*value).to_string());
            }
            data.own_height = height;
        }
        self.append_child(parent, node);
        node
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.tree.borrow_mut().insert(parent, child, None);
    }

    /// Set the intrinsic height of a leaf element.
    pub fn set_height(&self, node: NodeId, height: f64) {
        self.tree.borrow_mut().nodes[node.0].own_height = height;
    }

    /// Turn `node` into a scroll container with a fixed visible height.
    pub fn make_scrollable(&self, node: NodeId, client_height: f64) {
        self.tree.borrow_mut().nodes[node.0].scroll = Some(ScrollBox {
            client_height,
            scroll_top: 0.0,
        });
    }

    /// Scroll to the end of the content, as a user would.
    pub fn scroll_to_end(&self, container: NodeId) {
        let metrics = self.scroll_metrics(&container);
        self.set_scroll_top(&container, metrics.scroll_height);
    }

    pub fn set_location(&self, href: &str) {
        self.tree.borrow_mut().location = href.to_string();
    }

    #[must_use]
    pub fn tag(&self, node: NodeId) -> String {
        self.tree.borrow().nodes[node.0].tag.clone()
    }

    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree.borrow().nodes[node.0].children.clone()
    }

    /// Number of writes performed since creation.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.tree.borrow().writes
    }

    /// Drop any pending mutation records without delivering them.
    pub fn clear_mutations(&self) {
        self.tree.borrow_mut().pending = MutationBatch::default();
    }
}

impl Tree {
    fn alloc(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
            own_height: 0.0,
            scroll: None,
        });
        id
    }

    fn connected(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == self.root {
                return true;
            }
            match self.nodes[current.0].parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            let was_connected = self.connected(parent);
            self.nodes[parent.0].children.retain(|child| *child != node);
            self.writes += 1;
            if was_connected {
                self.pending.removed.push(node);
            }
        }
    }

    fn insert(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) {
        self.detach(node);
        let children = &mut self.nodes[parent.0].children;
        let at = reference
            .and_then(|r| children.iter().position(|child| *child == r))
            .unwrap_or(children.len());
        children.insert(at, node);
        self.nodes[node.0].parent = Some(parent);
        self.writes += 1;
        if self.connected(parent) {
            self.pending.added.push(node);
        }
    }

    fn content_height(&self, node: NodeId) -> f64 {
        let data = &self.nodes[node.0];
        if data.children.is_empty() {
            data.own_height
        } else {
            data.children.iter().map(|c| self.box_height(*c)).sum()
        }
    }

    fn box_height(&self, node: NodeId) -> f64 {
        match self.nodes[node.0].scroll {
            Some(scroll) => scroll.client_height,
            None => self.content_height(node),
        }
    }

    fn max_scroll(&self, node: NodeId) -> f64 {
        match self.nodes[node.0].scroll {
            Some(scroll) => (self.content_height(node) - scroll.client_height).max(0.0),
            None => 0.0,
        }
    }

    fn scroll_top(&self, node: NodeId) -> f64 {
        match self.nodes[node.0].scroll {
            Some(scroll) => scroll.scroll_top.clamp(0.0, self.max_scroll(node)),
            None => 0.0,
        }
    }

    fn top(&self, node: NodeId) -> f64 {
        let Some(parent) = self.nodes[node.0].parent else {
            return 0.0;
        };
        let before: f64 = self.nodes[parent.0]
            .children
            .iter()
            .take_while(|child| **child != node)
            .map(|child| self.box_height(*child))
            .sum();
        self.top(parent) - self.scroll_top(parent) + before
    }

    /// Child-index path from the topmost ancestor.
    fn path(&self, node: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = node;
        while let Some(parent) = self.nodes[current.0].parent {
            let idx = self.nodes[parent.0]
                .children
                .iter()
                .position(|child| *child == current)
                .unwrap_or(0);
            path.push(idx);
            current = parent;
        }
        path.reverse();
        path
    }

    fn descendants(&self, root: NodeId, out: &mut Vec<NodeId>) {
        for child in &self.nodes[root.0].children {
            out.push(*child);
            self.descendants(*child, out);
        }
    }

    fn matches(&self, node: NodeId, selector: &str) -> bool {
        let data = &self.nodes[node.0];
        selector
            .split(',')
            .filter_map(|part| Compound::parse(part.trim()))
            .any(|compound| compound.matches(data))
    }
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum AttrOp {
    Exists,
    Equals(String),
    Prefix(String),
}

#[derive(Debug, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, AttrOp)>,
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl Compound {
    /// Parse one compound selector. Returns `None` for anything outside the
    /// supported subset, which then matches nothing.
    fn parse(input: &str) -> Option<Self> {
        if input.is_empty() {
            return None;
        }
        let mut out = Self::default();
        let chars: Vec<char> = input.chars().collect();
        let mut i = 0;

        let ident = |i: &mut usize| -> String {
            let start = *i;
            while *i < chars.len() && is_ident(chars[*i]) {
                *i += 1;
            }
            chars[start..*i].iter().collect()
        };

        if chars[0] == '*' {
            i = 1;
        } else if is_ident(chars[0]) {
            out.tag = Some(ident(&mut i).to_ascii_lowercase());
        }

        while i < chars.len() {
            match chars[i] {
                '#' => {
                    i += 1;
                    out.id = Some(ident(&mut i));
                }
                '.' => {
                    i += 1;
                    out.classes.push(ident(&mut i));
                }
                '[' => {
                    i += 1;
                    let name = ident(&mut i);
                    if name.is_empty() {
                        return None;
                    }
                    let op = match *chars.get(i)? {
                        ']' => AttrOp::Exists,
                        '=' => {
                            i += 1;
                            AttrOp::Equals(Self::value(&chars, &mut i)?)
                        }
                        '^' if chars.get(i + 1) == Some(&'=') => {
                            i += 2;
                            AttrOp::Prefix(Self::value(&chars, &mut i)?)
                        }
                        _ => return None,
                    };
                    if chars.get(i) != Some(&']') {
                        return None;
                    }
                    i += 1;
                    out.attrs.push((name, op));
                }
                _ => return None,
            }
        }
        Some(out)
    }

    fn value(chars: &[char], i: &mut usize) -> Option<String> {
        let quote = match *chars.get(*i)? {
            q @ ('"' | '\'') => Some(q),
            _ => None,
        };
        if let Some(q) = quote {
            *i += 1;
            let start = *i;
            while *i < chars.len() && chars[*i] != q {
                *i += 1;
            }
            let value = chars.get(start..*i)?.iter().collect();
            *i += 1;
            Some(value)
        } else {
            let start = *i;
            while *i < chars.len() && is_ident(chars[*i]) {
                *i += 1;
            }
            Some(chars[start..*i].iter().collect())
        }
    }

    fn matches(&self, data: &NodeData) -> bool {
        if let Some(tag) = &self.tag
            && *tag != data.tag
        {
            return false;
        }
        if let Some(id) = &self.id
            && data.attrs.get("id") != Some(id)
        {
            return false;
        }
        let class_list = data.attrs.get("class").map(String::as_str).unwrap_or("");
        if !self
            .classes
            .iter()
            .all(|class| class_list.split_whitespace().any(|c| c == class))
        {
            return false;
        }
        self.attrs.iter().all(|(name, op)| match (data.attrs.get(name), op) {
            (None, _) => false,
            (Some(_), AttrOp::Exists) => true,
            (Some(v), AttrOp::Equals(want)) => v == want,
            (Some(v), AttrOp::Prefix(want)) => v.starts_with(want.as_str()),
        })
    }
}

// ---------------------------------------------------------------------------
// HostDom
// ---------------------------------------------------------------------------

impl HostDom for MemoryDom {
    type Node = NodeId;

    fn query(&self, selector: &str) -> Option<NodeId> {
        let tree = self.tree.borrow();
        let mut all = Vec::new();
        tree.descendants(tree.root, &mut all);
        all.into_iter().find(|node| tree.matches(*node, selector))
    }

    fn query_all(&self, root: &NodeId, selector: &str) -> Vec<NodeId> {
        let tree = self.tree.borrow();
        let mut all = Vec::new();
        tree.descendants(*root, &mut all);
        all.retain(|node| tree.matches(*node, selector));
        all
    }

    fn matches(&self, node: &NodeId, selector: &str) -> bool {
        self.tree.borrow().matches(*node, selector)
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        self.tree.borrow().nodes[node.0].parent
    }

    fn contains(&self, ancestor: &NodeId, node: &NodeId) -> bool {
        let tree = self.tree.borrow();
        let mut current = Some(*node);
        while let Some(n) = current {
            if n == *ancestor {
                return true;
            }
            current = tree.nodes[n.0].parent;
        }
        false
    }

    fn is_connected(&self, node: &NodeId) -> bool {
        self.tree.borrow().connected(*node)
    }

    fn follows(&self, node: &NodeId, other: &NodeId) -> bool {
        let tree = self.tree.borrow();
        tree.path(*node) > tree.path(*other)
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.tree.borrow().nodes[node.0].attrs.get(name).cloned()
    }

    fn set_attribute(&self, node: &NodeId, name: &str, value: &str) {
        let mut tree = self.tree.borrow_mut();
        tree.nodes[node.0]
            .attrs
            .insert(name.to_string(), value.to_string());
        tree.writes += 1;
    }

    fn create_placeholder(&self, height: f64, attribute: &str, value: &str) -> Option<NodeId> {
        let mut tree = self.tree.borrow_mut();
        let node = tree.alloc("div");
        let data = &mut tree.nodes[node.0];
        data.attrs.insert(attribute.to_string(), value.to_string());
        data.own_height = height;
        Some(node)
    }

    fn set_placeholder_height(&self, placeholder: &NodeId, height: f64) {
        let mut tree = self.tree.borrow_mut();
        tree.nodes[placeholder.0].own_height = height;
        tree.writes += 1;
    }

    fn replace_with(&self, old: &NodeId, new: &NodeId) {
        let mut tree = self.tree.borrow_mut();
        let Some(parent) = tree.nodes[old.0].parent else {
            return;
        };
        tree.insert(parent, *new, Some(*old));
        tree.detach(*old);
    }

    fn insert_before(&self, parent: &NodeId, node: &NodeId, reference: Option<&NodeId>) {
        self.tree
            .borrow_mut()
            .insert(*parent, *node, reference.copied());
    }

    fn remove(&self, node: &NodeId) {
        self.tree.borrow_mut().detach(*node);
    }

    fn top(&self, node: &NodeId) -> f64 {
        self.tree.borrow().top(*node)
    }

    fn height(&self, node: &NodeId) -> f64 {
        let tree = self.tree.borrow();
        if tree.connected(*node) {
            tree.box_height(*node)
        } else {
            0.0
        }
    }

    fn last_element_child(&self, node: &NodeId) -> Option<NodeId> {
        self.tree.borrow().nodes[node.0].children.last().copied()
    }

    fn scroll_metrics(&self, container: &NodeId) -> ScrollMetrics {
        let tree = self.tree.borrow();
        let client_height = tree.box_height(*container);
        ScrollMetrics {
            scroll_top: tree.scroll_top(*container),
            client_height,
            scroll_height: tree.content_height(*container).max(client_height),
        }
    }

    fn set_scroll_top(&self, container: &NodeId, scroll_top: f64) {
        let mut tree = self.tree.borrow_mut();
        let max = tree.max_scroll(*container);
        let tree = &mut *tree;
        if let Some(scroll) = tree.nodes[container.0].scroll.as_mut() {
            scroll.scroll_top = scroll_top.clamp(0.0, max);
            tree.writes += 1;
        }
    }

    fn take_mutations(&self) -> MutationBatch<NodeId> {
        std::mem::take(&mut self.tree.borrow_mut().pending)
    }

    fn location_href(&self) -> String {
        self.tree.borrow().location.clone()
    }
}
