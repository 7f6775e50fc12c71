//! An in-memory, scripted host backend.
//!
//! Tests build a small element tree, register click/write reactions that
//! mutate it the way the real page would, and point the engine at it
//! through the normal `HostBackend` seam.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::ExtractionError;
use crate::host::{HostBackend, HostElement, HostElementImpl, Page};
use crate::selector::Selector;

type ClickFn = Arc<dyn Fn(&mut TreeState) + Send + Sync>;
type WriteFn = Arc<dyn Fn(&mut TreeState, &str) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Node {
    pub tag: String,
    pub dom_id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: HashMap<String, String>,
    pub text: String,
    pub value: String,
    pub visible: bool,
    pub children: Vec<u64>,
}

/// Builder for one node.
#[derive(Debug, Clone)]
pub struct NodeSpec(Node);

impl NodeSpec {
    pub fn tag(tag: &str) -> Self {
        Self(Node {
            tag: tag.to_string(),
            dom_id: None,
            classes: Vec::new(),
            attrs: HashMap::new(),
            text: String::new(),
            value: String::new(),
            visible: true,
            children: Vec::new(),
        })
    }

    pub fn id(mut self, id: &str) -> Self {
        self.0.dom_id = Some(id.to_string());
        self
    }

    pub fn class(mut self, classes: &str) -> Self {
        self.0
            .classes
            .extend(classes.split_whitespace().map(str::to_string));
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.0.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.0.text = text.to_string();
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.0.value = value.to_string();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.0.visible = false;
        self
    }
}

/// The mutable tree plus the interaction log. Reactions receive this.
#[derive(Default)]
pub struct TreeState {
    nodes: HashMap<u64, Node>,
    roots: Vec<u64>,
    next: u64,
    /// `(node, written value)` in write order.
    pub writes: Vec<(u64, String)>,
    pub clicks: Vec<u64>,
    /// Free counter for reactions that need per-commit behavior.
    pub commit_count: usize,
}

impl TreeState {
    fn insert(&mut self, parent: Option<u64>, spec: NodeSpec) -> u64 {
        let id = self.next;
        self.next += 1;
        self.nodes.insert(id, spec.0);
        match parent {
            Some(p) => {
                if let Some(node) = self.nodes.get_mut(&p) {
                    node.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        id
    }

    pub fn set_text(&mut self, id: u64, text: &str) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.text = text.to_string();
        }
    }

    pub fn set_value(&mut self, id: u64, value: &str) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.value = value.to_string();
        }
    }

    pub fn set_visible(&mut self, id: u64, visible: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.visible = visible;
        }
    }

    pub fn value_of(&self, id: u64) -> String {
        self.nodes.get(&id).map(|n| n.value.clone()).unwrap_or_default()
    }

    pub fn text_of(&self, id: u64) -> String {
        self.text_content(id)
    }

    /// Own text plus descendants' text, space-joined, like `textContent`.
    fn text_content(&self, id: u64) -> String {
        let Some(node) = self.nodes.get(&id) else {
            return String::new();
        };
        let mut parts = Vec::new();
        if !node.text.is_empty() {
            parts.push(node.text.clone());
        }
        for child in &node.children {
            let inner = self.text_content(*child);
            if !inner.is_empty() {
                parts.push(inner);
            }
        }
        parts.join(" ")
    }

    fn descendants(&self, id: u64, out: &mut Vec<u64>) {
        if let Some(node) = self.nodes.get(&id) {
            for child in &node.children {
                out.push(*child);
                self.descendants(*child, out);
            }
        }
    }

    fn all_in_document_order(&self) -> Vec<u64> {
        let mut out = Vec::new();
        for root in &self.roots {
            out.push(*root);
            self.descendants(*root, &mut out);
        }
        out
    }

    fn matches(&self, id: u64, step: &Selector) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        match step {
            Selector::Tag(tag) => node.tag == *tag,
            Selector::Id(dom_id) => node.dom_id.as_deref() == Some(dom_id),
            Selector::Class(classes) => classes
                .split_whitespace()
                .all(|c| node.classes.iter().any(|have| have == c)),
            Selector::Attr { name, value } => {
                node.attrs.get(name).map(String::as_str) == Some(value)
            }
            Selector::Text(needle) => self.text_content(id).contains(needle),
            Selector::Visible(v) => node.visible == *v,
            Selector::Chain(_) | Selector::Invalid(_) => false,
        }
    }

    /// Resolve a selector against the tree. Chains descend through
    /// descendants step by step; `Visible` steps filter the current set
    /// instead of descending.
    fn resolve(&self, selector: &Selector, root: Option<u64>) -> Vec<u64> {
        let steps: Vec<&Selector> = match selector {
            Selector::Chain(parts) => parts.iter().collect(),
            single => vec![single],
        };

        let mut current: Option<Vec<u64>> = None;
        for step in steps {
            if let Selector::Visible(_) = step {
                let set = current.take().unwrap_or_default();
                current = Some(
                    set.into_iter()
                        .filter(|id| self.matches(*id, step))
                        .collect(),
                );
                continue;
            }
            let candidates: Vec<u64> = match &current {
                None => match root {
                    Some(root_id) => {
                        let mut out = Vec::new();
                        self.descendants(root_id, &mut out);
                        out
                    }
                    None => self.all_in_document_order(),
                },
                Some(prev) => {
                    let mut out = Vec::new();
                    let mut seen = HashSet::new();
                    for id in prev {
                        let mut subtree = Vec::new();
                        self.descendants(*id, &mut subtree);
                        for d in subtree {
                            if seen.insert(d) {
                                out.push(d);
                            }
                        }
                    }
                    out
                }
            };
            current = Some(
                candidates
                    .into_iter()
                    .filter(|id| self.matches(*id, step))
                    .collect(),
            );
        }
        current.unwrap_or_default()
    }
}

struct Inner {
    state: TreeState,
    click_fns: HashMap<u64, ClickFn>,
    write_fns: HashMap<u64, WriteFn>,
}

/// The scripted backend. Cloning shares the tree.
#[derive(Clone)]
pub struct FakeHost {
    inner: Arc<Mutex<Inner>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: TreeState::default(),
                click_fns: HashMap::new(),
                write_fns: HashMap::new(),
            })),
        }
    }

    pub fn page(&self) -> Page {
        Page::new(Arc::new(self.clone()))
    }

    pub fn add_root(&self, spec: NodeSpec) -> u64 {
        self.lock().state.insert(None, spec)
    }

    pub fn add_child(&self, parent: u64, spec: NodeSpec) -> u64 {
        self.lock().state.insert(Some(parent), spec)
    }

    /// Run `f` when the node is clicked.
    pub fn on_click(&self, id: u64, f: impl Fn(&mut TreeState) + Send + Sync + 'static) {
        self.lock().click_fns.insert(id, Arc::new(f));
    }

    /// Run `f` after a value is written to the node.
    pub fn on_write(&self, id: u64, f: impl Fn(&mut TreeState, &str) + Send + Sync + 'static) {
        self.lock().write_fns.insert(id, Arc::new(f));
    }

    /// Inspect or mutate the tree directly.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut TreeState) -> R) -> R {
        f(&mut self.lock().state)
    }

    /// Every value written to `id`, in order.
    pub fn writes_to(&self, id: u64) -> Vec<String> {
        self.lock()
            .state
            .writes
            .iter()
            .filter(|(node, _)| *node == id)
            .map(|(_, value)| value.clone())
            .collect()
    }

    /// The full write log as `(node, value)` pairs.
    pub fn write_log(&self) -> Vec<(u64, String)> {
        self.lock().state.writes.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl HostBackend for FakeHost {
    async fn find_all(
        &self,
        selector: &Selector,
        root: Option<&HostElement>,
    ) -> Result<Vec<HostElement>, ExtractionError> {
        if let Some(reason) = selector.invalid_reason() {
            return Err(ExtractionError::InvalidSelector(reason.to_string()));
        }
        let root_id = match root {
            Some(el) => Some(el.handle().parse::<u64>().map_err(|_| {
                ExtractionError::HostError("foreign element handle".into())
            })?),
            None => None,
        };
        let guard = self.lock();
        let ids = guard.state.resolve(selector, root_id);
        Ok(ids
            .into_iter()
            .map(|id| {
                let node = &guard.state.nodes[&id];
                HostElement::new(FakeElement {
                    host: self.clone(),
                    id,
                    tag: node.tag.clone(),
                    dom_id: node.dom_id.clone(),
                })
            })
            .collect())
    }
}

struct FakeElement {
    host: FakeHost,
    id: u64,
    tag: String,
    dom_id: Option<String>,
}

impl std::fmt::Debug for FakeElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeElement")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .finish()
    }
}

#[async_trait]
impl HostElementImpl for FakeElement {
    fn handle(&self) -> String {
        self.id.to_string()
    }

    fn tag(&self) -> String {
        self.tag.clone()
    }

    fn id(&self) -> Option<String> {
        self.dom_id.clone()
    }

    async fn text(&self) -> Result<String, ExtractionError> {
        Ok(self.host.lock().state.text_content(self.id))
    }

    async fn attr(&self, name: &str) -> Result<Option<String>, ExtractionError> {
        Ok(self
            .host
            .lock()
            .state
            .nodes
            .get(&self.id)
            .and_then(|n| n.attrs.get(name).cloned()))
    }

    async fn value(&self) -> Result<String, ExtractionError> {
        Ok(self.host.lock().state.value_of(self.id))
    }

    async fn set_value(&self, value: &str) -> Result<(), ExtractionError> {
        let mut guard = self.host.lock();
        guard.state.writes.push((self.id, value.to_string()));
        guard.state.set_value(self.id, value);
        let reaction = guard.write_fns.get(&self.id).cloned();
        if let Some(f) = reaction {
            f(&mut guard.state, value);
        }
        Ok(())
    }

    async fn click(&self) -> Result<(), ExtractionError> {
        let mut guard = self.host.lock();
        guard.state.clicks.push(self.id);
        let reaction = guard.click_fns.get(&self.id).cloned();
        if let Some(f) = reaction {
            f(&mut guard.state);
        }
        Ok(())
    }

    async fn is_visible(&self) -> Result<bool, ExtractionError> {
        Ok(self
            .host
            .lock()
            .state
            .nodes
            .get(&self.id)
            .map(|n| n.visible)
            .unwrap_or(false))
    }

    fn clone_box(&self) -> Box<dyn HostElementImpl> {
        Box::new(FakeElement {
            host: self.host.clone(),
            id: self.id,
            tag: self.tag.clone(),
            dom_id: self.dom_id.clone(),
        })
    }
}
