//! The build graph: nodes, the parents they are built from, and the rules
//! that build them.
//!
//! A node's *parents* are the nodes it depends on.  A node with no parents
//! is an original source; a node that is nobody's parent is a final target.
//! Children are never stored; they are derived from the parent sets when
//! asked for.

use crate::arena::{Arena, Handle};
use crate::canon::canon_path;
use crate::rule::{Action, BuildRule};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

/// Handle to a node within one graph.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl Handle for NodeId {
    fn from_parts(index: usize, generation: u32) -> Self {
        NodeId {
            index: index as u32,
            generation,
        }
    }
    fn index(&self) -> usize {
        self.index as usize
    }
    fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RuleId(pub(crate) usize);

/// Build state of a node within a single build walk.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NodeState {
    /// Not yet visited, or visited and found up to date.
    Unknown,
    /// An original source: never built, only checked for changes.
    Source,
    /// Stale; the node's rule is scheduled to run.
    Stale,
    /// The node's rule is running.
    Building,
    /// The node's rule ran and failed.
    Failed,
    /// Not attempted, because a parent failed or was itself tainted.
    Tainted,
    /// The node's rule ran and succeeded.
    Built,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeState::Unknown => "UNKNOWN",
            NodeState::Source => "SOURCE",
            NodeState::Stale => "STALE",
            NodeState::Building => "BUILDING",
            NodeState::Failed => "FAILED",
            NodeState::Tainted => "TAINTED",
            NodeState::Built => "BUILT",
        };
        f.write_str(name)
    }
}

/// The set of node kinds a graph may hold.
pub trait Kind: Clone + PartialEq + std::fmt::Debug {
    /// Name of the variant, used in diagnostics and to detect one name
    /// being declared as two different kinds of resource.
    fn kind_name(&self) -> &'static str;
    fn file(path: &str) -> Self;
    fn action() -> Self;
    fn group() -> Self;
}

/// A resource that can be checked for existence and change, i.e. one that
/// may take part in a build walk.
#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    File(PathBuf),
    /// The execution of an action with no filesystem output, e.g. a test run.
    Action,
    /// A named grouping of its parents.
    Group,
}

impl Kind for Resource {
    fn kind_name(&self) -> &'static str {
        match self {
            Resource::File(_) => "file",
            Resource::Action => "action",
            Resource::Group => "group",
        }
    }
    fn file(path: &str) -> Self {
        Resource::File(PathBuf::from(path))
    }
    fn action() -> Self {
        Resource::Action
    }
    fn group() -> Self {
        Resource::Group
    }
}

/// Node kinds as declared, before patterns are expanded.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    File(PathBuf),
    Action,
    Group,
    /// A filename pattern, replaced by the files it matches before building.
    Pattern(String),
}

impl Kind for NodeKind {
    fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::File(_) => "file",
            NodeKind::Action => "action",
            NodeKind::Group => "group",
            NodeKind::Pattern(_) => "pattern",
        }
    }
    fn file(path: &str) -> Self {
        NodeKind::File(PathBuf::from(path))
    }
    fn action() -> Self {
        NodeKind::Action
    }
    fn group() -> Self {
        NodeKind::Group
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("cannot add {new} '{name}': there is already a {old} with that name")]
    KindMismatch {
        name: String,
        new: &'static str,
        old: &'static str,
    },
    #[error("multiple rules for '{0}'")]
    DuplicateRule(String),
    #[error("pattern '{0}' was not expanded before building")]
    Unexpanded(String),
}

#[derive(Debug)]
pub struct Node<K> {
    pub(crate) name: String,
    pub(crate) kind: K,
    pub(crate) state: NodeState,
    pub(crate) rule: Option<RuleId>,
    /// Insertion ordered, without duplicates.
    pub(crate) parents: Vec<NodeId>,
}

impl<K> Node<K> {
    /// Unique within the owning graph.
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn kind(&self) -> &K {
        &self.kind
    }
    pub fn state(&self) -> NodeState {
        self.state
    }
    pub fn rule(&self) -> Option<RuleId> {
        self.rule
    }
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }
}

/// An ordered set of nodes, iterated in ascending id order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeSet(BTreeSet<NodeId>);

impl NodeSet {
    pub fn new() -> Self {
        NodeSet::default()
    }
    pub fn insert(&mut self, id: NodeId) -> bool {
        self.0.insert(id)
    }
    pub fn contains(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().copied()
    }
    pub fn extend(&mut self, other: &NodeSet) {
        self.0.extend(other.iter())
    }
}

impl FromIterator<NodeId> for NodeSet {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        NodeSet(iter.into_iter().collect())
    }
}

#[derive(Debug)]
pub struct Graph<K> {
    pub(crate) nodes: Arena<NodeId, Node<K>>,
    index: FxHashMap<String, NodeId>,
    pub(crate) rules: Vec<BuildRule>,
}

impl<K: Kind> Default for Graph<K> {
    fn default() -> Self {
        Graph {
            nodes: Arena::default(),
            index: FxHashMap::default(),
            rules: Vec::new(),
        }
    }
}

impl<K: Kind> Graph<K> {
    pub fn new() -> Self {
        Graph::default()
    }

    /// Look up the node named `name`, creating it if there is none.
    /// Asking for an existing name as a different kind of resource is an
    /// error in the graph's construction.
    pub fn add_node(&mut self, name: impl Into<String>, kind: K) -> Result<NodeId, GraphError> {
        let name = name.into();
        if let Some(&id) = self.index.get(&name) {
            let existing = &self.nodes[id].kind;
            if existing.kind_name() != kind.kind_name() {
                return Err(GraphError::KindMismatch {
                    name,
                    new: kind.kind_name(),
                    old: existing.kind_name(),
                });
            }
            return Ok(id);
        }
        let id = self.nodes.insert(Node {
            name: name.clone(),
            kind,
            state: NodeState::Unknown,
            rule: None,
            parents: Vec::new(),
        });
        self.index.insert(name, id);
        Ok(id)
    }

    pub fn add_file(&mut self, name: &str) -> Result<NodeId, GraphError> {
        self.add_node(name, K::file(name))
    }

    pub fn add_action(&mut self, name: &str) -> Result<NodeId, GraphError> {
        self.add_node(name, K::action())
    }

    pub fn add_group(&mut self, name: &str) -> Result<NodeId, GraphError> {
        self.add_node(name, K::group())
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    /// Returns None for an id whose node has been removed.
    pub fn get(&self, id: NodeId) -> Option<&Node<K>> {
        self.nodes.get(id)
    }

    pub fn node(&self, id: NodeId) -> &Node<K> {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node<K> {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All live node ids, ascending.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.ids()
    }

    /// Remove a node, along with every parent edge that refers to it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node<K>> {
        let node = self.nodes.remove(id)?;
        self.index.remove(&node.name);
        for (_, other) in self.nodes.iter_mut() {
            other.parents.retain(|&p| p != id);
        }
        for rule in self.rules.iter_mut() {
            rule.targets.retain(|&t| t != id);
        }
        Some(node)
    }

    /// Make `parent` a parent of `child`.  Adding an existing edge is a no-op.
    pub fn add_parent(&mut self, child: NodeId, parent: NodeId) {
        if !self.nodes.contains(parent) {
            panic!("stale node id {:?}", parent);
        }
        let parents = &mut self.nodes[child].parents;
        if !parents.contains(&parent) {
            parents.push(parent);
        }
    }

    /// Add the same set of parents to many children.
    pub fn add_many_parents(&mut self, children: &[NodeId], parents: &[NodeId]) {
        for &child in children {
            for &parent in parents {
                self.add_parent(child, parent);
            }
        }
    }

    pub fn parents(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].parents
    }

    pub fn has_parents(&self, id: NodeId) -> bool {
        !self.nodes[id].parents.is_empty()
    }

    /// Whether the node is built rather than only read: it has parents or
    /// a rule of its own.
    pub fn is_target(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        !node.parents.is_empty() || node.rule.is_some()
    }

    /// The nodes that list `id` as a parent, ascending.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.parents.contains(&id))
            .map(|(child, _)| child)
            .collect()
    }

    /// Bind a new rule to its targets.  A node is built by at most one rule.
    pub fn add_rule(
        &mut self,
        action: Rc<dyn Action>,
        targets: Vec<NodeId>,
    ) -> Result<RuleId, GraphError> {
        let id = RuleId(self.rules.len());
        for &target in &targets {
            if self.nodes[target].rule.is_some() {
                return Err(GraphError::DuplicateRule(self.nodes[target].name.clone()));
            }
        }
        for &target in &targets {
            self.nodes[target].rule = Some(id);
        }
        self.rules.push(BuildRule { action, targets });
        Ok(id)
    }

    pub fn rule(&self, id: RuleId) -> &BuildRule {
        &self.rules[id.0]
    }

    /// Make `node` one more target of an existing rule.
    pub fn set_rule(&mut self, node: NodeId, rule: RuleId) -> Result<(), GraphError> {
        match self.nodes[node].rule {
            Some(existing) if existing == rule => return Ok(()),
            Some(_) => return Err(GraphError::DuplicateRule(self.nodes[node].name.clone())),
            None => {}
        }
        self.nodes[node].rule = Some(rule);
        self.rules[rule.0].targets.push(node);
        Ok(())
    }

    pub fn state(&self, id: NodeId) -> NodeState {
        self.nodes[id].state
    }

    pub fn set_state(&mut self, id: NodeId, state: NodeState) {
        self.nodes[id].state = state;
    }

    /// Mark every node without parents as an original source.  A node with
    /// a rule is built even when it has no parents.
    pub fn mark_sources(&mut self) {
        for (_, node) in self.nodes.iter_mut() {
            if node.parents.is_empty() && node.rule.is_none() {
                node.state = NodeState::Source;
            }
        }
    }

    /// Forget the states left behind by a previous walk.
    pub fn reset_states(&mut self) {
        for (_, node) in self.nodes.iter_mut() {
            if node.state != NodeState::Source {
                node.state = NodeState::Unknown;
            }
        }
    }

    /// Nodes that no other node depends on.
    pub fn final_targets(&self) -> NodeSet {
        let mut is_parent = vec![false; self.nodes.slot_count()];
        for (_, node) in self.nodes.iter() {
            for p in &node.parents {
                is_parent[p.index()] = true;
            }
        }
        self.nodes.ids().filter(|id| !is_parent[id.index()]).collect()
    }

    /// Resolve requested target names.  With no names, the goal is every
    /// final target.  A name matches its node exactly, or else every target
    /// below it as a directory prefix ("foo" matches "foo/bar.o").  Each
    /// name that matches nothing buildable yields one error.
    pub fn match_targets(&self, names: &[String]) -> (NodeSet, Vec<anyhow::Error>) {
        if names.is_empty() {
            return (self.final_targets(), Vec::new());
        }
        let mut result = NodeSet::new();
        let mut errs = Vec::new();
        for name in names {
            let name = canon_path(name);
            if let Some(id) = self.lookup(&name) {
                if self.is_target(id) {
                    result.insert(id);
                } else {
                    errs.push(anyhow::anyhow!("not a target: '{}'", name));
                }
                continue;
            }
            let prefix = format!("{}/", name);
            let matches: Vec<NodeId> = self
                .nodes
                .iter()
                .filter(|(id, node)| self.is_target(*id) && node.name.starts_with(&prefix))
                .map(|(id, _)| id)
                .collect();
            if matches.is_empty() {
                errs.push(anyhow::anyhow!("no targets found matching '{}'", name));
            }
            result.0.extend(matches);
        }
        (result, errs)
    }

    /// Panic if the graph's internal structures disagree with each other.
    pub fn verify(&self) {
        if self.index.len() != self.nodes.len() {
            panic!(
                "corrupt graph: {} nodes, but {} index entries",
                self.nodes.len(),
                self.index.len()
            );
        }
        for (name, &id) in &self.index {
            match self.nodes.get(id) {
                None => panic!("corrupt graph: index entry {:?} refers to stale {:?}", name, id),
                Some(node) if &node.name != name => panic!(
                    "corrupt graph: index says {:?} is {:?}, but that node is {:?}",
                    name, id, node.name
                ),
                Some(_) => {}
            }
        }
        for (id, node) in self.nodes.iter() {
            for (i, p) in node.parents.iter().enumerate() {
                if !self.nodes.contains(*p) {
                    panic!("corrupt graph: {:?} has stale parent {:?}", node.name, p);
                }
                if node.parents[..i].contains(p) {
                    panic!("corrupt graph: {:?} lists parent {:?} twice", node.name, p);
                }
            }
            if let Some(rule) = node.rule {
                if !self.rules[rule.0].targets.contains(&id) {
                    panic!("corrupt graph: {:?} is not a target of its own rule", node.name);
                }
            }
        }
    }

    /// Write a compact, human-readable listing of the whole graph.
    pub fn dump(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for (id, node) in self.nodes.iter() {
            writeln!(
                w,
                "{:04}: {} {} (state {})",
                id.index(),
                node.kind.kind_name(),
                node.name,
                node.state
            )?;
            if let Some(rule) = node.rule {
                writeln!(w, "  action: {}", self.describe_rule(rule))?;
            }
            if !node.parents.is_empty() {
                writeln!(w, "  parents:")?;
                for &p in &node.parents {
                    writeln!(w, "    {:04}: {}", p.index(), self.nodes[p].name)?;
                }
            }
        }
        Ok(())
    }

    /// The ordered, de-duplicated parents of every target of a rule.
    pub fn rule_sources(&self, rule: RuleId) -> Vec<NodeId> {
        let mut sources: Vec<NodeId> = Vec::new();
        for &t in &self.rules[rule.0].targets {
            for &p in &self.nodes[t].parents {
                if !sources.contains(&p) {
                    sources.push(p);
                }
            }
        }
        sources
    }

    pub fn describe_rule(&self, rule: RuleId) -> String {
        let r = &self.rules[rule.0];
        let targets: Vec<&str> = r.targets.iter().map(|&t| self.nodes[t].name()).collect();
        let sources = self.rule_sources(rule);
        let sources: Vec<&str> = sources.iter().map(|&s| self.nodes[s].name()).collect();
        r.action.describe(&crate::rule::Invocation {
            targets: &targets,
            sources: &sources,
        })
    }
}
