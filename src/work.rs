//! Build runner: walks the graph in dependency order, deciding for each
//! node whether it must be rebuilt, and running its rule if so.

use crate::db::{BuildDb, BuildRecord};
use crate::fs::FileSystem;
use crate::graph::{Graph, NodeId, NodeSet, NodeState, Resource, RuleId};
use crate::progress::Progress;
use crate::reduce::CycleError;
use crate::rule::Invocation;
use crate::signature::Signature;
use crate::trace;
use rustc_hash::{FxHashMap, FxHashSet};

/// Knobs for a build walk.
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    /// Keep building independent work after a failure.
    pub keep_going: bool,
    /// Check every parent for changes, not only sources and nodes built
    /// during this walk.  Catches intermediate files modified behind our
    /// back.
    pub check_all: bool,
    /// Report why each node is rebuilt or skipped.
    pub explain: bool,
}

/// Summary of the nodes that failed during a walk.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct BuildError {
    failed: Vec<String>,
    /// Number of nodes we attempted to build, or None if the walk stopped
    /// at the first failure.
    attempts: Option<usize>,
}

const MAX_NAMES: usize = 10;

impl BuildError {
    pub fn new(failed: Vec<String>, attempts: Option<usize>) -> Self {
        BuildError { failed, attempts }
    }

    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    pub fn attempts(&self) -> Option<usize> {
        self.attempts
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.failed.is_empty() {
            panic!("rendering a BuildError with no failures: there is no error here");
        }
        match self.attempts {
            Some(attempts) if attempts > 0 => write!(
                f,
                "failed to build {} of {} targets: {}",
                self.failed.len(),
                attempts,
                join_names(", ", MAX_NAMES, &self.failed)
            ),
            _ => write!(f, "failed to build target: {}", self.failed[0]),
        }
    }
}

/// Join at most `max` names; if there are more, the last one shown is
/// replaced by "...".
fn join_names(delim: &str, max: usize, names: &[String]) -> String {
    let max = max.min(names.len());
    let mut shown: Vec<&str> = names[..max].iter().map(|n| n.as_str()).collect();
    if names.len() > max && max > 0 {
        shown[max - 1] = "...";
    }
    shown.join(delim)
}

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error(transparent)]
    Failed(#[from] BuildError),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("{node}: rule succeeded but did not produce it")]
    NotProduced { node: String },
    #[error("cannot compute signature of {node}: {err}")]
    Unsignable { node: String, err: anyhow::Error },
    #[error("{node}: cannot write build record: {err}")]
    Record { node: String, err: anyhow::Error },
    #[error("interrupted while building {node}")]
    Interrupted { node: String },
}

/// The outcome of inspecting a node before building it.
enum Verdict {
    UpToDate,
    /// A parent failed or was itself tainted.
    Tainted(NodeId),
    /// The node must be built, for the given reason.
    Stale(String),
}

pub struct Work<'a> {
    graph: &'a mut Graph<Resource>,
    db: &'a mut dyn BuildDb,
    fs: &'a dyn FileSystem,
    progress: &'a mut dyn Progress,
    options: Options,

    /// Signatures computed during this walk.
    signatures: FxHashMap<NodeId, Signature>,
    /// Rules that already ran during this walk.
    executed: FxHashSet<RuleId>,
    /// Number of rules run.
    ran: usize,
    /// Number of nodes we tried to build, including ones that failed
    /// before their rule could run.
    attempts: usize,
    failed: Vec<String>,
}

impl<'a> Work<'a> {
    pub fn new(
        graph: &'a mut Graph<Resource>,
        db: &'a mut dyn BuildDb,
        fs: &'a dyn FileSystem,
        progress: &'a mut dyn Progress,
        options: Options,
    ) -> Self {
        Work {
            graph,
            db,
            fs,
            progress,
            options,
            signatures: FxHashMap::default(),
            executed: FxHashSet::default(),
            ran: 0,
            attempts: 0,
            failed: Vec::new(),
        }
    }

    pub fn graph(&self) -> &Graph<Resource> {
        &*self.graph
    }

    /// Bring every node in `goal` up to date, returning the number of rules
    /// run.  Failures of individual rules are reported through the progress
    /// as they happen, and summarized in the returned error.
    pub fn build_targets(&mut self, goal: &NodeSet) -> Result<usize, WalkError> {
        self.graph.reset_states();
        self.graph.mark_sources();
        self.signatures.clear();
        self.executed.clear();
        self.ran = 0;
        self.attempts = 0;
        self.failed.clear();

        let order = trace::scope("work.plan", || -> Result<Vec<NodeId>, CycleError> {
            let mut order = Vec::new();
            self.graph.dfs(goal, |id| -> Result<(), CycleError> {
                order.push(id);
                Ok(())
            })?;
            Ok(order)
        })?;

        for id in order {
            self.visit(id)?;
        }

        if !self.failed.is_empty() {
            return Err(BuildError::new(std::mem::take(&mut self.failed), Some(self.attempts)).into());
        }
        Ok(self.ran)
    }

    fn visit(&mut self, id: NodeId) -> Result<(), WalkError> {
        let node = self.graph.node(id);
        if node.state() == NodeState::Source {
            return Ok(());
        }
        let rule = match node.rule() {
            Some(rule) => rule,
            None => panic!("node is a target, but has no build rule: {}", node.name()),
        };
        if self.executed.contains(&rule) {
            // Built along with a sibling target of the same rule.
            return Ok(());
        }
        if node.state() != NodeState::Unknown {
            panic!(
                "visiting node {}, state = {} (should be UNKNOWN)",
                node.name(),
                node.state()
            );
        }

        let verdict = match self.consider(id) {
            Ok(verdict) => verdict,
            Err(err) => {
                self.graph.set_state(id, NodeState::Failed);
                self.attempts += 1;
                let name = self.graph.node(id).name().to_owned();
                self.progress.failed(&name, &[err]);
                return self.note_failure(name);
            }
        };

        match verdict {
            Verdict::UpToDate => {
                self.explain(id, || "up to date".to_string());
                Ok(())
            }
            Verdict::Tainted(parent) => {
                self.graph.set_state(id, NodeState::Tainted);
                let parent = self.graph.node(parent).name().to_owned();
                self.explain(id, || format!("not built: parent {} failed", parent));
                Ok(())
            }
            Verdict::Stale(why) => {
                self.explain(id, || why);
                self.graph.set_state(id, NodeState::Stale);
                if self.build_node(id, rule)? {
                    Ok(())
                } else {
                    let name = self.graph.node(id).name().to_owned();
                    self.note_failure(name)
                }
            }
        }
    }

    fn note_failure(&mut self, name: String) -> Result<(), WalkError> {
        self.failed.push(name);
        if self.options.keep_going {
            return Ok(());
        }
        // The attempt count means little when the walk stops early.
        Err(BuildError::new(std::mem::take(&mut self.failed), None).into())
    }

    fn explain(&mut self, id: NodeId, why: impl FnOnce() -> String) {
        if self.options.explain {
            let name = self.graph.node(id).name().to_owned();
            self.progress.explain(&name, &why());
        }
    }

    fn change_relevant(&self, state: NodeState) -> bool {
        match state {
            NodeState::Source | NodeState::Built => true,
            NodeState::Unknown => self.options.check_all,
            _ => false,
        }
    }

    fn signature(&mut self, id: NodeId) -> anyhow::Result<Signature> {
        if let Some(sig) = self.signatures.get(&id) {
            return Ok(sig.clone());
        }
        let sig = self.graph.node(id).kind().signature(self.fs)?;
        self.signatures.insert(id, sig.clone());
        Ok(sig)
    }

    /// Inspect a node and its parents to see if it needs building, and
    /// whether it can be built.
    fn consider(&mut self, id: NodeId) -> anyhow::Result<Verdict> {
        let node = self.graph.node(id);
        let parents = node.parents().to_vec();
        let failed_parent = parents.iter().find(|&&p| {
            matches!(self.graph.state(p), NodeState::Failed | NodeState::Tainted)
        });
        if let Some(&parent) = failed_parent {
            return Ok(Verdict::Tainted(parent));
        }

        let exists = node.kind().exists(self.fs)?;
        let record = if exists {
            self.db.lookup_node(node.name())?
        } else {
            None
        };
        let mut stale = match (&record, exists) {
            (_, false) => Some("missing".to_string()),
            (None, true) => Some("no build record".to_string()),
            (Some(_), true) => None,
        };

        if let Some(record) = &record {
            for &parent in &parents {
                if stale.is_some() {
                    break;
                }
                let pstate = self.graph.state(parent);
                let pname = self.graph.node(parent).name();
                let Some(old) = record.source_signature(pname) else {
                    stale = Some(format!("new parent {}", pname));
                    continue;
                };
                if !self.change_relevant(pstate) {
                    continue;
                }
                let old = old.clone();
                let pname = pname.to_owned();
                let new = self.signature(parent)?;
                if Resource::changed(&old, &new) {
                    stale = Some(format!("{} changed", pname));
                }
            }
        }

        if let (None, Some(record)) = (&stale, &record) {
            let graph = &*self.graph;
            let removed = record
                .parent_names()
                .find(|name| !parents.iter().any(|&p| graph.node(p).name() == *name));
            if let Some(name) = removed {
                stale = Some(format!("removed parent {}", name));
            }
        }

        Ok(match stale {
            Some(why) => Verdict::Stale(why),
            None => Verdict::UpToDate,
        })
    }

    /// Run the rule for a node.  Returns Ok(false) on an ordinary build
    /// failure, which has already been reported.
    fn build_node(&mut self, id: NodeId, rule: RuleId) -> Result<bool, WalkError> {
        self.executed.insert(rule);
        let targets = self.graph.rule(rule).targets.clone();
        let action = self.graph.rule(rule).action.clone();
        for &t in &targets {
            self.graph.set_state(t, NodeState::Building);
        }

        let target_names: Vec<&str> = targets.iter().map(|&t| self.graph.node(t).name()).collect();
        let sources = self.graph.rule_sources(rule);
        let source_names: Vec<&str> = sources.iter().map(|&s| self.graph.node(s).name()).collect();
        let inv = Invocation {
            targets: &target_names,
            sources: &source_names,
        };
        let description = action.describe(&inv);
        let label = target_names.join(" ");

        self.progress.task_started(&label, &description);
        let outcome = trace::scope(format!("build {}", label), || action.execute(&inv));
        self.progress.task_finished(&label, &description, &outcome);
        self.ran += 1;
        self.attempts += 1;

        if !outcome.success() {
            for &t in &targets {
                self.graph.set_state(t, NodeState::Failed);
            }
            let name = self.graph.node(id).name().to_owned();
            self.progress.failed(&name, &outcome.errs);
            if outcome.interrupted {
                return Err(WalkError::Interrupted { node: name });
            }
            return Ok(false);
        }

        for &t in &targets {
            self.graph.set_state(t, NodeState::Built);
            self.signatures.remove(&t);
        }
        for &t in &targets {
            self.record(t)?;
        }
        Ok(true)
    }

    /// Remember what a freshly built target was built from.
    fn record(&mut self, target: NodeId) -> Result<(), WalkError> {
        let name = self.graph.node(target).name().to_owned();
        let exists = self
            .graph
            .node(target)
            .kind()
            .exists(self.fs)
            .map_err(|err| WalkError::Unsignable {
                node: name.clone(),
                err,
            })?;
        if !exists {
            return Err(WalkError::NotProduced { node: name });
        }
        let sig = self.signature(target).map_err(|err| WalkError::Unsignable {
            node: name.clone(),
            err,
        })?;
        let mut record = BuildRecord::new(sig);
        for parent in self.graph.parents(target).to_vec() {
            let pname = self.graph.node(parent).name().to_owned();
            let sig = self.signature(parent).map_err(|err| WalkError::Unsignable {
                node: pname.clone(),
                err,
            })?;
            record.add_parent(pname, sig);
        }
        self.db
            .write_node(&name, record)
            .map_err(|err| WalkError::Record { node: name, err })
    }
}
