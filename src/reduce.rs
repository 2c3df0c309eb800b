//! Graph traversal, and the passes that turn a declared graph into one
//! ready to build: relevance pruning, pattern expansion and reduction.

use crate::graph::{Graph, GraphError, Kind, NodeId, NodeKind, NodeSet, Resource, RuleId};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct CycleError {
    /// Each cycle as a path of node names; the first and last names repeat.
    pub cycles: Vec<Vec<String>>,
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "found {} dependency cycles:", self.cycles.len())?;
        for cycle in &self.cycles {
            write!(f, "\n  {}", cycle.join(" -> "))?;
        }
        Ok(())
    }
}

#[derive(Copy, Clone, PartialEq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Expands a filename pattern into the names it currently matches.
pub trait Expander {
    fn expand(&self, pattern: &str) -> anyhow::Result<Vec<String>>;
}

impl<K: Kind> Graph<K> {
    /// Depth-first search through the ancestors of every node in `start`,
    /// calling `visit` on each node as the search leaves it, so that every
    /// node is visited after all of its parents.  An error from `visit`
    /// stops the search and is returned as-is; cycles are only reported for
    /// a search that ran to completion.
    pub fn dfs<E, F>(&self, start: &NodeSet, mut visit: F) -> Result<(), E>
    where
        E: From<CycleError>,
        F: FnMut(NodeId) -> Result<(), E>,
    {
        let mut colour = vec![Colour::White; self.nodes.slot_count()];
        let mut path: Vec<NodeId> = Vec::new();
        let mut cycles: Vec<Vec<NodeId>> = Vec::new();

        for id in start.iter() {
            if colour[id.index()] == Colour::White {
                colour[id.index()] = Colour::Grey;
                self.descend(id, &mut colour, &mut path, &mut cycles, &mut visit)?;
            }
        }

        if !cycles.is_empty() {
            let cycles = cycles
                .into_iter()
                .map(|cycle| cycle.iter().map(|&id| self.node(id).name().to_owned()).collect())
                .collect();
            return Err(CycleError { cycles }.into());
        }
        Ok(())
    }

    fn descend<E, F>(
        &self,
        id: NodeId,
        colour: &mut [Colour],
        path: &mut Vec<NodeId>,
        cycles: &mut Vec<Vec<NodeId>>,
        visit: &mut F,
    ) -> Result<(), E>
    where
        F: FnMut(NodeId) -> Result<(), E>,
    {
        path.push(id);
        for &parent in self.parents(id) {
            match colour[parent.index()] {
                Colour::Grey => {
                    // Grey nodes are exactly those on the path.
                    let start = path.iter().rposition(|&p| p == parent).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(parent);
                    cycles.push(cycle);
                }
                Colour::White => {
                    colour[parent.index()] = Colour::Grey;
                    self.descend(parent, colour, path, cycles, visit)?;
                }
                Colour::Black => {}
            }
        }
        path.pop();
        visit(id)?;
        colour[id.index()] = Colour::Black;
        Ok(())
    }

    /// The goal nodes and everything they transitively depend on.
    pub fn find_relevant(&self, goal: &NodeSet) -> Result<NodeSet, CycleError> {
        let mut relevant = NodeSet::new();
        self.dfs(goal, |id| -> Result<(), CycleError> {
            relevant.insert(id);
            Ok(())
        })?;
        Ok(relevant)
    }

    /// For each relevant node, its children that are also relevant.
    pub fn relevant_children(&self, relevant: &NodeSet) -> FxHashMap<NodeId, Vec<NodeId>> {
        let mut children: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        for child in relevant.iter() {
            for &parent in self.parents(child) {
                if relevant.contains(parent) {
                    children.entry(parent).or_default().push(child);
                }
            }
        }
        children
    }
}

impl Graph<NodeKind> {
    /// Replace each relevant pattern node with file nodes for whatever it
    /// matches.  Errors from every pattern are collected; if there are any
    /// the graph is left partially expanded.
    pub fn expand(
        &mut self,
        relevant: &NodeSet,
        expander: &dyn Expander,
    ) -> Result<(), Vec<anyhow::Error>> {
        let mut errs = Vec::new();
        for id in relevant.iter() {
            let pattern = match self.get(id).map(|n| n.kind()) {
                Some(NodeKind::Pattern(pattern)) => pattern.clone(),
                _ => continue,
            };
            let names = match expander.expand(&pattern) {
                Ok(names) => names,
                Err(err) => {
                    errs.push(err.context(format!("expanding '{}'", pattern)));
                    continue;
                }
            };
            let mut replacements = Vec::with_capacity(names.len());
            for name in names {
                match self.add_file(&name) {
                    Ok(file) => replacements.push(file),
                    Err(err) => errs.push(err.into()),
                }
            }
            self.replace_node(id, &replacements);
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs)
        }
    }

    /// Rewrite every parent set that refers to `old` to refer to
    /// `replacements` instead, in order, then drop `old`.
    fn replace_node(&mut self, old: NodeId, replacements: &[NodeId]) {
        for (_, node) in self.nodes.iter_mut() {
            let Some(pos) = node.parents.iter().position(|&p| p == old) else {
                continue;
            };
            let mut parents = node.parents[..pos].to_vec();
            for &r in replacements.iter().chain(&node.parents[pos + 1..]) {
                if !parents.contains(&r) {
                    parents.push(r);
                }
            }
            node.parents = parents;
        }
        if !replacements.contains(&old) {
            self.remove_node(old);
        }
    }

    /// Copy the relevant part of the graph into a graph of buildable
    /// resources, compacting node ids.
    pub fn reduce(&self, relevant: &NodeSet) -> Result<Graph<Resource>, GraphError> {
        let mut out: Graph<Resource> = Graph::new();
        let mut map: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        for id in relevant.iter() {
            let node = self.node(id);
            let kind = match node.kind() {
                NodeKind::File(path) => Resource::File(path.clone()),
                NodeKind::Action => Resource::Action,
                NodeKind::Group => Resource::Group,
                NodeKind::Pattern(_) => return Err(GraphError::Unexpanded(node.name().to_owned())),
            };
            map.insert(id, out.add_node(node.name(), kind)?);
        }
        for id in relevant.iter() {
            let new_id = map[&id];
            for parent in self.parents(id) {
                if let Some(&p) = map.get(parent) {
                    out.add_parent(new_id, p);
                }
            }
        }

        let mut rules: FxHashMap<RuleId, RuleId> = FxHashMap::default();
        for id in relevant.iter() {
            let Some(old_rule) = self.node(id).rule() else {
                continue;
            };
            if rules.contains_key(&old_rule) {
                continue;
            }
            let rule = self.rule(old_rule);
            let targets: Vec<NodeId> = rule.targets.iter().filter_map(|t| map.get(t).copied()).collect();
            rules.insert(old_rule, out.add_rule(rule.action.clone(), targets)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::NoopAction;
    use std::rc::Rc;

    fn graph_of(edges: &[(&str, &[&str])]) -> Graph<NodeKind> {
        let mut graph = Graph::new();
        for (name, parents) in edges {
            let id = graph.add_file(name).unwrap();
            for p in parents.iter() {
                let pid = if p.contains('*') {
                    graph.add_node(*p, NodeKind::Pattern(p.to_string())).unwrap()
                } else {
                    graph.add_file(p).unwrap()
                };
                graph.add_parent(id, pid);
            }
        }
        graph
    }

    fn names<K: Kind>(graph: &Graph<K>, ids: impl IntoIterator<Item = NodeId>) -> Vec<String> {
        ids.into_iter().map(|id| graph.node(id).name().to_owned()).collect()
    }

    fn goal<K: Kind>(graph: &Graph<K>, names: &[&str]) -> NodeSet {
        names.iter().map(|n| graph.lookup(n).unwrap()).collect()
    }

    #[test]
    fn dfs_is_topological() {
        let graph = graph_of(&[
            ("tool1", &["tool1.o", "misc.o", "util.o"]),
            ("tool2", &["tool2.o", "util.o"]),
            ("tool1.o", &["tool1.c", "misc.h", "util.h"]),
            ("misc.o", &["misc.h", "misc.c"]),
            ("util.o", &["util.h", "util.c"]),
            ("tool2.o", &["tool2.c", "util.h"]),
        ]);
        let mut order = Vec::new();
        graph
            .dfs(&goal(&graph, &["tool1", "tool2"]), |id| -> Result<(), CycleError> {
                order.push(id);
                Ok(())
            })
            .unwrap();
        assert_eq!(
            names(&graph, order),
            vec![
                "tool1.c", "misc.h", "util.h", "tool1.o", "misc.c", "misc.o", "util.c", "util.o",
                "tool1", "tool2.c", "tool2.o", "tool2"
            ]
        );
    }

    #[test]
    fn dfs_abort() {
        let graph = graph_of(&[("a", &["b"]), ("b", &["c"])]);
        let mut seen = Vec::new();
        let err = graph
            .dfs(&goal(&graph, &["a"]), |id| {
                seen.push(id);
                if graph.node(id).name() == "b" {
                    anyhow::bail!("stop at b");
                }
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "stop at b");
        assert_eq!(names(&graph, seen), vec!["c", "b"]);
    }

    #[test]
    fn dfs_cycles() {
        let mut graph = graph_of(&[("a", &["b"]), ("b", &["c"]), ("c", &["d"])]);
        let a = graph.lookup("a").unwrap();
        let c = graph.lookup("c").unwrap();
        graph.add_parent(c, a);
        let err = graph.find_relevant(&goal(&graph, &["a"])).unwrap_err();
        assert_eq!(err.to_string(), "found 1 dependency cycles:\n  a -> b -> c -> a");

        let graph = graph_of(&[("x", &["x"])]);
        let err = graph.find_relevant(&goal(&graph, &["x"])).unwrap_err();
        assert_eq!(err.cycles, vec![vec!["x".to_string(), "x".to_string()]]);

        // The path leading into a cycle is not part of it.
        let graph = graph_of(&[("z", &["a"]), ("a", &["b"]), ("b", &["a"])]);
        let err = graph.find_relevant(&goal(&graph, &["z"])).unwrap_err();
        assert_eq!(err.to_string(), "found 1 dependency cycles:\n  a -> b -> a");
    }

    #[test]
    fn relevance() {
        let graph = graph_of(&[
            ("tool1", &["tool1.o"]),
            ("tool2", &["tool2.o", "util.o"]),
            ("tool1.o", &["tool1.c", "util.h"]),
            ("tool2.o", &["tool2.c", "util.h"]),
            ("util.o", &["util.c", "util.h"]),
        ]);
        let relevant = graph.find_relevant(&goal(&graph, &["tool1"])).unwrap();
        assert_eq!(names(&graph, relevant.iter()), vec!["tool1", "tool1.o", "tool1.c", "util.h"]);

        let children = graph.relevant_children(&relevant);
        let util_h = graph.lookup("util.h").unwrap();
        assert_eq!(names(&graph, children[&util_h].clone()), vec!["tool1.o"]);
        assert!(!children.contains_key(&graph.lookup("tool1").unwrap()));
    }

    struct FixedExpander;
    impl Expander for FixedExpander {
        fn expand(&self, pattern: &str) -> anyhow::Result<Vec<String>> {
            match pattern {
                "*.c" => Ok(vec!["a.c".into(), "b.c".into()]),
                "*.h" => Ok(vec![]),
                _ => anyhow::bail!("bad pattern"),
            }
        }
    }

    #[test]
    fn expand_replaces_patterns() {
        let mut graph = graph_of(&[("prog", &["main.c", "*.c", "*.h", "b.c"])]);
        let relevant = graph.find_relevant(&goal(&graph, &["prog"])).unwrap();
        graph.expand(&relevant, &FixedExpander).unwrap();
        graph.verify();
        let prog = graph.lookup("prog").unwrap();
        assert_eq!(names(&graph, graph.parents(prog).to_vec()), vec!["main.c", "a.c", "b.c"]);
        assert!(graph.lookup("*.c").is_none());
        assert!(graph.lookup("*.h").is_none());

        // Expanding an already expanded graph changes nothing.
        let relevant = graph.find_relevant(&goal(&graph, &["prog"])).unwrap();
        graph.expand(&relevant, &FixedExpander).unwrap();
        assert_eq!(graph.parents(prog).len(), 3);
    }

    #[test]
    fn expand_collects_errors() {
        let mut graph = graph_of(&[("a", &["*.x"]), ("b", &["*.y"])]);
        let relevant = graph.find_relevant(&graph.final_targets()).unwrap();
        let errs = graph.expand(&relevant, &FixedExpander).unwrap_err();
        let errs: Vec<String> = errs.iter().map(|e| format!("{:#}", e)).collect();
        assert_eq!(
            errs,
            vec!["expanding '*.x': bad pattern", "expanding '*.y': bad pattern"]
        );
    }

    #[test]
    fn reduce_compacts() {
        let mut graph = graph_of(&[
            ("tool1", &["tool1.o"]),
            ("tool2", &["tool2.o"]),
            ("tool1.o", &["tool1.c", "*.h"]),
            ("tool2.o", &["tool2.c"]),
        ]);
        let tool1 = graph.lookup("tool1").unwrap();
        let tool1_o = graph.lookup("tool1.o").unwrap();
        let tool2_o = graph.lookup("tool2.o").unwrap();
        graph.add_rule(Rc::new(NoopAction), vec![tool1]).unwrap();
        graph.add_rule(Rc::new(NoopAction), vec![tool1_o, tool2_o]).unwrap();

        let relevant = graph.find_relevant(&goal(&graph, &["tool1"])).unwrap();
        let err = graph.reduce(&relevant).err().unwrap();
        assert_eq!(err.to_string(), "pattern '*.h' was not expanded before building");

        graph.expand(&relevant, &FixedExpander).unwrap();
        let relevant = graph.find_relevant(&goal(&graph, &["tool1"])).unwrap();
        let reduced = graph.reduce(&relevant).unwrap();
        reduced.verify();
        assert_eq!(names(&reduced, reduced.ids()), vec!["tool1", "tool1.o", "tool1.c"]);
        assert!(reduced.lookup("tool2.o").is_none());

        let new_tool1_o = reduced.lookup("tool1.o").unwrap();
        let rule = reduced.node(new_tool1_o).rule().unwrap();
        assert_eq!(reduced.rule(rule).targets, vec![new_tool1_o]);
    }
}
