//! Graph loading: reads the manifest and record store, and prepares the
//! part of the graph a build needs.

use crate::db::FileDb;
use crate::graph::{Graph, NodeKind, NodeSet, Resource};
use crate::reduce::Expander;
use crate::{manifest, trace};
use anyhow::{anyhow, bail};
use std::path::Path;

pub const DB_FILENAME: &str = ".kiln_db";

/// State loaded by read().
pub struct State {
    pub graph: Graph<NodeKind>,
    pub db: FileDb,
}

/// Load the manifest and .kiln_db.
pub fn read(build_filename: &str) -> anyhow::Result<State> {
    let text = std::fs::read_to_string(build_filename)
        .map_err(|err| anyhow!("read {}: {}", build_filename, err))?;
    let graph = trace::scope("manifest::parse", || {
        manifest::parse(Path::new(build_filename), &text)
    })?;
    let db = trace::scope("db::open", || FileDb::open(DB_FILENAME))
        .map_err(|err| anyhow!("load {}: {}", DB_FILENAME, err))?;
    Ok(State { graph, db })
}

fn join_errors(errs: Vec<anyhow::Error>) -> anyhow::Error {
    let msgs: Vec<String> = errs.iter().map(|err| format!("{:#}", err)).collect();
    anyhow!(msgs.join("\n"))
}

/// Select the targets named on the command line (all final targets if
/// none), expand the patterns they depend on, and reduce the graph to just
/// what building them involves.  Returns the reduced graph and the goal
/// within it.
pub fn prepare(
    graph: &mut Graph<NodeKind>,
    names: &[String],
    expander: &dyn Expander,
) -> anyhow::Result<(Graph<Resource>, NodeSet)> {
    let (goal, errs) = graph.match_targets(names);
    if !errs.is_empty() {
        return Err(join_errors(errs));
    }
    let relevant = graph.find_relevant(&goal)?;
    trace::scope("expand", || graph.expand(&relevant, expander)).map_err(join_errors)?;

    // Expansion rewrote parent sets, so relevance has to be found again.
    let relevant = graph.find_relevant(&goal)?;
    let reduced = trace::scope("reduce", || graph.reduce(&relevant))?;

    let mut reduced_goal = NodeSet::new();
    for id in goal.iter() {
        let name = graph.node(id).name();
        match reduced.lookup(name) {
            Some(id) => reduced_goal.insert(id),
            None => bail!("target '{}' lost during reduction", name),
        };
    }
    Ok((reduced, reduced_goal))
}
