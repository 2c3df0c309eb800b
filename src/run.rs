use anyhow::{anyhow, bail};
use std::io::Write;
use std::path::Path;

use crate::db::BuildDb;
use crate::fs::RealFileSystem;
use crate::graph::Kind;
use crate::manifest::GlobExpander;
use crate::progress::ConsoleProgress;
use crate::work::{Options, Work};
use crate::{load, signal, trace};

#[derive(argh::FromArgs)]
/// kiln, an incremental build engine
struct Args {
    /// chdir before running
    #[argh(option, short = 'C')]
    chdir: Option<String>,

    /// input build file [default=build.kiln]
    #[argh(option, short = 'f', default = "String::from(\"build.kiln\")")]
    build_file: String,

    /// debugging tools, use -d list to list
    #[argh(option, short = 'd')]
    debug: Option<String>,

    /// subcommands, use -t list to list
    #[argh(option, short = 't')]
    tool: Option<String>,

    /// keep going after failures, building everything that doesn't depend
    /// on a failed target
    #[argh(switch, short = 'k')]
    keep_going: bool,

    /// check every intermediate target for changes, not just sources
    #[argh(switch)]
    check_all: bool,

    /// print executed command lines
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// targets to build
    #[argh(positional)]
    targets: Vec<String>,
}

fn run_tool(tool: &str, args: &Args) -> anyhow::Result<i32> {
    if tool == "list" {
        println!("subcommands:");
        println!("  targets  list final targets");
        println!("  graph    dump the build graph");
        println!("  records  dump the build record database");
        println!("  rdeps    list the targets that use the given nodes");
        return Ok(1);
    }

    let state = trace::scope("load::read", || load::read(&args.build_file))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match tool {
        "targets" => {
            for id in state.graph.final_targets().iter() {
                let node = state.graph.node(id);
                writeln!(out, "{}: {}", node.name(), node.kind().kind_name())?;
            }
        }
        "graph" => state.graph.dump(&mut out)?,
        "records" => state.db.dump(&mut out)?,
        "rdeps" => {
            if args.targets.is_empty() {
                bail!("-t rdeps needs at least one node name");
            }
            let graph = &state.graph;
            let relevant = graph.find_relevant(&graph.final_targets())?;
            let children = graph.relevant_children(&relevant);
            for name in &args.targets {
                let id = graph
                    .lookup(name)
                    .ok_or_else(|| anyhow!("unknown node {:?}", name))?;
                writeln!(out, "{}:", name)?;
                for child in children.get(&id).into_iter().flatten() {
                    writeln!(out, "  {}", graph.node(*child).name())?;
                }
            }
        }
        _ => bail!("unknown -t {:?}, use -t list to list", tool),
    }
    Ok(0)
}

fn run_impl() -> anyhow::Result<i32> {
    let args: Args = argh::from_env();

    let mut options = Options {
        keep_going: args.keep_going,
        check_all: args.check_all,
        explain: false,
    };

    if let Some(debug) = &args.debug {
        match debug.as_str() {
            "list" => {
                println!("debug tools:");
                println!("  explain  print why each target is (or isn't) rebuilt");
                println!("  trace    generate json performance trace");
                return Ok(1);
            }
            "explain" => options.explain = true,
            "trace" => trace::open("trace.json")?,
            _ => bail!("unknown -d {:?}, use -d list to list", debug),
        }
    }

    if let Some(dir) = &args.chdir {
        let dir = Path::new(dir);
        std::env::set_current_dir(dir).map_err(|err| anyhow!("chdir {:?}: {}", dir, err))?;
    }

    if let Some(tool) = &args.tool {
        return run_tool(tool, &args);
    }

    let mut state = trace::scope("load::read", || load::read(&args.build_file))?;
    let (mut graph, goal) = load::prepare(&mut state.graph, &args.targets, &GlobExpander)?;

    let fs = RealFileSystem::new();
    let mut progress = ConsoleProgress::new(args.verbose);
    signal::register_sigint();
    let mut work = Work::new(&mut graph, &mut state.db, &fs, &mut progress, options);
    match trace::scope("work.build_targets", || work.build_targets(&goal))? {
        0 => {
            // Special case: don't print numbers when no work done.
            println!("kiln: no work to do");
        }
        n => println!("kiln: ran {} rules, now up to date", n),
    }
    Ok(0)
}

pub fn run() -> anyhow::Result<i32> {
    let res = run_impl();
    if let Err(err) = trace::close() {
        eprintln!("kiln: writing trace: {}", err);
    }
    res
}
