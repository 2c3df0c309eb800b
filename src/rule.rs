//! Build rules: the actions that bring targets up to date.

use crate::graph::NodeId;
use std::os::unix::process::ExitStatusExt;
use std::rc::Rc;

/// The names an action runs over: the targets it produces and the sources
/// they are built from.
pub struct Invocation<'a> {
    pub targets: &'a [&'a str],
    pub sources: &'a [&'a str],
}

/// What running an action produced.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Console output of the action, shown to the user whether it
    /// succeeded or not.
    pub output: Vec<u8>,
    /// Empty iff the action succeeded.
    pub errs: Vec<anyhow::Error>,
    /// The action was stopped by SIGINT.  The walk must not start anything
    /// else.
    pub interrupted: bool,
}

impl Outcome {
    pub fn success(&self) -> bool {
        self.errs.is_empty()
    }
}

pub trait Action {
    fn execute(&self, inv: &Invocation) -> Outcome;
    /// Short description of what the action does, e.g. its command line.
    fn describe(&self, inv: &Invocation) -> String;
}

/// An action bound to the targets it produces.  Running it once brings
/// every target up to date.
pub struct BuildRule {
    pub action: Rc<dyn Action>,
    pub targets: Vec<NodeId>,
}

impl std::fmt::Debug for BuildRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildRule")
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

/// An action for nodes that only group their parents.
pub struct NoopAction;

impl Action for NoopAction {
    fn execute(&self, _inv: &Invocation) -> Outcome {
        Outcome::default()
    }
    fn describe(&self, inv: &Invocation) -> String {
        format!("group {}", inv.targets.join(" "))
    }
}

/// Runs a shell command line.
pub struct CommandAction {
    pub command: String,
}

impl CommandAction {
    pub fn new(command: impl Into<String>) -> Self {
        CommandAction {
            command: command.into(),
        }
    }

    /// The command line with `$in`, `$out` and `$$` replaced.
    pub fn expand(&self, inv: &Invocation) -> String {
        let mut out = String::with_capacity(self.command.len());
        let mut rest = self.command.as_str();
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            rest = &rest[pos..];
            if let Some(r) = rest.strip_prefix("$$") {
                out.push('$');
                rest = r;
            } else if let Some(r) = rest.strip_prefix("$in") {
                out.push_str(&inv.sources.join(" "));
                rest = r;
            } else if let Some(r) = rest.strip_prefix("$out") {
                out.push_str(&inv.targets.join(" "));
                rest = r;
            } else {
                out.push('$');
                rest = &rest[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

impl Action for CommandAction {
    fn execute(&self, inv: &Invocation) -> Outcome {
        let cmdline = self.expand(inv);
        for target in inv.targets {
            if let Some(dir) = std::path::Path::new(target).parent() {
                if dir.as_os_str().is_empty() {
                    continue;
                }
                if let Err(err) = std::fs::create_dir_all(dir) {
                    return Outcome {
                        errs: vec![anyhow::anyhow!("mkdir {}: {}", dir.display(), err)],
                        ..Outcome::default()
                    };
                }
            }
        }
        match run_command(&cmdline) {
            Ok((termination, output)) => {
                let errs = match &termination {
                    Termination::Success => Vec::new(),
                    Termination::Interrupted => {
                        vec![anyhow::anyhow!("{}: interrupted", inv.targets.join(" "))]
                    }
                    Termination::Failure(why) => {
                        vec![anyhow::anyhow!("{}: {}", inv.targets.join(" "), why)]
                    }
                };
                Outcome {
                    output,
                    errs,
                    interrupted: termination == Termination::Interrupted,
                }
            }
            Err(err) => Outcome {
                errs: vec![err.context(format!("running {:?}", cmdline))],
                ..Outcome::default()
            },
        }
    }

    fn describe(&self, inv: &Invocation) -> String {
        self.expand(inv)
    }
}

#[derive(Debug, PartialEq)]
enum Termination {
    Success,
    Interrupted,
    /// Describes how the command failed.
    Failure(String),
}

/// Run a command line through the shell, collecting its stdout and then its
/// stderr into one buffer.
fn run_command(cmdline: &str) -> anyhow::Result<(Termination, Vec<u8>)> {
    let out = std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(cmdline)
        .stdin(std::process::Stdio::null())
        .output()?;
    let mut output = out.stdout;
    output.extend_from_slice(&out.stderr);

    let termination = if out.status.success() {
        Termination::Success
    } else if let Some(sig) = out.status.signal() {
        match sig {
            libc::SIGINT => Termination::Interrupted,
            _ => Termination::Failure(format!("signal {}", sig)),
        }
    } else {
        match out.status.code() {
            Some(code) => Termination::Failure(format!("command failed with exit status {}", code)),
            None => Termination::Failure("command failed".to_string()),
        }
    };
    Ok((termination, output))
}
