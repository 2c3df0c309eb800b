//! Build progress reporting, for the purpose of display to the user.

use crate::rule::Outcome;
use std::io::Write;

/// Trait for build progress notifications.
pub trait Progress {
    /// Called when a rule starts running.  `targets` names what it builds.
    fn task_started(&mut self, targets: &str, description: &str);

    /// Called when a rule completes, successfully or not.
    fn task_finished(&mut self, targets: &str, description: &str, outcome: &Outcome);

    /// Called with the errors that made a node fail, whether they came from
    /// its rule or from inspecting the node.
    fn failed(&mut self, node: &str, errs: &[anyhow::Error]);

    /// Called with the reason a node is rebuilt or skipped, when explaining.
    fn explain(&mut self, node: &str, why: &str);

    /// Log a line of output.
    fn log(&mut self, msg: &str);
}

/// Progress implementation for a plain console.
#[derive(Default)]
pub struct ConsoleProgress {
    /// Whether to print full command lines rather than target names.
    verbose: bool,
}

impl ConsoleProgress {
    pub fn new(verbose: bool) -> Self {
        ConsoleProgress { verbose }
    }
}

impl Progress for ConsoleProgress {
    fn task_started(&mut self, targets: &str, description: &str) {
        if self.verbose {
            self.log(description);
        } else {
            self.log(&format!("build {}", targets));
        }
    }

    fn task_finished(&mut self, targets: &str, description: &str, outcome: &Outcome) {
        if !outcome.success() {
            self.log(&format!(
                "failed: {}",
                if self.verbose { description } else { targets }
            ));
        }
        if !outcome.output.is_empty() {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(&outcome.output).and_then(|_| stdout.flush());
        }
    }

    fn failed(&mut self, _node: &str, errs: &[anyhow::Error]) {
        for err in errs {
            eprintln!("build failure: {}", err);
        }
    }

    fn explain(&mut self, node: &str, why: &str) {
        eprintln!("kiln explain: {}: {}", node, why);
    }

    fn log(&mut self, msg: &str) {
        println!("{}", msg);
    }
}
