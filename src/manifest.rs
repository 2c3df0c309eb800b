//! Parser for build manifests, the text form of a build graph.
//!
//! ```text
//! # comment
//! tool1.o: tool1.c misc.h util.h
//!     cc -c $in -o $out
//! action test: tool1
//!     ./tool1 --self-test
//! group all: tool1 test
//! ```
//!
//! A statement names its targets, a colon, and the parents they are built
//! from; the indented lines after it are the commands that build them.

use crate::canon::canon_path;
use crate::graph::{Graph, NodeId, NodeKind};
use crate::reduce::Expander;
use crate::rule::{Action, CommandAction, NoopAction};
use crate::scanner::{ParseResult, Scanner};
use anyhow::{anyhow, bail};
use std::path::Path;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Decl {
    File,
    Action,
    Group,
}

#[derive(Debug)]
struct Statement<'text> {
    line: usize,
    decl: Decl,
    targets: Vec<&'text str>,
    parents: Vec<&'text str>,
    commands: Vec<&'text str>,
}

fn is_pattern(name: &str) -> bool {
    name.contains(|c| matches!(c, '*' | '?' | '['))
}

fn is_word_end(c: char) -> bool {
    matches!(c, ' ' | '\t' | ':' | '\n' | '\r' | '\0')
}

struct Parser<'text> {
    scanner: Scanner<'text>,
}

impl<'text> Parser<'text> {
    fn new(text: &'text str) -> Self {
        Parser {
            scanner: Scanner::new(text),
        }
    }

    fn read_word(&mut self) -> Option<&'text str> {
        let start = self.scanner.ofs;
        while !self.scanner.at_end() && !is_word_end(self.scanner.peek()) {
            self.scanner.next();
        }
        let end = self.scanner.ofs;
        if start == end {
            None
        } else {
            Some(self.scanner.slice(start, end))
        }
    }

    /// Read whitespace-separated words up to a ':' or the end of the line.
    fn read_words(&mut self) -> Vec<&'text str> {
        let mut words = Vec::new();
        loop {
            self.scanner.skip_spaces();
            match self.read_word() {
                Some(word) => words.push(word),
                None => return words,
            }
        }
    }

    fn skip_blank_lines(&mut self) {
        loop {
            let start = self.scanner.ofs;
            self.scanner.skip_spaces();
            if self.scanner.peek() == '#' || self.scanner.peek_newline() {
                self.scanner.read_line();
                continue;
            }
            if !self.scanner.at_end() {
                // Rewind over leading spaces; the statement reader decides
                // what indentation means.
                self.scanner.ofs = start;
            }
            return;
        }
    }

    fn read_statement(&mut self) -> ParseResult<Option<Statement<'text>>> {
        self.skip_blank_lines();
        if self.scanner.at_end() {
            return Ok(None);
        }
        if matches!(self.scanner.peek(), ' ' | '\t') {
            return self.scanner.parse_error("command line outside of a statement");
        }
        let line = self.scanner.line;

        let mut targets = self.read_words();
        let decl = match targets.first() {
            Some(&"action") if targets.len() > 1 => Decl::Action,
            Some(&"group") if targets.len() > 1 => Decl::Group,
            _ => Decl::File,
        };
        if decl != Decl::File {
            targets.remove(0);
            if targets.len() != 1 {
                return self.scanner.parse_error("expected exactly one name");
            }
        }
        if targets.is_empty() {
            return self.scanner.parse_error("expected target name");
        }
        if !self.scanner.skip(':') {
            return self.scanner.parse_error(format!("expected ':', got {:?}", self.scanner.peek()));
        }
        let parents = self.read_words();
        if self.scanner.peek() == ':' {
            return self.scanner.parse_error("unexpected ':'");
        }
        self.scanner.expect_newline()?;

        let mut commands = Vec::new();
        while matches!(self.scanner.peek(), ' ' | '\t') {
            self.scanner.skip_spaces();
            let command = self.scanner.read_line().trim_end();
            if !command.is_empty() && !command.starts_with('#') {
                commands.push(command);
            }
        }

        Ok(Some(Statement {
            line,
            decl,
            targets,
            parents,
            commands,
        }))
    }
}

fn target_node(graph: &mut Graph<NodeKind>, decl: Decl, name: &str) -> anyhow::Result<NodeId> {
    Ok(match decl {
        Decl::File => graph.add_file(&canon_path(name))?,
        Decl::Action => graph.add_action(name)?,
        Decl::Group => graph.add_group(name)?,
    })
}

fn parent_node(graph: &mut Graph<NodeKind>, name: &str) -> anyhow::Result<NodeId> {
    if let Some(id) = graph.lookup(name) {
        return Ok(id);
    }
    if is_pattern(name) {
        return Ok(graph.add_node(name, NodeKind::Pattern(name.to_owned()))?);
    }
    let path = canon_path(name);
    match graph.lookup(&path) {
        Some(id) => Ok(id),
        None => Ok(graph.add_file(&path)?),
    }
}

/// Parse manifest text into a graph.  `filename` is used in error messages.
pub fn parse(filename: &Path, text: &str) -> anyhow::Result<Graph<NodeKind>> {
    let mut parser = Parser::new(text);
    let mut stmts = Vec::new();
    loop {
        match parser.read_statement() {
            Ok(Some(stmt)) => stmts.push(stmt),
            Ok(None) => break,
            Err(err) => bail!(parser.scanner.format_parse_error(filename, err)),
        }
    }

    let at = |stmt: &Statement, err: anyhow::Error| anyhow!("{}:{}: {}", filename.display(), stmt.line, err);

    let mut graph = Graph::new();
    // Declare every target before resolving parents, so that a parent can
    // name an action or group declared further down.
    let mut declared = Vec::with_capacity(stmts.len());
    for stmt in &stmts {
        let mut targets = Vec::with_capacity(stmt.targets.len());
        for name in &stmt.targets {
            targets.push(target_node(&mut graph, stmt.decl, name).map_err(|err| at(stmt, err))?);
        }
        declared.push(targets);
    }

    for (stmt, targets) in stmts.iter().zip(declared) {
        let mut parents = Vec::with_capacity(stmt.parents.len());
        for name in &stmt.parents {
            parents.push(parent_node(&mut graph, name).map_err(|err| at(stmt, err))?);
        }
        graph.add_many_parents(&targets, &parents);

        let action: Rc<dyn Action> = match (stmt.decl, stmt.commands.is_empty()) {
            (Decl::Group, true) => Rc::new(NoopAction),
            (Decl::Group, false) => {
                return Err(at(stmt, anyhow!("group '{}' cannot have commands", stmt.targets[0])))
            }
            (_, true) => {
                return Err(at(stmt, anyhow!("no commands to build '{}'", stmt.targets[0])))
            }
            (_, false) => Rc::new(CommandAction::new(stmt.commands.join(" && "))),
        };
        graph.add_rule(action, targets).map_err(|err| at(stmt, err.into()))?;
    }
    Ok(graph)
}

/// Expands patterns against the files in the working directory.
pub struct GlobExpander;

impl Expander for GlobExpander {
    fn expand(&self, pattern: &str) -> anyhow::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in glob::glob(pattern)? {
            let path = entry?;
            if !path.is_file() {
                continue;
            }
            match path.to_str() {
                Some(name) => names.push(canon_path(name)),
                None => bail!("non-UTF-8 path {}", path.display()),
            }
        }
        Ok(names)
    }
}
