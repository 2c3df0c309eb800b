//! Scans an input string (source file) character by character.

use std::path::Path;

#[derive(Debug)]
pub struct ParseError {
    msg: String,
    ofs: usize,
}
pub type ParseResult<T> = Result<T, ParseError>;

pub struct Scanner<'a> {
    buf: &'a str,
    pub ofs: usize,
    pub line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(buf: &'a str) -> Self {
        Scanner {
            buf,
            ofs: 0,
            line: 1,
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.buf[start..end]
    }

    /// The byte at the current offset, or '\0' at the end of input.
    /// Only meaningful for ASCII; callers only compare against ASCII
    /// delimiters, so slices taken at those positions stay on char
    /// boundaries.
    pub fn peek(&self) -> char {
        self.buf.as_bytes().get(self.ofs).map_or('\0', |&b| b as char)
    }

    pub fn at_end(&self) -> bool {
        self.ofs >= self.buf.len()
    }

    pub fn peek_newline(&self) -> bool {
        match self.peek() {
            '\n' => true,
            '\r' => self.buf.as_bytes().get(self.ofs + 1) == Some(&b'\n'),
            _ => false,
        }
    }

    pub fn next(&mut self) {
        if self.at_end() {
            panic!("scanned past end")
        }
        if self.peek() == '\n' {
            self.line += 1;
        }
        self.ofs += 1;
    }

    pub fn read(&mut self) -> char {
        let c = self.peek();
        self.next();
        c
    }

    pub fn skip(&mut self, ch: char) -> bool {
        if !self.at_end() && self.peek() == ch {
            self.next();
            return true;
        }
        false
    }

    pub fn skip_spaces(&mut self) {
        while self.skip(' ') || self.skip('\t') {}
    }

    /// Consume a line ending, or accept the end of input.
    pub fn expect_newline(&mut self) -> ParseResult<()> {
        if self.at_end() {
            return Ok(());
        }
        self.skip('\r');
        if !self.skip('\n') {
            return self.parse_error(format!("expected newline, got {:?}", self.peek()));
        }
        Ok(())
    }

    /// Consume the rest of the current line, returning it without the line
    /// ending.
    pub fn read_line(&mut self) -> &'a str {
        let start = self.ofs;
        while !self.at_end() && !self.peek_newline() {
            self.next();
        }
        let line = self.slice(start, self.ofs);
        if !self.at_end() {
            self.skip('\r');
            self.skip('\n');
        }
        line
    }

    pub fn parse_error<T, S: Into<String>>(&self, msg: S) -> ParseResult<T> {
        Err(ParseError {
            msg: msg.into(),
            ofs: self.ofs,
        })
    }

    pub fn format_parse_error(&self, filename: &Path, err: ParseError) -> String {
        let mut ofs = 0;
        for (line_number, line) in self.buf.split('\n').enumerate() {
            if ofs + line.len() >= err.ofs {
                let line = line.trim_end_matches('\r');
                let prefix = format!("{}:{}: ", filename.display(), line_number + 1);
                let mut msg = format!("{}parse error: {}\n", prefix, err.msg);

                let col = (err.ofs - ofs).min(line.len());
                let context: String = line.chars().take(60).collect();
                msg.push_str(&context);
                if context.len() < line.len() {
                    msg.push_str("...");
                }
                msg.push('\n');
                msg.push_str(&" ".repeat(col.min(context.len())));
                msg.push_str("^\n");
                return msg;
            }
            ofs += line.len() + 1;
        }
        format!("{}: parse error: {}\n", filename.display(), err.msg)
    }
}
