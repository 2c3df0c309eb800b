//! Chrome trace output, enabled with `-d trace`.  Load the resulting file
//! in chrome://tracing or Perfetto to see where a build spent its time.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Mutex;
use std::time::Instant;

static TRACE: Mutex<Option<Trace>> = Mutex::new(None);

struct Event {
    name: Cow<'static, str>,
    start: Instant,
    end: Instant,
}

struct Trace {
    start: Instant,
    w: BufWriter<File>,
    /// First error hit while writing events, reported at close.
    err: Option<std::io::Error>,
}

impl Trace {
    fn new(path: &str) -> std::io::Result<Self> {
        let mut w = BufWriter::new(File::create(path)?);
        writeln!(w, "[")?;
        Ok(Trace {
            start: Instant::now(),
            w,
            err: None,
        })
    }

    fn write_event(&mut self, event: &Event) -> std::io::Result<()> {
        write!(
            self.w,
            "{{ \"pid\": 0, \"name\": {:?}, \"ts\": {}, \"ph\": \"X\", \"dur\": {} }}",
            event.name,
            event.start.duration_since(self.start).as_micros(),
            event.end.duration_since(event.start).as_micros()
        )
    }

    fn write(&mut self, event: &Event) {
        if self.err.is_some() {
            return;
        }
        if let Err(err) = self.write_event(event).and_then(|_| writeln!(self.w, ",")) {
            self.err = Some(err);
        }
    }

    fn close(&mut self) -> std::io::Result<()> {
        if let Some(err) = self.err.take() {
            return Err(err);
        }
        let main = Event {
            name: Cow::Borrowed("main"),
            start: self.start,
            end: Instant::now(),
        };
        self.write_event(&main)?;
        writeln!(self.w, "]")?;
        self.w.flush()
    }
}

pub fn open(path: &str) -> std::io::Result<()> {
    let trace = Trace::new(path)?;
    *TRACE.lock().unwrap_or_else(|e| e.into_inner()) = Some(trace);
    Ok(())
}

pub fn enabled() -> bool {
    TRACE.lock().map(|t| t.is_some()).unwrap_or(false)
}

/// Run `f`, recording how long it took under `name` if tracing is on.
#[inline]
pub fn scope<T>(name: impl Into<Cow<'static, str>>, f: impl FnOnce() -> T) -> T {
    if !enabled() {
        return f();
    }
    let start = Instant::now();
    let result = f();
    let event = Event {
        name: name.into(),
        start,
        end: Instant::now(),
    };
    if let Some(t) = TRACE.lock().unwrap_or_else(|e| e.into_inner()).as_mut() {
        t.write(&event);
    }
    result
}

pub fn close() -> std::io::Result<()> {
    match TRACE.lock().unwrap_or_else(|e| e.into_inner()).take() {
        Some(mut t) => t.close(),
        None => Ok(()),
    }
}
