//! Print output abstraction.
//!
//! The engine never writes to stdout directly; `console.log` and friends go
//! through a `PrintWriter` owned by the context, so embedders and tests can
//! capture or silence output.

use std::{cell::RefCell, rc::Rc};

/// Destination for script print output.
pub trait PrintWriter {
    fn print(&mut self, line: &str);
}

/// Writes to standard output.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn print(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Discards all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn print(&mut self, _line: &str) {}
}

/// Collects output into a shared string buffer, one line per print.
#[derive(Debug, Default, Clone)]
pub struct CollectStringPrint {
    buffer: Rc<RefCell<String>>,
}

impl CollectStringPrint {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that stays valid after the writer moves into the context.
    pub fn handle(&self) -> Rc<RefCell<String>> {
        Rc::clone(&self.buffer)
    }

    pub fn contents(&self) -> String {
        self.buffer.borrow().clone()
    }
}

impl PrintWriter for CollectStringPrint {
    fn print(&mut self, line: &str) {
        let mut buffer = self.buffer.borrow_mut();
        buffer.push_str(line);
        buffer.push('\n');
    }
}
