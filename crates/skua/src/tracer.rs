//! Execution tracing hooks.
//!
//! A `VmTracer` observes the interpreter at opcode and call granularity.
//! The default `NoopTracer` compiles away to nothing interesting;
//! `StderrTracer` prints a live trace for debugging; `RecordingTracer`
//! collects events for assertions in tests.

use crate::bytecode::Opcode;

/// Events emitted by the VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Op { pc: u32, op: Opcode },
    Call { funcname: String },
    Return { funcname: String },
    Throw { message: String },
}

/// Observer of VM execution.
pub trait VmTracer {
    fn on_op(&mut self, _pc: u32, _op: Opcode) {}
    fn on_call(&mut self, _funcname: &str) {}
    fn on_return(&mut self, _funcname: &str) {}
    fn on_throw(&mut self, _message: &str) {}
}

/// The default tracer: observes nothing.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Prints every event to standard error.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl VmTracer for StderrTracer {
    fn on_op(&mut self, pc: u32, op: Opcode) {
        eprintln!("[trace] {pc:6}  {op}");
    }

    fn on_call(&mut self, funcname: &str) {
        eprintln!("[trace] call {funcname}");
    }

    fn on_return(&mut self, funcname: &str) {
        eprintln!("[trace] ret  {funcname}");
    }

    fn on_throw(&mut self, message: &str) {
        eprintln!("[trace] throw {message}");
    }
}

/// Records events for later inspection.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

impl VmTracer for RecordingTracer {
    fn on_op(&mut self, pc: u32, op: Opcode) {
        self.events.push(TraceEvent::Op { pc, op });
    }

    fn on_call(&mut self, funcname: &str) {
        self.events.push(TraceEvent::Call {
            funcname: funcname.to_owned(),
        });
    }

    fn on_return(&mut self, funcname: &str) {
        self.events.push(TraceEvent::Return {
            funcname: funcname.to_owned(),
        });
    }

    fn on_throw(&mut self, message: &str) {
        self.events.push(TraceEvent::Throw {
            message: message.to_owned(),
        });
    }
}
