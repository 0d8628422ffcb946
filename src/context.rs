//! The execution context: the opaque, per-instance state that is resumed
//! with one message at a time.
//!
//! The runtime treats the engine that actually *runs* user code as an
//! external collaborator (an embedded interpreter, a WASM module, a
//! scripting VM — whatever the host chooses to plug in). [`ExecutionContext`]
//! is the lifecycle boundary the core dispatch loop talks to; [`ClosureContext`]
//! is the reference embedding used by this crate and by its tests, which
//! runs a plain boxed closure instead of a textual script. For a textual-
//! engine embedding, `load_string`/`call`/`close` compose into the same
//! `resume`/`close` lifecycle: loading installs the entry function once,
//! and each `call` is one `resume`.
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::failure::{self, Failure};

/// A single opaque message delivered to an instance.
pub type Message = Box<dyn Any + Send>;

/// Boxes `value` up as a [`Message`].
pub fn message<T: Send + 'static>(value: T) -> Message {
    Box::new(value)
}

/// What an instance's entry function asks the driver to do after handling
/// one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirective {
    /// Keep the instance alive; the driver will ask for another message.
    Continue,
    /// The entry function is done; the instance should terminate normally.
    Stop,
}

/// The user's entry function: invoked once per message.
pub type EntryFn = Arc<dyn Fn(Message) -> Result<StepDirective, Failure> + Send + Sync>;

/// The user's optional error handler: invoked once, with the failure that
/// terminated the instance.
pub type ErrorHandlerFn = Arc<dyn Fn(&Failure) + Send + Sync>;

/// Outcome of resuming an execution context with one message.
pub enum StepOutcome {
    /// The step completed normally; the instance wants more messages.
    Continue,
    /// The entry function asked to stop, or the driver ran out of program
    /// to run.
    Done,
    /// The entry function panicked or returned an error.
    Err(Failure),
}

/// The lifecycle API an embedded execution engine must provide.
///
/// Exactly one instance owns exactly one context; contexts are never
/// shared between instances or resumed from more than one thread at a
/// time (the pool enforces this by constructions, see `pool::run_instance`).
pub trait ExecutionContext: Send {
    /// Resumes the context with the next message, running at most one
    /// step of the driver loop.
    fn resume(&mut self, message: Message) -> StepOutcome;

    /// Releases any resources held by the context. Called once, when the
    /// owning instance becomes DEAD.
    fn close(&mut self) {}
}

impl fmt::Debug for dyn ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("ExecutionContext")
    }
}

/// The reference [`ExecutionContext`] embedding: runs a native Rust
/// closure instead of a scripted program.
///
/// `load_string` in the spec's opaque boundary corresponds to installing
/// `entry` once at construction time; `call` corresponds to one `resume`;
/// `close` is this type's `close`.
pub struct ClosureContext {
    entry: Option<EntryFn>,
}

impl ClosureContext {
    /// Creates a context with no entry function installed. Resuming an
    /// uninstalled context always reports [`StepOutcome::Done`].
    pub fn new() -> ClosureContext {
        ClosureContext { entry: None }
    }

    /// Creates a context that will run `entry` on every resume.
    pub fn with_entry(entry: EntryFn) -> ClosureContext {
        ClosureContext { entry: Some(entry) }
    }

    /// Installs (or replaces) the entry function.
    pub fn install(&mut self, entry: EntryFn) {
        self.entry = Some(entry);
    }
}

impl Default for ClosureContext {
    fn default() -> ClosureContext {
        ClosureContext::new()
    }
}

impl ExecutionContext for ClosureContext {
    fn resume(&mut self, message: Message) -> StepOutcome {
        let entry = match &self.entry {
            Some(entry) => entry.clone(),
            None => return StepOutcome::Done,
        };
        match failure::catch(std::panic::AssertUnwindSafe(|| entry(message))) {
            Ok(Ok(StepDirective::Continue)) => StepOutcome::Continue,
            Ok(Ok(StepDirective::Stop)) => StepOutcome::Done,
            Ok(Err(failure)) => StepOutcome::Err(failure),
            Err(failure) => StepOutcome::Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn resumes_entry_and_continues() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let entry: EntryFn = Arc::new(move |_msg| {
            count2.fetch_add(1, Ordering::SeqCst);
            Ok(StepDirective::Continue)
        });
        let mut ctx = ClosureContext::with_entry(entry);
        matches!(ctx.resume(message(1u32)), StepOutcome::Continue);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_directive_yields_done() {
        let entry: EntryFn = Arc::new(|_msg| Ok(StepDirective::Stop));
        let mut ctx = ClosureContext::with_entry(entry);
        match ctx.resume(message(1u32)) {
            StepOutcome::Done => {}
            _ => panic!("expected Done"),
        }
    }

    #[test]
    fn panic_is_captured_as_failure() {
        let entry: EntryFn = Arc::new(|_msg| panic!("boom"));
        let mut ctx = ClosureContext::with_entry(entry);
        match ctx.resume(message(1u32)) {
            StepOutcome::Err(failure) => assert_eq!(failure.message(), "boom"),
            _ => panic!("expected Err"),
        }
    }

    #[test]
    fn returned_error_is_reported_without_panicking() {
        let entry: EntryFn = Arc::new(|_msg| Err(Failure::new("nope")));
        let mut ctx = ClosureContext::with_entry(entry);
        match ctx.resume(message(1u32)) {
            StepOutcome::Err(failure) => assert_eq!(failure.message(), "nope"),
            _ => panic!("expected Err"),
        }
    }

    #[test]
    fn uninstalled_context_is_done() {
        let mut ctx = ClosureContext::new();
        match ctx.resume(message(1u32)) {
            StepOutcome::Done => {}
            _ => panic!("expected Done"),
        }
    }
}
