//! A cooperative actor runtime: processes, instances, and a dynamic
//! thread pool.
//!
//! A [`Process`] is a template describing a program (an entry function
//! plus an optional error handler) and an input channel shared by every
//! [`Instance`] spawned from it. Instances are lightweight: many of them
//! are multiplexed over a small number of OS threads managed by a
//! [`Pool`]. An instance never blocks an OS thread waiting for a
//! message — it parks, and the pool picks a different instance to run in
//! the meantime.
//!
//! ```
//! use procrt::{Pool, Process, context::{message, StepDirective}};
//!
//! let pool = Pool::builder().size(2).build();
//! let process = Process::new();
//! process.wrap(std::sync::Arc::new(|msg| {
//!     let n = *msg.downcast::<u32>().unwrap();
//!     println!("got {}", n);
//!     Ok(StepDirective::Stop)
//! }), None).unwrap();
//! process.setpool(Some(pool.clone()));
//! process.spawn(1).unwrap();
//! process.send(message(7u32)).unwrap();
//! # pool.kill();
//! ```
//!
//! Non-goals: this crate does not itself provide an embedded scripting
//! engine, closure serialization, or language bindings. [`context::ExecutionContext`]
//! is the seam a host would plug those into; [`context::ClosureContext`]
//! is the reference, native-Rust-closure embedding used throughout this
//! crate's own tests.

pub mod channel;
pub mod codec;
pub mod context;
pub mod error;
pub mod failure;
pub mod instance;
mod macros;
pub mod pool;
mod queue;
pub mod process;
mod registry;

pub use channel::Channel;
pub use codec::EnvBlob;
pub use error::ProcessError;
pub use failure::Failure;
pub use instance::{Instance, InstanceState};
pub use pool::{default_pool, Pool, PoolBuilder};
pub use process::Process;

use std::sync::Arc;

use context::{EntryFn, ErrorHandlerFn};

/// Chainable construction of a [`Process`], mirroring the teacher crate's
/// own `Builder` shape but configuring an instance template instead of an
/// OS command line.
#[derive(Default)]
pub struct ProcessBuilder {
    parent: Option<Arc<Process>>,
    pool: Option<Arc<Pool>>,
    env: Option<EnvBlob>,
    error_handler: Option<ErrorHandlerFn>,
}

impl ProcessBuilder {
    /// Starts a new, empty builder.
    pub fn new() -> ProcessBuilder {
        ProcessBuilder::default()
    }

    /// Records `parent` as the new process's creator.
    pub fn parent(mut self, parent: Arc<Process>) -> ProcessBuilder {
        self.parent = Some(parent);
        self
    }

    /// Attaches the pool the new process's instances will run on.
    pub fn pool(mut self, pool: Arc<Pool>) -> ProcessBuilder {
        self.pool = Some(pool);
        self
    }

    /// Sets the process's opaque environment blob.
    pub fn env(mut self, env: EnvBlob) -> ProcessBuilder {
        self.env = Some(env);
        self
    }

    /// Installs an error handler, invoked once if an instance's entry
    /// function panics or returns an error.
    pub fn error_handler(mut self, handler: ErrorHandlerFn) -> ProcessBuilder {
        self.error_handler = Some(handler);
        self
    }

    /// Builds the process and installs `entry` as its program.
    pub fn wrap(self, entry: EntryFn) -> Result<Arc<Process>, ProcessError> {
        let process = Process::with_parent(self.parent.as_ref());
        if let Some(env) = self.env {
            process.setenv(env);
        }
        process.wrap(entry, self.error_handler)?;
        if let Some(pool) = self.pool {
            process.setpool(Some(pool));
        }
        Ok(process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context::{message, StepDirective};

    #[test]
    fn builder_wires_pool_and_parent() {
        let pool = Pool::builder().size(1).build();
        let parent = Process::new();
        let child = ProcessBuilder::new()
            .parent(parent.clone())
            .pool(pool.clone())
            .wrap(Arc::new(|_msg| Ok(StepDirective::Stop)))
            .unwrap();
        assert!(Arc::ptr_eq(&child.parent().unwrap(), &parent));
        assert!(child.pool().is_some());
        child.spawn(1).unwrap();
        child.input().push(message(1u32)).unwrap();
        pool.kill();
    }
}
