#![forbid(unsafe_code)]
#![deny(
    clippy::dbg_macro,
    rustdoc::missing_crate_level_docs,
    nonstandard_style,
    unused_qualifications
)]

/*!
# Worker pool and connection driver for the crow server library

This crate owns everything between the listening socket and the
application: the accept loop, the per-worker event-loop threads, the
one-second task timer that enforces idle timeouts, and the per-connection
state machine that reads, parses, dispatches, and writes.

The application side is abstracted as [`Service`]; `crow`'s `App`
implements it.
*/

mod binding;
pub use binding::{Listener, Stream};

mod task_timer;
pub use task_timer::TaskTimer;

mod worker;
pub use worker::{DateCache, WorkerContext};

mod connection;
pub use connection::serve;

mod service;
pub use service::Service;

mod server;
pub use server::{Server, ServerConfig, ServerHandle, TickFn};

pub use swansong::Swansong;
