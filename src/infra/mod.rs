//! Process runtime: the worker loop that serves a channel and the shutdown plumbing.

pub mod daemon;
pub mod shutdown;

pub use daemon::{run, serve};
