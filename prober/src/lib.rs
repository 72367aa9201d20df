//! Protocol-agnostic core of the prober.
//!
//! A test case is a [`tree::Conversation`]: a rooted tree of command, generator and
//! expectation nodes. The [`runner::Runner`] walks one conversation against a live peer
//! through the [`protocol::Stream`] of a protocol binding, and the [`cli`] module runs
//! whole batches of conversations and reports which of them failed.

pub mod accumulator;
pub mod cli;
pub mod codec;
pub mod error;
pub mod log;
pub mod mutation;
pub mod protocol;
pub mod runner;
pub mod tree;

#[cfg(test)]
pub(crate) mod test_utils;

pub const GIT_REF: &str = match option_env!("GIT_REF") {
    Some(env) => env,
    None => "undefined",
};
