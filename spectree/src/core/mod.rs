//! Building blocks shared by declaration and execution.
//!
//! Nothing here knows about the tree or the thread-local declaration stack;
//! these modules operate on plain values and are tested in isolation.

pub mod decorator;
pub mod description;
pub mod error;
pub mod hooks;
pub mod naming;
pub mod tags;
pub mod types;
