//! Crate-level tests spanning parsing, rewriting and translation.

mod helpers;
mod pipeline;
