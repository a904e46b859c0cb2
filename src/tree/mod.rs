//! The document tree model.
//!
//! [element] defines the block and span vocabulary every phase operates
//! on, [document] arranges documents into the virtual tree, and [cursor]
//! provides the read-only view rules get of the tree they are rewriting.
//!
//! Elements are plain data. Anything a phase learns about them lives in
//! the cursor's index, so cloning a subtree never drags hidden state
//! along with it.

pub mod cursor;
pub mod document;
pub mod element;
