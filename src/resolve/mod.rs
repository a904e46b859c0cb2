//! The resolve phase: symbol tables first, rewrite rules second.
//!
//! [collect] builds per-document tables of every id, link definition and
//! footnote assignment; [rules] and [section] consume them through rewrite
//! rules. Splitting the two means references can point forward in a
//! document, or into documents that have not been rewritten yet, without
//! any rule ever scanning the tree.

pub mod collect;
pub mod rules;
pub mod section;
