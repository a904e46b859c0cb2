//! Cross-document link validation and output path translation.

pub mod translate;
pub mod validate;
