//! The archive differencer (C5, archive half): streaming entry extraction
//! with path sanitization and decompression-bomb guards (spec.md §4.5).

pub mod bomb_guard;
pub mod compare;
pub mod fnv;
pub mod sanitize;

pub use compare::compare_archive;
