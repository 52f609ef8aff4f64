//! The chunked equality engine (C4): full compare and quick-check.

pub mod compare;

pub use compare::{full_compare, quick_check, CompareVerdict, QuickCheckOutcome};
