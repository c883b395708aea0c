//! Types for representing bus address ranges.

mod range;

pub use range::Range;

//===========================================================================//
