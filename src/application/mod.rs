//! Application services built on the domain types.

pub mod pricing;
