//! HTTP middleware stack.

pub mod cors;
pub mod trace;
