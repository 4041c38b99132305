// src/enforcement/mod.rs
// Per-visitor enforcement stages run by the kernel, in evaluation order.

pub mod rules;
pub mod rate;
pub mod behavior;
pub mod session_limit;
