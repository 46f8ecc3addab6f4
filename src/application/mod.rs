//! Application layer containing the bill authorization engine.
//!
//! `BillEngine` is the single entry point for mutations and the read-side
//! relations. It holds no per-request state; each call loads what it needs
//! from the stores, runs its gates and issues at most one guarded write.

pub mod engine;
