//! Subsystems built on the core primitives.
//!
//! Bottom-up: `manifold` and `persistence` are leaves, `drift` compares
//! checkpoints against the live workspace, `lifecycle` runs pause/resume,
//! `checkpoint` is the facade over all of them. `revert` and `rag` form the
//! rollback side.

pub mod checkpoint;
pub mod drift;
pub mod lifecycle;
pub mod manifold;
pub mod persistence;
pub mod rag;
pub mod revert;
