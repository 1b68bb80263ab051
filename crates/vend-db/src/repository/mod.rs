//! # Repository Layer
//!
//! One repository per table, each a thin handle over the shared pool.
//! Repositories are `Clone` so they can be moved into spawned tasks.

pub mod cart;
pub mod product;
