//! API handlers module

pub mod editions;
pub mod health;
