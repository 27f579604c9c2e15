//! Domain services.

pub mod generation;
