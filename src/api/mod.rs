// Host-facing setup helpers.

pub mod simple;
