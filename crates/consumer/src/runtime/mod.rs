//! Runtime module — process lifecycle: boot, serve, stop.

pub mod boot;
pub mod serve;
pub mod stop;
