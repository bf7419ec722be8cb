//! Command catalog data model
//!
//! Commands are organised in a tree of groups. Each command describes one
//! script on disk, the kind of interpreter that runs it and the typed
//! parameters it accepts. The tree is built once per catalog load and never
//! mutated afterwards; tasks share commands through `Arc`.

pub mod command;
pub mod group;
pub mod ids;
pub mod node;
pub mod parameter;
