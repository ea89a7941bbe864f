//! Render Graph System
//!
//! Passes are nodes of a directed acyclic graph. Each pass declares the named
//! resources it reads and writes; compilation derives a topological execution
//! order and rejects cycles and reads with no producer.

pub mod executor;
pub mod graph;
pub mod pass;
pub mod resource;

pub use executor::*;
pub use graph::*;
pub use pass::*;
pub use resource::*;
