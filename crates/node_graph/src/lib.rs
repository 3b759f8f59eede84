//! Dataflow graph runtime for compute nodes.
//!
//! Nodes declare typed sockets statically and expose their results as
//! borrowed `SocketData`. `NodeGraph` owns the nodes, orders them by their
//! connections and runs each one to completion on an `Executor`.

mod graph;
mod node;
mod socket;

pub use graph::{GraphRunFailure, NodeGraph};
pub use node::{InputData, Node, NodeRunFailure};
pub use socket::{RasterDimensions, SocketData, SocketSpec, SocketType, SocketValue};

#[cfg(test)]
mod tests;
