use std::fmt;
use std::future::Future;

use gpu_runtime::{Executor, GpuTaskError};
use tiles::TileStoreError;

use crate::socket::{SocketData, SocketSpec, SocketValue};

/// Why a single node run failed. Carries a message suitable for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRunFailure {
    message: String,
}

impl NodeRunFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for NodeRunFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.message)
    }
}

impl std::error::Error for NodeRunFailure {}

impl From<TileStoreError> for NodeRunFailure {
    fn from(error: TileStoreError) -> Self {
        Self::new(error.to_string())
    }
}

impl From<GpuTaskError> for NodeRunFailure {
    fn from(error: GpuTaskError) -> Self {
        Self::new(error.to_string())
    }
}

impl From<std::io::Error> for NodeRunFailure {
    fn from(error: std::io::Error) -> Self {
        Self::new(error.to_string())
    }
}

/// Resolved inputs of one node, indexed like its `inputs()` declaration.
/// An entry is `None` when the socket is unconnected or its producer has
/// nothing to offer.
pub struct InputData<'a> {
    specs: &'static [SocketSpec],
    values: Vec<Option<SocketData<'a>>>,
}

impl<'a> InputData<'a> {
    pub fn new(specs: &'static [SocketSpec], values: Vec<Option<SocketData<'a>>>) -> Self {
        assert_eq!(
            specs.len(),
            values.len(),
            "input data must hold one entry per declared socket"
        );
        for (spec, value) in specs.iter().zip(&values) {
            if let Some(value) = value {
                assert_eq!(
                    spec.socket_type,
                    value.socket_type(),
                    "input '{}' resolved to the wrong socket type",
                    spec.name
                );
            }
        }
        Self { specs, values }
    }

    /// Inputs of a node without any connection.
    pub fn empty(specs: &'static [SocketSpec]) -> Self {
        Self::new(specs, vec![None; specs.len()])
    }

    pub fn raw(&self, index: usize) -> Option<SocketData<'a>> {
        self.values[index]
    }

    pub fn get_optional<T: SocketValue<'a>>(&self, name: &str) -> Option<T> {
        let index = self.index_of::<T>(name);
        self.values[index].and_then(T::from_socket)
    }

    /// Reads a required input; a missing value fails the run.
    pub fn get<T: SocketValue<'a>>(&self, name: &str) -> Result<T, NodeRunFailure> {
        self.get_optional(name)
            .ok_or_else(|| NodeRunFailure::new(format!("input socket '{name}' has no data")))
    }

    fn index_of<T: SocketValue<'a>>(&self, name: &str) -> usize {
        let index = self
            .specs
            .iter()
            .position(|spec| spec.name == name)
            .unwrap_or_else(|| panic!("no input socket named '{name}'"));
        assert_eq!(
            self.specs[index].socket_type,
            T::TYPE,
            "input socket '{name}' read as the wrong type"
        );
        index
    }
}

/// A unit of work in a `NodeGraph`. Sockets are declared statically; the
/// graph owns the bookkeeping (timing, enabled and running flags).
pub trait Node {
    type Context: Executor;

    fn inputs(&self) -> &'static [SocketSpec];

    fn outputs(&self) -> &'static [SocketSpec];

    /// Value of output `index`, or `None` before the first successful run.
    /// Pass-through outputs may return one of `inputs`.
    fn output<'a>(&'a self, index: usize, inputs: &InputData<'a>) -> Option<SocketData<'a>>;

    fn run_impl(
        &mut self,
        context: &Self::Context,
        inputs: &InputData<'_>,
    ) -> impl Future<Output = Result<(), NodeRunFailure>>;
}
