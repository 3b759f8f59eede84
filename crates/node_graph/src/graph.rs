use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use gpu_runtime::Executor;

use crate::node::{InputData, Node, NodeRunFailure};
use crate::socket::SocketData;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRunFailure {
    pub node_name: String,
    pub node_failure: NodeRunFailure,
}

impl fmt::Display for GraphRunFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "node '{}' failed: {}",
            self.node_name, self.node_failure
        )
    }
}

impl std::error::Error for GraphRunFailure {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Connection {
    node: usize,
    output: usize,
}

struct NodeSlot<N> {
    name: String,
    /// Taken out while the node runs.
    node: Option<N>,
    inputs: Vec<Option<Connection>>,
    enabled: bool,
    running: bool,
    last_run_duration: Duration,
}

/// Named nodes plus their connections. Runs nodes in topological order,
/// breaking ties by insertion order, on the executor it was created with.
/// Dropping the graph drains outstanding GPU work.
pub struct NodeGraph<'c, N: Node> {
    context: &'c N::Context,
    slots: Vec<NodeSlot<N>>,
}

impl<'c, N: Node> NodeGraph<'c, N> {
    pub fn new(context: &'c N::Context) -> Self {
        Self {
            context,
            slots: Vec::new(),
        }
    }

    pub fn context(&self) -> &'c N::Context {
        self.context
    }

    pub fn add_node(&mut self, name: impl Into<String>, node: N) -> usize {
        let name = name.into();
        assert!(
            self.index_of(&name).is_none(),
            "node '{name}' already exists"
        );
        let inputs = vec![None; node.inputs().len()];
        self.slots.push(NodeSlot {
            name,
            node: Some(node),
            inputs,
            enabled: true,
            running: false,
            last_run_duration: Duration::ZERO,
        });
        self.slots.len() - 1
    }

    /// Connects output `output` of node `from` to input `input` of node
    /// `to`, replacing any previous connection of that input.
    pub fn connect(&mut self, from: &str, output: &str, to: &str, input: &str) {
        let from_index = self.expect_index(from);
        let to_index = self.expect_index(to);
        let from_node = self.slot_node(from_index);
        let output_index = from_node
            .outputs()
            .iter()
            .position(|spec| spec.name == output)
            .unwrap_or_else(|| panic!("node '{from}' has no output socket '{output}'"));
        let output_type = from_node.outputs()[output_index].socket_type;
        let to_node = self.slot_node(to_index);
        let input_index = to_node
            .inputs()
            .iter()
            .position(|spec| spec.name == input)
            .unwrap_or_else(|| panic!("node '{to}' has no input socket '{input}'"));
        let input_type = to_node.inputs()[input_index].socket_type;
        assert_eq!(
            output_type, input_type,
            "cannot connect {from}.{output} ({output_type}) to {to}.{input} ({input_type})"
        );
        self.slots[to_index].inputs[input_index] = Some(Connection {
            node: from_index,
            output: output_index,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.name.as_str())
    }

    pub fn node(&self, name: &str) -> Option<&N> {
        let index = self.index_of(name)?;
        self.slots[index].node.as_ref()
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut N> {
        let index = self.index_of(name)?;
        self.slots[index].node.as_mut()
    }

    /// Typed view of a node, through the sum type's `TryFrom` downcast.
    pub fn node_as<'s, T>(&'s self, name: &str) -> Option<&'s T>
    where
        &'s T: TryFrom<&'s N>,
    {
        self.node(name).and_then(|node| <&T>::try_from(node).ok())
    }

    pub fn node_as_mut<'s, T>(&'s mut self, name: &str) -> Option<&'s mut T>
    where
        &'s mut T: TryFrom<&'s mut N>,
    {
        self.node_mut(name)
            .and_then(|node| <&mut T>::try_from(node).ok())
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.slots[self.expect_index(name)].enabled
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) {
        let index = self.expect_index(name);
        self.slots[index].enabled = enabled;
    }

    /// Returns how many nodes matched.
    pub fn set_enabled_for_nodes_with_name(&mut self, pattern: &str, enabled: bool) -> usize {
        let mut matched = 0;
        for slot in self.slots.iter_mut().filter(|slot| slot.name.contains(pattern)) {
            slot.enabled = enabled;
            matched += 1;
        }
        matched
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.slots[self.expect_index(name)].running
    }

    pub fn last_run_duration(&self, name: &str) -> Duration {
        self.slots[self.expect_index(name)].last_run_duration
    }

    /// Last run duration of every node, in milliseconds.
    pub fn timings(&self) -> BTreeMap<String, f64> {
        self.slots
            .iter()
            .map(|slot| {
                (
                    slot.name.clone(),
                    slot.last_run_duration.as_secs_f64() * 1000.0,
                )
            })
            .collect()
    }

    pub fn write_timings_to_json_file(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.timings()).map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;
        log::info!("wrote node timings to {}", path.display());
        Ok(())
    }

    /// Kahn's algorithm, always picking the lowest ready index. Panics on a
    /// cycle.
    pub fn topological_order(&self) -> Vec<usize> {
        let count = self.slots.len();
        let mut in_degree = vec![0usize; count];
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (index, slot) in self.slots.iter().enumerate() {
            for connection in slot.inputs.iter().flatten() {
                in_degree[index] += 1;
                downstream[connection.node].push(index);
            }
        }
        let mut ready: Vec<usize> = (0..count).filter(|&index| in_degree[index] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(position) = ready
            .iter()
            .enumerate()
            .min_by_key(|(_, index)| **index)
            .map(|(position, _)| position)
        {
            let index = ready.swap_remove(position);
            order.push(index);
            for &next in &downstream[index] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(next);
                }
            }
        }
        assert_eq!(order.len(), count, "node graph contains a cycle");
        order
    }

    /// Runs every enabled node once. Stops at the first failure; the graph
    /// stays usable and may be run again.
    pub fn run(&mut self) -> Result<(), GraphRunFailure> {
        let order = self.topological_order();
        let started = Instant::now();
        log::info!("running node graph ({} nodes)", order.len());
        for index in order {
            if !self.slots[index].enabled {
                self.slots[index].last_run_duration = Duration::ZERO;
                log::debug!("skipping disabled node '{}'", self.slots[index].name);
                continue;
            }
            if let Err(node_failure) = self.run_node(index) {
                let node_name = self.slots[index].name.clone();
                log::error!("node '{node_name}' failed: {node_failure}");
                return Err(GraphRunFailure {
                    node_name,
                    node_failure,
                });
            }
        }
        log::info!(
            "node graph finished in {:.2} ms",
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    fn run_node(&mut self, index: usize) -> Result<(), NodeRunFailure> {
        let context = self.context;
        let mut node = self.slots[index]
            .node
            .take()
            .unwrap_or_else(|| panic!("node '{}' is already running", self.slots[index].name));
        self.slots[index].running = true;
        let started = Instant::now();
        let result = {
            let inputs = self.resolve_inputs(index, &node);
            context.block_on(node.run_impl(context, &inputs))
        };
        let duration = started.elapsed();

        let slot = &mut self.slots[index];
        slot.node = Some(node);
        slot.running = false;
        slot.last_run_duration = duration;
        log::debug!(
            "node '{}' took {:.3} ms",
            slot.name,
            duration.as_secs_f64() * 1000.0
        );
        result
    }

    fn resolve_inputs<'s>(&'s self, index: usize, node: &N) -> InputData<'s> {
        let values = self.slots[index]
            .inputs
            .iter()
            .map(|connection| connection.and_then(|connection| self.resolve_output(connection)))
            .collect();
        InputData::new(node.inputs(), values)
    }

    fn resolve_output(&self, connection: Connection) -> Option<SocketData<'_>> {
        let node = self.slots[connection.node].node.as_ref()?;
        let inputs = self.resolve_inputs(connection.node, node);
        node.output(connection.output, &inputs)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.name == name)
    }

    fn expect_index(&self, name: &str) -> usize {
        self.index_of(name)
            .unwrap_or_else(|| panic!("no node named '{name}'"))
    }

    fn slot_node(&self, index: usize) -> &N {
        self.slots[index]
            .node
            .as_ref()
            .unwrap_or_else(|| panic!("node '{}' is running", self.slots[index].name))
    }
}

impl<N: Node> Drop for NodeGraph<'_, N> {
    fn drop(&mut self) {
        self.context.drain();
    }
}
