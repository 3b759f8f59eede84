use std::cell::{Cell, RefCell};
use std::future::Future;
use std::time::Duration;

use gpu_runtime::{Executor, block_on_local};
use tiles::TileId;

use super::*;

#[derive(Default)]
struct FakeContext {
    log: RefCell<Vec<&'static str>>,
    drains: Cell<u32>,
}

impl Executor for FakeContext {
    fn block_on<F: Future>(&self, future: F) -> F::Output {
        block_on_local(future)
    }

    fn drain(&self) {
        self.drains.set(self.drains.get() + 1);
    }
}

const SOURCE_OUTPUTS: &[SocketSpec] = &[
    SocketSpec::new("tile ids", SocketType::TileIdList),
    SocketSpec::new("dimensions", SocketType::RasterDimensions),
];
const RELAY_INPUTS: &[SocketSpec] = &[SocketSpec::new("tile ids", SocketType::TileIdList)];
const SINK_INPUTS: &[SocketSpec] = &[
    SocketSpec::new("tile ids", SocketType::TileIdList),
    SocketSpec::new("dimensions", SocketType::RasterDimensions),
];

struct Source {
    label: &'static str,
    ids: Vec<TileId>,
    produced: Option<Vec<TileId>>,
}

#[derive(Default)]
struct Sink {
    seen_ids: Option<usize>,
    seen_dimensions: Option<RasterDimensions>,
}

enum TestNode {
    Source(Source),
    Relay,
    Sink(Sink),
    Failing,
}

impl TestNode {
    fn source(label: &'static str, count: u32) -> Self {
        TestNode::Source(Source {
            label,
            ids: (0..count).map(|x| TileId::new(4, x, 0)).collect(),
            produced: None,
        })
    }

    fn label(&self) -> &'static str {
        match self {
            TestNode::Source(source) => source.label,
            TestNode::Relay => "relay",
            TestNode::Sink(_) => "sink",
            TestNode::Failing => "failing",
        }
    }
}

impl<'a> TryFrom<&'a TestNode> for &'a Sink {
    type Error = ();

    fn try_from(node: &'a TestNode) -> Result<Self, ()> {
        match node {
            TestNode::Sink(sink) => Ok(sink),
            _ => Err(()),
        }
    }
}

impl Node for TestNode {
    type Context = FakeContext;

    fn inputs(&self) -> &'static [SocketSpec] {
        match self {
            TestNode::Source(_) => &[],
            TestNode::Relay | TestNode::Failing => RELAY_INPUTS,
            TestNode::Sink(_) => SINK_INPUTS,
        }
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        match self {
            TestNode::Source(_) => SOURCE_OUTPUTS,
            TestNode::Relay | TestNode::Failing => RELAY_INPUTS,
            TestNode::Sink(_) => &[],
        }
    }

    fn output<'a>(&'a self, index: usize, inputs: &InputData<'a>) -> Option<SocketData<'a>> {
        match (self, index) {
            (TestNode::Source(source), 0) => source
                .produced
                .as_deref()
                .map(SocketData::TileIdList),
            (TestNode::Source(source), 1) => source.produced.as_ref().map(|ids| {
                SocketData::RasterDimensions(RasterDimensions::new(ids.len() as u32, 1))
            }),
            (TestNode::Relay, 0) => inputs.raw(0),
            _ => None,
        }
    }

    async fn run_impl(
        &mut self,
        context: &FakeContext,
        inputs: &InputData<'_>,
    ) -> Result<(), NodeRunFailure> {
        context.log.borrow_mut().push(self.label());
        match self {
            TestNode::Source(source) => {
                source.produced = Some(source.ids.clone());
                Ok(())
            }
            TestNode::Relay => inputs.get::<&[TileId]>("tile ids").map(|_| ()),
            TestNode::Sink(sink) => {
                sink.seen_ids = Some(inputs.get::<&[TileId]>("tile ids")?.len());
                sink.seen_dimensions = inputs.get_optional::<RasterDimensions>("dimensions");
                Ok(())
            }
            TestNode::Failing => Err(NodeRunFailure::new("boom")),
        }
    }
}

fn chain(graph: &mut NodeGraph<'_, TestNode>) {
    graph.add_node("sink", TestNode::Sink(Sink::default()));
    graph.add_node("relay", TestNode::Relay);
    graph.add_node("source", TestNode::source("source", 3));
    graph.connect("source", "tile ids", "relay", "tile ids");
    graph.connect("relay", "tile ids", "sink", "tile ids");
}

#[test]
fn run_follows_connections_not_insertion_order() {
    let context = FakeContext::default();
    let mut graph = NodeGraph::new(&context);
    chain(&mut graph);
    assert_eq!(graph.topological_order(), vec![2, 1, 0]);
    graph.run().expect("graph run");
    assert_eq!(*context.log.borrow(), vec!["source", "relay", "sink"]);
}

#[test]
fn pass_through_outputs_forward_upstream_data() {
    let context = FakeContext::default();
    let mut graph = NodeGraph::new(&context);
    chain(&mut graph);
    graph.run().expect("graph run");
    let sink: &Sink = graph.node_as("sink").expect("sink node");
    assert_eq!(sink.seen_ids, Some(3));
    assert_eq!(sink.seen_dimensions, None);
}

#[test]
fn optional_inputs_resolve_when_connected() {
    let context = FakeContext::default();
    let mut graph = NodeGraph::new(&context);
    chain(&mut graph);
    graph.connect("source", "dimensions", "sink", "dimensions");
    graph.run().expect("graph run");
    let sink: &Sink = graph.node_as("sink").expect("sink node");
    assert_eq!(sink.seen_dimensions, Some(RasterDimensions::new(3, 1)));
}

#[test]
fn first_failure_stops_the_run_and_names_the_node() {
    let context = FakeContext::default();
    let mut graph = NodeGraph::new(&context);
    graph.add_node("source", TestNode::source("source", 1));
    graph.add_node("fail", TestNode::Failing);
    graph.add_node("sink", TestNode::Sink(Sink::default()));
    graph.connect("source", "tile ids", "fail", "tile ids");
    graph.connect("fail", "tile ids", "sink", "tile ids");

    let failure = graph.run().expect_err("graph must fail");
    assert_eq!(failure.node_name, "fail");
    assert_eq!(failure.node_failure.message(), "boom");
    assert_eq!(*context.log.borrow(), vec!["source", "failing"]);
    assert!(!graph.is_running("fail"));

    let again = graph.run().expect_err("graph fails again");
    assert_eq!(again, failure);
}

#[test]
fn missing_input_fails_with_socket_name() {
    let context = FakeContext::default();
    let mut graph = NodeGraph::new(&context);
    graph.add_node("sink", TestNode::Sink(Sink::default()));
    let failure = graph.run().expect_err("unconnected input");
    assert_eq!(failure.node_name, "sink");
    assert_eq!(
        failure.node_failure.message(),
        "input socket 'tile ids' has no data"
    );
}

#[test]
fn disabled_nodes_are_skipped_with_zero_duration() {
    let context = FakeContext::default();
    let mut graph = NodeGraph::new(&context);
    chain(&mut graph);
    graph.run().expect("first run");
    assert_eq!(graph.set_enabled_for_nodes_with_name("sin", false), 1);
    assert!(!graph.is_enabled("sink"));
    context.log.borrow_mut().clear();
    graph.run().expect("second run");
    assert_eq!(*context.log.borrow(), vec!["source", "relay"]);
    assert_eq!(graph.last_run_duration("sink"), Duration::ZERO);
}

#[test]
fn upstream_without_output_counts_as_missing_input() {
    let context = FakeContext::default();
    let mut graph = NodeGraph::new(&context);
    chain(&mut graph);
    graph.set_enabled("source", false);
    let failure = graph.run().expect_err("source never produced");
    assert_eq!(failure.node_name, "relay");
}

#[test]
fn reconnecting_an_input_replaces_the_connection() {
    let context = FakeContext::default();
    let mut graph = NodeGraph::new(&context);
    graph.add_node("small", TestNode::source("small", 1));
    graph.add_node("large", TestNode::source("large", 5));
    graph.add_node("sink", TestNode::Sink(Sink::default()));
    graph.connect("small", "tile ids", "sink", "tile ids");
    graph.connect("large", "tile ids", "sink", "tile ids");
    graph.run().expect("graph run");
    let sink: &Sink = graph.node_as("sink").expect("sink node");
    assert_eq!(sink.seen_ids, Some(5));
}

#[test]
fn node_as_rejects_other_variants() {
    let context = FakeContext::default();
    let mut graph = NodeGraph::new(&context);
    chain(&mut graph);
    assert!(graph.node_as::<Sink>("relay").is_none());
    assert!(graph.node_as::<Sink>("missing").is_none());
}

#[test]
#[should_panic(expected = "cannot connect")]
fn connect_rejects_type_mismatch() {
    let context = FakeContext::default();
    let mut graph = NodeGraph::new(&context);
    chain(&mut graph);
    graph.connect("source", "dimensions", "relay", "tile ids");
}

#[test]
#[should_panic(expected = "has no input socket")]
fn connect_rejects_unknown_socket() {
    let context = FakeContext::default();
    let mut graph = NodeGraph::new(&context);
    chain(&mut graph);
    graph.connect("source", "tile ids", "sink", "heights");
}

#[test]
#[should_panic(expected = "cycle")]
fn cycles_are_rejected() {
    let context = FakeContext::default();
    let mut graph = NodeGraph::new(&context);
    graph.add_node("a", TestNode::Relay);
    graph.add_node("b", TestNode::Relay);
    graph.connect("a", "tile ids", "b", "tile ids");
    graph.connect("b", "tile ids", "a", "tile ids");
    graph.topological_order();
}

#[test]
fn timings_cover_every_node_and_serialize() {
    let context = FakeContext::default();
    let mut graph = NodeGraph::new(&context);
    chain(&mut graph);
    graph.run().expect("graph run");
    let timings = graph.timings();
    assert_eq!(
        timings.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["relay", "sink", "source"]
    );

    let path = std::env::temp_dir().join(format!("node_graph_timings_{}.json", std::process::id()));
    graph.write_timings_to_json_file(&path).expect("write timings");
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read timings"))
            .expect("timings json");
    assert!(written["sink"].is_number());
    let _ = std::fs::remove_file(path);
}

#[test]
fn dropping_the_graph_drains_gpu_work() {
    let context = FakeContext::default();
    {
        let mut graph = NodeGraph::new(&context);
        chain(&mut graph);
        graph.run().expect("graph run");
        assert_eq!(context.drains.get(), 0);
    }
    assert_eq!(context.drains.get(), 1);
}
