//! Tests for the execution state store.
//!
//! Runs go through `ReplayTransport`, so every test can check whether the
//! store reached for the network at all.

use tokio_util::sync::CancellationToken;

use engine::sse::encode_event;
use engine::{NodeResult, RunEvent, WorkflowError};
use nodes::{
    Edge, ExecutionStatePatch, ExecutionStatus, HumanInputData, Node, NodeData, Position,
};

use crate::{edge_status, ReplayTransport, StartStatus, StoreConfig, StoreError, WorkflowStore};

fn agent(id: &str, agent_id: &str) -> Node {
    Node::agent_task(id, agent_id, format!("step {id}"))
}

fn prompt_edge(id: &str, from: &str, to: &str) -> Edge {
    Edge::from_result(id, from, to, "prompt")
}

fn loaded(nodes: Vec<Node>, edges: Vec<Edge>) -> WorkflowStore {
    let mut store = WorkflowStore::default();
    store.initialize_workflow(nodes, edges, Some("Month end close".into()), None);
    store
}

fn started(total: usize) -> RunEvent {
    RunEvent::WorkflowStarted {
        message: "Starting workflow: Month end close".into(),
        total_nodes: total,
    }
}

fn node_started(id: &str) -> RunEvent {
    RunEvent::NodeStarted {
        node_id: id.into(),
        agent_name: "Bookkeeper".into(),
        description: format!("step {id}"),
    }
}

fn result(id: &str, output: &str) -> NodeResult {
    NodeResult {
        node_id: id.into(),
        agent_name: "Bookkeeper".into(),
        description: format!("step {id}"),
        output: output.into(),
    }
}

fn node_completed(id: &str, output: &str) -> RunEvent {
    let r = result(id, output);
    RunEvent::NodeCompleted {
        node_id: r.node_id,
        agent_name: r.agent_name,
        description: r.description,
        output: r.output,
    }
}

fn completed(results: Vec<NodeResult>) -> RunEvent {
    RunEvent::WorkflowCompleted {
        message: "Workflow completed successfully".into(),
        output: results,
    }
}

/// Encode `events` and cut the bytes into `size`-byte chunks, so event
/// boundaries land mid-chunk.
fn replay(events: &[RunEvent], size: usize) -> ReplayTransport {
    let wire: String = events.iter().map(encode_event).collect();
    wire.as_bytes()
        .chunks(size)
        .fold(ReplayTransport::new(), |t, c| t.chunk(c.to_vec()))
}

fn success_script() -> Vec<RunEvent> {
    vec![
        started(2),
        node_started("a"),
        node_completed("a", "x"),
        node_started("b"),
        node_completed("b", "y"),
        completed(vec![result("a", "x"), result("b", "y")]),
    ]
}

fn status(store: &WorkflowStore, id: &str) -> ExecutionStatus {
    store.node(id).unwrap().execution_state.status
}

fn edge_state(store: &WorkflowStore, id: &str) -> ExecutionStatus {
    store.edge(id).unwrap().status()
}

// ============================================================
// Running
// ============================================================

#[tokio::test]
async fn successful_run_completes_every_node_and_edge() {
    let mut store = loaded(
        vec![agent("a", "bookkeeper"), agent("b", "bookkeeper")],
        vec![prompt_edge("ab", "a", "b")],
    );
    let transport = replay(&success_script(), 7);

    let outcome = store
        .start_execution(&transport, "March ledger", &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, StartStatus::Success, "{}", outcome.message);
    assert_eq!(status(&store, "a"), ExecutionStatus::Completed);
    assert_eq!(status(&store, "b"), ExecutionStatus::Completed);
    assert_eq!(store.node("a").unwrap().execution_state.output.as_deref(), Some("x"));
    assert_eq!(store.node("b").unwrap().execution_state.output.as_deref(), Some("y"));
    assert_eq!(edge_state(&store, "ab"), ExecutionStatus::Completed);
    assert_eq!(store.run_count(), 1);
    assert!(store.last_completed_at().is_some());

    let sent = transport.requests();
    assert_eq!(transport.open_count(), 1);
    assert_eq!(sent[0].workflow_id, store.workflow_id());
    assert_eq!(sent[0].input_query, "March ledger");
    assert_eq!(sent[0].workflow_schema.nodes.len(), 2);
}

#[tokio::test]
async fn missing_agent_leaves_later_nodes_idle() {
    let mut store = loaded(
        vec![agent("a", "ghost"), agent("b", "auditor"), agent("c", "auditor")],
        vec![prompt_edge("ab", "a", "b"), prompt_edge("bc", "b", "c")],
    );
    let transport = replay(
        &[
            started(3),
            node_started("a"),
            RunEvent::NodeError {
                node_id: "a".into(),
                agent_name: "ghost".into(),
                description: "step a".into(),
                error: "Agent 'ghost' not found".into(),
            },
        ],
        64,
    );

    let outcome = store.start_execution(&transport, "", &CancellationToken::new()).await;

    assert_eq!(outcome.status, StartStatus::Error);
    assert!(outcome.message.contains("Agent 'ghost' not found"));
    assert_eq!(status(&store, "a"), ExecutionStatus::Error);
    assert_eq!(
        store.node("a").unwrap().execution_state.error.as_ref().unwrap().message,
        "Agent 'ghost' not found"
    );
    assert_eq!(status(&store, "b"), ExecutionStatus::Idle);
    assert_eq!(status(&store, "c"), ExecutionStatus::Idle);
    assert_eq!(edge_state(&store, "ab"), ExecutionStatus::Error);
    assert_eq!(edge_state(&store, "bc"), ExecutionStatus::Idle);
    assert_eq!(store.run_count(), 0);
}

#[tokio::test]
async fn cycle_is_refused_without_a_network_call() {
    let mut store = loaded(
        vec![agent("a", "bookkeeper"), agent("b", "bookkeeper")],
        vec![prompt_edge("ab", "a", "b"), prompt_edge("ba", "b", "a")],
    );
    assert_eq!(store.errors().len(), 1);
    match &store.errors()[0] {
        WorkflowError::Cycle { edges } => {
            let mut ids: Vec<_> = edges.iter().map(|e| e.id.as_str()).collect();
            ids.sort();
            assert_eq!(ids, vec!["ab", "ba"]);
        }
        other => panic!("unexpected error {other:?}"),
    }

    let transport = replay(&success_script(), 64);
    let outcome = store.start_execution(&transport, "", &CancellationToken::new()).await;

    assert_eq!(outcome.status, StartStatus::Error);
    assert_eq!(outcome.message, "Workflow validation failed");
    assert_eq!(transport.open_count(), 0);
}

#[tokio::test]
async fn duplicate_node_ids_are_refused_without_a_network_call() {
    let mut store = loaded(vec![agent("a", "bookkeeper"), agent("a", "auditor")], vec![]);
    assert!(matches!(
        &store.errors()[0],
        WorkflowError::DuplicateNodeId { nodes } if nodes.len() == 2
    ));

    let transport = replay(&success_script(), 64);
    let outcome = store.start_execution(&transport, "", &CancellationToken::new()).await;

    assert_eq!(outcome.status, StartStatus::Error);
    assert_eq!(outcome.message, "Workflow validation failed");
    assert_eq!(transport.open_count(), 0);
}

#[test]
fn fan_in_is_one_error_listing_both_edges() {
    let store = loaded(
        vec![
            Node::human_input("h1").with_user_input("one"),
            Node::human_input("h2").with_user_input("two"),
            agent("x", "bookkeeper"),
        ],
        vec![prompt_edge("e1", "h1", "x"), prompt_edge("e2", "h2", "x")],
    );

    assert_eq!(store.errors().len(), 1);
    match &store.errors()[0] {
        WorkflowError::MultipleSourcesForTargetHandle { edges } => {
            let ids: Vec<_> = edges.iter().map(|e| e.id.as_str()).collect();
            assert_eq!(ids, vec!["e1", "e2"]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn unanswered_human_input_blocks_the_run() {
    let mut store = loaded(
        vec![Node::human_input("a"), agent("b", "bookkeeper")],
        vec![prompt_edge("ab", "a", "b")],
    );

    let check = store.validate_inputs_before_execution();
    assert!(!check.is_valid);
    assert_eq!(check.errors.len(), 1);
    assert_eq!(check.errors[0].node_id, "a");

    let transport = replay(&success_script(), 64);
    let outcome = store.start_execution(&transport, "", &CancellationToken::new()).await;
    assert_eq!(outcome.status, StartStatus::Error);
    assert_eq!(transport.open_count(), 0);

    store.update_node_user_input("a", "Q3").unwrap();
    assert!(store.validate_inputs_before_execution().is_valid);
    let outcome = store.start_execution(&transport, "", &CancellationToken::new()).await;
    assert!(outcome.is_success(), "{}", outcome.message);

    // The answer travels with the request.
    let sent = &transport.requests()[0].workflow_schema.nodes[0];
    match &sent.data {
        NodeData::HumanInput(d) => assert_eq!(d.user_input.as_deref(), Some("Q3")),
        other => panic!("unexpected data {other:?}"),
    }
}

#[test]
fn blank_answer_does_not_count() {
    let mut store = loaded(vec![Node::human_input("a")], vec![]);
    store.update_node_user_input("a", "   ").unwrap();
    assert!(!store.validate_inputs_before_execution().is_valid);
}

#[tokio::test]
async fn fourth_run_is_rejected_locally() {
    let mut store = loaded(
        vec![agent("a", "bookkeeper"), agent("b", "bookkeeper")],
        vec![prompt_edge("ab", "a", "b")],
    );
    let transport = replay(&success_script(), 64);
    let cancel = CancellationToken::new();

    for run in 1..=3 {
        let outcome = store.start_execution(&transport, "", &cancel).await;
        assert!(outcome.is_success(), "run {run}: {}", outcome.message);
        assert_eq!(store.run_count(), run);
    }

    let outcome = store.start_execution(&transport, "", &cancel).await;
    assert_eq!(outcome.status, StartStatus::Error);
    assert!(outcome.message.contains("Maximum number of runs"));
    assert_eq!(transport.open_count(), 3);
}

#[tokio::test]
async fn failed_runs_do_not_use_up_the_cap() {
    let mut store = WorkflowStore::new(StoreConfig {
        max_runs: 1,
        ..StoreConfig::default()
    });
    store.initialize_workflow(vec![agent("a", "bookkeeper")], vec![], None, None);
    let failing = ReplayTransport::new().fail("connection reset");

    let outcome = store.start_execution(&failing, "", &CancellationToken::new()).await;
    assert_eq!(outcome.status, StartStatus::Error);
    assert_eq!(store.run_count(), 0);

    let ok = replay(
        &[started(1), node_started("a"), node_completed("a", "x"), completed(vec![result("a", "x")])],
        16,
    );
    assert!(store.start_execution(&ok, "", &CancellationToken::new()).await.is_success());
    assert_eq!(store.run_count(), 1);
}

#[tokio::test]
async fn stream_failure_keeps_states_as_last_received() {
    let mut store = loaded(
        vec![agent("a", "bookkeeper"), agent("b", "bookkeeper")],
        vec![prompt_edge("ab", "a", "b")],
    );
    let wire: String = [started(2), node_started("a"), node_completed("a", "x"), node_started("b")]
        .iter()
        .map(encode_event)
        .collect();
    let transport = ReplayTransport::new().chunk(wire).fail("connection reset");

    let outcome = store.start_execution(&transport, "", &CancellationToken::new()).await;

    assert_eq!(outcome.status, StartStatus::Error);
    assert!(outcome.message.contains("connection reset"));
    assert_eq!(store.last_error(), Some(outcome.message.as_str()));
    assert_eq!(status(&store, "a"), ExecutionStatus::Completed);
    assert_eq!(status(&store, "b"), ExecutionStatus::Running);
    assert_eq!(edge_state(&store, "ab"), ExecutionStatus::Running);
    assert_eq!(store.run_count(), 0);
}

#[tokio::test]
async fn server_error_event_is_surfaced() {
    let mut store = loaded(vec![agent("a", "bookkeeper")], vec![]);
    let transport = replay(
        &[RunEvent::Error {
            message: "Invalid workflow run request".into(),
            error: Some("missing inputQuery".into()),
        }],
        64,
    );

    let outcome = store.start_execution(&transport, "", &CancellationToken::new()).await;
    assert_eq!(outcome.status, StartStatus::Error);
    assert_eq!(outcome.message, "Invalid workflow run request: missing inputQuery");
}

#[tokio::test]
async fn undecodable_events_are_skipped() {
    let mut store = loaded(vec![agent("a", "bookkeeper")], vec![]);
    let mut wire = String::from("data: {not json}\n\n");
    for event in [started(1), node_started("a"), node_completed("a", "x"), completed(vec![result("a", "x")])] {
        wire.push_str(&encode_event(&event));
    }
    let transport = ReplayTransport::new().chunk(wire);

    let outcome = store.start_execution(&transport, "", &CancellationToken::new()).await;
    assert!(outcome.is_success(), "{}", outcome.message);
}

#[tokio::test]
async fn cancelled_run_does_not_touch_state() {
    let mut store = loaded(
        vec![agent("a", "bookkeeper"), agent("b", "bookkeeper")],
        vec![prompt_edge("ab", "a", "b")],
    );
    store
        .update_node_execution_state("a", ExecutionStatePatch::completed("old"))
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let transport = replay(&success_script(), 8);

    let outcome = store.start_execution(&transport, "", &cancel).await;

    assert_eq!(outcome.message, "Execution cancelled");
    assert_eq!(transport.open_count(), 0);
    assert_eq!(store.run_count(), 0);
    assert_eq!(status(&store, "a"), ExecutionStatus::Completed);
    assert_eq!(status(&store, "b"), ExecutionStatus::Idle);
}

#[tokio::test]
async fn a_new_run_resets_previous_states() {
    let mut store = loaded(vec![agent("a", "bookkeeper"), agent("b", "bookkeeper")], vec![]);
    store
        .update_node_execution_state("b", ExecutionStatePatch::completed("stale"))
        .unwrap();
    let transport = replay(&[started(2), node_started("a")], 64);

    store.start_execution(&transport, "", &CancellationToken::new()).await;

    assert_eq!(status(&store, "a"), ExecutionStatus::Running);
    assert_eq!(status(&store, "b"), ExecutionStatus::Idle);
    assert_eq!(store.node("b").unwrap().execution_state.output, None);
}

// ============================================================
// State updates
// ============================================================

#[test]
fn edge_status_follows_precedence() {
    use ExecutionStatus::*;
    let all = [Idle, Running, Completed, Error];
    for source in all {
        for target in all {
            let expected = if source == Error || target == Error {
                Error
            } else if source == Completed && target == Completed {
                Completed
            } else if matches!(source, Running | Completed) && target == Running {
                Running
            } else if source == Completed && target == Idle {
                Completed
            } else {
                Idle
            };
            assert_eq!(edge_status(source, target), expected, "{source} -> {target}");
        }
    }
}

#[test]
fn edge_recompute_is_order_independent() {
    let mut store = loaded(
        vec![agent("a", "x"), agent("b", "x"), agent("c", "x")],
        vec![prompt_edge("ab", "a", "b"), prompt_edge("bc", "b", "c")],
    );
    store
        .update_node_execution_state("a", ExecutionStatePatch::completed("1"))
        .unwrap();
    store
        .update_node_execution_state("b", ExecutionStatePatch::status(ExecutionStatus::Running))
        .unwrap();

    store.update_edge_status_from_nodes();
    let first = store.edges().to_vec();
    store.update_edge_status_from_nodes();
    assert_eq!(store.edges(), first.as_slice());
    assert_eq!(edge_state(&store, "ab"), ExecutionStatus::Running);
    assert_eq!(edge_state(&store, "bc"), ExecutionStatus::Idle);
}

#[test]
fn node_state_patch_merges() {
    let mut store = loaded(vec![agent("a", "x")], vec![]);
    store
        .update_node_execution_state("a", ExecutionStatePatch::completed("kept"))
        .unwrap();
    store
        .update_node_execution_state("a", ExecutionStatePatch::status(ExecutionStatus::Running))
        .unwrap();

    let state = &store.node("a").unwrap().execution_state;
    assert_eq!(state.status, ExecutionStatus::Running);
    assert_eq!(state.output.as_deref(), Some("kept"));

    assert_eq!(
        store.update_node_execution_state("zz", ExecutionStatePatch::default()),
        Err(StoreError::UnknownNode("zz".into()))
    );
    assert!(store.update_edge_execution_state("zz", ExecutionStatus::Idle).is_err());
}

#[test]
fn broken_connection_resets_stale_state() {
    let mut store = loaded(
        vec![agent("a", "x"), Node::visualize_text("v")],
        vec![Edge::from_result("av", "a", "v", "input")],
    );
    store
        .update_node_execution_state("v", ExecutionStatePatch::completed("shown"))
        .unwrap();

    store.remove_edge("av").unwrap();

    assert!(matches!(
        &store.errors()[0],
        WorkflowError::MissingRequiredConnection { node, .. } if node.id == "v"
    ));
    assert_eq!(status(&store, "v"), ExecutionStatus::Idle);
}

#[test]
fn broken_connection_clears_outgoing_edge_status() {
    let mut store = loaded(
        vec![agent("a", "x"), Node::visualize_text("v"), agent("w", "x")],
        vec![Edge::from_result("av", "a", "v", "input"), prompt_edge("vw", "v", "w")],
    );
    for id in ["a", "v", "w"] {
        store
            .update_node_execution_state(id, ExecutionStatePatch::completed("done"))
            .unwrap();
    }
    store.update_edge_status_from_nodes();
    assert_eq!(edge_state(&store, "vw"), ExecutionStatus::Completed);

    store.remove_edge("av").unwrap();

    assert_eq!(status(&store, "v"), ExecutionStatus::Idle);
    assert_eq!(edge_state(&store, "vw"), ExecutionStatus::Idle);
}

// ============================================================
// Loading and editing
// ============================================================

#[test]
fn initialize_lays_out_and_picks_up_answers() {
    let nodes = vec![
        Node::human_input("q").with_user_input("Q3").with_position(500.0, 500.0),
        agent("a", "x").with_position(500.0, 500.0),
    ];
    let store = loaded(nodes, vec![prompt_edge("qa", "q", "a")]);

    let q = &store.node("q").unwrap().position;
    let a = &store.node("a").unwrap().position;
    assert!(q.x < a.x);
    assert_eq!(store.user_input("q"), Some("Q3"));
    assert_eq!(store.name(), "Month end close");
    assert!(store.errors().is_empty());
}

#[test]
fn remove_node_cascades() {
    let mut store = loaded(
        vec![Node::human_input("q"), agent("a", "x"), agent("b", "x")],
        vec![prompt_edge("qa", "q", "a"), prompt_edge("ab", "a", "b")],
    );
    store.update_node_user_input("q", "answer").unwrap();

    store.remove_node("q").unwrap();

    assert!(store.node("q").is_none());
    assert!(store.edge("qa").is_none());
    assert!(store.edge("ab").is_some());
    assert_eq!(store.user_input("q"), None);
    assert_eq!(store.remove_node("q"), Err(StoreError::UnknownNode("q".into())));
}

#[test]
fn connect_checks_endpoints_and_ids() {
    let mut store = loaded(vec![agent("a", "x"), agent("b", "x")], vec![]);

    store.connect(prompt_edge("ab", "a", "b")).unwrap();
    assert_eq!(store.edges().len(), 1);
    assert_eq!(
        store.connect(prompt_edge("ab", "b", "a")),
        Err(StoreError::DuplicateEdge("ab".into()))
    );
    assert_eq!(
        store.connect(prompt_edge("an", "a", "nowhere")),
        Err(StoreError::UnknownNode("nowhere".into()))
    );

    store.connect(prompt_edge("ba", "b", "a")).unwrap();
    assert!(matches!(store.errors()[0], WorkflowError::Cycle { .. }));
}

#[test]
fn add_node_uses_the_factory() {
    let mut store = WorkflowStore::default();
    let id = store.add_node("text-input", Position::new(10.0, 20.0)).unwrap();

    let node = store.node(&id).unwrap();
    assert!(node.is_human_input());
    assert_eq!(node.type_name(), "text-input");
    assert!(matches!(
        store.add_node("spreadsheet", Position::default()),
        Err(StoreError::Configuration(_))
    ));
}

#[test]
fn update_node_data_keeps_type() {
    let mut store = loaded(vec![Node::human_input("q"), agent("a", "x")], vec![]);

    let answer = HumanInputData {
        user_input: Some("typed".into()),
        ..HumanInputData::default()
    };
    store.update_node_data("q", NodeData::HumanInput(answer)).unwrap();
    assert_eq!(store.user_input("q"), Some("typed"));

    let err = store
        .update_node_data("a", NodeData::HumanInput(HumanInputData::default()))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::NodeTypeMismatch { expected: "human-input", found: "agent-task", .. }
    ));
    assert_eq!(err.to_string(), "node 'a' has type agent-task, expected human-input");

    let err = store.update_node_user_input("a", "nope").unwrap_err();
    assert_eq!(err.to_string(), "node 'a' has type agent-task, expected human-input");
}

#[tokio::test]
async fn reset_forgets_graph_and_runs() {
    let mut store = loaded(vec![agent("a", "bookkeeper")], vec![]);
    let transport = replay(
        &[started(1), node_started("a"), node_completed("a", "x"), completed(vec![result("a", "x")])],
        64,
    );
    store.start_execution(&transport, "", &CancellationToken::new()).await;
    assert_eq!(store.run_count(), 1);
    let old_id = store.workflow_id().to_owned();

    store.reset_workflow();

    assert!(store.nodes().is_empty() && store.edges().is_empty());
    assert_eq!(store.run_count(), 0);
    assert_ne!(store.workflow_id(), old_id);
}
