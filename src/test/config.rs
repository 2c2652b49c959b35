use crate::config::{ConfigError, ScenarioSpec};
use crate::dist::{Manager, deploy};
use crate::net::NodeKind;
use crate::sim::SimTime;

const LINE: &str = r#"
{
    "schema_version": 1,
    "nodes": [
        { "name": "a" },
        { "name": "r", "kind": "router", "algorithm": "shortest_path" },
        { "name": "b" },
        { "name": "c" }
    ],
    "links": [
        { "from": "a", "to": "r" },
        { "from": "r", "to": "b", "latency_us": 2 },
        { "from": "r", "to": "c", "latency_us": 2 }
    ],
    "groups": [
        { "name": "g", "router": "r", "members": ["b", "c"] }
    ],
    "traffic": [
        { "src": "a", "dst": "b", "pkts": 4, "gap_us": 5 },
        { "src": "a", "dst": "g", "start_us": 100 }
    ]
}
"#;

#[test]
fn scenario_parses_with_defaults() {
    let spec = ScenarioSpec::from_json(LINE).expect("parse scenario");
    assert_eq!(spec.nodes.len(), 4);
    assert_eq!(spec.nodes[0].kind(), NodeKind::Host);
    assert_eq!(spec.nodes[1].kind(), NodeKind::Router);

    let link = &spec.links[0];
    assert_eq!(link.latency_us(), 1);
    assert_eq!(link.bandwidth_bps(), 10_000_000_000);
    assert!(link.bidirectional());

    let t = &spec.traffic[1];
    assert_eq!(t.pkts(), 1);
    assert_eq!(t.size_bytes(), 1000);
    assert_eq!(t.ttl(), 64);
    assert_eq!(t.start_us(), 100);
}

#[test]
fn scenario_rejects_bad_references() {
    let err = ScenarioSpec::from_json(r#"{ "schema_version": 9 }"#).unwrap_err();
    assert!(matches!(err, ConfigError::Schema(9)));

    let err = ScenarioSpec::from_json(
        r#"{ "schema_version": 1, "nodes": [ { "name": "a" }, { "name": "a" } ] }"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateName(ref n) if n == "a"));

    let err = ScenarioSpec::from_json(
        r#"{ "schema_version": 1, "nodes": [ { "name": "a" } ],
             "links": [ { "from": "a", "to": "zz" } ] }"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownName(ref n) if n == "zz"));

    let err = ScenarioSpec::from_json(
        r#"{ "schema_version": 1, "nodes": [ { "name": "a" } ],
             "groups": [ { "name": "g", "router": "a" } ] }"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::NotARouter(ref n) if n == "a"));

    let err = ScenarioSpec::from_json("{ not json").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn scenario_missing_file_reports_path() {
    let err = ScenarioSpec::from_path("/definitely/not/here.json").unwrap_err();
    match err {
        ConfigError::Io { path, .. } => assert!(path.ends_with("here.json")),
        other => panic!("expected Io, got {other:?}"),
    }
}

#[test]
fn scenario_deploys_and_runs_on_a_local_manager() {
    let spec = ScenarioSpec::from_json(LINE).expect("parse scenario");
    let manager = Manager::local();
    let deployed = deploy(&manager, &spec).expect("deploy");
    assert_eq!(deployed.nodes.len(), 4);
    assert_eq!(deployed.groups.len(), 1);
    assert_eq!(deployed.sources.len(), 2);

    let g = deployed.groups["g"].net_id();
    let members = manager.members(&deployed.groups["g"]).expect("members");
    assert_eq!(
        members,
        vec![
            deployed.node_id("b").expect("b"),
            deployed.node_id("c").expect("c")
        ]
    );
    assert!(g.is_multicast());

    manager.start().expect("start");
    let summary = manager.run(None).expect("run");
    assert!(summary.final_time > SimTime::from_micros(100));

    // 4 个单播包 + 组播到 2 个成员
    assert_eq!(manager.delivered_total().expect("delivered"), 6);
    assert_eq!(manager.stats().dropped_pkts(), 0);
    manager.stop();
}

#[test]
fn scenario_with_worker_placement_needs_joined_workers() {
    let spec = ScenarioSpec::from_json(
        r#"{ "schema_version": 1, "nodes": [ { "name": "a", "worker": 2 } ] }"#,
    )
    .expect("parse scenario");
    let manager = Manager::local();
    let err = deploy(&manager, &spec).unwrap_err();
    assert!(
        err.to_string().contains("worker #2"),
        "unexpected error: {err}"
    );
}
