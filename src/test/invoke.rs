use crate::net::{GroupKind, MulticastTree, NetError, NetId, Network, RoutingEngine, StaticRoutes};
use crate::proto::{ArgValue, InvokeError, MethodRegistry, Param, ParamKind, Target};
use crate::sim::Scheduler;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn small_net() -> Network {
    let mut net = Network::new(0);
    net.add_host(NetId(1), "alpha").expect("add");
    net.add_host(NetId(2), "beta").expect("add");
    net.create_group(NetId::group(0), GroupKind::Abstract)
        .expect("group");
    net
}

#[test]
fn invoke_runs_zero_arg_and_typed_methods() {
    let methods = MethodRegistry::standard();
    let sched = Scheduler::default();
    let mut net = small_net();

    let r = methods
        .invoke(Target::Node(NetId(1)), "name", &[], &mut net, &sched)
        .expect("name");
    assert_eq!(r.as_deref(), Some("alpha"));

    let r = methods
        .invoke(
            Target::Network,
            "connect",
            &args(&["1", "2", "1000", "10000000000"]),
            &mut net,
            &sched,
        )
        .expect("connect");
    assert_eq!(r.as_deref(), Some("0"));
    assert_eq!(net.neighbors(NetId(1)), &[NetId(2)]);

    let r = methods
        .invoke(Target::Network, "node_count", &[], &mut net, &sched)
        .expect("node_count");
    assert_eq!(r.as_deref(), Some("2"));
}

#[test]
fn invoke_group_methods_report_membership_changes() {
    let methods = MethodRegistry::standard();
    let sched = Scheduler::default();
    let mut net = small_net();
    let g = Target::Group(NetId::group(0));

    let join = |net: &mut Network, who: &str| {
        methods
            .invoke(g, "join", &args(&[who]), net, &sched)
            .expect("join")
    };
    assert_eq!(join(&mut net, "2").as_deref(), Some("true"));
    assert_eq!(join(&mut net, "1").as_deref(), Some("true"));
    assert_eq!(join(&mut net, "2").as_deref(), Some("false"));

    let members = methods
        .invoke(g, "members", &[], &mut net, &sched)
        .expect("members");
    assert_eq!(members.as_deref(), Some("[2,1]"));

    let left = methods
        .invoke(g, "leave", &args(&["9"]), &mut net, &sched)
        .expect("leave");
    assert_eq!(left.as_deref(), Some("false"));
}

#[test]
fn invoke_checks_arity_before_running() {
    let methods = MethodRegistry::standard();
    let sched = Scheduler::default();
    let mut net = small_net();

    let err = methods
        .invoke(Target::Network, "send", &args(&["1", "2"]), &mut net, &sched)
        .unwrap_err();
    assert!(matches!(
        err,
        InvokeError::Arity {
            expected: 4,
            got: 2,
            ..
        }
    ));
    assert_eq!(net.stats.forwarded_pkts, 0);
}

#[test]
fn invoke_reports_argument_conversion_failures() {
    let methods = MethodRegistry::standard();
    let sched = Scheduler::default();
    let mut net = small_net();

    let err = methods
        .invoke(
            Target::Network,
            "send",
            &args(&["1", "2", "lots", "8"]),
            &mut net,
            &sched,
        )
        .unwrap_err();
    match err {
        InvokeError::ArgConversion { param, value, kind } => {
            assert_eq!(param, "size_bytes");
            assert_eq!(value, "lots");
            assert_eq!(kind, ParamKind::UInt);
        }
        other => panic!("expected ArgConversion, got {other:?}"),
    }

    // ttl 超出 u8
    let err = methods
        .invoke(
            Target::Network,
            "send",
            &args(&["1", "2", "100", "300"]),
            &mut net,
            &sched,
        )
        .unwrap_err();
    assert!(matches!(err, InvokeError::ArgConversion { .. }));
}

#[test]
fn invoke_rejects_unknown_targets_and_methods() {
    let methods = MethodRegistry::standard();
    let sched = Scheduler::default();
    let mut net = small_net();

    assert!(matches!(
        methods.invoke(Target::Node(NetId(42)), "name", &[], &mut net, &sched),
        Err(InvokeError::UnknownTarget(Target::Node(NetId(42))))
    ));
    assert!(matches!(
        methods.invoke(Target::Node(NetId(1)), "explode", &[], &mut net, &sched),
        Err(InvokeError::NoSuchMethod { table: "node", .. })
    ));
}

#[test]
fn params_coerce_strings_to_declared_kinds() {
    let p = |kind| Param { name: "p", kind };
    assert_eq!(p(ParamKind::Int).coerce("-3").expect("int"), ArgValue::Int(-3));
    assert_eq!(p(ParamKind::UInt).coerce(" 7 ").expect("uint"), ArgValue::UInt(7));
    assert_eq!(p(ParamKind::Float).coerce("2.5").expect("float"), ArgValue::Float(2.5));
    assert_eq!(p(ParamKind::Bool).coerce("1").expect("bool"), ArgValue::Bool(true));
    assert_eq!(p(ParamKind::NetId).coerce("12").expect("id"), ArgValue::NetId(NetId(12)));
    assert_eq!(
        p(ParamKind::Str).coerce(" keep ").expect("str"),
        ArgValue::Str(" keep ".to_string())
    );
    assert!(p(ParamKind::UInt).coerce("-1").is_err());
    assert!(p(ParamKind::Bool).coerce("yes").is_err());
}

#[test]
fn invoke_reports_router_algorithms() {
    let methods = MethodRegistry::standard();
    let sched = Scheduler::default();
    let mut net = small_net();
    net.add_router(
        NetId(3),
        "core",
        RoutingEngine::new(Box::new(StaticRoutes), Box::new(MulticastTree::default())),
    )
    .expect("add router");

    let r = methods
        .invoke(Target::Node(NetId(3)), "algorithms", &[], &mut net, &sched)
        .expect("algorithms");
    assert_eq!(r.as_deref(), Some("static,multicast_tree"));

    // 主机没有路由算法
    let err = methods
        .invoke(Target::Node(NetId(1)), "algorithms", &[], &mut net, &sched)
        .unwrap_err();
    assert!(matches!(err, InvokeError::Net(NetError::NotARouter(id)) if id == NetId(1)));
}
