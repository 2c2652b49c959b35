use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::net::{
    Network, NetId, Packet, PacketKind, RouteCtx, RouteUpdate, RoutingAlgorithm, RoutingEngine,
    ShortestPath, StaticRoutes, Verdict, GroupKind, MulticastTree,
};
use crate::sim::{Scheduler, SimTime};

/// 记录被调用次数、返回固定下一跳的算法
struct Counting {
    calls: Arc<AtomicUsize>,
    hops: Vec<NetId>,
}

impl RoutingAlgorithm for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    fn next_hops(&mut self, _ctx: &mut RouteCtx<'_>, _pkt: &Packet) -> Vec<NetId> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hops.clone()
    }
}

fn counting_engine(hops: Vec<NetId>) -> (RoutingEngine, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = RoutingEngine::new(
        Box::new(Counting {
            calls: calls.clone(),
            hops: hops.clone(),
        }),
        Box::new(Counting {
            calls: calls.clone(),
            hops,
        }),
    );
    (engine, calls)
}

const R: NetId = NetId(1);

/// 路由器 R 与若干主机之间的星形拓扑（R 本身不作为节点加入）
fn star(hosts: &[u32]) -> Network {
    let mut net = Network::new(0);
    for h in hosts {
        net.add_host(NetId(*h), format!("h{h}")).expect("add host");
        net.connect(R, NetId(*h), SimTime::from_micros(1), 10_000_000_000);
        net.connect(NetId(*h), R, SimTime::from_micros(1), 10_000_000_000);
    }
    net
}

#[test]
fn engine_drops_ttl_zero_without_consulting_algorithm() {
    let sched = Scheduler::default();
    let mut net = star(&[2]);
    let (mut engine, calls) = counting_engine(vec![NetId(2)]);

    let pkt = net.make_packet(NetId(9), NetId(2), 100, 0);
    let verdict = engine.on_arrival(R, pkt, &sched, &mut net);

    assert_eq!(verdict, Verdict::TtlExpired);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(net.stats.ttl_drops, 1);
    assert_eq!(sched.pending(), 0);
}

#[test]
fn engine_decrements_ttl_once_then_forwards() {
    let sched = Scheduler::default();
    let mut net = star(&[2]);
    let (mut engine, calls) = counting_engine(vec![NetId(2)]);

    let pkt = net.make_packet(NetId(9), NetId(2), 100, 1);
    let verdict = engine.on_arrival(R, pkt, &sched, &mut net);
    assert_eq!(verdict, Verdict::Forwarded(NetId(2)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    sched.run(&mut net).expect("run");
    let inbox = net.inbox(NetId(2)).expect("host inbox");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].ttl, 0);
    assert_eq!(inbox[0].src, R);
    assert_eq!(net.stats.delivered_pkts, 1);
}

#[test]
fn engine_replicates_one_copy_per_hop_in_algorithm_order() {
    let sched = Scheduler::default();
    let mut net = star(&[2, 3, 4]);
    let group = NetId::group(0);
    net.create_group(group, GroupKind::Abstract).expect("group");
    net.routes.insert(R, group, vec![NetId(4), NetId(2), NetId(3)]);
    let mut engine = RoutingEngine::new(Box::new(ShortestPath::default()), Box::new(StaticRoutes));

    let pkt = net.make_packet(NetId(9), group, 200, 5);
    let id = pkt.id;
    let verdict = engine.on_arrival(R, pkt, &sched, &mut net);
    assert_eq!(
        verdict,
        Verdict::Replicated(vec![NetId(4), NetId(2), NetId(3)])
    );
    assert_eq!(net.stats.replicated_pkts, 3);

    sched.run(&mut net).expect("run");
    for h in [2, 3, 4] {
        let inbox = net.inbox(NetId(h)).expect("host inbox");
        assert_eq!(inbox.len(), 1, "host {h} should get exactly one copy");
        assert_eq!(inbox[0].id, id);
        assert_eq!(inbox[0].src, R);
        assert_eq!(inbox[0].ttl, 4);
        assert_eq!(inbox[0].dst, group);
    }
    assert_eq!(net.stats.delivered_pkts, 3);
}

#[test]
fn engine_drops_silently_when_no_hop_is_known() {
    let sched = Scheduler::default();
    let mut net = star(&[2]);
    let mut engine = RoutingEngine::new(Box::new(StaticRoutes), Box::new(StaticRoutes));

    let pkt = net.make_packet(NetId(9), NetId(2), 100, 8);
    assert_eq!(engine.on_arrival(R, pkt, &sched, &mut net), Verdict::NoRoute);
    assert_eq!(net.stats.no_route_drops, 1);
    assert_eq!(net.stats.forwarded_pkts, 0);
}

#[test]
fn engine_hands_unicast_control_to_algorithm() {
    let sched = Scheduler::default();
    let mut net = star(&[2]);
    let mut engine = RoutingEngine::new(Box::new(StaticRoutes), Box::new(MulticastTree::default()));

    let update = RouteUpdate {
        dst: NetId(40),
        hops: vec![NetId(2)],
    };
    let pkt = net
        .make_packet(NetId(9), R, 64, 4)
        .with_kind(PacketKind::UnicastControl)
        .with_payload(serde_json::to_vec(&update).expect("encode update"));
    assert_eq!(engine.on_arrival(R, pkt, &sched, &mut net), Verdict::Control);
    assert_eq!(net.stats.control_pkts, 1);
    assert_eq!(net.routes.pinned_hops(R, NetId(40)).unwrap(), &[NetId(2)]);

    // 安装的路由立即生效
    let pkt = net.make_packet(NetId(9), NetId(40), 100, 4);
    assert_eq!(
        engine.on_arrival(R, pkt, &sched, &mut net),
        Verdict::Forwarded(NetId(2))
    );
}

#[test]
fn packets_lose_one_ttl_per_router_hop() {
    // h1 -> r2 -> r3 -> h4
    let build = |ttl: u8| {
        let sched = Scheduler::default();
        let mut net = Network::new(0);
        net.add_host(NetId(1), "h1").expect("add");
        for r in [2, 3] {
            net.add_router(
                NetId(r),
                format!("r{r}"),
                RoutingEngine::new(Box::new(ShortestPath::default()), Box::new(MulticastTree::default())),
            )
            .expect("add");
        }
        net.add_host(NetId(4), "h4").expect("add");
        for (a, b) in [(1, 2), (2, 3), (3, 4)] {
            net.connect(NetId(a), NetId(b), SimTime::from_micros(1), 10_000_000_000);
            net.connect(NetId(b), NetId(a), SimTime::from_micros(1), 10_000_000_000);
        }
        net.send(NetId(1), NetId(4), 500, ttl, &sched).expect("send");
        sched.run(&mut net).expect("run");
        net
    };

    let net = build(1);
    assert_eq!(net.stats.ttl_drops, 1);
    assert_eq!(net.stats.delivered_pkts, 0);

    let net = build(2);
    assert_eq!(net.stats.ttl_drops, 0);
    assert_eq!(net.stats.delivered_pkts, 1);
    let inbox = net.inbox(NetId(4)).expect("inbox");
    assert_eq!(inbox[0].ttl, 0);
    assert_eq!(inbox[0].src, NetId(3));
}
