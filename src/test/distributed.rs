use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::dist::{DistError, Manager, Worker};
use crate::link::ProxyError;
use crate::net::{NetId, Stats};
use crate::proto::Target;
use crate::proxy::NodeHandle;
use crate::sim::{Ownership, SimTime, WorkerId};

const GBPS10: u64 = 10_000_000_000;

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// 在本机回环地址上起一个 manager 和一个 worker
fn manager_with_worker(desc: &'static str) -> (Manager, WorkerId, JoinHandle<Stats>) {
    let manager = Manager::bind("127.0.0.1:0").expect("bind manager");
    let addr = manager.local_addr().expect("manager addr");
    let worker = thread::spawn(move || {
        let w = Worker::connect(addr, desc).expect("worker connect");
        w.serve()
    });
    let ids = manager
        .accept_workers(1, Duration::from_secs(10))
        .expect("accept worker");
    assert_eq!(ids.len(), 1);
    (manager, ids[0], worker)
}

#[test]
fn remote_create_returns_address_with_worker_description() {
    let (manager, w, worker) = manager_with_worker("rack-7");
    assert_eq!(manager.worker_desc(w).as_deref(), Some("rack-7"));

    let router = manager
        .create_node(Some(w), "router", strings(&["r1", "shortest_path"]))
        .expect("create router");
    let NodeHandle::Remote(proxy) = &router else {
        panic!("expected remote router, got {router:?}");
    };
    assert_eq!(proxy.addr().worker_desc, "rack-7");
    assert_eq!(proxy.addr().worker_id, w);
    assert_eq!(manager.owner(router.net_id()), Some(Ownership::Remote(w)));

    // 零参数方法
    let name = manager
        .invoke_node(&router, "name", Vec::new())
        .expect("invoke name");
    assert_eq!(name.as_deref(), Some("r1"));
    let kind = manager
        .invoke(Target::Node(router.net_id()), "kind", Vec::new())
        .expect("invoke kind");
    assert_eq!(kind.as_deref(), Some("router"));

    manager.stop();
    worker.join().expect("worker thread");
}

#[test]
fn remote_failures_come_back_as_errors() {
    let (manager, w, worker) = manager_with_worker("w-err");

    match manager.create_node(Some(w), "toaster", strings(&["t"])) {
        Err(DistError::Proxy(ProxyError::Remote(msg))) => {
            assert!(msg.contains("toaster"), "{msg}")
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    let host = manager
        .create_node(Some(w), "host", strings(&["h"]))
        .expect("create host");
    match manager.invoke_node(&host, "name", strings(&["extra"])) {
        Err(DistError::Exec(_)) | Err(DistError::Proxy(_)) => {}
        other => panic!("expected arity error, got {other:?}"),
    }
    assert!(matches!(
        manager.invoke(Target::Node(NetId(999)), "name", Vec::new()),
        Err(DistError::UnknownEntity(NetId(999)))
    ));

    manager.stop();
    worker.join().expect("worker thread");
}

#[test]
fn packets_cross_between_manager_and_worker_partitions() {
    let (manager, w, worker) = manager_with_worker("w-data");

    // h0 在 manager 上；r1、h2 在 worker 上
    let h0 = manager
        .create_node(None, "host", strings(&["h0"]))
        .expect("h0")
        .net_id();
    let r1 = manager
        .create_node(Some(w), "router", strings(&["r1"]))
        .expect("r1")
        .net_id();
    let h2 = manager
        .create_node(Some(w), "host", strings(&["h2"]))
        .expect("h2")
        .net_id();
    for (a, b) in [(h0, r1), (r1, h0), (r1, h2), (h2, r1)] {
        manager
            .connect(a, b, SimTime::from_micros(1), GBPS10)
            .expect("connect");
    }

    let id = |n: NetId| n.0.to_string();
    manager
        .create_object(
            None,
            "source",
            h0,
            vec![id(h0), id(h2), "3".into(), "10000".into(), "1000".into(), "16".into(), "0".into()],
        )
        .expect("local source");
    let remote_source = manager
        .create_object(
            Some(w),
            "source",
            h2,
            vec![id(h2), id(h0), "2".into(), "10000".into(), "500".into(), "16".into(), "5000".into()],
        )
        .expect("remote source");
    assert_eq!(remote_source.worker_desc, "w-data");
    assert!(remote_source.pid.is_some());

    manager.start().expect("start");
    let summary = manager.run(None).expect("run");

    // 最后一个 h0 -> h2 的包在 20us 发出，两跳各 1.8us
    assert_eq!(summary.final_time, SimTime(23_600));
    assert_eq!(manager.stats().delivered_pkts, 2);
    assert_eq!(manager.stats().remote_out, 3);
    assert_eq!(manager.delivered_total().expect("delivered total"), 5);
    let received = manager
        .invoke(Target::Node(h2), "received", Vec::new())
        .expect("received");
    assert_eq!(received.as_deref(), Some("3"));

    manager.stop();
    let stats = worker.join().expect("worker thread");
    assert_eq!(stats.delivered_pkts, 3);
    assert_eq!(stats.remote_in, 3);
}

#[test]
fn multicast_group_on_worker_reports_membership() {
    let (manager, w, worker) = manager_with_worker("w-group");
    let r = manager
        .create_node(Some(w), "router", strings(&["r"]))
        .expect("router")
        .net_id();
    let h = manager
        .create_node(Some(w), "host", strings(&["h"]))
        .expect("host")
        .net_id();
    let group = manager.create_group(Some(w), Some(r)).expect("group");
    assert!(group.net_id().is_multicast());

    assert!(manager.join(&group, h).expect("join"));
    assert!(!manager.join(&group, h).expect("join again"));
    assert_eq!(manager.members(&group).expect("members"), vec![h]);
    assert!(manager.leave(&group, h).expect("leave"));
    assert!(!manager.leave(&group, h).expect("leave again"));
    assert!(manager.members(&group).expect("members").is_empty());

    manager.stop();
    worker.join().expect("worker thread");
}

#[test]
fn worker_disconnect_orphans_its_entities() {
    let (manager, w, worker) = manager_with_worker("w-gone");
    let h = manager
        .create_node(Some(w), "host", strings(&["h"]))
        .expect("host")
        .net_id();
    assert_eq!(manager.owner(h), Some(Ownership::Remote(w)));

    manager.stop();
    worker.join().expect("worker thread");

    let mut orphaned = false;
    for _ in 0..100 {
        if manager.owner(h).is_none() {
            orphaned = true;
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
    assert!(orphaned, "entity should be dropped after disconnect");
    assert!(manager.workers().is_empty());
}
