use crate::net::{NetId, RoutingTable};
use std::collections::{BTreeMap, HashSet};

fn diamond() -> BTreeMap<NetId, Vec<NetId>> {
    // 0 -> 1 -> 3
    //  \-> 2 ->/
    BTreeMap::from([
        (NetId(0), vec![NetId(1), NetId(2)]),
        (NetId(1), vec![NetId(3)]),
        (NetId(2), vec![NetId(3)]),
        (NetId(3), vec![]),
    ])
}

fn hop_set(rt: &RoutingTable, from: u32, dst: u32) -> HashSet<NetId> {
    rt.next_hops(NetId(from), NetId(dst))
        .expect("next_hops")
        .iter()
        .copied()
        .collect()
}

#[test]
fn routing_table_builds_next_hops_for_shortest_paths() {
    let mut rt = RoutingTable::new(0);
    rt.ensure_built(&diamond());

    assert_eq!(hop_set(&rt, 0, 3), HashSet::from([NetId(1), NetId(2)]));
    assert_eq!(rt.next_hops(NetId(0), NetId(1)).unwrap(), &[NetId(1)]);
    assert_eq!(rt.next_hops(NetId(0), NetId(2)).unwrap(), &[NetId(2)]);
    assert_eq!(rt.next_hops(NetId(1), NetId(3)).unwrap(), &[NetId(3)]);
    assert_eq!(rt.next_hops(NetId(2), NetId(3)).unwrap(), &[NetId(3)]);

    assert!(rt.next_hops(NetId(3), NetId(0)).is_none());
    assert!(rt.next_hops(NetId(0), NetId(0)).is_none());
}

#[test]
fn routing_table_requires_mark_dirty_to_rebuild() {
    let mut adj = diamond();
    let mut rt = RoutingTable::new(0);
    rt.ensure_built(&adj);
    assert!(!rt.is_dirty());

    // 改拓扑但不标脏：仍是旧结果
    adj.insert(NetId(0), vec![NetId(1)]);
    rt.ensure_built(&adj);
    assert_eq!(hop_set(&rt, 0, 3), HashSet::from([NetId(1), NetId(2)]));

    rt.mark_dirty();
    rt.ensure_built(&adj);
    assert_eq!(hop_set(&rt, 0, 3), HashSet::from([NetId(1)]));
}

#[test]
fn routing_table_explicit_entries_replace_and_survive_rebuild() {
    let mut rt = RoutingTable::new(0);
    rt.insert(NetId(0), NetId(3), vec![NetId(2)]);
    rt.insert(NetId(0), NetId(3), vec![NetId(1)]);
    rt.ensure_built(&diamond());

    assert_eq!(rt.next_hops(NetId(0), NetId(3)).unwrap(), &[NetId(1)]);
    assert_eq!(rt.pinned_hops(NetId(0), NetId(3)).unwrap(), &[NetId(1)]);
    // 计算出来的条目不算显式条目
    assert!(rt.pinned_hops(NetId(1), NetId(3)).is_none());

    rt.mark_dirty();
    rt.ensure_built(&diamond());
    assert_eq!(rt.next_hops(NetId(0), NetId(3)).unwrap(), &[NetId(1)]);

    assert_eq!(rt.remove(NetId(0), NetId(3)), Some(vec![NetId(1)]));
    rt.mark_dirty();
    rt.ensure_built(&diamond());
    assert_eq!(hop_set(&rt, 0, 3), HashSet::from([NetId(1), NetId(2)]));
}

#[test]
fn routing_table_pick_ecmp_is_deterministic_and_within_candidates() {
    let rt = RoutingTable::new(123);
    let cands = [NetId(1), NetId(2)];

    let a = rt.pick_ecmp_with_key(NetId(0), NetId(3), 999, &cands);
    let b = rt.pick_ecmp_with_key(NetId(0), NetId(3), 999, &cands);
    assert_eq!(a, b);
    assert!(cands.contains(&a));
}

#[test]
fn routing_table_pick_ecmp_respects_hash_salt_for_some_key() {
    let cands = [NetId(1), NetId(2)];
    let rt0 = RoutingTable::new(0);
    let rt1 = RoutingTable::new(1);

    let found = (0..10_000u64).find(|key| {
        rt0.pick_ecmp_with_key(NetId(0), NetId(3), *key, &cands)
            != rt1.pick_ecmp_with_key(NetId(0), NetId(3), *key, &cands)
    });
    assert!(
        found.is_some(),
        "expected at least one key to differ between salts"
    );
}
