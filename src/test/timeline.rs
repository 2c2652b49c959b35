use crate::sim::{Pid, SimTime, Timeline};

fn pid(n: u32) -> Pid {
    Pid::new(0, n)
}

#[test]
fn timeline_pops_in_time_order_and_fifo_within_a_time() {
    let mut tl = Timeline::new();
    tl.schedule_at(pid(9), SimTime(10));
    tl.schedule_at(pid(7), SimTime(5));
    tl.schedule_at(pid(1), SimTime(5));
    tl.schedule_at(pid(3), SimTime(5));

    // 同一时刻按插入顺序，不按 pid 大小
    assert_eq!(tl.remove_first(), Some((SimTime(5), pid(7))));
    assert_eq!(tl.remove_first(), Some((SimTime(5), pid(1))));
    assert_eq!(tl.remove_first(), Some((SimTime(5), pid(3))));
    assert_eq!(tl.remove_first(), Some((SimTime(10), pid(9))));
    assert_eq!(tl.remove_first(), None);
    assert!(tl.is_empty());
}

#[test]
fn timeline_reschedule_replaces_previous_entry() {
    let mut tl = Timeline::new();
    tl.schedule_at(pid(1), SimTime(5));
    tl.schedule_at(pid(2), SimTime(7));
    tl.schedule_at(pid(1), SimTime(20));

    assert_eq!(tl.len(), 2);
    assert_eq!(tl.scheduled_at(pid(1)), Some(SimTime(20)));
    assert_eq!(tl.peek_first(), Some((SimTime(7), pid(2))));
    assert_eq!(tl.remove_first(), Some((SimTime(7), pid(2))));
    assert_eq!(tl.remove_first(), Some((SimTime(20), pid(1))));
    assert_eq!(tl.remove_first(), None);
}

#[test]
fn timeline_reschedule_to_same_time_moves_to_back_of_bucket() {
    let mut tl = Timeline::new();
    tl.schedule_at(pid(1), SimTime(5));
    tl.schedule_at(pid(2), SimTime(5));
    tl.schedule_at(pid(1), SimTime(5));

    assert_eq!(tl.remove_first(), Some((SimTime(5), pid(2))));
    assert_eq!(tl.remove_first(), Some((SimTime(5), pid(1))));
}

#[test]
fn timeline_cancel_returns_old_time_and_prunes_bucket() {
    let mut tl = Timeline::new();
    tl.schedule_at(pid(1), SimTime(3));
    tl.schedule_at(pid(2), SimTime(8));

    assert_eq!(tl.cancel(pid(1)), Some(SimTime(3)));
    assert_eq!(tl.cancel(pid(1)), None);
    assert_eq!(tl.peek_first(), Some((SimTime(8), pid(2))));
    assert_eq!(tl.len(), 1);

    tl.clear();
    assert!(tl.is_empty());
    assert_eq!(tl.peek_first(), None);
}
