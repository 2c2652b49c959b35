use crate::sim::{
    Ownership, Pid, ProcessRegistry, ProcessState, SchedError, SimTime, Suspend, WorkerId, from_fn,
};

fn idle() -> Box<dyn crate::sim::Process> {
    Box::new(from_fn("idle", |_ctx| Suspend::Block))
}

#[test]
fn registry_walks_the_process_lifecycle() {
    let mut reg = ProcessRegistry::new();
    let pid = Pid::new(0, 1);
    reg.register(pid, Ownership::Local, idle()).expect("register");
    assert_eq!(reg.state(pid), Some(ProcessState::Idle));

    reg.mark_scheduled(pid, SimTime(10)).expect("schedule");
    assert_eq!(reg.state(pid), Some(ProcessState::Scheduled));

    reg.resume(pid).expect("resume");
    assert_eq!(reg.state(pid), Some(ProcessState::Running));
    assert_eq!(reg.running(), vec![pid]);

    // 没有新的唤醒时间 -> Idle
    assert_eq!(reg.blocked_or_finished(pid, false), Ok(ProcessState::Idle));
    assert!(reg.running().is_empty());

    reg.mark_scheduled(pid, SimTime(20)).expect("schedule");
    reg.resume(pid).expect("resume");
    reg.mark_scheduled(pid, SimTime(30)).expect("re-arm while running");
    assert_eq!(reg.state(pid), Some(ProcessState::Running));
    assert_eq!(reg.blocked_or_finished(pid, false), Ok(ProcessState::Scheduled));

    reg.resume(pid).expect("resume");
    assert_eq!(reg.blocked_or_finished(pid, true), Ok(ProcessState::Terminated));
    assert_eq!(reg.state(pid), Some(ProcessState::Terminated));
    assert!(reg.is_empty());
}

#[test]
fn registry_refuses_resume_without_wakeup() {
    let mut reg = ProcessRegistry::new();
    let pid = Pid::new(0, 1);
    reg.register(pid, Ownership::Local, idle()).expect("register");

    assert_eq!(
        reg.resume(pid),
        Err(SchedError::NotRunnable {
            pid,
            state: ProcessState::Idle
        })
    );
    assert_eq!(
        reg.blocked_or_finished(pid, false),
        Err(SchedError::NotRunnable {
            pid,
            state: ProcessState::Idle
        })
    );
}

#[test]
fn registry_keeps_tombstones_for_terminated_pids() {
    let mut reg = ProcessRegistry::new();
    let pid = Pid::new(0, 1);
    reg.register(pid, Ownership::Local, idle()).expect("register");
    assert!(reg.terminate(pid).is_some());

    assert_eq!(reg.mark_scheduled(pid, SimTime(1)), Err(SchedError::Terminated(pid)));
    assert_eq!(
        reg.register(pid, Ownership::Local, idle()),
        Err(SchedError::Terminated(pid))
    );
    assert_eq!(
        reg.mark_scheduled(Pid::new(0, 99), SimTime(1)),
        Err(SchedError::UnknownProcess(Pid::new(0, 99)))
    );
}

#[test]
fn registry_rejects_duplicate_pids_and_tracks_remote_owners() {
    let mut reg = ProcessRegistry::new();
    let w = WorkerId(2);
    reg.register(Pid::new(2, 1), Ownership::Remote(w), idle()).expect("register");
    reg.register(Pid::new(2, 2), Ownership::Remote(w), idle()).expect("register");
    reg.register(Pid::new(0, 1), Ownership::Local, idle()).expect("register");

    assert_eq!(
        reg.register(Pid::new(2, 1), Ownership::Local, idle()),
        Err(SchedError::DuplicatePid(Pid::new(2, 1)))
    );
    assert_eq!(reg.owned_by(w), vec![Pid::new(2, 1), Pid::new(2, 2)]);
    assert_eq!(reg.owner(Pid::new(0, 1)), Some(Ownership::Local));
    assert_eq!(reg.len(), 3);
}

#[test]
fn registry_preempt_returns_pending_wakeup() {
    let mut reg = ProcessRegistry::new();
    let a = Pid::new(0, 1);
    let b = Pid::new(0, 2);
    reg.register(a, Ownership::Local, idle()).expect("register");
    reg.register(b, Ownership::Local, idle()).expect("register");

    reg.mark_scheduled(a, SimTime(1)).expect("schedule");
    reg.resume(a).expect("resume");
    reg.mark_scheduled(a, SimTime(9)).expect("re-arm");
    reg.mark_scheduled(b, SimTime(2)).expect("schedule");
    reg.resume(b).expect("resume");

    assert_eq!(reg.running_except(b), vec![a]);
    assert_eq!(reg.preempt(a), Some(SimTime(9)));
    assert_eq!(reg.state(a), Some(ProcessState::Scheduled));
    assert_eq!(reg.running(), vec![b]);
    assert_eq!(reg.preempt(b), None);
    assert_eq!(reg.state(b), Some(ProcessState::Idle));
}
