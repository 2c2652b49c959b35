use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::link::{LinkError, ProxyError, WorkerLink};
use crate::net::NetId;
use crate::proto::{
    CmdId, Command, CommandTarget, Envelope, ExecError, InvokeCall, Target, read_frame,
    write_frame,
};
use crate::sim::WorkerId;

/// 回显参数；`nested` 会在分发线程上对自己的链路发起阻塞请求
struct EchoTarget {
    link: OnceLock<WorkerLink>,
    disconnected: Mutex<Sender<WorkerId>>,
}

impl EchoTarget {
    fn new() -> (Arc<EchoTarget>, Receiver<WorkerId>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let target = Arc::new(EchoTarget {
            link: OnceLock::new(),
            disconnected: Mutex::new(tx),
        });
        (target, rx)
    }
}

impl CommandTarget for EchoTarget {
    fn execute(&self, _from: WorkerId, cmd: Command) -> Result<Option<String>, ExecError> {
        match cmd {
            Command::Invoke(call) if call.method == "echo" => Ok(Some(call.args.join(","))),
            Command::Invoke(call) if call.method == "nested" => {
                let link = self
                    .link
                    .get()
                    .ok_or_else(|| ExecError::BadArgs("no link".to_string()))?;
                Ok(link.request(invoke("echo", &[]))?)
            }
            Command::Invoke(call) => Err(ExecError::BadArgs(call.method)),
            other => Err(ExecError::Unsupported(other.action())),
        }
    }

    fn on_disconnect(&self, worker: WorkerId) {
        let _ = self.disconnected.lock().expect("tx lock").send(worker);
    }
}

fn invoke(method: &str, args: &[&str]) -> Command {
    Command::Invoke(InvokeCall {
        target: Target::Node(NetId(1)),
        method: method.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
    })
}

struct Pair {
    manager: WorkerLink,
    manager_target: Arc<EchoTarget>,
    manager_down: Receiver<WorkerId>,
    worker: WorkerLink,
    worker_down: Receiver<WorkerId>,
}

/// manager 端持有 WorkerId(1)，worker 端从入站信封中获知自己的 id
fn linked_pair() -> Pair {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (manager_target, manager_down) = EchoTarget::new();
    let t = manager_target.clone();
    let accept = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let link = WorkerLink::spawn(stream, WorkerId(1), t.clone()).expect("spawn manager side");
        let _ = t.link.set(link.clone());
        link
    });

    let (worker_target, worker_down) = EchoTarget::new();
    let stream = TcpStream::connect(addr).expect("connect");
    let worker = WorkerLink::spawn(stream, WorkerId::MANAGER, worker_target.clone())
        .expect("spawn worker side");
    let _ = worker_target.link.set(worker.clone());
    let manager = accept.join().expect("accept thread");
    Pair {
        manager,
        manager_target,
        manager_down,
        worker,
        worker_down,
    }
}

#[test]
fn link_request_gets_reply_with_matching_cmd_id() {
    let pair = linked_pair();

    let r = pair.worker.request(invoke("echo", &["a", "b"])).expect("echo");
    assert_eq!(r.as_deref(), Some("a,b"));
    // worker 端在收到第一帧时学到自己的 id
    assert_eq!(pair.worker.worker_id(), WorkerId(1));

    let r = pair.manager.request(invoke("echo", &["x"])).expect("echo back");
    assert_eq!(r.as_deref(), Some("x"));
    assert!(pair.manager_target.link.get().is_some());
}

#[test]
fn link_request_surfaces_remote_errors() {
    let pair = linked_pair();

    match pair.worker.request(invoke("nope", &[])) {
        Err(ProxyError::Remote(msg)) => assert!(msg.contains("bad arguments"), "{msg}"),
        other => panic!("expected remote error, got {other:?}"),
    }
    match pair.worker.request(Command::StartSimulation) {
        Err(ProxyError::Remote(msg)) => assert!(msg.contains("startSimulation"), "{msg}"),
        other => panic!("expected remote error, got {other:?}"),
    }
    // 链路在错误应答后仍然可用
    assert!(pair.worker.request(invoke("echo", &[])).is_ok());
}

#[test]
fn link_refuses_blocking_request_on_dispatch_thread() {
    let pair = linked_pair();
    match pair.worker.request(invoke("nested", &[])) {
        Err(ProxyError::Remote(msg)) => assert!(msg.contains("dispatch thread"), "{msg}"),
        other => panic!("expected reentrancy error, got {other:?}"),
    }
}

#[test]
fn link_close_fails_later_requests_and_notifies_both_sides() {
    let pair = linked_pair();
    pair.worker.request(invoke("echo", &[])).expect("warm up");

    pair.manager.close();
    let down = pair
        .worker_down
        .recv_timeout(Duration::from_secs(5))
        .expect("worker side disconnect");
    assert_eq!(down, WorkerId(1));
    let down = pair
        .manager_down
        .recv_timeout(Duration::from_secs(5))
        .expect("manager side disconnect");
    assert_eq!(down, WorkerId(1));

    assert!(!pair.worker.is_alive());
    assert_eq!(
        pair.worker.request(invoke("echo", &[])),
        Err(ProxyError::Link(LinkError::Disconnected))
    );
    assert_eq!(pair.worker.send(Command::StopSimulation), Err(LinkError::Disconnected));
}

fn raw_request(stream: &mut TcpStream, cmd_id: i32, cmd: &Command) {
    let env = cmd
        .to_envelope(WorkerId::MANAGER, CmdId(cmd_id))
        .expect("encode");
    write_frame(stream, &env).expect("write");
}

fn raw_reply(stream: &mut TcpStream) -> (CmdId, Command) {
    let env: Envelope = read_frame(stream).expect("read").expect("frame");
    (env.cmd_id, Command::decode(&env).expect("decode reply"))
}

fn raw_peer() -> (TcpStream, WorkerLink) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let client = TcpStream::connect(addr).expect("connect");
    let (stream, _) = listener.accept().expect("accept");
    let (target, _down) = EchoTarget::new();
    let link = WorkerLink::spawn(stream, WorkerId(4), target).expect("spawn");
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    (client, link)
}

#[test]
fn link_rejects_non_increasing_cmd_ids() {
    let (mut client, _link) = raw_peer();
    let echo = invoke("echo", &["hi"]);

    raw_request(&mut client, 5, &echo);
    raw_request(&mut client, 5, &echo);
    raw_request(&mut client, 3, &echo);
    raw_request(&mut client, 6, &echo);

    assert_eq!(raw_reply(&mut client), (CmdId(5), Command::ok(Some("hi".to_string()))));
    for expected in [5, 3] {
        let (id, reply) = raw_reply(&mut client);
        assert_eq!(id, CmdId(expected));
        match reply {
            Command::Error(f) => assert!(f.message.contains("cmdId collision"), "{}", f.message),
            other => panic!("expected collision error, got {other:?}"),
        }
    }
    assert_eq!(raw_reply(&mut client), (CmdId(6), Command::ok(Some("hi".to_string()))));
}

#[test]
fn link_answers_undecodable_frames_with_error() {
    use std::io::Write;

    let (mut client, _link) = raw_peer();
    // 未知动作码
    write_frame(
        &mut client,
        &Envelope {
            worker_id: WorkerId::MANAGER,
            cmd_id: CmdId(1),
            action: 200,
            payload: "{}".to_string(),
        },
    )
    .expect("write");
    // 非 UTF-8 载荷
    client
        .write_all(&[0, 0, 0, 10, 0, 0, 0, 0, 0, 0, 0, 2, 4, 0xff])
        .expect("write raw");

    for expected in [1, 2] {
        let (id, reply) = raw_reply(&mut client);
        assert_eq!(id, CmdId(expected));
        assert!(matches!(reply, Command::Error(_)), "{reply:?}");
    }
}

#[test]
fn link_matches_out_of_order_replies_by_cmd_id() {
    let (mut client, link) = raw_peer();

    let spawn_request = |method: &'static str| {
        let link = link.clone();
        thread::spawn(move || link.request(invoke(method, &[])))
    };
    let first = spawn_request("first");
    let second = spawn_request("second");

    // 两个请求都在途之后才应答
    let mut seen = Vec::new();
    for _ in 0..2 {
        let env: Envelope = read_frame(&mut client).expect("read").expect("frame");
        match Command::decode(&env).expect("decode request") {
            Command::Invoke(call) => seen.push((env.cmd_id, call.method)),
            other => panic!("expected invoke, got {other:?}"),
        }
    }
    seen.sort();
    assert!(seen[0].0 < seen[1].0);

    // 先回后发出的那个
    for (cmd_id, method) in seen.into_iter().rev() {
        let env = Command::ok(Some(method))
            .to_envelope(WorkerId(4), cmd_id)
            .expect("encode reply");
        write_frame(&mut client, &env).expect("write reply");
    }

    assert_eq!(first.join().expect("first thread"), Ok(Some("first".to_string())));
    assert_eq!(second.join().expect("second thread"), Ok(Some("second".to_string())));
}
