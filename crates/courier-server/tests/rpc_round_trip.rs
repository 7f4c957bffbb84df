//! End-to-end tests over a real TCP connection.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;

use courier_server::{groups::GroupResolver, Server};
use courier_storage::{
    GuardedStorage, LockKind, MemoryStorage, Storage, StorageError, StorageResult,
};
use courier_types::Message;
use courier_wire::{
    Frame, Request, RequestId, RequestPayload, Response, ResponsePayload, Status,
    FRAME_HEADER_LEN,
};

struct NoGroups;

impl GroupResolver for NoGroups {
    fn groups_of(&self, _user: &str) -> Option<Vec<String>> {
        Some(Vec::new())
    }
}

fn start_server(storage: Box<dyn Storage>) -> Server {
    Server::start(
        2,
        0,
        Arc::new(GuardedStorage::new(storage)),
        Arc::new(NoGroups),
    )
    .expect("server starts")
}

fn connect(server: &Server) -> TcpStream {
    let stream = TcpStream::connect(server.local_addr()).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("read timeout");
    stream
}

fn call(stream: &mut TcpStream, request: &Request) -> Response {
    let mut out = BytesMut::new();
    request.to_frame().expect("encode").encode(&mut out);
    stream.write_all(&out).expect("send request");

    let mut header = [0u8; FRAME_HEADER_LEN];
    stream.read_exact(&mut header).expect("response header");
    let len = u32::from_le_bytes(header) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).expect("response payload");

    let mut buf = BytesMut::new();
    buf.extend_from_slice(&header);
    buf.extend_from_slice(&payload);
    let frame = Frame::decode(&mut buf).expect("frame").expect("complete");
    Response::from_frame(&frame).expect("decode response")
}

fn send_request(id: u64, from: &str, to: &[&str], ts: u64, body: &str) -> Request {
    Request {
        id: RequestId(id),
        payload: RequestPayload::Send {
            message: Message::new(
                from,
                to.iter().map(|s| (*s).to_string()).collect(),
                ts,
                body,
            ),
        },
    }
}

fn receive_request(id: u64, user: &str) -> Request {
    Request {
        id: RequestId(id),
        payload: RequestPayload::Receive {
            user: user.to_string(),
        },
    }
}

#[test]
fn send_then_receive_round_trip() {
    let mut server = start_server(Box::new(MemoryStorage::new()));
    let mut stream = connect(&server);

    let response = call(&mut stream, &send_request(1, "u1", &["u2"], 10, "hello"));
    assert_eq!(response.id, RequestId(1));
    assert!(matches!(
        response.payload,
        ResponsePayload::Send { status: Status::Ok }
    ));

    let response = call(&mut stream, &receive_request(2, "u2"));
    assert_eq!(response.id, RequestId(2));
    match response.payload {
        ResponsePayload::Receive {
            status: Status::Ok,
            messages,
        } => {
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].from, "u1");
            assert_eq!(messages[0].body, "hello");
        }
        other => panic!("unexpected response: {other:?}"),
    }

    server.shutdown_handle().request_stop();
    server.wait_for_stop();
}

#[test]
fn many_requests_share_one_connection() {
    let mut server = start_server(Box::new(MemoryStorage::new()));
    let mut stream = connect(&server);

    for i in 0..50 {
        let response = call(
            &mut stream,
            &send_request(i, "bulk", &["inbox"], 1, &format!("m{i}")),
        );
        assert_eq!(response.id, RequestId(i));
    }

    let response = call(&mut stream, &receive_request(99, "inbox"));
    match response.payload {
        ResponsePayload::Receive {
            status: Status::Ok,
            messages,
        } => assert_eq!(messages.len(), 50),
        other => panic!("unexpected response: {other:?}"),
    }

    server.stop();
}

#[test]
fn sent_messages_come_back_to_the_sender() {
    let mut server = start_server(Box::new(MemoryStorage::new()));
    let mut stream = connect(&server);

    call(&mut stream, &send_request(1, "u2", &["u2", "u3"], 20, "hi"));
    let response = call(
        &mut stream,
        &Request {
            id: RequestId(2),
            payload: RequestPayload::Sent {
                user: "u2".to_string(),
            },
        },
    );
    match response.payload {
        ResponsePayload::Sent {
            status: Status::Ok,
            messages,
        } => {
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].to, vec!["u2".to_string(), "u3".to_string()]);
        }
        other => panic!("unexpected response: {other:?}"),
    }

    server.stop();
}

struct ThrowingStorage;

impl Storage for ThrowingStorage {
    fn store(&mut self, _message: &Message) -> StorageResult<u64> {
        Err(StorageError::Backend("synthetic store failure".to_string()))
    }
    fn load(&mut self, _addressees: &[String]) -> StorageResult<Vec<Message>> {
        Ok(Vec::new())
    }
    fn load_sent(&mut self, _user: &str) -> StorageResult<Vec<Message>> {
        Ok(Vec::new())
    }
    fn required_lock_kind(&self) -> LockKind {
        LockKind::Mutex
    }
}

// A storage failure is encoded as an Error status while the transport
// stays healthy: the same connection keeps working.
#[test]
fn storage_failure_is_an_error_status_not_a_dead_connection() {
    let mut server = start_server(Box::new(ThrowingStorage));
    let mut stream = connect(&server);

    let response = call(&mut stream, &send_request(1, "u1", &["u2"], 1, "doomed"));
    assert_eq!(response.id, RequestId(1));
    assert!(matches!(
        response.payload,
        ResponsePayload::Send {
            status: Status::Error
        }
    ));

    // transport-level OK: the connection answers further calls
    let response = call(&mut stream, &receive_request(2, "u2"));
    assert!(matches!(
        response.payload,
        ResponsePayload::Receive {
            status: Status::Ok,
            ..
        }
    ));

    server.stop();
}

#[test]
fn connections_spread_across_workers() {
    let mut server = start_server(Box::new(MemoryStorage::new()));

    let mut streams: Vec<TcpStream> = (0..4).map(|_| connect(&server)).collect();
    for (i, stream) in streams.iter_mut().enumerate() {
        let id = i as u64;
        let response = call(
            stream,
            &send_request(id, &format!("u{i}"), &["shared"], 1, "hello"),
        );
        assert_eq!(response.id, RequestId(id));
    }

    let mut stream = connect(&server);
    let response = call(&mut stream, &receive_request(100, "shared"));
    match response.payload {
        ResponsePayload::Receive {
            status: Status::Ok,
            messages,
        } => assert_eq!(messages.len(), 4),
        other => panic!("unexpected response: {other:?}"),
    }

    server.stop();
}

#[test]
fn wait_for_stop_returns_after_request_stop() {
    let mut server = start_server(Box::new(MemoryStorage::new()));
    let handle = server.shutdown_handle();

    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        handle.request_stop();
    });

    server.wait_for_stop();
    trigger.join().expect("trigger panicked");
}
