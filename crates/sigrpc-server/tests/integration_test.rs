// Integration tests for sigrpc-server
//
// These tests start a real server on a loopback TCP port (or a Unix socket
// in a temp dir) and talk to it with the blocking or async client, or with
// raw frames when the point is to misbehave.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sigrpc_client::{AsyncRpcClient, RpcClient};
use sigrpc_common::transport::{
    read_frame, write_frame, AsyncTcpTransport, ConnectionState, TcpConnector, TcpTransport, Transport, TransportConfig,
    DEFAULT_MAX_FRAME_SIZE,
};
use sigrpc_common::{ObjList, Object, SigrpcError};
use sigrpc_server::{Endpoint, FunctionRegistry, LocalTransport, RpcServer, ServerConfig, ServiceError};
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Helpers
// ============================================================================

const SERVICE: &str = "test-rpc";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Repo {
    id: Option<String>,
    name: Option<String>,
    size: i64,
}

fn build_registry() -> Arc<FunctionRegistry> {
    let mut registry = FunctionRegistry::with_default_marshals().unwrap();
    registry.create_service(SERVICE);

    registry
        .register_function(SERVICE, "add", |a: i32, b: i32| -> Result<i32, ServiceError> {
            Ok(a + b)
        })
        .unwrap();

    registry
        .register_function(SERVICE, "get_substring", |s: String, n: i32| -> Result<Option<String>, ServiceError> {
            if n < 0 {
                return Err(ServiceError::new(100, "negative offset"));
            }
            Ok(Some(s.chars().skip(n as usize).collect()))
        })
        .unwrap();

    registry
        .register_function(SERVICE, "echo", |s: Option<String>| -> Result<Option<String>, ServiceError> {
            Ok(s)
        })
        .unwrap();

    registry
        .register_function(SERVICE, "list_repos", |prefix: String, n: i32| -> Result<ObjList<Repo>, ServiceError> {
            let repos = (0..n.max(0))
                .map(|i| Repo {
                    id: Some(format!("{}-{}", prefix, i)),
                    name: if i % 2 == 0 { None } else { Some(format!("Repo {}", i)) },
                    size: i as i64 * 1024,
                })
                .collect();
            Ok(ObjList(repos))
        })
        .unwrap();

    registry
        .register_function(SERVICE, "find_repo", |id: String| -> Result<Object<Repo>, ServiceError> {
            if id == "missing" {
                return Ok(Object::none());
            }
            Ok(Object::some(Repo { id: Some(id), name: None, size: 7 }))
        })
        .unwrap();

    registry
        .register_function(SERVICE, "validate", |_input: String| -> Result<i32, ServiceError> {
            Err(ServiceError::new(100, "bad input"))
        })
        .unwrap();

    registry
        .register_function(SERVICE, "explode", |_a: String, _b: String| -> Result<i32, ServiceError> {
            panic!("exploded on purpose")
        })
        .unwrap();

    Arc::new(registry)
}

async fn start_tcp(config: ServerConfig) -> String {
    let server = RpcServer::bind(Endpoint::Tcp("127.0.0.1:0".into()), build_registry(), config)
        .await
        .unwrap();

    #[allow(unreachable_patterns)]
    let addr = match server.local_addr() {
        Endpoint::Tcp(addr) => addr.clone(),
        other => panic!("unexpected endpoint {}", other),
    };

    tokio::spawn(server.run());
    addr
}

fn client(addr: &str) -> RpcClient<TcpTransport> {
    RpcClient::new(TcpTransport::tcp(addr), SERVICE)
}

/// Blocks until the server closes the connection.
fn expect_closed(stream: &mut TcpStream) {
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = [0u8; 64];
    match stream.read(&mut buf) {
        Ok(0) => {}
        Err(e) if e.kind() == ErrorKind::ConnectionReset => {}
        other => panic!("expected the server to close the connection, got {:?}", other),
    }
}

fn envelope(request: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({"service": SERVICE, "request": request})).unwrap()
}

async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap()
}

// ============================================================================
// Calls
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_add_raw_bytes() {
    let addr = start_tcp(ServerConfig::default()).await;

    let reply = blocking(move || {
        let mut transport = TcpTransport::tcp(addr);
        transport.send(SERVICE, br#"["add",2,3]"#).unwrap()
    })
    .await;

    assert_eq!(reply, br#"{"ret":5}"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_typed_calls() {
    let addr = start_tcp(ServerConfig::default()).await;

    blocking(move || {
        let mut client = client(&addr);

        let sum: i32 = client.call("add", (2, 3)).unwrap();
        assert_eq!(sum, 5);

        let sub: Option<String> = client.call("get_substring", ("hello", 2)).unwrap();
        assert_eq!(sub.as_deref(), Some("llo"));

        // Omitted trailing int arrives as -1.
        let sum: i32 = client.call("add", (10,)).unwrap();
        assert_eq!(sum, 9);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_error_codes() {
    let addr = start_tcp(ServerConfig::default()).await;

    blocking(move || {
        let mut client = client(&addr);

        let err = client.call::<i32>("nope", ()).unwrap_err();
        assert_eq!(err.rpc_code(), Some(500));

        let err = client.call::<i32>("validate", ("x",)).unwrap_err();
        assert!(matches!(err, SigrpcError::Rpc { code: 100, ref message } if message == "bad input"));

        let err = client.call_raw("add", vec![json!("two"), json!(3)]).unwrap_err();
        assert_eq!(err.rpc_code(), Some(512));

        client.set_service("no-such-service");
        let err = client.call::<i32>("add", (1, 2)).unwrap_err();
        assert_eq!(err.rpc_code(), Some(501));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_function_does_not_kill_server() {
    let addr = start_tcp(ServerConfig::default()).await;

    blocking(move || {
        let mut client = client(&addr);

        let err = client.call::<i32>("explode", ("a", "b")).unwrap_err();
        assert_eq!(err.rpc_code(), Some(513));

        // Same connection keeps working.
        let sum: i32 = client.call("add", (1, 1)).unwrap();
        assert_eq!(sum, 2);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unicode_round_trip() {
    let addr = start_tcp(ServerConfig::default()).await;

    blocking(move || {
        let mut client = client(&addr);

        let text = "héllo wörld ✓ 日本語 🦀";
        let echoed: Option<String> = client.call("echo", (text,)).unwrap();
        assert_eq!(echoed.as_deref(), Some(text));

        let sub: Option<String> = client.call("get_substring", ("日本語テキスト", 3)).unwrap();
        assert_eq!(sub.as_deref(), Some("テキスト"));

        let none: Option<String> = client.call("echo", (None::<String>,)).unwrap();
        assert_eq!(none, None);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_object_lists() {
    let addr = start_tcp(ServerConfig::default()).await;

    blocking(move || {
        let mut client = client(&addr);

        for n in [0, 1, 25] {
            let repos: ObjList<Repo> = client.call("list_repos", ("r", n)).unwrap();
            assert_eq!(repos.len(), n as usize);
            for (i, repo) in repos.into_inner().into_iter().enumerate() {
                assert_eq!(repo.id, Some(format!("r-{}", i)));
                assert_eq!(repo.name.is_none(), i % 2 == 0);
                assert_eq!(repo.size, i as i64 * 1024);
            }
        }

        // Null fields are present on the wire, not dropped.
        let raw = client.call_raw("list_repos", vec![json!("x"), json!(1)]).unwrap();
        assert_eq!(raw, json!([{"id": "x-0", "name": null, "size": 0}]));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_object() {
    let addr = start_tcp(ServerConfig::default()).await;

    blocking(move || {
        let mut client = client(&addr);

        let found: Object<Repo> = client.call("find_repo", ("abc",)).unwrap();
        assert_eq!(
            found.into_inner(),
            Some(Repo { id: Some("abc".into()), name: None, size: 7 })
        );

        let missing: Object<Repo> = client.call("find_repo", ("missing",)).unwrap();
        assert_eq!(missing.into_inner(), None);
    })
    .await;
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifty_clients_fifty_calls() {
    let addr = start_tcp(ServerConfig::default()).await;

    let mut handles = Vec::new();
    for c in 0..50i32 {
        let addr = addr.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let mut client = client(&addr);
            for i in 0..50i32 {
                let sum: i32 = client.call("add", (c, i)).unwrap();
                assert_eq!(sum, c + i);
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_max_connections_bounds_service() {
    let addr = start_tcp(ServerConfig::default().with_max_connections(1)).await;

    blocking(move || {
        let mut first = client(&addr);
        let sum: i32 = first.call("add", (1, 2)).unwrap();
        assert_eq!(sum, 3);

        // The only slot is taken: a second connection is not served.
        let config = TransportConfig::default().with_io_timeout(Some(Duration::from_millis(300)));
        let mut waiting = RpcClient::new(TcpTransport::new(TcpConnector::new(addr.clone()), config), SERVICE);
        let err = waiting.call::<i32>("add", (1, 1)).unwrap_err();
        assert!(matches!(err, SigrpcError::Timeout(300)), "got {:?}", err);

        // Releasing the slot lets new connections through.
        drop(first);
        let mut third = client(&addr);
        let sum: i32 = third.call("add", (2, 2)).unwrap();
        assert_eq!(sum, 4);
    })
    .await;
}

// ============================================================================
// Framing
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lying_header_closes_only_that_connection() {
    let addr = start_tcp(ServerConfig::default()).await;

    blocking(move || {
        let mut healthy = client(&addr);
        let _: i32 = healthy.call("add", (1, 1)).unwrap();

        let mut liar = TcpStream::connect(&addr).unwrap();
        liar.write_all(&100u32.to_be_bytes()).unwrap();
        liar.write_all(b"0123456789").unwrap();
        liar.shutdown(std::net::Shutdown::Write).unwrap();
        expect_closed(&mut liar);

        let sum: i32 = healthy.call("add", (20, 22)).unwrap();
        assert_eq!(sum, 42);
        assert_eq!(healthy.transport().state(), ConnectionState::Connected);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_empty_frame_is_rejected() {
    let addr = start_tcp(ServerConfig::default()).await;

    blocking(move || {
        let mut stream = TcpStream::connect(&addr).unwrap();
        stream.write_all(&0u32.to_be_bytes()).unwrap();
        expect_closed(&mut stream);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_oversized_frame_is_rejected() {
    let addr = start_tcp(ServerConfig::default().with_max_frame_size(1024)).await;

    blocking(move || {
        let mut stream = TcpStream::connect(&addr).unwrap();
        stream.write_all(&4096u32.to_be_bytes()).unwrap();
        expect_closed(&mut stream);

        // Frames under the limit are still served on new connections.
        let mut stream = TcpStream::connect(&addr).unwrap();
        write_frame(&mut stream, &envelope(r#"["add",1,2]"#), DEFAULT_MAX_FRAME_SIZE).unwrap();
        let reply = read_frame(&mut stream, DEFAULT_MAX_FRAME_SIZE).unwrap();
        assert_eq!(reply, br#"{"ret":3}"#);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_body_times_out() {
    let addr = start_tcp(ServerConfig::default().with_frame_timeout(Duration::from_millis(200))).await;

    blocking(move || {
        let mut stream = TcpStream::connect(&addr).unwrap();
        stream.write_all(&10u32.to_be_bytes()).unwrap();
        stream.write_all(b"abc").unwrap();
        expect_closed(&mut stream);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_header_releases_connection_slot() {
    let addr = start_tcp(
        ServerConfig::default()
            .with_frame_timeout(Duration::from_millis(200))
            .with_max_connections(1),
    )
    .await;

    blocking(move || {
        let mut staller = TcpStream::connect(&addr).unwrap();
        staller.write_all(&[0, 0]).unwrap();

        // Waits for the only slot until the staller is dropped.
        let sum: i32 = client(&addr).call("add", (2, 3)).unwrap();
        assert_eq!(sum, 5);

        expect_closed(&mut staller);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_oversized_response_is_reported() {
    let addr = start_tcp(ServerConfig::default().with_max_frame_size(256)).await;

    blocking(move || {
        let mut client = client(&addr);

        let err = client
            .call::<ObjList<Repo>>("list_repos", ("x", 50))
            .unwrap_err();
        assert!(matches!(err, SigrpcError::Rpc { code: 515, .. }), "got {:?}", err);
        assert!(!err.is_transport());
        assert_eq!(client.transport().state(), ConnectionState::Connected);

        let repos: ObjList<Repo> = client.call("list_repos", ("x", 1)).unwrap();
        assert_eq!(repos.len(), 1);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_malformed_envelope_keeps_connection() {
    let addr = start_tcp(ServerConfig::default()).await;

    blocking(move || {
        let mut stream = TcpStream::connect(&addr).unwrap();

        write_frame(&mut stream, b"{\"service\": 5}", DEFAULT_MAX_FRAME_SIZE).unwrap();
        let reply: Value = serde_json::from_slice(&read_frame(&mut stream, DEFAULT_MAX_FRAME_SIZE).unwrap()).unwrap();
        assert_eq!(reply["err_code"], 511);

        write_frame(&mut stream, &envelope("not a request"), DEFAULT_MAX_FRAME_SIZE).unwrap();
        let reply: Value = serde_json::from_slice(&read_frame(&mut stream, DEFAULT_MAX_FRAME_SIZE).unwrap()).unwrap();
        assert_eq!(reply["err_code"], 511);

        write_frame(&mut stream, &envelope(r#"["add",2,3]"#), DEFAULT_MAX_FRAME_SIZE).unwrap();
        let reply = read_frame(&mut stream, DEFAULT_MAX_FRAME_SIZE).unwrap();
        assert_eq!(reply, br#"{"ret":5}"#);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_client_reconnects_after_server_side_close() {
    let addr = start_tcp(ServerConfig::default().with_max_frame_size(64)).await;

    blocking(move || {
        let mut client = client(&addr);
        let _: i32 = client.call("add", (1, 1)).unwrap();

        // Over the server's limit: the server drops the connection.
        let long = "x".repeat(200);
        let err = client.call::<Option<String>>("echo", (long.as_str(),)).unwrap_err();
        assert!(err.is_transport(), "got {:?}", err);
        assert_eq!(client.transport().state(), ConnectionState::Closed);

        // The next call connects again.
        let sum: i32 = client.call("add", (2, 2)).unwrap();
        assert_eq!(sum, 4);
    })
    .await;
}

// ============================================================================
// Async client
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_client_calls() {
    let addr = start_tcp(ServerConfig::default()).await;
    let mut client = AsyncRpcClient::new(AsyncTcpTransport::tcp(addr), SERVICE);

    let sum: i32 = client.call("add", (2, 3)).await.unwrap();
    assert_eq!(sum, 5);

    let tail: Option<String> = client.call("get_substring", ("héllo", 1)).await.unwrap();
    assert_eq!(tail.as_deref(), Some("éllo"));

    let repos: ObjList<Repo> = client.call("list_repos", ("x", 3)).await.unwrap();
    assert_eq!(repos.len(), 3);

    let err = client.call::<i32>("nope", ()).await.unwrap_err();
    assert_eq!(err.rpc_code(), Some(500));

    let err = client.call::<i32>("explode", ("a", "b")).await.unwrap_err();
    assert_eq!(err.rpc_code(), Some(513));

    client.set_service("missing-service");
    let err = client.call::<i32>("add", (1, 2)).await.unwrap_err();
    assert_eq!(err.rpc_code(), Some(501));
    assert_eq!(client.transport().state(), ConnectionState::Connected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_clients_concurrently() {
    let addr = start_tcp(ServerConfig::default()).await;

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let addr = addr.clone();
            tokio::spawn(async move {
                let mut client = AsyncRpcClient::new(AsyncTcpTransport::tcp(addr), SERVICE);
                for j in 0..20 {
                    let sum: i32 = client.call("add", (i, j)).await.unwrap();
                    assert_eq!(sum, i + j);
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
}

// ============================================================================
// Unix sockets and in-process transport
// ============================================================================

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unix_socket_endpoint() {
    use sigrpc_common::transport::UnixTransport;
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sigrpc.sock");

    // A stale socket left by an earlier run.
    drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
    assert!(path.exists());

    let server = RpcServer::bind(Endpoint::Unix(path.clone()), build_registry(), ServerConfig::default())
        .await
        .unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
    tokio::spawn(server.run());

    let client_path = path.clone();
    blocking(move || {
        let mut client = RpcClient::new(UnixTransport::unix(client_path), SERVICE);
        let sum: i32 = client.call("add", (2, 3)).unwrap();
        assert_eq!(sum, 5);

        let sub: Option<String> = client.call("get_substring", ("hello", 2)).unwrap();
        assert_eq!(sub.as_deref(), Some("llo"));
    })
    .await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_bind_refuses_regular_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-a-socket");
    std::fs::write(&path, b"keep me").unwrap();

    let err = RpcServer::bind(Endpoint::Unix(path.clone()), build_registry(), ServerConfig::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SigrpcError::Connection(_)));
    assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
}

#[test]
fn test_local_transport_client() {
    let mut client = RpcClient::new(LocalTransport::new(build_registry()), SERVICE);

    let sum: i32 = client.call("add", (2, 3)).unwrap();
    assert_eq!(sum, 5);

    let repos: ObjList<Repo> = client.call("list_repos", ("local", 3)).unwrap();
    assert_eq!(repos.len(), 3);

    let err = client.call::<i32>("nope", ()).unwrap_err();
    assert_eq!(err.rpc_code(), Some(500));
}
