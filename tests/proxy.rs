//! End-to-end tests driving the proxy as a black box: a fake client talks
//! to `session::run` over one socket pair, a fake upstream server over
//! another, and the test observes what each side actually received.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use pg_rewrite_proxy::errors::RewriteError;
use pg_rewrite_proxy::messages::{self, ParseMessage};
use pg_rewrite_proxy::rewrite::substring::{SubstringRewriterFactory, SubstringRules};
use pg_rewrite_proxy::rewrite::{Rewriter, RewriterFactory};
use pg_rewrite_proxy::session;

/// Build a plain StartupMessage for protocol version 3.0 with `user` (and
/// optionally `database`) parameters.
fn startup_message(user: &str, database: Option<&str>) -> Vec<u8> {
    let mut params = BytesMut::new();
    params.put_i32(196_608);
    params.extend_from_slice(b"user");
    params.put_u8(0);
    params.extend_from_slice(user.as_bytes());
    params.put_u8(0);
    if let Some(database) = database {
        params.extend_from_slice(b"database");
        params.put_u8(0);
        params.extend_from_slice(database.as_bytes());
        params.put_u8(0);
    }
    params.put_u8(0);

    let mut message = BytesMut::with_capacity(4 + params.len());
    message.put_i32((4 + params.len()) as i32);
    message.extend_from_slice(&params);
    message.to_vec()
}

fn ssl_request() -> Vec<u8> {
    let mut message = BytesMut::new();
    message.put_i32(8);
    message.put_i32(80_877_103);
    message.to_vec()
}

fn sync_message() -> Vec<u8> {
    let mut message = BytesMut::new();
    message.put_u8(b'S');
    message.put_i32(4);
    message.to_vec()
}

/// Spawn a fake upstream server that accepts one connection, reads the
/// forwarded startup message, then reads exactly one more message and
/// returns its raw `(tag, body)` back to the caller through the channel.
async fn spawn_fake_upstream() -> (
    std::net::SocketAddr,
    tokio::sync::oneshot::Receiver<(u8, Vec<u8>)>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let (mut upstream, _) = listener.accept().await.unwrap();

        // Startup message: read and discard (length-prefixed, no tag byte).
        let mut len_buf = [0u8; 4];
        upstream.read_exact(&mut len_buf).await.unwrap();
        let len = i32::from_be_bytes(len_buf) as usize;
        let mut rest = vec![0u8; len - 4];
        upstream.read_exact(&mut rest).await.unwrap();

        let (tag, len) = messages::read_message_header(&mut upstream).await.unwrap();
        let body = messages::read_exact(&mut upstream, (len - 4) as usize)
            .await
            .unwrap();

        let _ = tx.send((tag, body.to_vec()));

        // Hold the connection open until the test drops it.
        let mut sink = [0u8; 1];
        let _ = upstream.read(&mut sink).await;
    });

    (addr, rx)
}

/// Connect a "client" socket into a freshly-spawned `session::run`, wired
/// to `upstream_addr`.
async fn spawn_session_with_client(
    upstream_addr: std::net::SocketAddr,
    factory: Arc<dyn RewriterFactory>,
) -> TcpStream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (client, client_addr) = listener.accept().await.unwrap();
        session::run(client, client_addr, upstream_addr, factory).await;
    });

    TcpStream::connect(proxy_addr).await.unwrap()
}

#[tokio::test]
async fn ssl_request_is_refused_with_single_n_byte() {
    let (upstream_addr, _rx) = spawn_fake_upstream().await;
    let rules = SubstringRules::new();
    let factory: Arc<dyn RewriterFactory> = Arc::new(SubstringRewriterFactory::new(rules));
    let mut client = spawn_session_with_client(upstream_addr, factory).await;

    client.write_all(&ssl_request()).await.unwrap();

    let mut reply = [0u8; 1];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, *b"N");
}

#[tokio::test]
async fn startup_message_is_forwarded_verbatim() {
    let (upstream_addr, rx) = spawn_fake_upstream().await;
    let rules = SubstringRules::new();
    let factory: Arc<dyn RewriterFactory> = Arc::new(SubstringRewriterFactory::new(rules));
    let mut client = spawn_session_with_client(upstream_addr, factory).await;

    client
        .write_all(&startup_message("alice", Some("app")))
        .await
        .unwrap();
    client.write_all(&sync_message()).await.unwrap();

    let (tag, body) = rx.await.unwrap();
    assert_eq!(tag, b'S');
    assert!(body.is_empty());
}

#[tokio::test]
async fn query_rewrite_sends_notice_and_forwards_rewritten_sql() {
    let (upstream_addr, rx) = spawn_fake_upstream().await;
    let mut rules = SubstringRules::new();
    rules.insert("secret_table", "public_table");
    let factory: Arc<dyn RewriterFactory> = Arc::new(SubstringRewriterFactory::new(rules));
    let mut client = spawn_session_with_client(upstream_addr, factory).await;

    client
        .write_all(&startup_message("alice", None))
        .await
        .unwrap();

    let query = messages::encode_query(b"select * from secret_table");
    client.write_all(&query).await.unwrap();

    // The proxy should push a NoticeResponse to the client before the
    // upstream ever sends anything back.
    let (tag, len) = messages::read_message_header(&mut client).await.unwrap();
    assert_eq!(tag, b'N');
    let body = messages::read_exact(&mut client, (len - 4) as usize)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&body).contains("rewritten"));

    let (upstream_tag, upstream_body) = rx.await.unwrap();
    assert_eq!(upstream_tag, b'Q');
    let forwarded = String::from_utf8_lossy(&upstream_body);
    assert!(forwarded.contains("public_table"));
    assert!(!forwarded.contains("secret_table"));
}

#[tokio::test]
async fn parse_rewrite_preserves_statement_name_and_param_types() {
    let (upstream_addr, rx) = spawn_fake_upstream().await;
    let mut rules = SubstringRules::new();
    rules.insert("secret_table", "public_table");
    let factory: Arc<dyn RewriterFactory> = Arc::new(SubstringRewriterFactory::new(rules));
    let mut client = spawn_session_with_client(upstream_addr, factory).await;

    client
        .write_all(&startup_message("alice", None))
        .await
        .unwrap();

    let parse = ParseMessage {
        statement: BytesMut::from(&b"stmt1"[..]),
        query: BytesMut::from(&b"select * from secret_table where id = $1"[..]),
        param_type_oids: vec![23],
    };
    client.write_all(&parse.encode()).await.unwrap();

    // Drain the rewrite notice.
    let (tag, len) = messages::read_message_header(&mut client).await.unwrap();
    assert_eq!(tag, b'N');
    messages::read_exact(&mut client, (len - 4) as usize)
        .await
        .unwrap();

    let (upstream_tag, _body) = rx.await.unwrap();
    assert_eq!(upstream_tag, b'P');
}

#[tokio::test]
async fn no_op_rewrite_sends_no_notice() {
    let (upstream_addr, rx) = spawn_fake_upstream().await;
    let rules = SubstringRules::new();
    let factory: Arc<dyn RewriterFactory> = Arc::new(SubstringRewriterFactory::new(rules));
    let mut client = spawn_session_with_client(upstream_addr, factory).await;

    client
        .write_all(&startup_message("alice", None))
        .await
        .unwrap();

    let query = messages::encode_query(b"select 1");
    client.write_all(&query).await.unwrap();

    let (upstream_tag, upstream_body) = rx.await.unwrap();
    assert_eq!(upstream_tag, b'Q');
    assert_eq!(String::from_utf8_lossy(&upstream_body), "select 1\0");
}

#[tokio::test]
async fn non_utf8_query_is_forwarded_byte_for_byte() {
    // A single-quoted literal containing a WIN1251 byte for 'я' (0xFF) is
    // not valid UTF-8, but must still reach upstream unchanged since the
    // rewriter can't be consulted on text it can't decode.
    let (upstream_addr, rx) = spawn_fake_upstream().await;
    let mut rules = SubstringRules::new();
    rules.insert("secret_table", "public_table");
    let factory: Arc<dyn RewriterFactory> = Arc::new(SubstringRewriterFactory::new(rules));
    let mut client = spawn_session_with_client(upstream_addr, factory).await;

    client
        .write_all(&startup_message("alice", None))
        .await
        .unwrap();

    let mut sql = b"select * from t where name = '".to_vec();
    sql.push(0xFF);
    sql.extend_from_slice(b"'");
    let query = messages::encode_query(&sql);
    client.write_all(&query).await.unwrap();

    let (upstream_tag, upstream_body) = rx.await.unwrap();
    assert_eq!(upstream_tag, b'Q');
    let mut expected = sql.clone();
    expected.push(0);
    assert_eq!(upstream_body, expected);
}

struct AlwaysFailsRewriter;

impl Rewriter for AlwaysFailsRewriter {
    fn rewrite_query(&mut self, _sql: &str) -> Result<String, RewriteError> {
        Err(RewriteError::new("boom"))
    }

    fn rewrite_parse(&mut self, _sql: &str) -> Result<String, RewriteError> {
        Err(RewriteError::new("boom"))
    }
}

struct AlwaysFailsFactory;

impl RewriterFactory for AlwaysFailsFactory {
    fn new_rewriter(&self) -> Result<Box<dyn Rewriter>, RewriteError> {
        Ok(Box::new(AlwaysFailsRewriter))
    }
}

#[tokio::test]
async fn rewrite_failure_sends_warning_and_forwards_original_sql() {
    let (upstream_addr, rx) = spawn_fake_upstream().await;
    let factory: Arc<dyn RewriterFactory> = Arc::new(AlwaysFailsFactory);
    let mut client = spawn_session_with_client(upstream_addr, factory).await;

    client
        .write_all(&startup_message("alice", None))
        .await
        .unwrap();

    let query = messages::encode_query(b"select 1");
    client.write_all(&query).await.unwrap();

    let (tag, len) = messages::read_message_header(&mut client).await.unwrap();
    assert_eq!(tag, b'N');
    let body = messages::read_exact(&mut client, (len - 4) as usize)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&body).contains("WARNING"));

    let (upstream_tag, upstream_body) = rx.await.unwrap();
    assert_eq!(upstream_tag, b'Q');
    assert_eq!(String::from_utf8_lossy(&upstream_body), "select 1\0");
}

#[tokio::test]
async fn closing_upstream_unblocks_the_client_side() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (upstream, _) = listener.accept().await.unwrap();
        // Immediately drop the upstream connection once the startup
        // message arrives.
        drop(upstream);
    });

    let rules = SubstringRules::new();
    let factory: Arc<dyn RewriterFactory> = Arc::new(SubstringRewriterFactory::new(rules));
    let mut client = spawn_session_with_client(upstream_addr, factory).await;

    client
        .write_all(&startup_message("alice", None))
        .await
        .unwrap();

    // With the upstream gone, the client side must observe EOF rather than
    // hang forever.
    let mut buf = [0u8; 1];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(n, 0);
}
