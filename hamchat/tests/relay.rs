use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hamchat::client::{run_interactive, ClientEvent, Session};
use hamchat::transport::{read_frame, write_frame};
use hamchat::{ConnectionRegistry, RelayServer, ServerConfig};
use hamchat_core::hamming;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

async fn start_relay(
    p_single: f64,
    p_double: f64,
    seed: Option<u64>,
) -> (SocketAddr, Arc<ConnectionRegistry>) {
    let cfg = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        p_single,
        p_double,
        seed,
    };
    let server = RelayServer::bind(&cfg).await.unwrap();
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    tokio::spawn(server.run());
    (addr, registry)
}

async fn wait_registered(registry: &ConnectionRegistry, user: &str, present: bool) {
    for _ in 0..500 {
        if registry.contains(user).await == present {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("user {user:?} never reached registered={present}");
}

async fn login(addr: SocketAddr, registry: &ConnectionRegistry, user: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    write_frame(&mut stream, user).await.unwrap();
    wait_registered(registry, user, true).await;
    stream
}

async fn recv(stream: &mut TcpStream) -> String {
    let body = timeout(WAIT, read_frame(stream)).await.unwrap().unwrap();
    String::from_utf8(body).unwrap()
}

async fn next_event(session: &mut Session) -> ClientEvent {
    timeout(WAIT, session.next_event()).await.unwrap().unwrap()
}

async fn transcript<I: AsyncBufRead + Unpin>(session: Session, input: I) -> String {
    let mut out = Vec::new();
    timeout(WAIT, run_interactive(session, input, &mut out))
        .await
        .unwrap()
        .unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn relays_unchanged_without_injection() {
    let (addr, registry) = start_relay(0.0, 0.0, None).await;
    let mut bob = login(addr, &registry, "bob").await;
    let mut alice = login(addr, &registry, "alice").await;

    let code = hamming::encode("hello").to_string();
    write_frame(&mut alice, &format!("bob|hello|{code}")).await.unwrap();
    assert_eq!(recv(&mut bob).await, format!("hello|{code}"));
}

#[tokio::test]
async fn unknown_recipient_gets_notice() {
    let (addr, registry) = start_relay(0.0, 0.0, None).await;
    let mut alice = login(addr, &registry, "alice").await;

    write_frame(&mut alice, "ghost|hi|0100").await.unwrap();
    assert_eq!(
        recv(&mut alice).await,
        "SERVER_ERROR|User 'ghost' not found or offline."
    );
}

#[tokio::test]
async fn duplicate_id_is_rejected_and_closed() {
    let (addr, registry) = start_relay(0.0, 0.0, None).await;
    let _first = login(addr, &registry, "alice").await;

    let mut second = TcpStream::connect(addr).await.unwrap();
    write_frame(&mut second, " alice ").await.unwrap();
    assert_eq!(
        recv(&mut second).await,
        "SERVER_ERROR|User ID 'alice' is already in use."
    );
    let closed = timeout(WAIT, read_frame(&mut second)).await.unwrap();
    assert!(closed.is_err());
    assert!(registry.contains("alice").await);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn empty_and_reserved_ids_are_rejected() {
    let (addr, registry) = start_relay(0.0, 0.0, None).await;

    let mut empty = TcpStream::connect(addr).await.unwrap();
    write_frame(&mut empty, "   ").await.unwrap();
    assert_eq!(recv(&mut empty).await, "SERVER_ERROR|User ID cannot be empty.");
    assert!(timeout(WAIT, read_frame(&mut empty)).await.unwrap().is_err());

    let mut piped = TcpStream::connect(addr).await.unwrap();
    write_frame(&mut piped, "a|b").await.unwrap();
    assert_eq!(recv(&mut piped).await, "SERVER_ERROR|User ID cannot contain '|'.");

    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn malformed_frame_keeps_session_open() {
    let (addr, registry) = start_relay(0.0, 0.0, None).await;
    let mut alice = login(addr, &registry, "alice").await;

    write_frame(&mut alice, "no separators here").await.unwrap();
    assert_eq!(
        recv(&mut alice).await,
        "SERVER_ERROR|Invalid message format. Use recipient|original_message|hamming_payload"
    );
    write_frame(&mut alice, "bob|x|01201").await.unwrap();
    assert!(recv(&mut alice).await.starts_with("SERVER_ERROR|Invalid message format."));

    let code = hamming::encode("Hi").to_string();
    write_frame(&mut alice, &format!("alice|Hi|{code}")).await.unwrap();
    assert_eq!(recv(&mut alice).await, format!("Hi|{code}"));
}

#[tokio::test]
async fn disconnect_releases_user_id() {
    let (addr, registry) = start_relay(0.0, 0.0, None).await;
    let bob = login(addr, &registry, "bob").await;
    let mut alice = login(addr, &registry, "alice").await;

    drop(bob);
    wait_registered(&registry, "bob", false).await;

    write_frame(&mut alice, "bob|hi|0100").await.unwrap();
    assert_eq!(
        recv(&mut alice).await,
        "SERVER_ERROR|User 'bob' not found or offline."
    );

    let _bob_again = login(addr, &registry, "bob").await;
}

#[tokio::test]
async fn session_roundtrip() {
    let (addr, registry) = start_relay(0.0, 0.0, None).await;
    let mut bob = Session::connect(addr, "bob").await.unwrap();
    wait_registered(&registry, "bob", true).await;
    let mut alice = Session::connect(addr, "alice").await.unwrap();
    wait_registered(&registry, "alice", true).await;

    let sent = alice.send("bob", "Hi").await.unwrap();
    assert_eq!(sent.codeword.len(), 21);

    let ClientEvent::Message(msg) = next_event(&mut bob).await else {
        panic!("expected a message");
    };
    let decoded = msg.outcome.as_ref().unwrap();
    assert_eq!(decoded.message, "Hi");
    assert!(!decoded.error_detected());
    assert!(!msg.differs_from_original());

    alice.send("ghost", "Hi").await.unwrap();
    assert_eq!(
        next_event(&mut alice).await,
        ClientEvent::ServerError("User 'ghost' not found or offline.".into())
    );

    bob.close().await;
    alice.close().await;
}

#[tokio::test]
async fn session_sees_rejection() {
    let (addr, registry) = start_relay(0.0, 0.0, None).await;
    let _carol = login(addr, &registry, "carol").await;

    let mut dup = Session::connect(addr, "carol").await.unwrap();
    assert_eq!(
        next_event(&mut dup).await,
        ClientEvent::ServerError("User ID 'carol' is already in use.".into())
    );
    assert_eq!(next_event(&mut dup).await, ClientEvent::Disconnected);
}

#[tokio::test]
async fn single_bit_errors_are_corrected() {
    let (addr, registry) = start_relay(1.0, 0.0, Some(7)).await;
    let mut bob = Session::connect(addr, "bob").await.unwrap();
    wait_registered(&registry, "bob", true).await;
    let mut alice = Session::connect(addr, "alice").await.unwrap();
    wait_registered(&registry, "alice", true).await;

    for _ in 0..5 {
        alice.send("bob", "hello").await.unwrap();
        let ClientEvent::Message(msg) = next_event(&mut bob).await else {
            panic!("expected a message");
        };
        let decoded = msg.outcome.as_ref().unwrap();
        assert!(decoded.error_corrected());
        assert_eq!(decoded.message, "hello");
        assert_ne!(msg.codeword, hamming::encode("hello"));
    }
}

#[tokio::test]
async fn double_bit_errors_flip_two_bits() {
    let (addr, registry) = start_relay(0.0, 1.0, Some(11)).await;
    let mut bob = login(addr, &registry, "bob").await;
    let mut alice = login(addr, &registry, "alice").await;

    let clean = hamming::encode("hello");
    write_frame(&mut alice, &format!("bob|hello|{clean}")).await.unwrap();
    let relayed = recv(&mut bob).await;
    let (original, bits) = relayed.split_once('|').unwrap();
    assert_eq!(original, "hello");
    let differing = bits
        .chars()
        .zip(clean.to_string().chars())
        .filter(|(a, b)| a != b)
        .count();
    assert_eq!(differing, 2);
}

#[tokio::test]
async fn interactive_quit_ends_session() {
    let (addr, registry) = start_relay(0.0, 0.0, None).await;
    let mut bob = login(addr, &registry, "bob").await;
    let alice = Session::connect(addr, "alice").await.unwrap();
    wait_registered(&registry, "alice", true).await;

    let out = transcript(alice, &b"bob/Hi\n/quit\nbob/never sent\n"[..]).await;
    assert_eq!(
        out,
        "Message sent to bob (21 bits encoded).\nDisconnecting...\n"
    );
    assert_eq!(recv(&mut bob).await, "Hi|010010011000011001001");
    wait_registered(&registry, "alice", false).await;
}

#[tokio::test]
async fn interactive_end_of_input_ends_session() {
    let (addr, registry) = start_relay(0.0, 0.0, None).await;
    let alice = Session::connect(addr, "alice").await.unwrap();
    wait_registered(&registry, "alice", true).await;

    let out = transcript(alice, &b"no separator\n\nbob/\n"[..]).await;
    assert_eq!(
        out,
        "Invalid format! Use: recipient_id/message\nBoth recipient and message are required!\n"
    );
    wait_registered(&registry, "alice", false).await;
}

#[tokio::test]
async fn interactive_server_disconnect_ends_session() {
    let (addr, registry) = start_relay(0.0, 0.0, None).await;
    let _carol = login(addr, &registry, "carol").await;

    // Input stays open; only the relay closing the connection can end the loop.
    let (_keyboard, stdin) = tokio::io::duplex(64);
    let dup = Session::connect(addr, "carol").await.unwrap();
    let out = transcript(dup, BufReader::new(stdin)).await;
    assert!(out.contains("[SERVER ERROR] User ID 'carol' is already in use."), "{out}");
    assert!(out.ends_with("[CLIENT] Connection closed by server.\n"), "{out}");
    assert!(registry.contains("carol").await);
}

#[tokio::test]
async fn interactive_output_failure_still_closes_session() {
    let (addr, registry) = start_relay(0.0, 0.0, None).await;
    let _bob = login(addr, &registry, "bob").await;
    let alice = Session::connect(addr, "alice").await.unwrap();
    wait_registered(&registry, "alice", true).await;

    let (mut terminal, screen) = tokio::io::duplex(64);
    drop(screen);
    let res = timeout(
        WAIT,
        run_interactive(alice, &b"bob/Hi\nbob/again\n"[..], &mut terminal),
    )
    .await
    .unwrap();
    assert!(res.is_err());
    wait_registered(&registry, "alice", false).await;
}

#[tokio::test]
async fn non_reading_recipient_stalls_sender() {
    let (addr, registry) = start_relay(0.0, 0.0, None).await;
    let mut bob = login(addr, &registry, "bob").await;
    let mut alice = login(addr, &registry, "alice").await;

    let body = format!("bob|x|{}", "0".repeat(64 * 1024));
    let sent = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let flood = tokio::spawn({
        let sent = sent.clone();
        let body = body.clone();
        async move {
            while write_frame(&mut alice, &body).await.is_ok() {
                sent.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }
    });
    sleep(Duration::from_secs(3)).await;
    let frames = sent.load(std::sync::atomic::Ordering::Relaxed);
    // Only socket buffers and a one-slot outbox sit between alice and bob.
    assert!(
        frames * body.len() < 64 * 1024 * 1024,
        "relay accepted {frames} frames for a recipient that never reads"
    );

    let first = recv(&mut bob).await;
    assert!(first.starts_with("x|000"));
    flood.abort();
}

#[tokio::test]
async fn undeliverable_frames_do_not_consume_injection() {
    let code = hamming::encode("hello").to_string();

    let mut received = Vec::new();
    for detour in [false, true] {
        let (addr, registry) = start_relay(1.0, 0.0, Some(21)).await;
        let mut bob = login(addr, &registry, "bob").await;
        let mut alice = login(addr, &registry, "alice").await;
        if detour {
            write_frame(&mut alice, &format!("ghost|hello|{code}")).await.unwrap();
            assert!(recv(&mut alice).await.starts_with("SERVER_ERROR|User 'ghost'"));
        }
        write_frame(&mut alice, &format!("bob|hello|{code}")).await.unwrap();
        received.push(recv(&mut bob).await);
    }
    assert_ne!(received[0], format!("hello|{code}"));
    assert_eq!(received[0], received[1]);
}
