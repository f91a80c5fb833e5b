use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

use gjallar::client::{DnsClient, Protocol, TransportError};
use gjallar::config::ResolverConfig;
use gjallar::dns::{
    Message,
    enums::{RecordClass, RecordType},
    resource::ResourceRecord,
};
use gjallar::tsig::{self, TsigAlgorithm, TsigKey, VerifyOutcome};

const SECRET: &str = "Z2phbGxhciB0ZXN0IHNlY3JldA==";

fn local_config(port: u16) -> ResolverConfig {
    ResolverConfig {
        server: IpAddr::from([127, 0, 0, 1]),
        port,
        timeout: Duration::from_millis(500),
        require_authentication: false,
        ..ResolverConfig::default()
    }
}

fn keyed_config(port: u16, secret: &str) -> ResolverConfig {
    ResolverConfig {
        key_name: Some("test.example".to_string()),
        key_secret: Some(secret.to_string()),
        require_authentication: true,
        ..local_config(port)
    }
}

/// Build the canonical one-answer response to `query`.
fn answer_for(query: &Message) -> Message {
    let mut response = query.clone();
    response.additionals.retain(|rr| rr.rtype != RecordType::TSIG);
    response.header.arcount = response.additionals.len() as u16;
    response.header.qr = true;
    response.header.ra = true;
    response.answers.push(ResourceRecord {
        labels: query.questions[0].labels.clone(),
        rtype: RecordType::A,
        rclass: RecordClass::IN,
        ttl: 3600,
        rdata: vec![192, 0, 2, 1],
        parsed_rdata: Some("192.0.2.1".to_string()),
    });
    response.header.ancount = 1;
    response
}

/// One-shot UDP server that answers with whatever `respond` builds.
async fn spawn_udp_server<F>(respond: F) -> u16
where
    F: Fn(&Message) -> Vec<Vec<u8>> + Send + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
        let query = Message::parse(&buf[..len]).unwrap();
        for datagram in respond(&query) {
            socket.send_to(&datagram, peer).await.unwrap();
        }
    });
    port
}

#[tokio::test]
async fn lookup_returns_the_answer() {
    let port = spawn_udp_server(|query| vec![answer_for(query).serialize().unwrap()]).await;

    let client = DnsClient::new(local_config(port));
    let response = client.lookup("example.com", RecordType::A).await.unwrap();

    assert_eq!(response.protocol, Protocol::Udp);
    assert_eq!(response.auth, None);
    assert_eq!(response.message.header.ancount, 1);
    assert_eq!(
        response.message.answers[0].parsed_rdata.as_deref(),
        Some("192.0.2.1")
    );
    assert_eq!(response.message.answers[0].ttl, 3600);
}

#[tokio::test]
async fn stale_datagrams_are_discarded() {
    let port = spawn_udp_server(|query| {
        // First a response for some other transaction, then the real one.
        let mut stale = answer_for(query);
        stale.header.id = query.header.id.wrapping_add(1);
        stale.answers.clear();
        stale.header.ancount = 0;
        vec![
            stale.serialize().unwrap(),
            answer_for(query).serialize().unwrap(),
        ]
    })
    .await;

    let client = DnsClient::new(local_config(port));
    let response = client.lookup("example.com", RecordType::A).await.unwrap();

    assert_eq!(response.message.header.ancount, 1);
}

#[tokio::test]
async fn truncated_response_falls_back_to_tcp() {
    // TCP and UDP listeners share the port number; the UDP side answers
    // with TC set and no records, the TCP side serves the real answer.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let udp = UdpSocket::bind(("127.0.0.1", port)).await.unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        let (len, peer) = udp.recv_from(&mut buf).await.unwrap();
        let query = Message::parse(&buf[..len]).unwrap();
        let mut truncated = query.clone();
        truncated.header.qr = true;
        truncated.header.tc = true;
        udp.send_to(&truncated.serialize().unwrap(), peer).await.unwrap();
    });

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut length_buf = [0u8; 2];
        stream.read_exact(&mut length_buf).await.unwrap();
        let mut query_buf = vec![0u8; u16::from_be_bytes(length_buf) as usize];
        stream.read_exact(&mut query_buf).await.unwrap();
        let query = Message::parse(&query_buf).unwrap();

        let response = answer_for(&query).serialize().unwrap();
        stream
            .write_all(&(response.len() as u16).to_be_bytes())
            .await
            .unwrap();
        stream.write_all(&response).await.unwrap();
    });

    let client = DnsClient::new(local_config(port));
    let response = client.lookup("example.com", RecordType::A).await.unwrap();

    assert_eq!(response.protocol, Protocol::Tcp);
    assert_eq!(response.message.header.ancount, 1);
}

#[tokio::test]
async fn timeout_after_exactly_one_retry() {
    // A server that counts datagrams and never answers.
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let received = Arc::new(AtomicUsize::new(0));
    let counter = received.clone();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            let _ = socket.recv_from(&mut buf).await;
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let mut config = local_config(port);
    config.timeout = Duration::from_millis(200);
    let client = DnsClient::new(config);

    let result = client.lookup("example.com", RecordType::A).await;
    assert!(matches!(result, Err(TransportError::Timeout)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(received.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn signed_exchange_verifies() {
    let key = TsigKey::new("test.example", TsigAlgorithm::HmacSha256, SECRET);
    let port = spawn_udp_server(move |query| {
        let response = answer_for(query);
        let signed = tsig::sign(&response, &key, tsig::unix_now(), 300).unwrap();
        vec![signed.serialize().unwrap()]
    })
    .await;

    let client = DnsClient::new(keyed_config(port, SECRET));
    let response = client.lookup("example.com", RecordType::A).await.unwrap();

    assert_eq!(response.auth, Some(VerifyOutcome::Authentic));
    assert_eq!(response.message.header.ancount, 1);
}

#[tokio::test]
async fn bogus_signature_still_returns_the_answer() {
    // Server signs with a different secret; the answer must come back with
    // a bad-signature status rather than an error.
    let imposter = TsigKey::new("test.example", TsigAlgorithm::HmacSha256, "bm90IHRoZSBzZWNyZXQ=");
    let port = spawn_udp_server(move |query| {
        let response = answer_for(query);
        let signed = tsig::sign(&response, &imposter, tsig::unix_now(), 300).unwrap();
        vec![signed.serialize().unwrap()]
    })
    .await;

    let client = DnsClient::new(keyed_config(port, SECRET));
    let response = client.lookup("example.com", RecordType::A).await.unwrap();

    assert_eq!(response.auth, Some(VerifyOutcome::BadSig));
    assert_eq!(response.message.header.ancount, 1);
}

#[tokio::test]
async fn unsigned_response_is_flagged_when_auth_requested() {
    let port = spawn_udp_server(|query| vec![answer_for(query).serialize().unwrap()]).await;

    let client = DnsClient::new(keyed_config(port, SECRET));
    let response = client.lookup("example.com", RecordType::A).await.unwrap();

    assert_eq!(response.auth, Some(VerifyOutcome::Unsigned));
    assert_eq!(response.message.header.ancount, 1);
}
