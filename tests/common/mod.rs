//! Shared utilities for integration tests: local TLS backends and a CONNECT proxy.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tls_dialer::config::DialerConfig;
use tls_dialer::SecureDialer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

/// A certificate for `localhost` / `127.0.0.1` and the CA file trusting it.
pub struct TestCert {
    pub cert: CertificateDer<'static>,
    pub key: PrivateKeyDer<'static>,
    pub ca_path: PathBuf,
}

impl TestCert {
    pub fn generate(label: &str) -> Self {
        let generated = rcgen::generate_simple_self_signed(vec![
            "localhost".to_string(),
            "127.0.0.1".to_string(),
        ])
        .unwrap();

        let ca_path = std::env::temp_dir().join(format!(
            "tls-dialer-test-{}-{}-{}.pem",
            label,
            std::process::id(),
            NEXT_CERT.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&ca_path, generated.cert.pem()).unwrap();

        Self {
            cert: generated.cert.der().clone(),
            key: PrivatePkcs8KeyDer::from(generated.key_pair.serialize_der()).into(),
            ca_path,
        }
    }

    /// Dialer configuration trusting only this certificate.
    pub fn dialer_config(&self) -> DialerConfig {
        let mut config = DialerConfig::default();
        config.connect_timeout_secs = 5;
        config.tls.use_native_roots = false;
        config.tls.extra_root_certs = vec![self.ca_path.to_string_lossy().into_owned()];
        config
    }

    pub fn dialer(&self) -> SecureDialer {
        SecureDialer::new(self.dialer_config()).unwrap()
    }

    fn acceptor(&self) -> TlsAcceptor {
        let mut config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![self.cert.clone()], self.key.clone_key())
            .unwrap();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        TlsAcceptor::from(Arc::new(config))
    }
}

impl Drop for TestCert {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.ca_path);
    }
}

static NEXT_CERT: AtomicUsize = AtomicUsize::new(0);

/// How a mock backend treats an accepted TLS connection.
#[derive(Clone, Copy)]
pub enum Backend {
    /// Answer each request head with a fixed HTTP response.
    Http(&'static str),
    /// Complete the handshake, then never send anything.
    Silent,
    /// Send a message, then close the TLS session.
    Goodbye(&'static str),
    /// Complete the handshake, then neither read nor write.
    Stalled,
}

/// Start a TLS backend on an ephemeral port.
pub async fn start_tls_backend(cert: &TestCert, behavior: Backend) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = cert.acceptor();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(mut tls) = acceptor.accept(socket).await else {
                    return;
                };
                match behavior {
                    Backend::Http(body) => {
                        while read_head(&mut tls).await.is_some() {
                            let response = format!(
                                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: text/plain\r\n\r\n{}",
                                body.len(),
                                body
                            );
                            if tls.write_all(response.as_bytes()).await.is_err() {
                                return;
                            }
                            let _ = tls.flush().await;
                        }
                    }
                    Backend::Silent => {
                        let mut sink = [0u8; 1024];
                        while matches!(tls.read(&mut sink).await, Ok(n) if n > 0) {}
                    }
                    Backend::Stalled => {
                        let _held = tls;
                        std::future::pending::<()>().await;
                    }
                    Backend::Goodbye(message) => {
                        let _ = tls.write_all(message.as_bytes()).await;
                        let _ = tls.shutdown().await;
                        let mut sink = [0u8; 1024];
                        while matches!(tls.read(&mut sink).await, Ok(n) if n > 0) {}
                    }
                }
            });
        }
    });

    addr
}

/// Start a plain TCP listener that accepts and then never speaks.
pub async fn start_stalled_listener() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// A CONNECT proxy that counts tunnels it opened.
pub struct MockProxy {
    pub addr: SocketAddr,
    pub tunnels: Arc<AtomicUsize>,
}

/// Start a CONNECT proxy. With `allow = false` every request gets `403`.
pub async fn start_connect_proxy(allow: bool) -> MockProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let tunnels = Arc::new(AtomicUsize::new(0));
    let counter = tunnels.clone();

    tokio::spawn(async move {
        while let Ok((mut client, _)) = listener.accept().await {
            let counter = counter.clone();
            tokio::spawn(async move {
                let Some(head) = read_head(&mut client).await else {
                    return;
                };
                let target = head
                    .lines()
                    .next()
                    .and_then(|line| line.strip_prefix("CONNECT "))
                    .and_then(|rest| rest.split_whitespace().next())
                    .map(str::to_string);

                let Some(target) = target.filter(|_| allow) else {
                    let _ = client
                        .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n")
                        .await;
                    return;
                };

                let Ok(mut upstream) = TcpStream::connect(&target).await else {
                    let _ = client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                if client
                    .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                    .await
                    .is_err()
                {
                    return;
                }
                let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
            });
        }
    });

    MockProxy { addr, tunnels }
}

/// Read one request head byte by byte. `None` on EOF or error.
async fn read_head<S: AsyncRead + Unpin>(stream: &mut S) -> Option<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte).await {
            Ok(1) => head.push(byte[0]),
            _ => return None,
        }
    }
    Some(String::from_utf8_lossy(&head).into_owned())
}

/// A well-formed HTTP/1.1 request for `/` on `host`.
pub fn http_request(host: &str) -> Vec<u8> {
    [
        "GET / HTTP/1.1".to_string(),
        "User-Agent: tls-dialer-tests".to_string(),
        format!("Host: {}", host),
        "Accept: */*".to_string(),
        "\r\n".to_string(),
    ]
    .join("\r\n")
    .into_bytes()
}
