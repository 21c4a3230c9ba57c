//! `tls-dial`: open a TLS connection, send one GET, print the response head.

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use tls_dialer::config::{load_config, DialerConfig};
use tls_dialer::net::error::BoxError;
use tls_dialer::net::proxy;
use tls_dialer::observability::logging::init_logging;
use tls_dialer::{SecureConnection, SecureDialer};

#[derive(Parser)]
#[command(name = "tls-dial")]
#[command(about = "Dial a TLS endpoint and fetch a response head", long_about = None)]
struct Cli {
    /// Destination as host:port.
    address: String,

    /// Network type (tcp, tcp4, tcp6).
    #[arg(short, long, default_value = "tcp")]
    network: String,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP proxy to tunnel through; `env` reads HTTPS_PROXY/NO_PROXY.
    #[arg(long)]
    proxy: Option<String>,

    /// Request path.
    #[arg(long, default_value = "/")]
    path: String,

    /// Deadline for the whole exchange, in seconds.
    #[arg(long, default_value_t = 30)]
    deadline_secs: u64,

    /// Print a JSON report instead of the raw head.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report {
    connection_id: String,
    peer: String,
    alpn: Option<String>,
    elapsed_ms: u64,
    status_line: String,
    headers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DialerConfig::default(),
    };
    init_logging(&config.observability.log_level);

    let mut dialer = SecureDialer::new(config)?;
    match cli.proxy.as_deref() {
        Some("env") => dialer = dialer.with_proxy(proxy::from_env()?),
        Some(raw) => dialer = dialer.with_proxy(proxy::fixed(Url::parse(raw)?)),
        None => {}
    }

    let start = Instant::now();
    let mut conn = dialer.dial(&cli.network, &cli.address).await?;
    conn.set_deadline(start + Duration::from_secs(cli.deadline_secs))?;

    let host = conn.peer().to_string();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: tls-dial/{}\r\nAccept: */*\r\nConnection: close\r\n\r\n",
        cli.path,
        host,
        env!("CARGO_PKG_VERSION")
    );
    conn.write_all(request.as_bytes()).await?;

    let head = read_head(&mut conn).await?;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    let alpn = conn
        .negotiated_alpn()
        .map(|p| String::from_utf8_lossy(p).into_owned());
    let connection_id = conn.id().to_string();
    conn.close().await?;

    if cli.json {
        let mut lines = head.lines().filter(|l| !l.is_empty());
        let report = Report {
            connection_id,
            peer: host,
            alpn,
            elapsed_ms,
            status_line: lines.next().unwrap_or_default().to_string(),
            headers: lines.map(str::to_string).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", head);
    }

    Ok(())
}

/// Read until the end of the response head (or end of stream).
async fn read_head(conn: &mut SecureConnection) -> Result<String, tls_dialer::ConnError> {
    let mut head = Vec::new();
    let mut buf = [0u8; 4096];

    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match conn.read(&mut buf).await {
            Ok(n) => head.extend_from_slice(&buf[..n]),
            Err(tls_dialer::ConnError::Eof) => break,
            Err(e) => return Err(e),
        }
    }

    if let Some(end) = head.windows(4).position(|w| w == b"\r\n\r\n") {
        head.truncate(end + 4);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}
