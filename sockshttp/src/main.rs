#[macro_use]
extern crate human_panic;

use anyhow::{bail, Context, Result};
use clap::Parser;
use dotenv::dotenv;
use http::Method;
use log::LevelFilter;
use sockshttp::http::is_content_header;
use sockshttp::{CancellationToken, ProxyAddress, Request, RequestBody, Socks5Transport};
use std::convert::TryFrom;
use std::time::Duration;
use tokio::io::{self, AsyncWriteExt};

/// HTTP/1.1 requests through a SOCKS5 proxy.
#[derive(Parser)]
#[clap(name = "sockshttp", version)]
struct Opts {
    /// Prints debug information verbosely
    #[clap(short, long)]
    debug: bool,

    /// Proxy to tunnel through, as socks5://[user:password@]host:port
    #[clap(short, long, env = "SOCKS_PROXY", default_value = "socks5://127.0.0.1:1080")]
    proxy: String,

    /// Lets the proxy resolve the target hostname
    #[clap(long)]
    remote_dns: bool,

    /// Request method
    #[clap(short = 'X', long, default_value = "GET")]
    method: String,

    /// Extra header, as "Name: value"
    #[clap(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body
    #[clap(long)]
    data: Option<String>,

    /// Prints the status line and headers before the body
    #[clap(short, long)]
    include: bool,

    /// Seconds to wait for the connection to the proxy
    #[clap(long)]
    connect_timeout: Option<u64>,

    /// Absolute http(s) URL to request
    url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let opts = Opts::parse();

    let mut logger = env_logger::builder();
    logger.format_module_path(false);

    if opts.debug {
        logger.filter_level(LevelFilter::Debug).init();
    } else {
        logger.filter_level(LevelFilter::Info).init();

        setup_panic!(Metadata {
            name: "sockshttp".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            authors: env!("CARGO_PKG_AUTHORS").replace(":", ", ").into(),
            homepage: env!("CARGO_PKG_HOMEPAGE").into(),
        });
    }

    let proxy = ProxyAddress::try_from(opts.proxy.as_str()).context("Invalid --proxy")?;
    let mut transport = Socks5Transport::new(proxy).resolve_dns_locally(!opts.remote_dns);
    if let Some(seconds) = opts.connect_timeout {
        transport = transport.connect_timeout(Duration::from_secs(seconds));
    }

    let request = build_request(&opts)?;

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let response = transport
        .send_with_cancellation(request, &token)
        .await
        .with_context(|| format!("Request to {} failed", opts.url))?;

    let mut stdout = io::stdout();
    if opts.include {
        let mut head = format!(
            "{:?} {} {}\r\n",
            response.version(),
            response.status().as_u16(),
            response.reason()
        );

        let content_headers = response.content_headers().into_iter().flat_map(|h| h.iter());
        for (name, values) in response.headers().iter().chain(content_headers) {
            head.push_str(&format!("{}: {}\r\n", name, values.join(", ")));
        }
        head.push_str("\r\n");

        stdout.write_all(head.as_bytes()).await?;
    }

    if let Some(mut body) = response.into_body() {
        io::copy(&mut body, &mut stdout).await.context("Failed to read response body")?;
    }
    stdout.flush().await?;

    Ok(())
}

///
///
///
fn build_request(opts: &Opts) -> Result<Request> {
    let method = Method::from_bytes(opts.method.to_uppercase().as_bytes()).context("Invalid --method")?;
    let mut request = Request::parse(method, &opts.url)?;
    let mut body = opts.data.clone().map(RequestBody::from);

    for header in &opts.headers {
        let (name, value) = match header.find(':') {
            Some(index) => (header[..index].trim(), header[index + 1..].trim()),
            None => bail!("Header must look like \"Name: value\": {}", header),
        };

        // Content headers describe the body, so they go with it.
        match body.as_mut() {
            Some(body) if is_content_header(name) => body.headers_mut().append(name, value),
            _ => request.headers_mut().append(name, value),
        }
    }

    if let Some(body) = body {
        request = request.with_body(body);
    }

    Ok(request)
}
