use std::io::Write;

use anyhow::Context;
use clap::Parser;
use fetch::{Args, fetch_url};
use hyper::{Method, Uri};
use proxy_agent::ProxyAgent;
use tracing_subscriber::EnvFilter;

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .try_init();
    let args = Args::parse();

    let options = args.agent_options()?;
    let agent = ProxyAgent::new(options).context("Failed to build agent")?;
    let uri: Uri = args.url.parse().context("Invalid URL")?;
    let method = Method::from_bytes(args.method.as_bytes()).context("Invalid method")?;

    let resp = fetch_url(&agent, &uri, method).await?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{:?} {}", resp.version(), resp.status())?;
    for (name, value) in resp.headers() {
        writeln!(stdout, "{name}: {}", String::from_utf8_lossy(value.as_bytes()))?;
    }
    writeln!(stdout)?;
    stdout.write_all(resp.body())?;
    stdout.flush()?;
    Ok(())
}
