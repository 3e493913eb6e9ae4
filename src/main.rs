//! `resilient-http` command line client.
//!
//! Sends one request (or several with `--repeat`) through the resilient client
//! configured from a TOML file, printing each status and body.

use std::path::PathBuf;

use clap::Parser;
use reqwest::Method;
use serde_json::Value;

use resilient_http::config::{load_config, ClientConfig};
use resilient_http::lifecycle::signals::cancel_on_ctrl_c;
use resilient_http::observability::init_logging;
use resilient_http::{Client, Context};

#[derive(Parser)]
#[command(name = "resilient-http")]
#[command(about = "HTTP client with rate limiting, retries and backoff", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP method.
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// JSON request body.
    #[arg(short, long)]
    data: Option<String>,

    /// Number of times to send the request.
    #[arg(short, long, default_value_t = 1)]
    repeat: u32,

    url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    init_logging(&config.observability.log_level);

    let method = Method::from_bytes(cli.method.to_uppercase().as_bytes())?;
    let payload: Option<Value> = cli.data.as_deref().map(serde_json::from_str).transpose()?;

    let client = Client::from_config(&config)?;
    tracing::info!(
        url = %cli.url,
        method = %method,
        max_retries = client.max_retries(),
        rate_limited = config.rate_limit.enabled,
        "Client ready"
    );

    let (ctx, handle) = Context::background().with_cancel();
    cancel_on_ctrl_c(handle);

    for i in 0..cli.repeat {
        match client.do_json(&ctx, method.clone(), &cli.url, payload.as_ref()).await {
            Ok(response) => print_response(i, response).await?,
            Err(e) if e.is_context() => {
                eprintln!("[{}] aborted: {}", i, e);
                break;
            }
            Err(e) => eprintln!("[{}] error: {}", i, e),
        }
    }

    Ok(())
}

async fn print_response(index: u32, res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    println!("[{}] {}", index, status);
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if !text.is_empty() => println!("{}", text),
        Err(_) => {}
    }
    Ok(())
}
