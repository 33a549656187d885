//! kuruvi command line client
//!
//! ```text
//! kuruvi [--config PATH] get <endpoint> [key=value ...]
//! kuruvi [--config PATH] capacity <endpoint>
//! ```
//!
//! `get` prints the response body to stdout. `capacity` prints the remaining
//! quota of every credential for the endpoint's bucket. Logs go to stderr as
//! JSON.

use anyhow::{Context, Result, bail};
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kuruvi::{Config, Dispatcher};

const USAGE: &str = "usage: kuruvi [--config PATH] get <endpoint> [key=value ...]
       kuruvi [--config PATH] capacity <endpoint>";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Get {
        endpoint: String,
        params: Vec<(String, String)>,
    },
    Capacity {
        endpoint: String,
    },
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    config: Option<String>,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut config = None;
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config needs a path")?;
            config = Some(path.clone());
        } else {
            positional.push(arg.as_str());
        }
    }

    let command = match positional.as_slice() {
        ["get", endpoint, rest @ ..] => {
            let params = rest
                .iter()
                .map(|pair| {
                    pair.split_once('=')
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .with_context(|| format!("parameter {pair:?} is not key=value"))
                })
                .collect::<Result<Vec<_>>>()?;
            Command::Get {
                endpoint: endpoint.to_string(),
                params,
            }
        }
        ["capacity", endpoint] => Command::Capacity {
            endpoint: endpoint.to_string(),
        },
        _ => bail!("{USAGE}"),
    };

    Ok(Args { config, command })
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr with LOG_LEVEL / RUST_LOG support; stdout is for output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&argv)?;

    let config_path = Config::resolve_path(args.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        auth_mode = ?config.api.auth_mode,
        key_sets = config.credentials.len(),
        rate_limits = config.rate_limits.len(),
        "configuration loaded"
    );

    let dispatcher = Dispatcher::from_config(&config).context("failed to build credential pool")?;

    let output = match args.command {
        Command::Get { endpoint, params } => {
            let params: Vec<(&str, &str)> = params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            dispatcher
                .get(&endpoint, &params)
                .await
                .with_context(|| format!("GET {endpoint} failed"))?
                .to_vec()
        }
        Command::Capacity { endpoint } => {
            let report = dispatcher.capacity(&endpoint)?;
            serde_json::to_vec_pretty(&report)?
        }
    };

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&output).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
