//! # Search Command
//!
//! Purpose: Run one query against searchd from the shell and print the
//! decoded result as JSON.
//!
//! Usage: `sphinx-search <keywords> [index] [comment]`
//!
//! The client configuration is read from the JSON file named by
//! `SPHINX_CONFIG` when set; otherwise defaults apply. Log output is
//! controlled with `RUST_LOG`.

use std::env;
use std::fs;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sphinx_client::common::SphinxQuery;
use sphinx_client::{ClientConfig, SphinxClient};

const CONFIG_ENV: &str = "SPHINX_CONFIG";

fn load_config() -> Result<ClientConfig> {
    match env::var(CONFIG_ENV) {
        Ok(path) => {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path))?;
            ClientConfig::from_json_str(&raw).with_context(|| format!("parsing config file {}", path))
        }
        Err(_) => Ok(ClientConfig::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let keywords = match args.next() {
        Some(keywords) => keywords,
        None => bail!("usage: sphinx-search <keywords> [index] [comment]"),
    };
    let index = args.next().unwrap_or_default();
    let comment = args.next().unwrap_or_default();

    let config = load_config()?;
    info!(host = %config.host, port = config.port, "connecting to searchd");
    let client = SphinxClient::with_config(config).context("connecting to searchd")?;

    let query = SphinxQuery::new_search(keywords, index, comment);
    let result = client.query(&query);
    client.close();
    let result = result.context("running query")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
