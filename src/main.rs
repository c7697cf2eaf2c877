use clap::{ArgAction, Parser};
use futures::StreamExt;
use futures::future::join_all;
use miette::miette;
use srcfacts_cache::{CacheOptions, FactCache};
use srcfacts_component::{Anchor, MemoryAnchor, Mounter};
use srcfacts_config::Config;
use srcfacts_facts::{FetcherHandle, FixtureFetcher};
use srcfacts_render::{FactsRenderer, Rendered};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Mount repository facts onto source links, fetching each repository once.
#[derive(Parser, Debug)]
#[command(name = "srcfacts", version, about, long_about = None)]
struct Cli {
    /// Config file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON file mapping repository links to their facts (overrides the config)
    #[arg(short, long)]
    fixtures: Option<PathBuf>,

    /// Log more; repeat for even more (overridden by RUST_LOG)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Links to mount; duplicates share one fetch
    #[arg(required = true)]
    hrefs: Vec<String>,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Error trees keep their full context in the `Debug` output.
fn report(err: impl fmt::Debug) -> miette::Report {
    miette!("{err:?}")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref()).map_err(report)?;
    tracing::debug!(config = ?config, "Configuration loaded");
    let fixtures = cli
        .fixtures
        .or_else(|| config.fixtures.clone())
        .ok_or_else(|| miette!(help = "pass --fixtures or set `fixtures` in the config", "no fixtures file given"))?;
    let fetcher: FetcherHandle = Arc::new(FixtureFetcher::from_path(&fixtures).map_err(report)?);
    let renderer = match config.template.as_deref() {
        Some(template) => template.parse::<FactsRenderer>(),
        None => FactsRenderer::standard(),
    }
    .map_err(report)?;

    let cache = FactCache::with_options(fetcher, CacheOptions { fetch_timeout: config.fetch_timeout() });
    let mounter = Mounter::new(cache.clone(), Arc::new(renderer)).with_base(config.base_url.clone());

    let anchors: Vec<Arc<MemoryAnchor>> = cli.hrefs.iter().map(|href| Arc::new(MemoryAnchor::new(href))).collect();
    join_all(anchors.iter().map(|anchor| mounter.mount(anchor).collect::<Vec<_>>())).await;

    for anchor in &anchors {
        let state = anchor.state().map_or_else(|| "-".to_string(), |state| state.to_string());
        let facts = anchor.facts().map(Rendered::into_string).unwrap_or_default();
        println!("{}\t{state}\t{facts}", anchor.href());
    }
    println!("{} distinct link(s) requested", cache.len());
    Ok(())
}
