use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;
mod config;
mod error;
mod union;

use cli::Args;
use config::{load_config, load_config_from, Config};
use error::UniteError;
use union::display::format_tree;
use union::{mount_union, UnionService, UnionTree};

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => {
            std::process::exit(code);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> error::Result<i32> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if args.allow_other {
        config.mount.allow_other = Some(true);
    }

    // An explicit log_level in the config beats the environment
    let filter = match &config.log_level {
        Some(level) => level.clone(),
        None => std::env::var("UNITEFS_LOG").unwrap_or_else(|_| config.get_log_level()),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let sources = cli::validate_sources(&args.sources)?;
    cli::validate_mount_point(&args.mountpoint, &sources)?;

    let service = build_union(&config, &args.exclude, &sources)?;

    if args.print_tree {
        print!("{}", format_tree(&service.union().read()));
        return Ok(0);
    }

    mount_and_wait(service, &args.mountpoint, &config).await
}

fn build_union(
    config: &Config,
    extra_exclude: &[String],
    sources: &[PathBuf],
) -> error::Result<Arc<UnionService>> {
    let options = config.build.to_build_options(extra_exclude)?;
    let union = Arc::new(UnionTree::new(options));

    for source in sources {
        if let Err(e) = union.register_subtree(source) {
            tracing::error!("Skipping source {}: {}", source.display(), e);
        }
    }

    if union.subtrees().is_empty() {
        return Err(UniteError::Config(
            "None of the source directories could be registered".to_string(),
        ));
    }

    Ok(Arc::new(UnionService::new(union)))
}

async fn mount_and_wait(
    service: Arc<UnionService>,
    mount_point: &std::path::Path,
    config: &Config,
) -> error::Result<i32> {
    let session = mount_union(
        service.clone(),
        mount_point,
        &config.mount,
        config.get_fuse_ttl_secs(),
    )?;

    println!(
        "Mounted {} source(s) at {} ({} nodes). Press Ctrl-C to unmount.",
        service.union().subtrees().len(),
        mount_point.display(),
        service.node_count()
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Unmounting {}", mount_point.display());
    drop(session);
    Ok(0)
}
