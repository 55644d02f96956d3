//! CLI entry point for courier.

mod cli;

use clap::Parser;
use courier::config::{load_config_with_source, normalize_config};
use courier::render::Renderer;
use courier::request::RequestClient;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit status for usage and configuration problems.
const EXIT_USAGE: i32 = 2;
/// Exit status for a request that failed or was cancelled.
const EXIT_FAILURE: i32 = 1;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();
    init_tracing(args.log_directive());

    let renderer = Arc::new(Renderer::new(!args.no_color));

    let loaded = match load_config_with_source(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            renderer.error(&e.to_string());
            std::process::exit(EXIT_USAGE);
        }
    };
    match loaded.source_path() {
        Some(path) => debug!(path = %path.display(), "loaded config"),
        None => debug!("no config file found; using built-in defaults"),
    }
    let mut config = loaded.config;
    if let Some(url) = &args.base_url {
        config.client.base_url = url.clone();
        if let Err(e) = normalize_config(&mut config) {
            renderer.error(&e.to_string());
            std::process::exit(EXIT_USAGE);
        }
    }

    let descriptor = match args.descriptor() {
        Ok(descriptor) => descriptor,
        Err(msg) => {
            renderer.error(&msg);
            std::process::exit(EXIT_USAGE);
        }
    };
    let options = args.options(config.request.clone());
    let client = Arc::new(RequestClient::from_config(&config, renderer.clone()));

    // Ctrl-C aborts whatever is in flight; the pending call then resolves as cancelled.
    let interrupt = {
        let client = client.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let cancelled = client.cancel_all();
                debug!(cancelled, "interrupted");
            }
        })
    };

    let result = client.execute(&descriptor, &options).await;
    interrupt.abort();

    match result {
        Ok(reply) => {
            let value = reply.into_value();
            match serde_json::to_string_pretty(&value) {
                Ok(text) => println!("{text}"),
                Err(_) => println!("{value}"),
            }
        }
        Err(failure) => {
            // Terminal failures were already reported through the renderer.
            if failure.is_cancelled() {
                renderer.error("request cancelled");
            }
            std::process::exit(EXIT_FAILURE);
        }
    }
}

fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_env("COURIER_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
