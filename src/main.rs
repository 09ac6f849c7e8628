mod cli;

use std::{io, process};

use tracing_subscriber::EnvFilter;

use editdesk::config::Config;
use editdesk::storage::Storage;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    let root = config.projects_root().unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    let storage = match Storage::new(root) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to initialize storage: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = cli::run(&config, storage) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
