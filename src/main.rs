use std::{error::Error, path::PathBuf, sync::Arc};

use clap::Parser;
use log::error;

use gemwiki::{config::FileConfig, store::fs::FsStore, Gemwiki};

#[derive(Parser)]
#[command(
    name = "gemwiki",
    about = "gemwiki - serve a wiki over Gemini",
    long_about = r#"
gemwiki - serve a wiki over Gemini

Usage:
    gemwiki [OPTIONS]

Options:
    -h, --help       Print help information
    -V, --version    Print version information
    -i, --interface  <INTERFACE>
                     Address to listen on (default 0.0.0.0)
    -p, --port       <PORT>
                     Port to listen on (default 1965)
    -s, --hostname   <HOSTNAME>
                     Hostname for the generated certificate (default localhost)
    -c, --certfile   <CERTFILE>
                     PEM file with certificate and key, skips generation
    -r, --root       <ROOT>
                     Content directory holding pages/ and media/ (default .)
        --config     <CONFIG>
                     Config file to use
"#
)]
struct Args {
    #[arg(short, long, help = "Address to listen on.")]
    interface: Option<String>,

    #[arg(short, long, help = "Port to listen on.")]
    port: Option<u16>,

    #[arg(short = 's', long, help = "Hostname for the generated certificate.")]
    hostname: Option<String>,

    #[arg(short = 'c', long, help = "PEM file with certificate and private key.")]
    certfile: Option<PathBuf>,

    #[arg(short, long, help = "Content directory.")]
    root: Option<PathBuf>,

    #[arg(long, help = "Config file to use.")]
    config: Option<PathBuf>,
}

async fn run() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    config.apply_overrides(
        args.interface
            .as_deref(),
        args.port,
        args.hostname
            .as_deref(),
        args.certfile,
        args.root,
    )?;

    let store = FsStore::open(&config.store)?;

    let mut server = Gemwiki::new(config.server, Arc::new(store));
    server
        .run()
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    if let Err(e) = run().await {
        error!("Failed to start server: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
