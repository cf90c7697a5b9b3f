mod args;
mod qv;

use clap::Parser;
use log::{debug, warn, LevelFilter};

use crate::args::Args;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if args.verbose {
        logger
            .filter_module("quickvote", LevelFilter::Debug)
            .filter_module("qvadmin", LevelFilter::Debug);
    }
    logger.init();
    debug!("args: {:?}", args);

    if let Err(e) = qv::run_command(&args).await {
        warn!("Error occured {:?}", e);
        eprintln!("An error occured: {}", e);
        std::process::exit(1);
    }
}
