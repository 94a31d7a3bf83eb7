use clap::Parser;
use log::LevelFilter;

use vpnscope::cli::args::Args;
use vpnscope::cli::commands;
use vpnscope::constants;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    // Logs go to stderr so `--json` output on stdout stays parseable.
    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if args.verbose {
        logger.filter_module(constants::APP_NAME, LevelFilter::Debug);
    }
    logger.format_timestamp_millis().init();

    log::debug!("Starting {} v{}", constants::APP_NAME, constants::APP_VERSION);
    commands::dispatch(args)
}
