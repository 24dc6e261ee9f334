use std::process::ExitCode;

use clap::Parser;

use rasterfe::cli::{self, CliArgs};
use rasterfe::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let settings = args.load_settings();

    // Initialize session log (overwrites previous session log)
    if settings.log_to_file {
        logger::init();
    }
    rasterfe::log_info!("RasterFE {} started", env!("CARGO_PKG_VERSION"));

    cli::run(args, &settings)
}
