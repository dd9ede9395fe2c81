//! datapilot - command-line entry point

use clap::Parser;
use datapilot::cli::{run, Cli};
use datapilot::logging;

fn main() -> anyhow::Result<()> {
    logging::init(logging::DEFAULT_FILTER);
    run(Cli::parse())
}
