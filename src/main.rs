use anyhow::Result;

use card_reader_server::cli::commands::run_cli;

fn main() -> Result<()> {
    run_cli()
}
