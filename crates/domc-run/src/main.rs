use clap::Parser;

mod cli;

fn main() -> miette::Result<()> {
    let cli = cli::Cli::parse();

    cli.init_tracing();
    tracing::debug!("cli: {cli:?}");

    cli.run()
}
