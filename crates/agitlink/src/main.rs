use std::process::ExitCode;

use clap::Parser;

use agitlink::cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    agitlink::init(cli.verbose);

    match cli.run() {
        Ok(url) => {
            println!("{url}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("agitlink: {err:#}");
            ExitCode::FAILURE
        }
    }
}
