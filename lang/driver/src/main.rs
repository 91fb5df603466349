//! `strata` — the reference CLI for the elaborator (`spec.md` §6.5).

use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "strata", about = "Elaborator and proof checker for the core calculus")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Cap on solver passes before giving up (`spec.md` §5).
    #[arg(long, global = true, default_value_t = strata_driver::default_max_iterations())]
    max_iterations: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Elaborate a file and report diagnostics, if any.
    Check { file: String },
    /// Elaborate a file and print the resulting registry.
    Dump { file: String },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let (file, dump) = match &cli.command {
        Command::Check { file } => (file, false),
        Command::Dump { file } => (file, true),
    };

    let source = match std::fs::read_to_string(file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: could not read {file}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let (registry, diagnostics) = strata_driver::elaborate(&source, cli.max_iterations);

    if !diagnostics.is_empty() {
        let reports: Vec<miette::Report> = diagnostics.into_iter().map(miette::Report::new).collect();
        let mut stderr = std::io::stderr();
        strata_driver::render_reports_io(&mut stderr, &reports, true);
        return ExitCode::FAILURE;
    }

    if dump {
        print!("{}", strata_driver::dump_registry(&registry));
    } else {
        println!("ok");
    }
    ExitCode::SUCCESS
}
