mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Explicit manifest path (`-f`)
    pub file: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        file: cli.file,
    };

    match cli.command {
        Command::Validate => commands::jar::validate(&ctx),
        Command::Plan(args) => commands::jar::plan(&ctx, args.target.as_deref(), args.json),
        Command::Status(args) => commands::jar::status(&ctx, args.target.as_deref()),
        Command::Diff(args) => commands::jar::diff(&ctx, args.target.as_deref()),
        Command::Apply(args) => commands::jar::apply(
            &ctx,
            args.target.as_deref(),
            args.dry_run,
            args.yes,
            args.jobs as usize,
        ),
        Command::Deploy(args) => commands::jar::deploy(&ctx, args),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "tomcat-jar", &mut io::stdout());
            Ok(())
        }
    }
}
