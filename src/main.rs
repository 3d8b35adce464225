//! citedesk CLI entry point.

use citedesk::cli::commands::{self, CommandContext};
use citedesk::cli::{Cli, Commands, OutputFormat};
use citedesk::error::Error;
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.silent {
        citedesk::SILENT.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    if cli.dry_run {
        citedesk::DRY_RUN.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    if cli.format == OutputFormat::Csv {
        citedesk::CSV_OUTPUT.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR --format json OR non-TTY stdout
    let json = cli.json
        || cli.format == OutputFormat::Json
        || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let ctx = CommandContext {
        db: cli.db.as_deref(),
        config: cli.config.as_deref(),
        actor: cli.actor.as_deref(),
        json,
    };

    match &cli.command {
        Commands::Init { force, seed } => commands::init::execute(&ctx, *force, *seed),
        Commands::Version => commands::version::execute(json),
        Commands::Completions { shell } => commands::completions::execute(shell),
        Commands::Config { command } => commands::config::execute(command, &ctx),
        Commands::User { command } => commands::user::execute(command, &ctx),

        // Records
        Commands::Driver { command } => commands::driver::execute(command, &ctx),
        Commands::ViolationType { command } => commands::violation_type::execute(command, &ctx),
        Commands::Citation { command } => commands::citation::execute(command, &ctx),
        Commands::Fine { command } => commands::citation::execute_fine(command, &ctx),

        // Cashier
        Commands::Payment { command } => commands::payment::execute(command, &ctx),
        Commands::Receipt { command } => commands::receipt::execute(command, &ctx),

        // Office
        Commands::Report { command } => commands::report::execute(command, &ctx),
        Commands::Audit { command } => commands::audit::execute(command, &ctx),
        Commands::Backup { command } => commands::backup::execute(command, &ctx),
        Commands::Import { command } => commands::import::execute(command, &ctx),

        Commands::Serve { bind } => commands::serve::execute(&ctx, bind.as_deref()),
    }
}
