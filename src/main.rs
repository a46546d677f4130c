// src/main.rs

use std::process::ExitCode;

use tracing::debug;
use uncov::cmds::{CommandContext, Registry};
use uncov::db::Db;
use uncov::history::BuildHistory;
use uncov::invocation::Invocation;
use uncov::repo::Repository;
use uncov::settings::Settings;
use uncov::Error;

/// Name of the database file inside the `.git` directory.
const DATABASE_FILE: &str = "uncov.sqlite";
/// Name of the configuration file inside the `.git` directory.
const CONFIG_FILE: &str = "uncov.ini";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let invocation = Invocation::new(std::env::args().collect());
    match run(&invocation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::AlreadyReported) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(invocation: &Invocation) -> uncov::Result<()> {
    let registry = Registry::new();

    if let Some(error) = invocation.error() {
        eprintln!("Usage error: {error}\n\n{}", invocation.usage());
        return Err(Error::AlreadyReported);
    }

    if invocation.should_print_help() {
        return registry
            .find("help")
            .expect("help command is registered")
            .exec_generic(&registry, "help", &[]);
    }

    if invocation.should_print_version() {
        println!("uncov v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let name = invocation.subcommand_name();
    let Some(cmd) = registry.find(name) else {
        eprintln!("Unknown subcommand: {name}");
        return Err(Error::AlreadyReported);
    };

    let args = invocation.subcommand_args();
    Registry::check_arg_count(cmd, name, args)?;

    if cmd.is_generic() {
        return cmd.exec_generic(&registry, name, args);
    }

    let repo = Repository::discover(invocation.repository_path())?;
    let data_dir = repo.git_path();
    debug!("Using data directory: {}", data_dir.display());

    let mut settings = Settings::default();
    settings.load_from_file(&data_dir.join(CONFIG_FILE));

    let mut db = Db::open(data_dir.join(DATABASE_FILE))?;
    let mut bh = BuildHistory::new(&mut db);

    let mut ctx = CommandContext {
        settings: &settings,
        bh: &mut bh,
        repo: &repo,
    };
    cmd.exec_repo(&mut ctx, name, args)
}
