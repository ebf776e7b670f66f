use anyhow::Context;
use clap::Parser;
use owo_colors::OwoColorize;

use scp_shell::config::Cli;
use scp_shell::console::Console;
use scp_shell::host::Filesystem;
use scp_shell::local::LocalFs;
use scp_shell::remote::Remote;
use scp_shell::repl;
use scp_shell::shell::Shell;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let destination = cli.destination()?;
    let mut remote = Remote::connect(&destination, cli.stat_ttl)
        .with_context(|| format!("could not open a session to {}", destination.host))?;

    if let Some(dir) = &cli.directory {
        remote
            .chdir(dir)
            .with_context(|| format!("could not change to remote directory {dir}"))?;
    }

    let shell = Shell::new(Box::new(remote), Box::new(LocalFs))
        .with_console(Console::detect())
        .with_color(cli.color());

    repl::run(shell, cli.history_path()).context("line editor failed")?;
    Ok(())
}
