use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use log::LevelFilter;
use tracing::info;

use panebus::config::{self, AppConfig, AppPaths};
use panebus::pid;
use panebus::server;

const APP_NAME: &str = "panebus";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_serve(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging();

    match cli.command {
        Command::Serve(cmd) => async_serve(ctx, cmd),
        Command::Start(cmd) => handle_start(&ctx, cmd),
        Command::Stop => handle_stop(&ctx),
        Command::Status => handle_status(&ctx),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "panebus - control plane for AI-agent terminal sessions.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Alternate config file, or a directory holding config.toml
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Only print errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Raise log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,
    /// Emit JSON where a command supports it
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the daemon in the foreground
    Serve(ServeCommand),
    /// Start the daemon in the background
    Start(ServeCommand),
    /// Stop the background daemon
    Stop,
    /// Check whether the daemon is running
    Status,
    /// Write the default config file
    Init(InitCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Write a shell completion script to stdout
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Port to listen on (loopback only)
    #[arg(short, long)]
    port: Option<u16>,
    /// Database file to use instead of the default
    #[arg(long, value_name = "PATH")]
    database: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct InitCommand {
    /// Overwrite an existing config file
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the merged configuration
    Show,
    /// Show which config file is in use
    Path,
    /// Rewrite the config file with defaults
    Reset,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::discover(common.config.clone())?;
        let config = config::load_config(&paths)?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return;
        }

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("panebus={level},tower_http={level}")));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_ansi(io::stderr().is_terminal()))
            .try_init()
            .ok();

        // Also init env_logger for compatibility with log crate users.
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        builder.filter_level(self.effective_log_level());
        builder.try_init().ok();
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.debug {
            LevelFilter::Debug
        } else {
            match (self.common.verbose, self.config.logging.level.as_str()) {
                (0, "error") => LevelFilter::Error,
                (0, "warn") => LevelFilter::Warn,
                (0, "debug") => LevelFilter::Debug,
                (0, "trace") => LevelFilter::Trace,
                (0, _) => LevelFilter::Info,
                (1, _) => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    /// Effective config after CLI flag overrides.
    fn config_for(&self, cmd: &ServeCommand) -> AppConfig {
        let mut config = self.config.clone();
        if let Some(port) = cmd.port {
            config.port = port;
        }
        if let Some(database) = &cmd.database {
            config.database = Some(database.clone());
        }
        config
    }
}

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    let config = ctx.config_for(&cmd);
    server::serve(&config, &ctx.paths).await
}

/// Spawn a detached `serve` process and report where it landed.
fn handle_start(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    let pid_file = ctx.paths.pid_file();
    if pid::is_running(&pid_file) {
        println!(
            "daemon is already running (pid {})",
            pid::read_pid(&pid_file).unwrap_or_default()
        );
        return Ok(());
    }

    let exe = std::env::current_exe().context("resolving panebus binary path")?;
    let mut command = std::process::Command::new(exe);
    command.arg("serve");
    if let Some(config) = &ctx.common.config {
        command.arg("--config").arg(config);
    }
    if let Some(port) = cmd.port {
        command.arg("--port").arg(port.to_string());
    }
    if let Some(database) = &cmd.database {
        command.arg("--database").arg(database);
    }

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("starting panebus daemon")?;

    // Give the daemon a moment to bind and write its pid file.
    std::thread::sleep(std::time::Duration::from_millis(500));

    let config = ctx.config_for(&cmd);
    if pid::is_running(&pid_file) {
        println!(
            "daemon started (pid {}, http://127.0.0.1:{})",
            child.id(),
            config.port
        );
    } else {
        println!(
            "daemon process started (pid {}) but is not up yet; check logs if it stays down",
            child.id()
        );
    }
    Ok(())
}

fn handle_stop(ctx: &RuntimeContext) -> Result<()> {
    if pid::stop_daemon(&ctx.paths.pid_file()) {
        println!("daemon stopped");
    } else {
        println!("daemon is not running");
    }
    Ok(())
}

fn handle_status(ctx: &RuntimeContext) -> Result<()> {
    let pid_file = ctx.paths.pid_file();
    if pid::is_running(&pid_file) {
        println!(
            "daemon is running (pid {}, port {})",
            pid::read_pid(&pid_file).unwrap_or_default(),
            ctx.config.port
        );
    } else {
        println!("daemon is not running");
    }
    Ok(())
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.paths.config_file.exists() && !cmd.force {
        return Err(anyhow!(
            "refusing to overwrite {}; pass --force to replace it",
            ctx.paths.config_file.display()
        ));
    }
    config::write_default_config(&ctx.paths.config_file)?;
    info!(path = %ctx.paths.config_file.display(), "wrote default config");
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ctx.config)
                        .context("serializing config to JSON")?
                );
            } else {
                println!(
                    "{}",
                    toml::to_string_pretty(&ctx.config).context("serializing config to TOML")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
        ConfigCommand::Reset => config::write_default_config(&ctx.paths.config_file),
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}
