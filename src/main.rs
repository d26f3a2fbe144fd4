#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unnecessary_wraps,
    dead_code
)]

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::Write;
use tracing_subscriber::{fmt, EnvFilter};

use personabot::security::redact_opt;
use personabot::{infra, providers, Config};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// Telegram bot that plays whatever role a chat gives it.
#[derive(Parser, Debug)]
#[command(name = "personabot")]
#[command(version)]
#[command(about = "Telegram persona bot backed by a chat model.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (overrides PERSONABOT_CONFIG_DIR)
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to Telegram and serve chats until Ctrl+C
    #[command(long_about = "\
Connect to Telegram and serve chats until Ctrl+C.

Needs a bot token (TELEGRAM_TOKEN) and a model API key \
(PERSONABOT_API_KEY or GOOGLE_API_KEY), either in the environment \
or in config.toml.

Examples:
  personabot start
  RUST_LOG=personabot=debug personabot start
  personabot --config-dir /etc/personabot start")]
    Start,

    /// Show the effective configuration with secrets redacted
    Status,

    /// List supported model providers
    Providers,

    /// Generate shell completion script to stdout
    #[command(long_about = "\
Generate shell completion scripts for `personabot`.

The script is printed to stdout so it can be sourced directly:

Examples:
  source <(personabot completions bash)
  personabot completions zsh > ~/.zfunc/_personabot
  personabot completions fish > ~/.config/fish/completions/personabot.fish")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("PERSONABOT_CONFIG_DIR", config_dir);
    }

    // Completions must stay stdout-only: no config, no logging.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(());
    }

    // Variables already in the environment win; a missing .env is fine.
    let dotenv_path = dotenvy::dotenv().ok();

    // Respects RUST_LOG, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    if let Some(path) = &dotenv_path {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
    let config = Config::load().await?;

    match cli.command {
        Commands::Completions { .. } => unreachable!(),
        Commands::Start => infra::run(&config).await,
        Commands::Status => {
            print_status(&config);
            Ok(())
        }
        Commands::Providers => {
            print_providers(&config);
            Ok(())
        }
    }
}

fn print_status(config: &Config) {
    println!("personabot status");
    println!();
    println!("Version:      {}", env!("CARGO_PKG_VERSION"));
    println!("Config:       {}", config.config_path.display());
    println!();
    println!("Provider:     {}", config.provider_name());
    println!(
        "Model:        {}",
        config.default_model.as_deref().unwrap_or("(default)")
    );
    println!("Temperature:  {}", config.default_temperature);
    println!("API key:      {}", redact_opt(config.api_key.as_deref()));
    println!();
    println!("Telegram:");
    println!(
        "  Bot token:        {}",
        redact_opt(config.telegram.bot_token.as_deref())
    );
    println!("  API base URL:     {}", config.telegram.api_base_url);
    println!("  Poll timeout:     {}s", config.telegram.poll_timeout_secs);
    println!("  Request timeout:  {}s", config.telegram.request_timeout_secs);
    println!();
    println!("Runtime:");
    println!("  Max workers:      {}", config.runtime.max_workers);
    println!("  Queue capacity:   {}", config.runtime.queue_capacity);
    println!("  Shutdown grace:   {}s", config.runtime.shutdown_grace_secs);
    println!();
    match config.validate() {
        Ok(()) => println!("Ready to start."),
        Err(e) => println!("Not ready: {e}"),
    }
}

fn print_providers(config: &Config) {
    let providers = providers::list_providers();
    let current = config.provider_name().trim().to_ascii_lowercase();

    println!("Supported providers ({} total):\n", providers.len());
    println!("  ID (use in config)  DESCRIPTION");
    println!("  ------------------- -----------");
    for p in &providers {
        let is_active = p.name.eq_ignore_ascii_case(&current)
            || p.aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(&current));
        let marker = if is_active { " (active)" } else { "" };
        let aliases = if p.aliases.is_empty() {
            String::new()
        } else {
            format!("  (aliases: {})", p.aliases.join(", "))
        };
        println!(
            "  {:<19} {} [default model: {}]{}{}",
            p.name, p.display_name, p.default_model, marker, aliases
        );
    }
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}
