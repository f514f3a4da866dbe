//! podrelay-creds - Credential management tool for Podrelay
//!
//! Credentials are validated against the platform before they are saved.
//! Secret fields are never printed; `show` renders them as a mask marker.

use anyhow::Result;
use clap::{Parser, Subcommand};
use libpodrelay::credentials::MASK_MARKER;
use libpodrelay::types::ValidationResult;
use libpodrelay::{Level, PlatformId, PodrelayError, PodrelayService};
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "podrelay-creds")]
#[command(about = "Manage Podrelay platform credentials", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and store credentials for a platform
    Set {
        /// Platform name (youtube, spotify, twitter, bluesky, ...)
        platform: PlatformId,

        /// Field value as name=value; repeatable
        #[arg(long = "field", value_name = "NAME=VALUE", value_parser = parse_field)]
        fields: Vec<(String, String)>,

        /// Read name=value lines from stdin (for automation/agents)
        #[arg(long)]
        stdin: bool,

        /// Save without asking the platform first
        #[arg(long)]
        no_validate: bool,

        /// Leave the platform disabled after saving
        #[arg(long)]
        disabled: bool,
    },

    /// Show stored credentials with secrets masked
    Show {
        platform: PlatformId,
    },

    /// List every platform and its credential state
    List,

    /// Check stored credentials against the platform
    Validate {
        /// Platform name, or --all for every configured platform
        platform: Option<PlatformId>,

        /// Validate all configured platforms
        #[arg(short, long, conflicts_with = "platform")]
        all: bool,
    },

    /// Include a platform in automated runs
    Enable {
        platform: PlatformId,
    },

    /// Exclude a platform from automated runs
    Disable {
        platform: PlatformId,
    },

    /// Delete credentials for a platform
    Delete {
        platform: PlatformId,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

fn parse_field(s: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing field name in '{}'", s));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    libpodrelay::logging::init_default(cli.verbose);

    match run_command(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<PodrelayError>()
                .map(PodrelayError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run_command(command: Commands) -> Result<()> {
    let service = PodrelayService::new().await?;

    match command {
        Commands::Set {
            platform,
            fields,
            stdin,
            no_validate,
            disabled,
        } => set_credentials(&service, platform, fields, stdin, no_validate, !disabled).await,
        Commands::Show { platform } => show_credentials(&service, platform).await,
        Commands::List => list_credentials(&service).await,
        Commands::Validate { platform, all } => {
            if all {
                validate_all(&service).await
            } else if let Some(platform) = platform {
                let result = service.revalidate(platform).await?;
                report_validation(platform, &result)
            } else {
                anyhow::bail!("Either specify a platform or use --all flag");
            }
        }
        Commands::Enable { platform } => {
            service
                .credentials()
                .set_enabled(platform.level(), platform, true)
                .await?;
            println!("✓ Enabled {}", platform.display_name());
            Ok(())
        }
        Commands::Disable { platform } => {
            service
                .credentials()
                .set_enabled(platform.level(), platform, false)
                .await?;
            println!("✓ Disabled {}", platform.display_name());
            Ok(())
        }
        Commands::Delete { platform, force } => delete_credentials(&service, platform, force).await,
    }
}

/// Collect field values, validate them and save
async fn set_credentials(
    service: &PodrelayService,
    platform: PlatformId,
    args: Vec<(String, String)>,
    use_stdin: bool,
    no_validate: bool,
    enable: bool,
) -> Result<()> {
    let mut incoming: BTreeMap<String, String> = args.into_iter().collect();

    if use_stdin {
        // Explicit stdin mode: one name=value per line
        for line in io::stdin().lock().lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, value) = parse_field(line).map_err(|e| anyhow::anyhow!(e))?;
            incoming.insert(name, value);
        }
    } else if incoming.is_empty() {
        if !atty::is(atty::Stream::Stdin) {
            anyhow::bail!("Not a TTY. Use --field or --stdin to provide credentials.");
        }
        incoming = prompt_fields(platform)?;
    }

    if incoming.is_empty() {
        anyhow::bail!("No credential values given for {}", platform);
    }

    if no_validate {
        service
            .credentials()
            .save(platform.level(), platform, incoming, Some(enable), false)
            .await?;
        println!(
            "✓ Stored {} credentials without validation",
            platform.display_name()
        );
        return Ok(());
    }

    let result = service
        .validate_credentials(platform, incoming, Some(enable))
        .await?;
    if result.valid {
        println!("✓ Stored {} credentials", platform.display_name());
    }
    report_validation(platform, &result)
}

/// Ask for every schema field; empty answers keep the stored value
fn prompt_fields(platform: PlatformId) -> Result<BTreeMap<String, String>> {
    println!(
        "Enter {} credentials (leave empty to keep the current value):",
        platform.display_name()
    );
    let mut fields = BTreeMap::new();
    for spec in platform.fields() {
        let prompt = format!("  {}: ", spec.name);
        let value = if spec.secret {
            rpassword::prompt_password(&prompt)?
        } else {
            print!("{}", prompt);
            io::stdout().flush()?;
            let mut input = String::new();
            io::stdin().read_line(&mut input)?;
            input
        };
        let value = value.trim();
        if !value.is_empty() {
            fields.insert(spec.name.to_string(), value.to_string());
        }
    }
    Ok(fields)
}

fn report_validation(platform: PlatformId, result: &ValidationResult) -> Result<()> {
    if result.valid {
        println!("✓ {} credentials are valid", platform.display_name());
        let derived = result.derived.clone().into_field_updates(platform);
        for (name, value) in &derived {
            let secret = platform.field(name).is_some_and(|spec| spec.secret);
            println!("  {}: {}", name, if secret { MASK_MARKER } else { value.as_str() });
        }
        Ok(())
    } else {
        anyhow::bail!(
            "{} credentials are invalid: {}",
            platform.display_name(),
            result.error.as_deref().unwrap_or("unknown reason")
        )
    }
}

async fn show_credentials(service: &PodrelayService, platform: PlatformId) -> Result<()> {
    let view = service.credentials().view(platform.level(), platform).await?;

    println!("{} (level {})", platform.display_name(), view.level.number());
    println!("  enabled:    {}", view.enabled);
    println!("  configured: {}", view.configured);
    match view.validated_at {
        Some(at) if view.validated => println!("  validated:  {}", at.format("%Y-%m-%d %H:%M UTC")),
        _ => println!("  validated:  no"),
    }
    for spec in platform.fields() {
        let value = view.fields.get(spec.name).map(String::as_str).unwrap_or("");
        println!("  {:<22} {}", spec.name, if value.is_empty() { "-" } else { value });
    }
    Ok(())
}

async fn list_credentials(service: &PodrelayService) -> Result<()> {
    for (level, heading) in [(Level::Source, "Sources"), (Level::Target, "Targets")] {
        println!("{}:", heading);
        for platform in PlatformId::platforms_at(level) {
            let view = service.credentials().view(level, platform).await?;
            let state = match (view.configured, view.enabled) {
                (false, _) => "not configured",
                (true, true) => "enabled",
                (true, false) => "disabled",
            };
            let validated = if view.validated { ", validated" } else { "" };
            println!("  {:<10} {}{}", platform.as_str(), state, validated);
        }
    }
    Ok(())
}

async fn validate_all(service: &PodrelayService) -> Result<()> {
    let platforms = service.configured_platforms().await?;
    if platforms.is_empty() {
        println!("No configured platforms.");
        println!();
        println!("Use 'podrelay-creds set <platform>' to store credentials.");
        return Ok(());
    }

    let mut failed = 0;
    for platform in platforms {
        match service.revalidate(platform).await {
            Ok(result) if result.valid => println!("  ✓ {}", platform.display_name()),
            Ok(result) => {
                failed += 1;
                println!(
                    "  ✗ {}: {}",
                    platform.display_name(),
                    result.error.as_deref().unwrap_or("invalid")
                );
            }
            Err(e) => {
                failed += 1;
                println!("  ✗ {}: {}", platform.display_name(), e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} platform(s) failed validation", failed);
    }
    Ok(())
}

async fn delete_credentials(service: &PodrelayService, platform: PlatformId, force: bool) -> Result<()> {
    // Confirm deletion unless --force is used
    if !force && atty::is(atty::Stream::Stdin) {
        print!("Delete {} credentials? [y/N]: ", platform.display_name());
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled");
            return Ok(());
        }
    }

    if service.credentials().delete(platform.level(), platform).await? {
        println!("✓ Deleted {} credentials", platform.display_name());
    } else {
        println!("No credentials found for {}", platform.display_name());
    }
    Ok(())
}
