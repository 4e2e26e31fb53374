//! Config command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use squish_core::auth::generate_secret;
use squish_core::config::{humantime_serde, Config};

use super::{ConfigAction, ConfigArgs};
use crate::ui::{format_bytes, format_duration, rule};

/// Keys understood by `config get` and `config set`.
const KEYS: &[&str] = &[
    "server.port",
    "server.localhost_only",
    "server.public_url",
    "server.max_upload_bytes",
    "server.cors",
    "server.allow_registration",
    "storage.data_dir",
    "storage.retention",
    "compression.min_savings",
    "compression.large_threshold",
    "compression.medium_threshold",
    "compression.ffmpeg_path",
    "compression.tool_timeout",
    "jobs.max_entries",
    "jobs.sweep_interval",
    "auth.jwt_secret",
    "auth.token_ttl",
];

/// Run the config command.
pub async fn run(args: ConfigArgs, config_path: Option<&Path>) -> Result<()> {
    let path = super::config_file(config_path);

    match args.action {
        ConfigAction::Path => {
            println!("{}", path.display());
        }

        ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            let mut config = Config::default();
            config.auth.jwt_secret = Some(generate_secret());
            config.save_to(&path)?;
            println!("Wrote {}", path.display());
        }

        ConfigAction::Show => {
            let config = super::load_config(Some(&path))?;
            show(&config, &path);
        }

        ConfigAction::Get { key } => {
            let config = super::load_config(Some(&path))?;
            match get_config_value(&config, &key) {
                Some(v) => println!("{}: {}", key, v),
                None => anyhow::bail!("Unknown configuration key: {} (known: {})", key, KEYS.join(", ")),
            }
        }

        ConfigAction::Set { key, value } => {
            let mut config = super::load_config(Some(&path))?;
            if !set_config_value(&mut config, &key, &value)? {
                anyhow::bail!("Unknown configuration key: {} (known: {})", key, KEYS.join(", "));
            }
            config.validate()?;
            config.save_to(&path)?;
            println!("Set {} = {}", key, value);
        }
    }

    Ok(())
}

fn show(config: &Config, path: &Path) {
    println!();
    println!("Squish Configuration ({})", path.display());
    rule(50);
    println!();
    println!("[server]");
    println!("  port = {}", config.server.port);
    println!("  localhost_only = {}", config.server.localhost_only);
    println!(
        "  public_url = {}",
        config.server.public_url.as_deref().unwrap_or("(none)")
    );
    println!(
        "  max_upload_bytes = {} ({})",
        config.server.max_upload_bytes,
        format_bytes(config.server.max_upload_bytes)
    );
    println!("  cors = {}", config.server.cors);
    println!("  allow_registration = {}", config.server.allow_registration);
    println!();
    println!("[storage]");
    println!(
        "  data_dir = \"{}\"",
        config.storage.resolved_data_dir().display()
    );
    println!("  retention = \"{}\"", format_duration(config.storage.retention));
    println!();
    println!("[compression]");
    println!("  min_savings = {}", config.compression.min_savings);
    println!(
        "  large_threshold = {} ({})",
        config.compression.large_threshold,
        format_bytes(config.compression.large_threshold)
    );
    println!(
        "  medium_threshold = {} ({})",
        config.compression.medium_threshold,
        format_bytes(config.compression.medium_threshold)
    );
    println!(
        "  ffmpeg_path = \"{}\"",
        config.compression.ffmpeg_path.display()
    );
    println!(
        "  tool_timeout = \"{}\"",
        format_duration(config.compression.tool_timeout)
    );
    println!();
    println!("[jobs]");
    println!("  max_entries = {}", config.jobs.max_entries);
    println!(
        "  sweep_interval = \"{}\"",
        format_duration(config.jobs.sweep_interval)
    );
    println!();
    println!("[auth]");
    println!("  jwt_secret = {}", mask_secret(config.auth.jwt_secret.as_deref()));
    println!("  token_ttl = \"{}\"", format_duration(config.auth.token_ttl));
    println!();
}

fn mask_secret(secret: Option<&str>) -> &'static str {
    match secret {
        Some(_) => "(set)",
        None => "(generated at startup)",
    }
}

fn get_config_value(config: &Config, key: &str) -> Option<String> {
    let value = match key {
        "server.port" => config.server.port.to_string(),
        "server.localhost_only" => config.server.localhost_only.to_string(),
        "server.public_url" => config.server.public_url.clone().unwrap_or_default(),
        "server.max_upload_bytes" => config.server.max_upload_bytes.to_string(),
        "server.cors" => config.server.cors.to_string(),
        "server.allow_registration" => config.server.allow_registration.to_string(),
        "storage.data_dir" => config.storage.resolved_data_dir().display().to_string(),
        "storage.retention" => format_duration(config.storage.retention),
        "compression.min_savings" => config.compression.min_savings.to_string(),
        "compression.large_threshold" => config.compression.large_threshold.to_string(),
        "compression.medium_threshold" => config.compression.medium_threshold.to_string(),
        "compression.ffmpeg_path" => config.compression.ffmpeg_path.display().to_string(),
        "compression.tool_timeout" => format_duration(config.compression.tool_timeout),
        "jobs.max_entries" => config.jobs.max_entries.to_string(),
        "jobs.sweep_interval" => format_duration(config.jobs.sweep_interval),
        "auth.jwt_secret" => mask_secret(config.auth.jwt_secret.as_deref()).to_string(),
        "auth.token_ttl" => format_duration(config.auth.token_ttl),
        _ => return None,
    };
    Some(value)
}

fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<bool> {
    let duration = |value: &str| {
        humantime_serde::parse(value)
            .with_context(|| format!("Invalid duration '{}'. Use forms like 90s, 5m, 24h", value))
    };
    let optional = |value: &str| (!value.trim().is_empty()).then(|| value.to_string());

    match key {
        "server.port" => config.server.port = value.parse()?,
        "server.localhost_only" => config.server.localhost_only = value.parse()?,
        "server.public_url" => config.server.public_url = optional(value),
        "server.max_upload_bytes" => config.server.max_upload_bytes = value.parse()?,
        "server.cors" => config.server.cors = value.parse()?,
        "server.allow_registration" => config.server.allow_registration = value.parse()?,
        "storage.data_dir" => config.storage.data_dir = optional(value).map(PathBuf::from),
        "storage.retention" => config.storage.retention = duration(value)?,
        "compression.min_savings" => config.compression.min_savings = value.parse()?,
        "compression.large_threshold" => config.compression.large_threshold = value.parse()?,
        "compression.medium_threshold" => config.compression.medium_threshold = value.parse()?,
        "compression.ffmpeg_path" => config.compression.ffmpeg_path = PathBuf::from(value),
        "compression.tool_timeout" => config.compression.tool_timeout = duration(value)?,
        "jobs.max_entries" => config.jobs.max_entries = value.parse()?,
        "jobs.sweep_interval" => config.jobs.sweep_interval = duration(value)?,
        "auth.jwt_secret" => config.auth.jwt_secret = optional(value),
        "auth.token_ttl" => config.auth.token_ttl = duration(value)?,
        _ => return Ok(false),
    }
    Ok(true)
}
