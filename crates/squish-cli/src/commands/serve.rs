//! Serve command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use squish_core::config::Config;
use squish_core::web::WebServer;

use super::ServeArgs;
use crate::ui::{format_bytes, format_duration, rule};

/// Run the serve command.
pub async fn run(args: ServeArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let data_dir = config.storage.resolved_data_dir();
    let host = if config.server.localhost_only {
        "127.0.0.1"
    } else {
        "0.0.0.0"
    };

    println!();
    println!("Squish");
    rule(40);
    println!();
    println!("  http://{}:{}", host, config.server.port);
    if let Some(url) = &config.server.public_url {
        println!("  public URL: {}", url);
    }
    println!();
    println!("  Data:       {}", data_dir.display());
    println!("  Retention:  {}", format_duration(config.storage.retention));
    println!("  Max upload: {}", format_bytes(config.server.max_upload_bytes));
    if config.auth.jwt_secret.is_none() {
        println!();
        println!("  No auth.jwt_secret configured; sessions end when the server stops.");
    }
    println!();
    println!("Press Ctrl+C to stop the server.");

    WebServer::new(config)
        .start()
        .await
        .context("Web server failed")?;

    println!();
    println!("Server stopped.");

    Ok(())
}

fn apply_overrides(config: &mut Config, args: &ServeArgs) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.localhost_only {
        config.server.localhost_only = true;
    }
    if let Some(dir) = &args.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        let args = ServeArgs {
            port: Some(9090),
            localhost_only: true,
            data_dir: Some(PathBuf::from("/srv/squish")),
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.server.port, 9090);
        assert!(config.server.localhost_only);
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/srv/squish")));
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let mut config = Config::default();
        config.server.port = 3000;
        config.server.localhost_only = true;
        let args = ServeArgs {
            port: None,
            localhost_only: false,
            data_dir: None,
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.server.port, 3000);
        assert!(config.server.localhost_only);
        assert!(config.storage.data_dir.is_none());
    }
}
