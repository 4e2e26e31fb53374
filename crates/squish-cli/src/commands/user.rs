//! User command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use squish_core::auth::{Role, UserInfo, UserStore};
use squish_core::jobs::JobStore;

use super::{UserAction, UserArgs};
use crate::ui::rule;

/// Run the user command.
pub async fn run(args: UserArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = Some(dir);
    }
    let mut users = UserStore::from_config(&config).context("Failed to open user store")?;

    match args.action {
        UserAction::Add {
            username,
            admin,
            password,
        } => {
            let role = if admin { Role::Admin } else { Role::User };
            let user = users.create(&username, &password, role)?;
            println!("Created {} account '{}'.", user.role, user.username);
        }

        UserAction::List { json } => {
            let infos: Vec<UserInfo> = users.list().iter().map(|u| u.info()).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&infos)?);
            } else if infos.is_empty() {
                println!("No accounts. The first account registered becomes an admin.");
            } else {
                println!();
                println!("Accounts:");
                rule(60);
                for info in &infos {
                    println!(
                        "  {:32}  {:6}  {}",
                        info.username,
                        info.role.to_string(),
                        info.id
                    );
                }
                rule(60);
            }
        }

        UserAction::Remove { username } => {
            let id = users
                .find_by_username(&username)
                .map(|u| u.id)
                .with_context(|| format!("User not found: {}", username))?;
            let user = users.remove(&id)?;

            let owned = count_owned_jobs(&config, &user.id);
            println!("Removed account '{}'.", user.username);
            if owned > 0 {
                println!("  {} jobs uploaded by this account were kept.", owned);
            }
        }

        UserAction::Passwd { username, password } => {
            let id = users
                .find_by_username(&username)
                .map(|u| u.id)
                .with_context(|| format!("User not found: {}", username))?;
            users.set_password(&id, &password)?;
            println!("Password changed for '{}'.", username);
        }
    }

    Ok(())
}

fn count_owned_jobs(config: &squish_core::config::Config, owner: &uuid::Uuid) -> usize {
    JobStore::from_config(config).map_or(0, |store| {
        store
            .list(None)
            .iter()
            .filter(|job| job.owner.as_ref() == Some(owner))
            .count()
    })
}
