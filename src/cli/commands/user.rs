//! User account commands.

use super::{invalid_choice, CommandContext};
use crate::cli::UserCommands;
use crate::error::Result;
use crate::model::{Role, User};
use crate::service::UserService;
use crate::validate::normalize_role;
use colored::Colorize;

const ROLES: &str = "admin, cashier, enforcer, encoder";

fn role_arg(input: &str) -> Result<Role> {
    normalize_role(input)
        .map(|r| Role::from_str(&r))
        .map_err(invalid_choice("role", ROLES))
}

pub fn execute(command: &UserCommands, ctx: &CommandContext) -> Result<()> {
    let mut storage = ctx.open()?;
    let config = ctx.settings()?;
    let actor = ctx.actor();
    let mut service = UserService::new(&mut storage, &config);

    match command {
        UserCommands::Create { username, name, role } => {
            let user = service.create(username, name, role_arg(role)?, &actor)?;
            if crate::is_silent() {
                println!("{}", user.username);
            } else if ctx.json {
                super::print_json(&user)?;
            } else {
                println!("Created user {} ({})", user.username, user.role.as_str());
            }
        }
        UserCommands::List { all } => {
            let users = service.list(*all)?;
            if crate::is_csv() {
                println!("username,full_name,role,active");
                for u in &users {
                    println!("{},{},{},{}", u.username, crate::csv_escape(&u.full_name), u.role.as_str(), u.is_active);
                }
            } else if ctx.json {
                super::print_json(&serde_json::json!({ "users": users, "count": users.len() }))?;
            } else if users.is_empty() {
                println!("No users found.");
            } else {
                print_users(&users);
            }
        }
        UserCommands::Update { username, name, role, active } => {
            let role = role.as_deref().map(role_arg).transpose()?;
            let user = service.update(username, name.as_deref(), role, *active, &actor)?;
            if ctx.json {
                super::print_json(&user)?;
            } else {
                println!("Updated user {} ({}, {})", user.username, user.role.as_str(), status_word(&user));
            }
        }
    }
    Ok(())
}

fn status_word(user: &User) -> String {
    if user.is_active {
        "active".green().to_string()
    } else {
        "inactive".dimmed().to_string()
    }
}

fn print_users(users: &[User]) {
    println!("Users ({}):", users.len());
    for u in users {
        println!("  {:<16} {:<9} {:<30} {}", u.username, u.role.as_str(), u.full_name, status_word(u));
    }
}
