//! CLI tool to manage principals and credentials.
//!
//! Usage:
//!   cargo run --bin manage-credentials -- create-user --username ci-bot --roles read,write
//!   cargo run --bin manage-credentials -- create-key --user-id <id> --name deploy --scopes read
//!   cargo run --bin manage-credentials -- list-keys --user-id <id>
//!   cargo run --bin manage-credentials -- deactivate-key --id <key-id>
//!   cargo run --bin manage-credentials -- legacy-token --user-id <id>

use std::env;
use std::fmt::Display;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use token_exchange_lib::auth::scope::{format_scopes, parse_scope_param};
use token_exchange_lib::config::Config;
use token_exchange_lib::db::DbPool;
use token_exchange_lib::models::{ApiKeyListItem, ApiKeyPolicy, User};
use token_exchange_lib::services::credential_store::expiry_from;
use token_exchange_lib::services::{AuthServices, TokenStore};
use token_exchange_lib::store::{MemoryStore, Stores};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let command = args[1].as_str();
    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        return;
    }

    let config = Config::from_env().unwrap_or_else(|e| fail("Error loading config", e));

    match command {
        "create-user" => create_user(&connect(&config).await, &args).await,
        "deactivate-user" => deactivate_user(&connect(&config).await, &args).await,
        "create-key" => create_key(&connect(&config).await, &args).await,
        "list-keys" | "ls" => list_keys(&connect(&config).await, &args).await,
        "deactivate-key" => deactivate_key(&connect(&config).await, &args).await,
        "legacy-token" => legacy_token(&config, &args),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn fail(context: &str, err: impl Display) -> ! {
    eprintln!("{}: {}", context, err);
    std::process::exit(1);
}

/// Open the configured database. The in-memory store would vanish with this
/// process, so it is refused.
async fn connect(config: &Config) -> AuthServices {
    if config.database.is_memory() {
        eprintln!("Error: DATABASE_URL must point at PostgreSQL for this command");
        std::process::exit(1);
    }

    let pool = DbPool::new(config)
        .await
        .unwrap_or_else(|e| fail("Error connecting to database", e));
    pool.run_migrations()
        .await
        .unwrap_or_else(|e| fail("Error running migrations", e));

    AuthServices::new(Stores::database(pool), config.tokens.clone())
}

fn flag_value(args: &[String], names: &[&str]) -> Option<String> {
    args.iter()
        .skip(2)
        .position(|a| names.contains(&a.as_str()))
        .and_then(|i| args.get(i + 3))
        .cloned()
}

fn required_flag(args: &[String], names: &[&str]) -> String {
    flag_value(args, names).unwrap_or_else(|| {
        eprintln!("Error: {} is required", names[0]);
        std::process::exit(1);
    })
}

fn uuid_flag(args: &[String], names: &[&str]) -> Uuid {
    let raw = required_flag(args, names);
    Uuid::parse_str(&raw).unwrap_or_else(|e| fail(&format!("Invalid {}", names[0]), e))
}

fn list_flag(args: &[String], name: &str) -> Vec<String> {
    flag_value(args, &[name])
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn scopes_flag(args: &[String]) -> Option<Vec<String>> {
    parse_scope_param(flag_value(args, &["--scopes", "-s"]).as_deref())
        .unwrap_or_else(|e| fail("Invalid --scopes", e))
}

async fn create_user(services: &AuthServices, args: &[String]) {
    let username = required_flag(args, &["--username", "-u"]);
    let email = flag_value(args, &["--email"]);
    let user = User::new(username, email, list_flag(args, "--roles"));

    services
        .users
        .insert(&user)
        .await
        .unwrap_or_else(|e| fail("Error creating user", e));

    println!("User created.");
    println!("  ID:       {}", user.id);
    println!("  Username: {}", user.username);
    println!("  Roles:    {}", format_scopes(&user.roles));
}

async fn deactivate_user(services: &AuthServices, args: &[String]) {
    let id = uuid_flag(args, &["--id", "-i"]);
    match services.users.set_active(id, false).await {
        Ok(true) => println!("User {} deactivated.", id),
        Ok(false) => {
            eprintln!("User {} not found.", id);
            std::process::exit(1);
        }
        Err(e) => fail("Error deactivating user", e),
    }
}

async fn create_key(services: &AuthServices, args: &[String]) {
    let user_id = uuid_flag(args, &["--user-id"]);
    let name = required_flag(args, &["--name", "-n"]);

    let user = services
        .users
        .find_by_id(user_id)
        .await
        .unwrap_or_else(|e| fail("Error loading user", e));
    if !user.is_some_and(|u| u.is_active) {
        eprintln!("User {} not found or inactive.", user_id);
        std::process::exit(1);
    }

    let rate_limit = flag_value(args, &["--rate-limit"]).map(|v| {
        v.parse::<i32>()
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or_else(|| fail("Invalid --rate-limit", v))
    });
    let expires_at = flag_value(args, &["--expires-in", "-e"]).map(|v| {
        expiry_from(&v, Utc::now()).unwrap_or_else(|e| fail("Invalid --expires-in", e))
    });

    let policy = ApiKeyPolicy {
        scopes: scopes_flag(args).unwrap_or_default(),
        allowed_ips: list_flag(args, "--allowed-ips"),
        rate_limit,
        expires_at,
    };

    let (key, secret) = services
        .credentials
        .create(user_id, &name, policy)
        .await
        .unwrap_or_else(|e| fail("Error creating credential", e));

    println!();
    println!("Credential created. The secret is shown only once.");
    println!();
    println!("  ID:         {}", key.id);
    println!("  Access key: {}", key.access_key);
    println!("  Secret key: {}", secret);
    println!("  Scopes:     {}", format_scopes(&key.scopes));
    if let Some(expires_at) = key.expires_at {
        println!("  Expires:    {}", expires_at.to_rfc3339());
    }
    println!();
}

async fn list_keys(services: &AuthServices, args: &[String]) {
    let user_id = uuid_flag(args, &["--user-id"]);
    let keys = services
        .credentials
        .list_for_user(user_id)
        .await
        .unwrap_or_else(|e| fail("Error listing keys", e));

    if keys.is_empty() {
        println!("No credentials found.");
        return;
    }

    println!();
    println!(
        "{:<36} {:<28} {:<20} {:<24} {:<10}",
        "ID", "ACCESS KEY", "NAME", "SCOPES", "STATUS"
    );
    println!("{}", "-".repeat(120));

    let now = Utc::now();
    for key in keys {
        let status = if !key.is_active {
            "inactive"
        } else if key.is_expired_at(now) {
            "expired"
        } else {
            "active"
        };
        let item = ApiKeyListItem::from(key);

        let name = if item.name.chars().count() > 18 {
            format!("{}...", item.name.chars().take(15).collect::<String>())
        } else {
            item.name.clone()
        };

        println!(
            "{:<36} {:<28} {:<20} {:<24} {:<10}",
            item.id,
            item.access_key,
            name,
            format_scopes(&item.scopes),
            status
        );
    }
    println!();
}

async fn deactivate_key(services: &AuthServices, args: &[String]) {
    let id = uuid_flag(args, &["--id", "-i"]);

    let mut key = match services.credentials.get(id).await {
        Ok(Some(key)) if key.is_active => key,
        Ok(_) => {
            eprintln!("Credential {} not found or already inactive.", id);
            std::process::exit(1);
        }
        Err(e) => fail("Error loading credential", e),
    };

    key.is_active = false;
    services
        .credentials
        .update(key)
        .await
        .unwrap_or_else(|e| fail("Error deactivating credential", e));
    let revoked = services
        .tokens
        .revoke_all_for_key(id)
        .await
        .unwrap_or_else(|e| fail("Error revoking tokens", e));

    println!("Credential {} deactivated ({} tokens revoked).", id, revoked);
}

/// Sign a self-contained access token. Nothing is stored, so it cannot be
/// revoked before it expires.
fn legacy_token(config: &Config, args: &[String]) {
    let user_id = uuid_flag(args, &["--user-id"]);
    let scopes = scopes_flag(args);
    let ttl = flag_value(args, &["--ttl"]).map(|v| {
        v.parse::<u64>()
            .unwrap_or_else(|_| fail("Invalid --ttl", v))
    });

    // Signing touches no repository
    let tokens = TokenStore::new(Arc::new(MemoryStore::default()), config.tokens.clone());
    let ttl = tokens.settings().clamp_ttl(ttl);
    let issued = tokens
        .issue_access_token(user_id, None, scopes, ttl, Utc::now())
        .unwrap_or_else(|e| fail("Error signing token", e));

    println!("{}", issued.token);
    eprintln!("Expires: {}", issued.expires_at.to_rfc3339());
}

fn print_usage() {
    eprintln!();
    eprintln!("Usage: manage-credentials <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  create-user --username <name> [--email <email>] [--roles a,b]");
    eprintln!("                                     Create a principal");
    eprintln!("  deactivate-user --id <id>          Deactivate a principal");
    eprintln!("  create-key --user-id <id> --name <name> [--scopes a,b]");
    eprintln!("             [--allowed-ips ip,ip] [--rate-limit n] [--expires-in 90d]");
    eprintln!("                                     Create a credential");
    eprintln!("  list-keys, ls --user-id <id>       List a principal's credentials");
    eprintln!("  deactivate-key --id <id>           Deactivate a credential and revoke its tokens");
    eprintln!("  legacy-token --user-id <id> [--scopes a,b] [--ttl secs]");
    eprintln!("                                     Sign a self-contained access token");
    eprintln!("  help                               Show this help");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  manage-credentials create-user --username ci-bot --roles read");
    eprintln!(
        "  manage-credentials create-key --user-id 550e8400-e29b-41d4-a716-446655440000 --name ci --scopes read,write"
    );
    eprintln!("  manage-credentials deactivate-key --id 550e8400-e29b-41d4-a716-446655440000");
    eprintln!();
}
