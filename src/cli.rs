//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::password::hash_password_blocking;
use crate::db::{Database, NewUser, UserRole};
use crate::rate_limit::RateLimitSettings;
use clap::Parser;
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{error, info};
use uuid::Uuid;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const GENERATED_PASSWORD_LENGTH: usize = 24;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tokenkeep",
    about = "Access and refresh token sessions for an admin backend"
)]
pub struct Args {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "tokenkeep.db")]
    pub database: String,

    /// Path to file containing the access token secret. Prefer the JWT_SECRET env var
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer the JWT_REFRESH_SECRET env var.
    /// Defaults to the access token secret
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Create an admin account with this email on startup (password from ADMIN_PASSWORD, or generated)
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Disable new user signups (admin creation via --create-admin still works)
    #[arg(long)]
    pub no_signup: bool,

    /// Trust X-Forwarded-For for client IPs (only behind a reverse proxy)
    #[arg(long)]
    pub trust_proxy: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Read a secret from `env_var` (clearing it) or from `file`.
/// Returns `Ok(None)` when neither is set.
fn read_secret(env_var: &str, file: Option<&str>) -> Result<Option<String>, ()> {
    if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        return Ok(Some(secret));
    }

    match file {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(content.trim().to_string())),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                Err(())
            }
        },
        None => Ok(None),
    }
}

fn check_length(kind: &str, secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "{} secret is shorter than {} characters. Use a longer secret",
            kind, MIN_JWT_SECRET_LENGTH
        );
        return None;
    }
    Some(secret)
}

/// Load the access and refresh secrets from environment variables or files.
/// Returns None and logs an error if either cannot be loaded.
pub fn load_jwt_secrets(
    access_secret_file: Option<&str>,
    refresh_secret_file: Option<&str>,
) -> Option<(String, String)> {
    let Some(access) = read_secret("JWT_SECRET", access_secret_file).ok()? else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --access-secret-file"
        );
        return None;
    };
    let access = check_length("Access token", access)?;

    let refresh = match read_secret("JWT_REFRESH_SECRET", refresh_secret_file).ok()? {
        Some(refresh) => check_length("Refresh token", refresh)?,
        None => access.clone(),
    };

    Some((access, refresh))
}

fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Handle the --create-admin flag: create the admin account, or promote an
/// existing account with that email.
pub async fn handle_create_admin(db: &Database, email: &str) {
    match db.users().get_by_email(email).await {
        Ok(Some(existing)) => {
            if existing.role == UserRole::Admin {
                println!();
                println!("Admin already exists: {}", existing.email);
                println!();
                return;
            }
            match db.users().set_role(existing.id, UserRole::Admin).await {
                Ok(_) => {
                    info!(subject = %existing.uuid, "Promoted existing user to admin");
                    println!();
                    println!("Promoted to admin: {}", existing.email);
                    println!();
                }
                Err(e) => {
                    error!(error = %e, "Failed to promote user to admin");
                    std::process::exit(1);
                }
            }
        }
        Ok(None) => {
            let (password, generated) = match std::env::var("ADMIN_PASSWORD") {
                Ok(password) => {
                    // SAFETY: single-threaded startup, as above.
                    unsafe { std::env::remove_var("ADMIN_PASSWORD") };
                    (password, false)
                }
                Err(_) => (generate_password(), true),
            };

            let password_hash = match hash_password_blocking(password.clone()).await {
                Ok(hash) => hash,
                Err(e) => {
                    error!(error = %e, "Failed to hash admin password");
                    std::process::exit(1);
                }
            };

            let uuid = Uuid::new_v4().to_string();
            let new_user = NewUser {
                uuid: &uuid,
                email,
                password_hash: &password_hash,
                first_name: "Admin",
                last_name: "",
                position: "Administrator",
                role: UserRole::Admin,
            };

            match db.users().create(&new_user).await {
                Ok(_) => {
                    println!();
                    println!("Admin user created: {}", email);
                    if generated {
                        println!("Password: {}", password);
                    }
                    println!();
                }
                Err(e) => {
                    error!(error = %e, "Failed to create admin user");
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to check for existing admin");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    db: Database,
    access_secret: String,
    refresh_secret: String,
    no_signup: bool,
    trust_proxy: bool,
) -> ServerConfig {
    ServerConfig {
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        no_signup,
        trust_proxy,
        rate_limits: RateLimitSettings::default(),
        ..ServerConfig::new(db, Vec::new())
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
