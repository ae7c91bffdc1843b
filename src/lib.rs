pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;

pub use config::Config;
use db::{NewUser, Store};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        None | Some("serve" | "-d" | "--daemon") => serve(config).await,

        Some("init" | "--init") => {
            if Config::create_default_if_missing()? {
                println!("✓ Config file created. Set the token secret and run 'authd serve'.");
            } else {
                println!("config.toml already exists.");
            }
            Ok(())
        }

        Some("create-superuser") => {
            if args.len() < 4 {
                println!("Usage: authd create-superuser <email> <username>");
                return Ok(());
            }
            cmd_create_superuser(&config, &args[2], &args[3]).await
        }

        Some("help" | "-h" | "--help") => {
            print_help();
            Ok(())
        }

        Some(other) => {
            println!("Unknown command: {other}");
            println!();
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Authd - minimal user-account service");
    println!();
    println!("USAGE:");
    println!("  authd [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("  serve             Run the API server (default)");
    println!("  init              Create default config file");
    println!("  create-superuser <email> <username>");
    println!("                    Create a superuser account (password read from stdin)");
    println!("  help              Show this help message");
    println!();
    println!("CONFIG:");
    println!("  Edit config.toml; the signing secret can also come from AUTHD_TOKEN_SECRET.");
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    info!("Authd v{} starting...", env!("CARGO_PKG_VERSION"));

    let state = api::create_app_state(config.clone()).await?;
    let app = api::router(state);

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("API listening at http://{addr}");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {e}");
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {e}"),
    }

    server_handle.abort();
    info!("Stopped");

    Ok(())
}

/// Bootstrap command: mints the first superuser so the admin-create
/// endpoint has someone to call it.
async fn cmd_create_superuser(config: &Config, email: &str, username: &str) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    println!("Password for {email}:");
    let mut password = String::new();
    std::io::stdin().read_line(&mut password)?;
    let password = password.trim_end_matches(['\r', '\n']);

    if password.is_empty() {
        println!("Password cannot be empty.");
        return Ok(());
    }

    let new = NewUser {
        email: email.to_string(),
        username: username.to_string(),
        group: "users".to_string(),
        password: password.to_string(),
        is_superuser: true,
        is_active: true,
    };

    match store.create_user(&new, &config.security).await? {
        Some(user) => {
            println!("✓ Created superuser {} (ID: {})", user.email, user.id);
        }
        None => {
            println!("Email {email} is already registered.");
        }
    }

    Ok(())
}
