use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use platform_edge::config::{load_config, EdgeConfig};
use platform_edge::observability::logging;
use platform_edge::routing::{AuthStatus, GuardDecision, RouteGuard};
use platform_edge::session::{ApiClient, ApiRequest, FileStorage, RegisterOutcome, SessionError, SessionManager};

#[derive(Parser)]
#[command(name = "edge-cli")]
#[command(about = "Session client for the platform API", long_about = None)]
struct Cli {
    /// API root, as served by the edge proxy.
    #[arg(short, long, default_value = "http://localhost:3000/api")]
    url: String,

    /// TOML configuration file (session and route settings).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login { email: String, password: String },
    /// Create an account
    Register {
        email: String,
        password: String,
        #[arg(long)]
        referral_code: Option<String>,
    },
    /// Confirm an email address
    VerifyEmail { token: String },
    /// Install tokens from an OAuth or magic-link callback
    Callback { access_token: String, refresh_token: String },
    /// Show the signed-in user
    Me,
    /// Exchange the refresh token now
    Refresh,
    /// Sign out
    Logout,
    /// Request a password reset email
    ForgotPassword { email: String },
    /// Set a new password with a reset token
    ResetPassword { token: String, password: String },
    /// Authenticated GET against any API path
    Get { path: String },
    /// Store the locale preference
    Locale { locale: String },
    /// Show what the route guard does with a page path
    Route { path: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EdgeConfig::default(),
    };
    logging::init_logging(&config.observability);

    let storage = Arc::new(FileStorage::open(&config.session.storage_path)?);
    let client = ApiClient::new(&cli.url, Duration::from_secs(config.timeouts.request_secs))?;
    let manager = SessionManager::new(client, config.session.clone(), storage);
    let guard = RouteGuard::new(&config.routes);

    if !matches!(cli.command, Commands::Login { .. } | Commands::Register { .. } | Commands::Callback { .. }) {
        manager.restore().await;
    }

    let result = match cli.command {
        Commands::Login { email, password } => manager.login(&email, &password).await.map(|_| {
            println!("Signed in");
        }),
        Commands::Register {
            email,
            password,
            referral_code,
        } => manager
            .register(&email, &password, referral_code.as_deref())
            .await
            .map(|outcome| match outcome {
                RegisterOutcome::SignedIn => println!("Registered and signed in"),
                RegisterOutcome::VerificationRequired => println!("Registered; check your email to verify"),
            }),
        Commands::VerifyEmail { token } => manager.verify_email(&token).await.map(|signed_in| {
            println!("Email verified{}", if signed_in { "; signed in" } else { "" });
        }),
        Commands::Callback {
            access_token,
            refresh_token,
        } => manager
            .exchange_callback_tokens(&access_token, &refresh_token)
            .await
            .and_then(|user| print_json(&user)),
        Commands::Me => match manager.get_current_user() {
            Some(user) => print_json(&user),
            None => manager.refresh_identity().await.and_then(|user| print_json(&user)),
        },
        Commands::Refresh => manager.refresh_session().await.map(|_| {
            println!("Session refreshed");
        }),
        Commands::Logout => {
            manager.logout().await;
            println!("Signed out; next page: {}", config.routes.login_path);
            Ok(())
        }
        Commands::ForgotPassword { email } => manager.forgot_password(&email).await.map(|_| {
            println!("If the account exists, a reset email is on its way");
        }),
        Commands::ResetPassword { token, password } => manager.reset_password(&token, &password).await.map(|_| {
            println!("Password updated");
        }),
        Commands::Get { path } => manager
            .send(&ApiRequest::get(path))
            .await
            .and_then(|value| print_json(&value)),
        Commands::Locale { locale } => manager.set_locale(&locale).map(|line| {
            println!("{}", line);
        }),
        Commands::Route { path } => {
            let status: AuthStatus = manager.state().into();
            match guard.evaluate(&path, status) {
                GuardDecision::Allow => println!("allow"),
                GuardDecision::Defer => println!("defer (session unresolved)"),
                GuardDecision::RedirectTo(target) => println!("redirect {}", target),
            }
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error [{}]: {}", e.code(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), SessionError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| SessionError::Decode(e.to_string()))?;
    println!("{}", text);
    Ok(())
}
