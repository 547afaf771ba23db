//! adportal CLI - command-line shell for the directory management portal
//!
//! Owns exactly one session controller per process, prints the events it
//! publishes and shuts it down before exiting.

use adportal_client::{ApiClientConfig, HttpSessionApi};
use adportal_core::{
    init_logging, log_operation_error, log_operation_start, log_operation_success, PortalConfig,
    PortalError, PortalResult, SessionApi, User,
};
use adportal_session::{
    password_strength, Severity, SessionController, SessionEvent, SessionState, SessionStore,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "adportal")]
#[command(about = "Self-service client for the Active Directory management portal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and persist the session
    Login {
        #[arg(short, long)]
        username: String,

        /// Password; prompted for when omitted
        #[arg(short, long, env = "ADPORTAL_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Ask the backend for a long-lived session
        #[arg(long)]
        remember: bool,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Validate the stored session and show the account status
    Status,

    /// Show the profile of the signed-in user
    Profile,

    /// Change the password of the signed-in user
    Passwd {
        #[arg(long)]
        current: String,

        #[arg(long)]
        new: String,

        #[arg(long)]
        confirm: String,
    },

    /// Keep the stored session alive and report its lifecycle
    Watch,

    /// Score a password
    Strength { password: String },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;

    let mut logging_config = config.logging.clone();
    if cli.verbose {
        logging_config.level = "debug".to_string();
        logging_config.filter_directives = vec![
            "adportal_core=debug".to_string(),
            "adportal_client=debug".to_string(),
            "adportal_session=debug".to_string(),
        ];
    }
    init_logging(&logging_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting adportal CLI v{}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Commands::Strength { password } => {
            handle_strength(&password);
            Ok(())
        }
        Commands::Config {
            show,
            init,
            validate,
        } => handle_config(cli.config.as_ref(), &config, show, init, validate),
        command => run_session_command(command, &config).await,
    };

    if let Err(e) = result {
        e.log();
        eprintln!("❌ {}", e.user_message());
        std::process::exit(1);
    }

    Ok(())
}

fn load_config(config_path: Option<&PathBuf>) -> anyhow::Result<PortalConfig> {
    if let Some(path) = config_path {
        return PortalConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }

    for path in default_config_paths().into_iter().flatten() {
        if path.exists() {
            return PortalConfig::from_file(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()));
        }
    }

    Ok(PortalConfig::default())
}

fn default_config_paths() -> [Option<PathBuf>; 3] {
    [
        dirs::config_dir().map(|d| d.join("adportal").join("config.toml")),
        dirs::home_dir().map(|d| d.join(".adportal").join("config.toml")),
        Some(PathBuf::from("adportal.toml")),
    ]
}

fn build_controller(config: &PortalConfig) -> PortalResult<SessionController> {
    let api: Arc<dyn SessionApi> =
        Arc::new(HttpSessionApi::new(ApiClientConfig::from(&config.api))?);
    let store = SessionStore::open(config.storage.resolved_data_dir())?;

    SessionController::new(api, store, config.session.clone())
}

async fn run_session_command(command: Commands, config: &PortalConfig) -> PortalResult<()> {
    let controller = build_controller(config)?;
    let mut events = controller.subscribe();

    let result = match command {
        Commands::Login {
            username,
            password,
            remember,
        } => handle_login(&controller, &username, password, remember).await,
        Commands::Logout => {
            controller.logout().await;
            Ok(())
        }
        Commands::Status => handle_status(&controller).await,
        Commands::Profile => handle_profile(&controller).await,
        Commands::Passwd {
            current,
            new,
            confirm,
        } => handle_passwd(&controller, &mut events, &current, &new, &confirm).await,
        Commands::Watch => handle_watch(&controller, &mut events).await,
        Commands::Strength { .. } | Commands::Config { .. } => Ok(()),
    };

    controller.shutdown().await;
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }

    result
}

async fn handle_login(
    controller: &SessionController,
    username: &str,
    password: Option<String>,
    remember: bool,
) -> PortalResult<()> {
    let password = match password {
        Some(password) => password,
        None => prompt_password()?,
    };

    log_operation_start!("cli_login", username = %username);
    let session = controller
        .login(username, &password, remember)
        .await
        .map_err(|e| {
            log_operation_error!("cli_login", e);
            e
        })?;
    log_operation_success!("cli_login");

    match session.expires_at {
        Some(expires_at) => println!("⏳ Session expires at {}", expires_at.to_rfc3339()),
        None => println!("⏳ Session expiry is managed by the server"),
    }
    Ok(())
}

fn prompt_password() -> PortalResult<String> {
    print!("Password: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn require_restored(controller: &SessionController) -> PortalResult<bool> {
    if controller.restore().await? {
        return Ok(true);
    }
    println!("🔒 Not signed in. Run 'adportal login' first.");
    Ok(false)
}

async fn handle_status(controller: &SessionController) -> PortalResult<()> {
    if !require_restored(controller).await? {
        return Ok(());
    }

    if let Some(user) = controller.current_user().await {
        println!("👤 Signed in as {}", user.display_label());
    }
    if let Some(session) = controller.session().await {
        if let Some(expires_at) = session.expires_at {
            println!("⏳ Session expires at {}", expires_at.to_rfc3339());
        }
    }

    let status = controller.account_status().await?;
    println!("📋 Account status:");
    println!("   Enabled:          {}", yes_no(status.enabled));
    println!("   Locked:           {}", yes_no(status.locked));
    println!("   Password expired: {}", yes_no(status.password_expired));
    if let Some(last_set) = &status.password_last_set {
        println!("   Password set:     {}", last_set);
    }
    if let Some(expires_at) = &status.password_expires_at {
        println!("   Password expires: {}", expires_at);
    }
    if let Some(last_logon) = &status.last_logon {
        println!("   Last logon:       {}", last_logon);
    }
    Ok(())
}

async fn handle_profile(controller: &SessionController) -> PortalResult<()> {
    if !require_restored(controller).await? {
        return Ok(());
    }

    let user = controller.profile().await?;
    print_profile(&user)?;
    Ok(())
}

fn print_profile(user: &User) -> PortalResult<()> {
    println!("👤 {}", user.display_label());
    println!("   Username: {}", user.username);
    if let Some(email) = &user.email {
        println!("   Email:    {}", email);
    }
    if !user.attributes.is_empty() {
        println!("{}", serde_json::to_string_pretty(&user.attributes)?);
    }
    Ok(())
}

async fn handle_passwd(
    controller: &SessionController,
    events: &mut broadcast::Receiver<SessionEvent>,
    current: &str,
    new: &str,
    confirm: &str,
) -> PortalResult<()> {
    let strength = password_strength(new);
    println!("🔑 New password strength: {} ({}/6)", strength.label(), strength.score);

    if !require_restored(controller).await? {
        return Ok(());
    }

    controller.change_password(current, new, confirm).await?;

    // The controller signs out on its own after the configured delay
    let grace = controller.settings().forced_logout_delay() + std::time::Duration::from_secs(5);
    let signed_out = tokio::time::timeout(grace, wait_for_sign_out(events)).await;
    if signed_out.is_err() {
        debug!("Forced logout did not arrive in time, signing out");
        controller.logout().await;
    }
    Ok(())
}

async fn wait_for_sign_out(events: &mut broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                print_event(&event);
                if is_sign_out(&event) {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Event printer lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn handle_watch(
    controller: &SessionController,
    events: &mut broadcast::Receiver<SessionEvent>,
) -> PortalResult<()> {
    if !require_restored(controller).await? {
        return Ok(());
    }

    if let Some(user) = controller.current_user().await {
        println!("👀 Watching the session of {} (Ctrl-C to stop)", user.display_label());
    }

    let mut last_minutes = None;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                println!("👋 Stopped watching; the session stays stored");
                return Ok(());
            }
            received = events.recv() => match received {
                Ok(SessionEvent::SessionWarning { minutes_left }) => {
                    // Coalesce the per-tick warnings into one line per minute
                    if last_minutes != Some(minutes_left) {
                        last_minutes = Some(minutes_left);
                        print_event(&SessionEvent::SessionWarning { minutes_left });
                    }
                }
                Ok(event) => {
                    print_event(&event);
                    if is_sign_out(&event) {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event printer lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }
}

fn is_sign_out(event: &SessionEvent) -> bool {
    matches!(
        event,
        SessionEvent::StateChanged {
            state: SessionState::Unauthenticated,
            ..
        }
    )
}

fn handle_strength(password: &str) {
    let strength = password_strength(password);
    println!("🔑 {} ({}/6)", strength.label(), strength.score);
}

fn handle_config(
    config_path: Option<&PathBuf>,
    config: &PortalConfig,
    show: bool,
    init: bool,
    validate: bool,
) -> PortalResult<()> {
    if init {
        let path = match config_path {
            Some(path) => path.clone(),
            None => dirs::config_dir()
                .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
                .map(|d| d.join("adportal").join("config.toml"))
                .unwrap_or_else(|| PathBuf::from("adportal.toml")),
        };

        PortalConfig::default().save_to_file(&path)?;
        println!("✅ Configuration initialized at: {}", path.display());
        println!("📝 Edit api.base_url to point at your portal backend.");
    }

    if show {
        let rendered = toml::to_string_pretty(config).map_err(|e| PortalError::Config {
            message: format!("Failed to render configuration: {}", e),
            source: Some(Box::new(e)),
            context: adportal_core::ErrorContext::new("cli").with_operation("show_config"),
        })?;
        println!("📋 Current configuration:");
        println!("{}", rendered);
    }

    if validate {
        match config.validate() {
            Ok(()) => println!("✅ Configuration is valid"),
            Err(e) => {
                println!("❌ Configuration validation failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged { state, user, reason } => {
            let who = user.as_ref().map(User::display_label).unwrap_or("-");
            debug!(?state, ?reason, "State changed");
            println!("🔄 {:?} ({:?}, user: {})", state, reason, who);
        }
        SessionEvent::Notification(notification) => {
            let icon = match notification.severity {
                Severity::Info => "ℹ️",
                Severity::Success => "✅",
                Severity::Warning => "⚠️",
                Severity::Error => "❌",
            };
            println!("{} {}: {}", icon, notification.title, notification.message);
        }
        SessionEvent::SessionWarning { minutes_left } => {
            println!("⏰ Session expires in {} minute(s)", minutes_left);
        }
        SessionEvent::Refreshed { expires_in } => match expires_in {
            Some(seconds) => println!("🔁 Session refreshed, {}s left", seconds),
            None => println!("🔁 Session refreshed"),
        },
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_login() {
        let cli = Cli::try_parse_from([
            "adportal",
            "login",
            "--username",
            "alice",
            "--password",
            "pw",
            "--remember",
        ])
        .unwrap();

        match cli.command {
            Commands::Login {
                username,
                password,
                remember,
            } => {
                assert_eq!(username, "alice");
                assert_eq!(password.as_deref(), Some("pw"));
                assert!(remember);
            }
            _ => panic!("Expected login command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["adportal", "status", "--verbose", "-c", "custom.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
    }

    #[test]
    fn test_sign_out_detection() {
        assert!(is_sign_out(&SessionEvent::StateChanged {
            state: SessionState::Unauthenticated,
            user: None,
            reason: adportal_session::TransitionReason::Expired,
        }));
        assert!(!is_sign_out(&SessionEvent::SessionWarning { minutes_left: 3 }));
    }
}
