//! latchkey - a terminal front-end for the latchkey account client.
//!
//! All the session machinery (token storage, refresh, passkey CRUD) lives
//! in latchkey-core; this binary is command parsing and printing.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use latchkey_core::auth::oauth;
use latchkey_core::{
    biometric_capabilities, AccountClient, Config, Gateway, Navigator, NoAuthenticator,
    PasskeyClient, RefreshCoordinator, SessionManager, TokenStore, LOGIN_ROUTE,
};

const USAGE: &str = "latchkey - account management client

USAGE:
    latchkey <command>

COMMANDS:
    login [identifier]        Sign in with a password
    google                    Sign in with Google (paste the redirect URL back)
    logout                    Sign out and clear stored tokens
    whoami                    Show the current session
    status                    Show configured sign-in methods
    passwd                    Set or change the account password
    register                  Create a new password account
    recovery generate         Generate fresh recovery codes
    recovery status           Show recovery code status
    passkeys list             List registered passkeys
    passkeys delete <id>      Delete a passkey by credential id
    capabilities              Probe WebAuthn capabilities on this host

Set LATCHKEY_API_URL (or a .env file) to point at a different server.
";

/// Initialize tracing into a daily log file under the data directory.
/// Use RUST_LOG to control the log level (e.g. RUST_LOG=debug).
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = Config::data_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let appender = tracing_appender::rolling::daily(&log_dir, "latchkey.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    Ok(guard)
}

/// There is no browser to steer; print where the user should go instead.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect_to(&self, target: &str) {
        if target == LOGIN_ROUTE {
            eprintln!("Session ended - sign in again with `latchkey login`.");
        } else {
            println!("Open in your browser:\n  {}", target);
        }
    }
}

struct Client {
    config: Config,
    gateway: Gateway,
    session: SessionManager,
}

fn build_client() -> Result<Client> {
    let config = Config::load()?;

    let token_path = Config::token_path()?;
    let store = match TokenStore::sealed(&token_path, Config::keychain_service()) {
        Ok(store) => store,
        Err(err) => {
            warn!(error = %err, "Keychain unavailable, storing tokens unsealed");
            TokenStore::plain(token_path.with_extension("json"))?
        }
    };

    let navigator: Arc<dyn Navigator> = Arc::new(TerminalNavigator);
    let refresher = RefreshCoordinator::new(&config.base_url, store.clone(), navigator)?;
    let gateway = Gateway::new(&config.base_url, store.clone(), refresher)?;
    let session = SessionManager::new(gateway.clone(), store);

    Ok(Client {
        config,
        gateway,
        session,
    })
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing()?;
    info!("latchkey starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print!("{}", USAGE);
        return Ok(());
    }

    let client = build_client()?;
    match args[0].as_str() {
        "login" => cmd_login(&client, args.get(1).map(String::as_str)).await,
        "google" => cmd_google(&client).await,
        "logout" => cmd_logout(&client).await,
        "whoami" => cmd_whoami(&client).await,
        "status" => cmd_status(&client).await,
        "passwd" => cmd_passwd(&client).await,
        "register" => cmd_register(&client).await,
        "recovery" => cmd_recovery(&client, args.get(1).map(String::as_str)).await,
        "passkeys" => cmd_passkeys(&client, &args[1..]).await,
        "capabilities" => cmd_capabilities().await,
        other => {
            eprintln!("Unknown command: {}\n", other);
            print!("{}", USAGE);
            Ok(())
        }
    }
}

async fn cmd_login(client: &Client, identifier: Option<&str>) -> Result<()> {
    let identifier = match identifier {
        Some(identifier) => identifier.to_string(),
        None => {
            let default = client.config.last_identifier.clone().unwrap_or_default();
            let label = if default.is_empty() {
                "Email or username: ".to_string()
            } else {
                format!("Email or username [{}]: ", default)
            };
            let entered = prompt(&label)?;
            if entered.is_empty() { default } else { entered }
        }
    };
    if identifier.is_empty() {
        anyhow::bail!("An email or username is required");
    }

    let password = rpassword::prompt_password("Password: ")?;
    let user = client
        .session
        .login_with_password(&identifier, &password)
        .await
        .context("Login failed")?;

    let mut config = client.config.clone();
    config.last_identifier = Some(identifier);
    config.save()?;

    println!("Signed in as {}.", user.username);
    Ok(())
}

async fn cmd_google(client: &Client) -> Result<()> {
    oauth::begin_google(&client.config.base_url, &TerminalNavigator);
    let redirect = prompt("Paste the redirect URL after signing in: ")?;
    let (user, _cleaned) = oauth::complete_google_redirect(&client.session, &redirect)
        .await
        .context("Google sign-in failed")?;
    println!("Signed in as {}.", user.username);
    Ok(())
}

async fn cmd_logout(client: &Client) -> Result<()> {
    client.session.logout().await;
    println!("Signed out.");
    Ok(())
}

async fn cmd_whoami(client: &Client) -> Result<()> {
    let state = client.session.initialize().await;
    match state.user {
        Some(user) => {
            println!("Signed in as {}", user.username);
            if let Some(email) = user.email {
                println!("Email: {}", email);
            }
        }
        None => println!("Not signed in."),
    }
    Ok(())
}

async fn cmd_status(client: &Client) -> Result<()> {
    let account = AccountClient::new(client.gateway.clone());
    let status = account.account_status().await.context("Could not fetch account status")?;

    let flag = |set: bool| if set { "yes" } else { "no" };
    println!("Password:  {}", flag(status.has_password));
    println!("Google:    {}", flag(status.has_google));
    println!(
        "Passkeys:  {}",
        if status.has_passkey {
            format!("{} active", status.passkey_count)
        } else {
            "none".to_string()
        }
    );
    Ok(())
}

async fn cmd_passwd(client: &Client) -> Result<()> {
    let account = AccountClient::new(client.gateway.clone());
    let status = account.account_status().await.context("Could not fetch account status")?;

    if status.has_password {
        let current = rpassword::prompt_password("Current password: ")?;
        let new = rpassword::prompt_password("New password: ")?;
        let confirm = rpassword::prompt_password("Confirm new password: ")?;
        account
            .change_password(&current, &new, &confirm)
            .await
            .context("Password change failed")?;
        println!("Password changed.");
    } else {
        let new = rpassword::prompt_password("New password: ")?;
        let confirm = rpassword::prompt_password("Confirm password: ")?;
        account
            .set_password(&new, &confirm)
            .await
            .context("Setting the password failed")?;
        println!("Password set.");
    }
    Ok(())
}

async fn cmd_register(client: &Client) -> Result<()> {
    let email = prompt("Email: ")?;
    let username = prompt("Username: ")?;
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    let account = AccountClient::new(client.gateway.clone());
    account
        .register(&email, &username, &password)
        .await
        .context("Registration failed")?;
    println!("Account created. Sign in with `latchkey login {}`.", username);
    Ok(())
}

async fn cmd_recovery(client: &Client, subcommand: Option<&str>) -> Result<()> {
    let account = AccountClient::new(client.gateway.clone());
    match subcommand {
        Some("generate") => {
            let batch = account
                .generate_recovery_codes()
                .await
                .context("Could not generate recovery codes")?;
            println!("Store these codes somewhere safe - they are shown only once:\n");
            for code in &batch.codes {
                println!("  {}", code);
            }
        }
        Some("status") => {
            let status = account
                .recovery_status()
                .await
                .context("Could not fetch recovery status")?;
            if status.has_codes {
                println!("{} recovery codes remaining.", status.codes_remaining);
            } else {
                println!("No recovery codes. Generate some with `latchkey recovery generate`.");
            }
        }
        _ => {
            eprintln!("Usage: latchkey recovery <generate|status>");
        }
    }
    Ok(())
}

async fn cmd_passkeys(client: &Client, args: &[String]) -> Result<()> {
    // Passkey ceremonies need a browser; from a terminal only the CRUD side
    // is reachable, which is exactly what NoAuthenticator provides.
    let passkeys = PasskeyClient::new(client.gateway.clone(), NoAuthenticator);
    match args.first().map(String::as_str) {
        Some("list") => {
            let list = passkeys.list().await.context("Could not list passkeys")?;
            if list.is_empty() {
                println!("No passkeys registered.");
                return Ok(());
            }
            for descriptor in &list {
                let created = descriptor
                    .created_at
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  [{}]  created {}  id {}",
                    descriptor.display_label(),
                    descriptor.kind(),
                    created,
                    descriptor.credential_id
                );
            }
        }
        Some("delete") => match args.get(1) {
            Some(id) => {
                let answer = prompt("Delete this passkey? It cannot be undone. [y/N] ")?;
                if !answer.eq_ignore_ascii_case("y") {
                    println!("Aborted.");
                    return Ok(());
                }
                passkeys.delete(id).await.context("Could not delete passkey")?;
                println!("Passkey deleted.");
            }
            None => eprintln!("Usage: latchkey passkeys delete <id>"),
        },
        _ => {
            eprintln!("Usage: latchkey passkeys <list|delete <id>>");
        }
    }
    Ok(())
}

async fn cmd_capabilities() -> Result<()> {
    let capabilities = biometric_capabilities(&NoAuthenticator).await;
    println!("{}", serde_json::to_string_pretty(&capabilities)?);
    Ok(())
}
