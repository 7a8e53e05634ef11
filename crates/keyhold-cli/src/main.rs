//! keyhold - command-line front end for the keyhold identity/credential backend.
//!
//! Logs in and out, shows the current principal, manages per-service
//! credentials and their connection tests, and walks through OAuth linking.

use std::io::{self, Read, Write};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keyhold_core::config::{ENV_PASSPHRASE, ENV_PASSWORD};
use keyhold_core::{
    Capability, ClientContext, Config, CredentialRecord, Decision, Registration, SecretPayload,
    ServiceType, TokenStorage,
};

const USAGE: &str = "\
Usage: keyhold <command> [args]

Commands:
  login [username]               Log in (password from KEYHOLD_PASSWORD or prompt)
  logout                         End the session and clear local credentials
  whoami                         Show the authenticated principal
  signup <username> <email> [display name]
                                 Register a new account (does not log in)
  check <member|admin>           Check whether the session grants a capability
  creds list [--remote]          List credentials (local records or backend metadata)
  creds save <service> <json|-> [--test]
                                 Save a credential payload (JSON object, '-' reads stdin),
                                 optionally running its connection test right away
  creds test <service>           Run a connection test
  link begin [service]           Start OAuth linking (default: google_workspace)
  link complete <redirect-url>   Finish OAuth linking from the redirect URL

Credentials and pending links are kept in sealed files unlocked by the vault
passphrase (KEYHOLD_PASSPHRASE or prompt). With persist_credentials off they
last for one run only: use `creds save --test`, and `link begin` waits for
the redirect URL.

Services: slack, azure_openai, google_workspace, google_oauth, or any backend name.
Set RUST_LOG=debug for diagnostics.";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

fn password() -> Result<String> {
    match std::env::var(ENV_PASSWORD) {
        Ok(password) if !password.is_empty() => Ok(password),
        _ => Ok(rpassword::prompt_password("Password: ")?),
    }
}

/// Passphrase for sealed storage, when the configuration needs one.
fn passphrase(config: &Config) -> Result<Option<String>> {
    if config.token_storage != TokenStorage::Sealed && !config.persist_credentials {
        return Ok(None);
    }
    match std::env::var(ENV_PASSPHRASE) {
        Ok(passphrase) if !passphrase.is_empty() => Ok(Some(passphrase)),
        _ => Ok(Some(rpassword::prompt_password("Vault passphrase: ")?)),
    }
}

fn parse_service(raw: &str) -> Result<ServiceType> {
    raw.parse::<ServiceType>().map_err(anyhow::Error::msg)
}

fn read_payload(raw: &str) -> Result<SecretPayload> {
    let text = if raw == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        raw.to_string()
    };
    let value: serde_json::Value = serde_json::from_str(&text).context("Payload is not valid JSON")?;
    SecretPayload::from_value(value).map_err(anyhow::Error::msg)
}

fn print_record(record: &CredentialRecord) {
    let tested = record
        .last_tested_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    let fields: Vec<&str> = record.payload.keys().collect();
    println!(
        "{:<18} {:<15} tested: {:<24} fields: {}",
        record.service_type.as_str(),
        record.test_status.as_str(),
        tested,
        fields.join(", ")
    );
    if let Some(ref message) = record.test_message {
        println!("{:<18} {}", "", message);
    }
}

fn remember_username(username: &str) {
    let result = Config::load().and_then(|mut stored| {
        stored.last_username = Some(username.to_string());
        stored.save()
    });
    if let Err(e) = result {
        warn!(error = %e, "Failed to save config");
    }
}

async fn run(context: &ClientContext, args: &[String]) -> Result<()> {
    let arg = |i: usize| args.get(i).map(String::as_str);

    match (arg(0), arg(1)) {
        (Some("login"), username) => {
            let username = match username.map(str::to_string).or_else(|| context.config().last_username.clone()) {
                Some(username) => username,
                None => prompt("Username: ")?,
            };
            let password = password()?;
            let principal = context.login(&username, &password).await?;
            remember_username(&principal.username);
            info!(username = %principal.username, "Login complete");
            println!("Logged in as {} ({})", principal.display(), principal.role);
        }
        (Some("logout"), _) => {
            context.logout().await;
            println!("Logged out");
        }
        (Some("whoami"), _) => {
            let principal = context.current_principal().await?;
            println!("{}", principal.username);
            println!("  name:  {}", principal.display());
            println!("  email: {}", principal.email);
            println!("  role:  {}", principal.role);
            if let Some(session) = context.sessions().session() {
                println!("  token expires in {} min", session.minutes_until_expiry());
            }
        }
        (Some("signup"), Some(username)) => {
            let email = arg(2).context("signup needs an email address")?;
            let display_name = if args.len() > 3 {
                Some(args[3..].join(" "))
            } else {
                None
            };
            let password = password()?;
            let registration = Registration {
                username: username.to_string(),
                email: email.to_string(),
                display_name,
                password,
            };
            let principal = context.signup(&registration).await?;
            println!("Registered {}. Log in with `keyhold login {}`.", principal.username, principal.username);
        }
        (Some("check"), Some(capability)) => {
            let capability: Capability = capability.parse().map_err(anyhow::Error::msg)?;
            match context.authorize(capability) {
                Decision::Allow => println!("allow"),
                Decision::Deny(reason) => {
                    println!("deny: {:?}", reason);
                    std::process::exit(1);
                }
            }
        }
        (Some("creds"), Some("list")) => {
            if arg(2) == Some("--remote") {
                for credential in context.remote_credentials().await? {
                    println!(
                        "{:<18} {:<15} active: {}  {}",
                        credential.service_type.as_str(),
                        credential.test_status.as_deref().unwrap_or("not_tested"),
                        credential.is_active,
                        credential.test_message.as_deref().unwrap_or("")
                    );
                }
            } else {
                let records = context.list_credentials()?;
                if records.is_empty() {
                    println!("No credentials configured");
                }
                for record in &records {
                    print_record(record);
                }
            }
        }
        (Some("creds"), Some("save")) => {
            let service = parse_service(arg(2).context("creds save needs a service")?)?;
            let payload = read_payload(arg(3).context("creds save needs a JSON payload")?)?;
            let run_test = args[4..].iter().any(|a| a == "--test");
            let record = context.save_credential(service.clone(), payload).await?;
            if run_test {
                let verdict = context.test_credential(&service).await?;
                println!("{}: {}", verdict.test_status(), verdict.message);
            } else {
                print_record(&record);
                if !context.config().persist_credentials {
                    eprintln!("note: persist_credentials is off; pass --test to verify in this run");
                }
            }
        }
        (Some("creds"), Some("test")) => {
            let service = parse_service(arg(2).context("creds test needs a service")?)?;
            let verdict = context.test_credential(&service).await?;
            println!("{}: {}", verdict.test_status(), verdict.message);
        }
        (Some("link"), Some("begin")) => {
            let service = match arg(2) {
                Some(raw) => parse_service(raw)?,
                None => ServiceType::DocumentStore,
            };
            let url = context.begin_link(service).await?;
            println!("Open this URL to authorize access:\n\n  {}\n", url);
            if context.config().persist_credentials {
                println!("Then run `keyhold link complete '<redirect url>'`.");
            } else {
                let callback = prompt("Paste the redirect URL: ")?;
                let record = context.complete_link(&callback).await?;
                print_record(&record);
            }
        }
        (Some("link"), Some("complete")) => {
            let callback = arg(2).context("link complete needs the redirect URL")?;
            let record = context.complete_link(callback).await?;
            print_record(&record);
        }
        (Some(other), _) => bail!("Unknown command or missing arguments: '{}'\n\n{}", other, USAGE),
        (None, _) => println!("{}", USAGE),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || matches!(args[0].as_str(), "help" | "--help" | "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load().context("Failed to load config")?;
    config.apply_env();

    let passphrase = passphrase(&config)?;
    let context = ClientContext::init(config, passphrase.as_deref())
        .context("Failed to initialize client context")?;

    let result = run(&context, &args).await;
    context.teardown();
    result
}
