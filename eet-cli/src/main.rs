use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eet_core::api::{EetClient, Outcome};
use eet_core::config::{Config, EnvironmentType};
use eet_core::receipt::sign::{EnvelopeSigner, private_key_from_pem};
use eet_core::receipt::{BkpCase, SaleRecord, SecurityCodes, generate_bkp_with_case, parse_request};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eet")]
#[command(about = "Czech EET sales registration client")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute PKP and BKP for a sale record.
    Codes {
        #[arg(long)]
        record: PathBuf,
        #[arg(long)]
        key: PathBuf,
        #[arg(long)]
        uppercase: bool,
    },
    /// Derive the BKP from a base64 PKP.
    Bkp {
        #[arg(long)]
        pkp: String,
        #[arg(long)]
        uppercase: bool,
    },
    /// Validate a sale record and print its wire fields.
    Request {
        #[arg(long)]
        record: PathBuf,
    },
    /// Print the signed SOAP envelope for a sale record.
    Envelope {
        #[arg(long)]
        record: PathBuf,
        #[arg(long)]
        key: PathBuf,
        #[arg(long)]
        cert: PathBuf,
    },
    /// Register a sale with the service.
    Send {
        #[arg(long)]
        record: PathBuf,
        #[arg(long)]
        key: PathBuf,
        #[arg(long)]
        cert: PathBuf,
        #[arg(long, default_value = "playground")]
        env: EnvironmentType,
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long)]
        offline: bool,
        #[arg(long)]
        user_agent: Option<String>,
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[derive(Serialize)]
struct SendReport<'a> {
    status: &'static str,
    pkp: &'a str,
    bkp: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fik: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confirmation: Option<&'a eet_core::Confirmation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    response_time_ms: u64,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn load_record(path: &Path) -> Result<SaleRecord> {
    serde_json::from_str(&read(path)?)
        .with_context(|| format!("parsing sale record {}", path.display()))
}

fn load_signer(cert: &Path, key: &Path) -> Result<EnvelopeSigner> {
    Ok(EnvelopeSigner::from_pem(&read(cert)?, &read(key)?)?)
}

fn bkp_case(uppercase: bool) -> BkpCase {
    if uppercase { BkpCase::Upper } else { BkpCase::Lower }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Codes {
            record,
            key,
            uppercase,
        } => {
            let request = parse_request(&load_record(&record)?)?;
            let key = private_key_from_pem(&read(&key)?)?;
            let codes = SecurityCodes::compute(&key, request.data(), bkp_case(uppercase))?;
            print_json(&codes)?;
        }
        Commands::Bkp { pkp, uppercase } => {
            println!("{}", generate_bkp_with_case(pkp.trim(), bkp_case(uppercase))?);
        }
        Commands::Request { record } => {
            let request = parse_request(&load_record(&record)?)?;
            print_json(&request)?;
        }
        Commands::Envelope { record, key, cert } => {
            let request = parse_request(&load_record(&record)?)?;
            let signer = load_signer(&cert, &key)?;
            let codes = signer.security_codes(request.data(), BkpCase::Lower)?;
            let envelope = signer.sign_envelope(&request, &codes)?;
            println!("{}", envelope.xml());
        }
        Commands::Send {
            record,
            key,
            cert,
            env,
            timeout_ms,
            offline,
            user_agent,
            endpoint,
        } => {
            let mut config = Config::new(env).with_offline(offline);
            if let Some(timeout_ms) = timeout_ms {
                config = config.with_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(user_agent) = user_agent {
                config = config.with_user_agent(user_agent);
            }
            if let Some(endpoint) = endpoint {
                config = config.with_endpoint(endpoint);
            }

            let client = EetClient::new(config, load_signer(&cert, &key)?)?;
            tracing::debug!(endpoint = client.endpoint(), "submitting");
            let submission = client.send(&load_record(&record)?).await?;

            let report = SendReport {
                status: match submission.outcome() {
                    Outcome::Confirmed(_) => "confirmed",
                    Outcome::Offline(_) => "offline",
                },
                pkp: submission.codes().pkp(),
                bkp: submission.codes().bkp(),
                fik: submission.fik(),
                confirmation: submission.confirmation(),
                error: submission.error().map(ToString::to_string),
                response_time_ms: millis(submission.response_time()),
            };
            print_json(&report)?;
        }
    }

    Ok(())
}
