//! `chainstream` CLI entry-point.
//!
//! Runs the Chainstream nodes outside a workflow host, with in-memory host
//! collaborators and a real HTTP transport.
//!
//! Available sub-commands:
//! - `chains`  — list the chains the API supports.
//! - `call`    — run the action node for one resource/operation.
//! - `webhook` — check, create or delete the trigger's subscription.
//! - `verify`  — verify a saved webhook delivery offline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chainstream::models::{DEFAULT_API_BASE_URL, DEFAULT_AUTH_DOMAIN, CREDENTIAL_NAME};
use chainstream::{
    verify, ChainstreamCredential, ChainstreamNode, ChainstreamTrigger, WebhookSubscription,
    WebhookTopic,
};
use clap::{Args, Parser, Subcommand};
use nodes::memory::{MemoryCredentials, MemoryParameters, MemoryStaticData};
use nodes::{ExecutableNode, ExecutionContext, ReqwestTransport, WebhookEnvelope, WebhookNode};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "chainstream",
    about = "Run Chainstream workflow nodes from the command line",
    version
)]
struct Cli {
    #[command(flatten)]
    credential: CredentialArgs,

    #[command(subcommand)]
    command: Command,
}

/// The `chainstreamApi` credential fields.
#[derive(Args)]
struct CredentialArgs {
    #[arg(long, env = "CHAINSTREAM_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,
    #[arg(long, env = "CHAINSTREAM_DOMAIN", default_value = DEFAULT_AUTH_DOMAIN)]
    domain: String,
    #[arg(long, env = "CHAINSTREAM_CLIENT_ID", default_value = "")]
    client_id: String,
    #[arg(long, env = "CHAINSTREAM_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    client_secret: String,
    /// Reuse an existing access token instead of requesting one.
    #[arg(long, env = "CHAINSTREAM_SESSION_TOKEN", default_value = "", hide_env_values = true)]
    session_token: String,
}

impl CredentialArgs {
    fn to_credential(&self) -> ChainstreamCredential {
        let mut credential = ChainstreamCredential::new(&self.client_id, &self.client_secret);
        credential.api_base_url = self.api_base_url.clone();
        credential.domain = self.domain.clone();
        credential.session_token = self.session_token.clone();
        credential
    }
}

#[derive(Subcommand)]
enum Command {
    /// List supported chains as `value<TAB>name`.
    Chains,
    /// Run the action node and print its output items as JSON.
    Call {
        #[arg(long, default_value = "token")]
        resource: String,
        #[arg(long)]
        operation: String,
        /// Node parameter as `name=value`; values that parse as JSON are sent as JSON.
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        /// Number of (empty) input items to run.
        #[arg(long, default_value_t = 1)]
        items: usize,
        #[arg(long)]
        continue_on_fail: bool,
    },
    /// Manage the trigger's upstream subscription.
    Webhook {
        #[command(subcommand)]
        action: WebhookAction,
    },
    /// Verify a saved webhook delivery.
    Verify {
        #[arg(long, env = "CHAINSTREAM_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,
        /// Delivery header as `name=value`.
        #[arg(long = "header", value_parser = parse_key_val)]
        headers: Vec<(String, String)>,
        /// File holding the raw request body.
        #[arg(long)]
        body_file: PathBuf,
        #[arg(long, default_value = "sol.token.migrated")]
        topic: String,
        /// Unix time to verify against; defaults to now.
        #[arg(long)]
        now: Option<i64>,
    },
}

#[derive(Subcommand)]
enum WebhookAction {
    /// Report whether a subscription for the callback URL exists.
    Check(WebhookArgs),
    /// Register the callback URL.
    Create(WebhookArgs),
    /// Remove the subscription with the given id.
    Delete {
        #[command(flatten)]
        args: WebhookArgs,
        #[arg(long)]
        id: String,
    },
}

#[derive(Args)]
struct WebhookArgs {
    /// Callback URL the deliveries are sent to.
    #[arg(long)]
    url: String,
    #[arg(long, default_value = "sol.token.migrated")]
    topic: String,
    /// Optional upstream filter expression.
    #[arg(long)]
    filter: Option<String>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    Ok((key.trim().to_string(), value.to_string()))
}

fn param_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn context(credential: &CredentialArgs, params: MemoryParameters) -> Result<ExecutionContext> {
    let transport = ReqwestTransport::new().context("failed to build HTTP client")?;
    let credentials = MemoryCredentials::new().with(CREDENTIAL_NAME, credential.to_credential().to_data());
    Ok(ExecutionContext::new(
        "chainstream-cli",
        Arc::new(params),
        Arc::new(credentials),
        Arc::new(transport),
        Arc::new(MemoryStaticData::new()),
    ))
}

fn trigger_context(credential: &CredentialArgs, args: &WebhookArgs) -> Result<ExecutionContext> {
    let params = MemoryParameters::new()
        .with("topic", json!(args.topic))
        .with("filter", json!(args.filter.clone().unwrap_or_default()));
    Ok(context(credential, params)?.with_webhook_url(&args.url))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Chains => {
            let ctx = context(&cli.credential, MemoryParameters::new())?;
            for chain in ChainstreamNode::default().get_chains(&ctx).await? {
                println!("{}\t{}", chain.value, chain.name);
            }
        }
        Command::Call {
            resource,
            operation,
            params,
            items,
            continue_on_fail,
        } => {
            let mut parameters = MemoryParameters::new()
                .with("resource", json!(resource))
                .with("operation", json!(operation));
            for (name, raw) in &params {
                parameters = parameters.with(name.clone(), param_value(raw));
            }
            let ctx = context(&cli.credential, parameters)?.with_continue_on_fail(continue_on_fail);

            info!("Running {resource}/{operation} over {items} item(s)");
            let outputs = ChainstreamNode::default()
                .execute(vec![json!({}); items], &ctx)
                .await?;
            println!("{}", serde_json::to_string_pretty(&outputs)?);
        }
        Command::Webhook { action } => {
            let trigger = ChainstreamTrigger;
            match action {
                WebhookAction::Check(args) => {
                    let ctx = trigger_context(&cli.credential, &args)?;
                    match trigger.find_existing(&ctx).await? {
                        Some(id) => println!("exists: {id}"),
                        None => println!("not registered"),
                    }
                }
                WebhookAction::Create(args) => {
                    let ctx = trigger_context(&cli.credential, &args)?;
                    let subscription = trigger.subscribe(&ctx).await?;
                    println!("created: {}", subscription.id);
                }
                WebhookAction::Delete { args, id } => {
                    let ctx = trigger_context(&cli.credential, &args)?;
                    WebhookSubscription {
                        id: id.clone(),
                        topic: args.topic.parse().ok(),
                        callback_url: Some(args.url.clone()),
                        secret: None,
                    }
                    .store(ctx.static_data.as_ref());
                    if !trigger.delete(&ctx).await {
                        bail!("failed to delete webhook endpoint {id}");
                    }
                    println!("deleted: {id}");
                }
            }
        }
        Command::Verify {
            secret,
            headers,
            body_file,
            topic,
            now,
        } => {
            let body = std::fs::read(&body_file)
                .with_context(|| format!("cannot read body file {}", body_file.display()))?;
            let topic: WebhookTopic = topic.parse().map_err(anyhow::Error::msg)?;
            let envelope = WebhookEnvelope::new(headers, body);
            let now = now.unwrap_or_else(|| chrono::Utc::now().timestamp());

            match verify::verify(&envelope, &secret, topic, now) {
                Ok(scheme) => println!("valid ({scheme:?})"),
                Err(e) => {
                    eprintln!("invalid: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
