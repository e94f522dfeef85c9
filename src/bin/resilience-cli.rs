use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use paes_resilience::resilience::retries::{retry_with_backoff, RetryPolicy};

#[derive(Parser)]
#[command(name = "resilience-cli")]
#[command(about = "Management CLI for the PAES resilience service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    /// Attempts per request when the service is unreachable
    #[arg(long, default_value_t = 3)]
    attempts: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service status
    Status,
    /// List circuit breakers
    Breakers,
    /// Reset a circuit breaker
    Reset { name: String },
    /// Query performance statistics
    Queries,
    /// Show stored log entries
    Logs {
        #[arg(long)]
        level: Option<String>,
        #[arg(long)]
        module: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Check whether a resource URL is reachable
    Validate { url: String },
    /// Predict next routes
    Predict { route: String },
    /// Record a navigation event
    Navigate { from: String, to: String },
    /// Random cache status
    Entropy,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let build = || {
        let request = match &cli.command {
            Commands::Status => client.get(format!("{}/admin/status", base)),
            Commands::Breakers => client.get(format!("{}/admin/breakers", base)),
            Commands::Reset { name } => {
                client.post(format!("{}/admin/breakers/{}/reset", base, name))
            }
            Commands::Queries => client.get(format!("{}/admin/queries", base)),
            Commands::Logs { level, module, limit } => {
                let mut query: Vec<(&str, String)> = Vec::new();
                if let Some(level) = level {
                    query.push(("level", level.clone()));
                }
                if let Some(module) = module {
                    query.push(("module", module.clone()));
                }
                if let Some(limit) = limit {
                    query.push(("limit", limit.to_string()));
                }
                client.get(format!("{}/admin/logs", base)).query(&query)
            }
            Commands::Validate { url } => client
                .get(format!("{}/admin/resources/validate", base))
                .query(&[("url", url)]),
            Commands::Predict { route } => client
                .get(format!("{}/admin/navigation/predict", base))
                .query(&[("route", route)]),
            Commands::Navigate { from, to } => client
                .post(format!("{}/admin/navigation", base))
                .json(&serde_json::json!({ "from": from, "to": to })),
            Commands::Entropy => client.get(format!("{}/admin/entropy", base)),
        };
        request.headers(headers.clone())
    };

    // Only connection-level failures are retried; HTTP errors are reported as-is.
    let policy = RetryPolicy {
        max_attempts: cli.attempts.max(1),
        ..RetryPolicy::default()
    };
    let res = retry_with_backoff(
        &policy,
        |_attempt| build().send(),
        |e: &reqwest::Error| e.is_connect() || e.is_timeout(),
    )
    .await?;

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    if status == reqwest::StatusCode::NO_CONTENT {
        println!("OK");
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
