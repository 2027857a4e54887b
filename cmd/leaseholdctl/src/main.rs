use clap::{Parser, Subcommand};
use pkg_constants::network::{DEFAULT_API_ADDR, REQUESTED_BY_HEADER};
use pkg_types::options::{LeaseOptions, parse_assignment};
use serde_json::{Value, json};
use tracing::info;

#[derive(Parser)]
#[command(name = "leaseholdctl", about = "CLI tool for managing ephemeral leases")]
struct Cli {
    /// Server API endpoint
    #[arg(long, default_value = DEFAULT_API_ADDR)]
    server: String,

    /// Bearer token for the lease API
    #[arg(long, default_value = "")]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a new lease
    Create {
        /// Region to create the instance in
        #[arg(long)]
        region: String,
        /// Lease option as key=value (repeatable)
        #[arg(long = "opt", value_name = "KEY=VALUE")]
        opts: Vec<String>,
        /// Extra arguments passed to the workload
        #[arg(long, default_value = "")]
        extra_args: String,
        /// Requester identity recorded on the lease
        #[arg(long)]
        requested_by: Option<String>,
    },
    /// List running leases
    List {
        /// Show pins
        #[arg(long)]
        verbose: bool,
    },
    /// Show one lease
    Get { name: String },
    /// Delete a lease
    Delete { name: String },
    /// Restart a lease's workload
    Restart { name: String },
    /// Extend a lease, e.g. `extend brave-otter 30m`
    Extend { name: String, duration: String },
    /// Download a lease's gzip log archive
    Logs {
        name: String,
        /// Output file (defaults to <name>.log.gz)
        #[arg(long, short)]
        output: Option<String>,
    },
    /// Show drift between the provider and the lease cache
    Report,
    /// Show engine limits and load
    Info,
}

async fn check(resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    let message = body["error"].as_str().unwrap_or("no details");
    eprintln!("Error: server returned {}: {}", status, message);
    std::process::exit(1);
}

fn print_leases(leases: &[Value]) {
    println!(
        "{:<20} {:<10} {:<16} {:<10} {:<6} {:<12} {}",
        "NAME", "REGION", "ADDRESS", "PHASE", "PIN", "REQUESTER", "EXPIRES"
    );
    for lease in leases {
        println!(
            "{:<20} {:<10} {:<16} {:<10} {:<6} {:<12} {}",
            lease["name"].as_str().unwrap_or("-"),
            lease["region"].as_str().unwrap_or("-"),
            lease["main_address"].as_str().unwrap_or("-"),
            lease["phase"].as_str().unwrap_or("-"),
            lease["pin"].as_str().unwrap_or("****"),
            lease["requested_by"].as_str().unwrap_or("-"),
            lease["expires_at"].as_str().unwrap_or("never"),
        );
    }
    if leases.is_empty() {
        println!("(no leases running)");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let client = reqwest::Client::builder().build()?;
    let base = cli.server.trim_end_matches('/').to_string();
    let url = |path: &str| format!("{}/api/v1{}", base, path);
    let auth = |req: reqwest::RequestBuilder| req.bearer_auth(&cli.token);

    match &cli.command {
        Commands::Create {
            region,
            opts,
            extra_args,
            requested_by,
        } => {
            let mut options = LeaseOptions::new();
            for opt in opts {
                let (key, value) = parse_assignment(opt)?;
                options.insert(&key, value);
            }
            info!("Requesting lease in {} from {}", region, base);
            let mut req = auth(client.post(url("/leases"))).json(&json!({
                "region": region,
                "options": options,
                "extra_args": extra_args,
            }));
            if let Some(requester) = requested_by {
                req = req.header(REQUESTED_BY_HEADER, requester);
            }
            let resp = check(req.send().await?).await?;
            let partial = resp.status() == reqwest::StatusCode::MULTI_STATUS;
            let body: Value = resp.json().await?;
            let lease = if partial { &body["lease"] } else { &body };
            println!("Lease:    {}", lease["name"].as_str().unwrap_or("-"));
            println!("Address:  {}", lease["main_address"].as_str().unwrap_or("-"));
            println!("Region:   {}", lease["region"].as_str().unwrap_or("-"));
            println!("Pin:      {}", lease["pin"].as_str().unwrap_or("-"));
            if partial {
                eprintln!(
                    "Warning: {}",
                    body["error"].as_str().unwrap_or("lease is not recorded")
                );
            }
        }
        Commands::List { verbose } => {
            let resp = auth(client.get(url(&format!("/leases?verbose={}", verbose))))
                .send()
                .await?;
            let leases: Vec<Value> = check(resp).await?.json().await?;
            print_leases(&leases);
        }
        Commands::Get { name } => {
            let resp = auth(client.get(url(&format!("/leases/{}", name))))
                .send()
                .await?;
            let lease: Value = check(resp).await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&lease)?);
        }
        Commands::Delete { name } => {
            let resp = auth(client.delete(url(&format!("/leases/{}", name))))
                .send()
                .await?;
            check(resp).await?;
            println!("Deleted {}", name);
        }
        Commands::Restart { name } => {
            let resp = auth(client.post(url(&format!("/leases/{}/restart", name))))
                .send()
                .await?;
            check(resp).await?;
            println!("Restarted {}", name);
        }
        Commands::Extend { name, duration } => {
            let resp = auth(client.post(url(&format!("/leases/{}/extend", name))))
                .json(&json!({ "duration": duration }))
                .send()
                .await?;
            let body: Value = check(resp).await?.json().await?;
            let total = body["granted_extension_secs"].as_u64().unwrap_or(0);
            println!(
                "Extended {} (total extension {})",
                name,
                pkg_types::validate::format_duration(std::time::Duration::from_secs(total))
            );
        }
        Commands::Logs { name, output } => {
            let resp = auth(client.get(url(&format!("/leases/{}/logs", name))))
                .send()
                .await?;
            let archive = check(resp).await?.bytes().await?;
            let path = output
                .clone()
                .unwrap_or_else(|| format!("{}{}", name, pkg_constants::lease::LOG_ARCHIVE_SUFFIX));
            tokio::fs::write(&path, &archive).await?;
            println!("Wrote {} bytes to {}", archive.len(), path);
        }
        Commands::Report => {
            let resp = auth(client.get(url("/reconcile"))).send().await?;
            let report: Value = check(resp).await?.json().await?;
            let leases = report["leases"].as_array().cloned().unwrap_or_default();
            print_leases(&leases);
            let names = |key: &str| -> Vec<String> {
                report[key]
                    .as_array()
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default()
            };
            println!();
            println!("Stale records:        {}", names("stale_records").join(", "));
            println!("Untracked instances:  {}", names("untracked_instances").join(", "));
        }
        Commands::Info => {
            info!("Querying engine info from {}", base);
            let resp = client.get(url("/info")).send().await?;
            let info: Value = check(resp).await?.json().await?;
            println!("Endpoint:         {}", info["endpoint"].as_str().unwrap_or("-"));
            println!("Version:          {}", info["version"].as_str().unwrap_or("-"));
            println!("Provider:         {}", info["provider"].as_str().unwrap_or("-"));
            println!("Max leases:       {}", info["max_concurrent_leases"]);
            println!("Max per hour:     {}", info["max_creations_per_hour"]);
            println!("Base lifetime:    {}", info["base_lifetime"].as_str().unwrap_or("-"));
            println!("Max extension:    {}", info["max_extension"].as_str().unwrap_or("-"));
            println!("Created (1h):     {}", info["creations_in_last_hour"]);
            println!("Provisioning:     {}", info["provisioning"]);
        }
    }

    Ok(())
}
