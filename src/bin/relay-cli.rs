use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Operator CLI for the transaction relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:5000")]
    url: String,

    /// User id sent with every request.
    #[arg(long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check relay liveness and configured chains
    Health,
    /// Prepare a transfer
    Prepare {
        #[arg(long)]
        chain: String,
        #[arg(long)]
        sender: String,
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        amount: String,
        /// Token contract; omit for a native transfer
        #[arg(long)]
        contract: Option<String>,
    },
    /// Sign and send a prepared transfer
    Confirm {
        #[arg(long)]
        chain: String,
        #[arg(long)]
        id: String,
        /// Environment variable holding the private key; the relay resolves
        /// the key itself when omitted
        #[arg(long)]
        key_env: Option<String>,
    },
    /// Show a transaction record
    Status { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Health => client.get(format!("{}/health", base)),
        Commands::Prepare {
            chain,
            sender,
            recipient,
            amount,
            contract,
        } => client.post(format!("{}/api/{}/prepare", base, chain)).json(&json!({
            "UserID": cli.user,
            "sender_address": sender,
            "recipient_address": recipient,
            "amount": amount,
            "smart_contract_address": contract,
        })),
        Commands::Confirm { chain, id, key_env } => {
            let private_key = match key_env {
                Some(var) => Some(std::env::var(&var).map_err(|_| format!("{} is not set", var))?),
                None => None,
            };
            client.post(format!("{}/api/{}/confirm", base, chain)).json(&json!({
                "UserID": cli.user,
                "transaction_id": id,
                "private_key": private_key,
            }))
        }
        Commands::Status { id } => {
            let request = client.get(format!("{}/api/transactions/{}", base, id));
            match &cli.user {
                Some(user) => request.header("UserID", user.as_str()),
                None => request,
            }
        }
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if status.is_success() {
        println!("{}", rendered);
    } else {
        eprintln!("Error: relay returned status {}", status);
        eprintln!("{}", rendered);
        std::process::exit(1);
    }
    Ok(())
}
