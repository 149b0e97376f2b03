use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use rust_decimal::Decimal;
use securepay::application::merchant::{Merchant, PaymentSubmission};
use securepay::application::network::{Network, Stores};
use securepay::config::Config;
use securepay::domain::card::CardData;
use securepay::domain::money::Amount;
use securepay::infrastructure::cipher::CipherService;
use securepay::interfaces::csv::outcome_writer::OutcomeWriter;
use securepay::interfaces::csv::payment_reader::PaymentReader;
use securepay::logging::{LogFormat, init_logging};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the JSON stores and the channel key. In-memory when omitted.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit one payment and print the outcome.
    Pay {
        #[arg(long, required_unless_present = "token")]
        card: Option<String>,
        #[arg(long, required_unless_present = "token")]
        expiry: Option<String>,
        #[arg(long)]
        cvv: String,
        #[arg(long)]
        amount: Decimal,
        /// Pay with a stored token instead of a card number.
        #[arg(long)]
        token: Option<String>,
        /// Store a token for the card if the payment is approved.
        #[arg(long)]
        save_token: bool,
    },
    /// Submit every row of a `card,expiry,cvv,amount` CSV file.
    Batch { input: PathBuf },
    /// Manage stored card tokens.
    Tokens {
        #[command(subcommand)]
        action: TokenAction,
    },
    /// Print the processor's transaction history as JSON.
    History,
}

#[derive(Subcommand)]
enum TokenAction {
    List,
    Revoke { token: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging("info", cli.log_format).into_diagnostic()?;
    let config = Config::load(cli.config.as_deref()).into_diagnostic()?;

    let (stores, cipher) = match &cli.data_dir {
        Some(dir) => Stores::json_files(dir).into_diagnostic()?,
        None => (Stores::in_memory(), CipherService::ephemeral().into_diagnostic()?),
    };
    let network = Network::new(&config, stores, cipher);

    match cli.command {
        Command::Pay {
            card,
            expiry,
            cvv,
            amount,
            token,
            save_token,
        } => {
            let amount = Amount::new(amount).into_diagnostic()?;
            let submission = match token {
                Some(token) => PaymentSubmission::with_token(cvv, token, amount),
                None => PaymentSubmission::new(
                    CardData::new(card.unwrap_or_default(), expiry.unwrap_or_default(), cvv),
                    amount,
                ),
            }
            .save_token(save_token);

            let listener = network
                .processor
                .clone()
                .spawn(config.channel.poll_interval());
            let result = network.merchant.submit(submission).await;
            listener.abort();

            let outcome = result.into_diagnostic()?;
            println!("{}", outcome);
            if let Some(code) = &outcome.authorization_code {
                println!("Authorization code: {}", code);
            }
            if let Some(token) = &outcome.token {
                println!("Token: {}", token);
            }
        }
        Command::Batch { input } => {
            let listener = network
                .processor
                .clone()
                .spawn(config.channel.poll_interval());
            let result = run_batch(&network.merchant, input).await;
            listener.abort();
            result?;
            let stats = network.processor.statistics();
            info!(
                total = stats.total,
                approved = stats.approved,
                declined = stats.declined,
                fraud = stats.fraud,
                "batch finished"
            );
        }
        Command::Tokens { action } => match action {
            TokenAction::List => {
                for (token, masked) in network.merchant.vault().list().await.into_diagnostic()? {
                    println!("{}\t{}", token, masked);
                }
            }
            TokenAction::Revoke { token } => {
                if !network.merchant.vault().revoke(&token).await.into_diagnostic()? {
                    return Err(miette!("Token not found: {}", token));
                }
                println!("Token revoked: {}", token);
            }
        },
        Command::History => {
            let history = network.processor.history().await.into_diagnostic()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&history).into_diagnostic()?
            );
        }
    }

    Ok(())
}

async fn run_batch(merchant: &Merchant, input: PathBuf) -> Result<()> {
    let file = File::open(input).into_diagnostic()?;
    let reader = PaymentReader::new(file);
    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());

    for (index, row) in reader.payments().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                eprintln!("Error reading row {}: {}", index + 1, e);
                continue;
            }
        };
        match merchant
            .submit(PaymentSubmission::new(row.card_data(), row.amount))
            .await
        {
            Ok(outcome) => writer.write(&outcome).into_diagnostic()?,
            Err(e) => {
                warn!(row = index + 1, error = %e, "payment not submitted");
                eprintln!("Error submitting row {}: {}", index + 1, e);
            }
        }
    }

    writer.flush().into_diagnostic()
}
