use bankgate::application::flow::PaymentFlow;
use bankgate::config::Settings;
use bankgate::domain::ports::SoapTransportRef;
use bankgate::domain::transaction::{Amount, Transaction};
use bankgate::error::GatewayError;
use bankgate::infrastructure::soap::HttpSoapTransport;
use bankgate::interfaces::json::callback_fields::parse_field;
use bankgate::interfaces::json::transaction_file::{PaymentOutput, read_transaction, write_json};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, short, default_value = "bankgate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a payment and print the redirect form with the new transaction
    Pay {
        #[arg(long)]
        gateway: String,
        /// Amount in the smallest currency unit
        #[arg(long)]
        amount: u64,
        #[arg(long)]
        order_id: String,
        /// Merchant callback URL
        #[arg(long)]
        redirect_url: String,
        #[arg(long)]
        description: Option<String>,
        /// Transaction id; defaults to the current time in milliseconds
        #[arg(long)]
        tx_id: Option<u64>,
    },
    /// Verify a payment from the fields the gateway posted back
    Verify {
        /// Transaction JSON printed by `pay`
        #[arg(long)]
        transaction: PathBuf,
        /// Callback field as KEY=VALUE, repeatable
        #[arg(long = "field", short = 'f')]
        fields: Vec<String>,
    },
    /// List enabled gateways
    Gateways,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config).into_diagnostic()?;

    match cli.command {
        Command::Gateways => {
            for descriptor in settings.enabled() {
                let reverse = if descriptor.supports_reverse {
                    "reverse"
                } else {
                    "no-reverse"
                };
                println!("{}\t{}", descriptor.name, reverse);
            }
        }
        Command::Pay {
            gateway,
            amount,
            order_id,
            redirect_url,
            description,
            tx_id,
        } => {
            let transport = transport(&settings)?;
            let adapter = settings.build_gateway(&gateway, transport).into_diagnostic()?;

            let id = tx_id.unwrap_or_else(|| chrono::Utc::now().timestamp_millis().unsigned_abs());
            let amount = Amount::new(amount).into_diagnostic()?;
            let mut tx = Transaction::new(id, amount, order_id, redirect_url, gateway);
            tx.description = description;

            let mut flow = PaymentFlow::new(adapter.as_ref(), &mut tx);
            let form = flow.pay().await.into_diagnostic()?;

            let output = PaymentOutput {
                form: &form,
                transaction: &tx,
            };
            write_json(io::stdout().lock(), &output).into_diagnostic()?;
        }
        Command::Verify {
            transaction,
            fields,
        } => {
            let file = File::open(&transaction).into_diagnostic()?;
            let mut tx = read_transaction(file).into_diagnostic()?;
            let fields = fields
                .iter()
                .map(String::as_str)
                .map(parse_field)
                .collect::<bankgate::error::Result<Vec<_>>>()
                .into_diagnostic()?;

            let transport = transport(&settings)?;
            let adapter = settings.build_gateway(&tx.gateway, transport).into_diagnostic()?;

            let mut flow = PaymentFlow::new(adapter.as_ref(), &mut tx);
            flow.receive_callback(fields).await.into_diagnostic()?;
            if !flow.can_continue_with_callback_parameters() {
                tracing::warn!("callback does not report a successful payment");
            }
            let verified = flow.verify().await;
            if matches!(verified, Err(GatewayError::Business { .. })) {
                flow.mark_failed().await.into_diagnostic()?;
            }

            write_json(io::stdout().lock(), &tx).into_diagnostic()?;
            verified.into_diagnostic()?;
        }
    }

    Ok(())
}

fn transport(settings: &Settings) -> Result<SoapTransportRef> {
    let transport = HttpSoapTransport::new(settings.transport.timeout()).into_diagnostic()?;
    Ok(Arc::new(transport))
}
