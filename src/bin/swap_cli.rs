use std::path::PathBuf;

use anyhow::{Context as _, Result};
use boltz_swap::config::BoltzSettings;
use boltz_swap::swap::CreateAutoReverseSubmarineSwap;
use boltz_swap::swap::auto::{create_auto_swap, delete_auto_swap};
use boltz_swap::swap::store::{SqliteSwapStore, SwapStore as _};
use clap::{Parser as _, Subcommand};
use serde_json::json;

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, default_value = "boltz_swap.sqlite")]
    store_path: PathBuf,

    #[arg(long, default_value = "main")]
    boltz_network: String,

    #[arg(long, default_value = "liquidv1")]
    boltz_network_liquid: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    ListSwaps {
        #[arg(long = "wallet", required = true)]
        wallets: Vec<String>,
    },
    ListReverseSwaps {
        #[arg(long = "wallet", required = true)]
        wallets: Vec<String>,
    },
    ListAutoSwaps {
        #[arg(long = "wallet", required = true)]
        wallets: Vec<String>,
    },
    CreateAutoSwap {
        #[arg(long)]
        wallet: String,

        #[arg(long, default_value = "BTC/BTC")]
        asset: String,

        /// Minimum amount to swap out, in sats.
        #[arg(long)]
        amount: u64,

        /// Balance to keep in the wallet, in sats.
        #[arg(long, default_value_t = 0)]
        balance: u64,

        #[arg(long)]
        onchain_address: String,

        #[arg(long)]
        instant_settlement: bool,

        /// Skip the swap while the claim fee estimate is above this, sat/vbyte.
        #[arg(long)]
        feerate_limit: Option<u64>,
    },
    DeleteAutoSwap {
        #[arg(long)]
        id: String,
    },
}

fn main() -> Result<()> {
    boltz_swap::logging::init().ok();
    let args = Args::parse();

    let settings = BoltzSettings {
        boltz_network: args.boltz_network,
        boltz_network_liquid: args.boltz_network_liquid,
        ..BoltzSettings::default()
    };
    settings.validate().context("validate settings")?;

    let store = SqliteSwapStore::open(args.store_path).context("open swap store")?;

    let out = match args.command {
        Command::ListSwaps { wallets } => {
            json!(store.list_submarine_swaps(&wallets).context("list swaps")?)
        }
        Command::ListReverseSwaps { wallets } => {
            json!(store.list_reverse_swaps(&wallets).context("list reverse swaps")?)
        }
        Command::ListAutoSwaps { wallets } => {
            json!(store.list_auto_swaps(&wallets).context("list auto swaps")?)
        }
        Command::CreateAutoSwap {
            wallet,
            asset,
            amount,
            balance,
            onchain_address,
            instant_settlement,
            feerate_limit,
        } => {
            let auto_swap = create_auto_swap(
                &store,
                &settings,
                CreateAutoReverseSubmarineSwap {
                    wallet,
                    asset,
                    amount,
                    balance,
                    instant_settlement,
                    onchain_address,
                    feerate_limit,
                },
            )
            .context("create auto swap")?;
            json!(auto_swap)
        }
        Command::DeleteAutoSwap { id } => {
            delete_auto_swap(&store, &id).context("delete auto swap")?;
            json!({ "deleted": id })
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
