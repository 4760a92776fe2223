//! DEX core command line.
//!
//! Exposes the risk calculator, the quote estimator and the request meter,
//! plus a `sim` walkthrough of a position lifecycle and a few swaps.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use dex_core::config::{Config, DEFAULT_CONFIG_PATH};
use dex_core::token::spot_rate;
use dex_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::Path;

#[derive(Parser, Debug)]
#[command(name = "dex-sim")]
#[command(about = "Position risk math and swap quoting for the DEX front end")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Liquidation price for an entry, leverage and side
    Liquidation {
        #[arg(long)]
        entry: Decimal,
        #[arg(long)]
        leverage: u32,
        #[arg(long, default_value = "long")]
        side: Side,
    },
    /// Unrealized PnL of a position
    Pnl {
        #[arg(long)]
        entry: Decimal,
        #[arg(long)]
        current: Decimal,
        /// Position size in USDC
        #[arg(long)]
        size: Decimal,
        #[arg(long, default_value = "long")]
        side: Side,
    },
    /// Check position inputs against the asset table
    Validate {
        asset: String,
        collateral: Decimal,
        leverage: u32,
    },
    /// Quote a swap
    Quote {
        token_in: String,
        token_out: String,
        amount: String,
        /// Account charged for the request
        #[arg(long)]
        account: Option<String>,
    },
    /// Price impact of a fill against spot
    Impact {
        amount_in: Decimal,
        amount_out: Decimal,
        /// Spot rate. Derived from --from/--to reference prices when omitted
        #[arg(long)]
        spot: Option<Decimal>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    /// Check a swap amount against the minimum
    CheckAmount {
        amount: String,
        #[arg(long)]
        min: Option<Decimal>,
    },
    /// List perps assets
    Assets,
    /// List spot tokens
    Tokens,
    /// Charge one request to an account
    Charge { account: String },
    /// Walk through a position lifecycle and some swaps
    Sim,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = load_config(&cli.config);
    config.apply_env_overrides()?;
    config.validate()?;

    dex_core::telemetry::init_logging(&config.telemetry.log_level)?;

    match cli.command {
        Commands::Liquidation { entry, leverage, side } => {
            let liq = liquidation_price(price(entry)?, leverage_of(leverage)?, side);
            emit(cli.json, &serde_json::json!({ "liquidation_price": liq }), || {
                format!("{side} {leverage}x from {entry}: liquidates at {liq}")
            })?;
        }
        Commands::Pnl { entry, current, size, side } => {
            let pnl = unrealized_pnl(price(entry)?, price(current)?, Quote::new(size), side);
            emit(cli.json, &serde_json::json!({ "unrealized_pnl": pnl }), || {
                format!("{side} {size} USDC, {entry} -> {current}: {pnl} USDC")
            })?;
        }
        Commands::Validate { asset, collateral, leverage } => {
            let result = ValidationResult::from(&validate_position(&asset, Quote::new(collateral), leverage));
            println!("{}", serde_json::to_string(&result)?);
        }
        Commands::Quote {
            token_in,
            token_out,
            amount,
            account,
        } => {
            validate_amount(&amount, config.quote.min_swap_amount)?;
            if let Some(account) = account {
                let receipt = config.meter()?.charge(&account)?;
                eprintln!("charged {} USDC, balance {}", receipt.cost, receipt.balance.value().round_dp(2));
            }
            let quote = config.estimator().quote(&token_in, &token_out, &amount)?;
            emit(cli.json, &quote, || describe_quote(&quote))?;
        }
        Commands::Impact {
            amount_in,
            amount_out,
            spot,
            from,
            to,
        } => {
            let spot = match (spot, from, to) {
                (Some(spot), _, _) => spot,
                (None, Some(from), Some(to)) => spot_rate(&from, &to),
                _ => return Err(anyhow!("pass --spot or both --from and --to")),
            };
            let impact = price_impact(amount_in, amount_out, spot);
            emit(cli.json, &serde_json::json!({ "price_impact": impact }), || {
                format!("{}%", impact.round_dp(4))
            })?;
        }
        Commands::CheckAmount { amount, min } => {
            let min = min.unwrap_or(config.quote.min_swap_amount);
            let result = ValidationResult::from(&validate_amount(&amount, min));
            println!("{}", serde_json::to_string(&result)?);
        }
        Commands::Assets => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&ASSETS)?);
            } else {
                for a in ASSETS.iter() {
                    println!(
                        "{:<5} {:<9} ${:<8} max {}x  min {} USDC  funding {}",
                        a.symbol, a.name, a.price, a.max_leverage, a.min_collateral, a.funding_rate
                    );
                }
            }
        }
        Commands::Tokens => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&TOKENS)?);
            } else {
                for t in TOKENS.iter() {
                    println!("{:<5} {:>2} decimals  chain {}  ${:<8} {}", t.symbol, t.decimals, t.chain, t.usd_price, t.address);
                }
            }
        }
        Commands::Charge { account } => {
            let receipt = config.meter()?.charge(&account)?;
            emit(cli.json, &receipt, || {
                format!("charged {} USDC, balance {}", receipt.cost, receipt.balance.value().round_dp(2))
            })?;
        }
        Commands::Sim => run_sim(&config)?,
    }

    Ok(())
}

// missing default file is normal, anything else is worth a warning
fn load_config(path: &str) -> Config {
    if path == DEFAULT_CONFIG_PATH && !Path::new(path).exists() {
        return Config::default();
    }
    Config::load(path).unwrap_or_else(|e| {
        eprintln!("Warning: {e}");
        eprintln!("Using default configuration");
        Config::default()
    })
}

fn price(value: Decimal) -> anyhow::Result<Price> {
    Price::new(value).ok_or_else(|| anyhow!("price must be positive, got {value}"))
}

fn leverage_of(value: u32) -> anyhow::Result<Leverage> {
    Leverage::new(value).ok_or_else(|| anyhow!("leverage must be at least 1x"))
}

fn emit<T: serde::Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn describe_quote(quote: &SwapQuote) -> String {
    let source = match &quote.source {
        QuoteSource::Route { provider, path } => format!("via {provider} ({})", path.join(" > ")),
        QuoteSource::Fallback { reason } => format!("estimate, {reason:?}"),
    };
    format!(
        "{} {} -> {} {}  impact {}%  [{source}]",
        quote.amount_in,
        quote.token_in,
        quote.amount_out,
        quote.token_out,
        quote.price_impact.round_dp(4)
    )
}

fn run_sim(config: &Config) -> anyhow::Result<()> {
    println!("DEX Core Simulation\n");

    scenario_1_risk_math()?;
    scenario_2_position_lifecycle()?;
    scenario_3_quotes(config)?;
    scenario_4_metering(config)?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

/// Liquidation and PnL for the reference cases.
fn scenario_1_risk_math() -> anyhow::Result<()> {
    println!("Scenario 1: Risk Math\n");

    let entry = price(dec!(2500))?;
    let ten = leverage_of(10)?;
    println!("  ETH 10x long from 2500 liquidates at {}", liquidation_price(entry, ten, Side::Long));
    println!("  ETH 10x short from 2500 liquidates at {}", liquidation_price(entry, ten, Side::Short));

    let pnl = unrealized_pnl(entry, price(dec!(2750))?, Quote::new(dec!(1000)), Side::Long);
    println!("  1000 USDC long, 2500 -> 2750: {pnl} USDC");

    for (asset, collateral, leverage) in [("ETH", dec!(5), 10), ("ETH", dec!(50), 60), ("DOGE", dec!(100), 2)] {
        let result = ValidationResult::from(&validate_position(asset, Quote::new(collateral), leverage));
        println!(
            "  validate {asset} {collateral} USDC {leverage}x: {}",
            result.error.as_deref().unwrap_or("ok")
        );
    }
    println!();
    Ok(())
}

/// Open, protect, mark and close a position.
fn scenario_2_position_lifecycle() -> anyhow::Result<()> {
    println!("Scenario 2: Position Lifecycle\n");

    let preview = preview("SOL", Side::Long, Some(dec!(200)), leverage_of(5)?);
    println!("  Preview SOL 200 USDC 5x: size {}, liquidates at {}", preview.size, preview.liquidation_price);

    let mut book = PositionBook::new();
    let request = OpenRequest::new("SOL", Side::Long, dec!(200), 5).with_stop_loss(price(dec!(75))?);
    let id = book.open(request, Timestamp::now())?.id;
    println!("  Opened {id}");

    book.update_orders(id, Some(price(dec!(95))?), Some(price(dec!(78))?))?;
    let position = book.get(id).context("position vanished")?;
    println!(
        "  {id}: size {} entry {} liq {} funding/period {}",
        position.size,
        position.entry_price,
        position.liquidation_price(),
        position.funding_per_period()
    );

    for mark in [dec!(90), dec!(96), dec!(77), dec!(60)] {
        let trigger = position.exit_trigger(price(mark)?);
        println!(
            "  mark {mark}: pnl {} trigger {:?}",
            position.unrealized_pnl(price(mark)?),
            trigger
        );
    }

    let hedge = OpenRequest::new("SOL", Side::Short, dec!(100), 2);
    book.open(hedge, Timestamp::now())?;
    for p in book.iter() {
        println!("  open {}: {} {} size {}", p.id, p.side, p.asset, p.size);
    }
    println!("  SOL book pnl at 96: {}", book.total_unrealized_pnl("SOL", price(dec!(96))?));

    let closed = book.close(id, price(dec!(96))?)?;
    println!(
        "  Closed {id} at {}: realized {} returned {}\n",
        closed.exit_price, closed.realized_pnl, closed.returned
    );
    Ok(())
}

/// Routed quotes, fallback estimates and the swap form.
fn scenario_3_quotes(config: &Config) -> anyhow::Result<()> {
    println!("Scenario 3: Swap Quotes\n");

    let offline = QuoteEstimator::new(Box::new(FallbackRouter), config.fallback_rates());
    let pools = Config::demo_pools().estimator();

    for (token_in, token_out, amount) in [("USDC", "ETH", "1000"), ("ETH", "USDC", "1.5"), ("DAI", "ETH", "500")] {
        println!("  offline: {}", describe_quote(&offline.quote(token_in, token_out, amount)?));
        match pools.quote(token_in, token_out, amount) {
            Ok(q) => println!("  pools:   {}", describe_quote(&q)),
            Err(e) => println!("  pools:   {e}"),
        }
    }

    match pools.quote("USDT", "WBTC", "100") {
        Ok(q) => println!("  pools:   {}", describe_quote(&q)),
        Err(e) => println!("  pools:   {e}"),
    }

    let mut form = SwapForm::default();
    form.set_from_amount("250", &offline)?;
    println!("  form {} {} -> {} {}", form.from_amount, form.from_token, form.to_amount, form.to_token);
    form.flip();
    println!("  flipped {} {} -> {} {}\n", form.from_amount, form.from_token, form.to_amount, form.to_token);
    Ok(())
}

/// Per-request charging until the account runs dry.
fn scenario_4_metering(config: &Config) -> anyhow::Result<()> {
    println!("Scenario 4: Request Metering\n");

    let meter = RequestMeter::new(
        std::sync::Arc::new(MemoryBalanceStore::new(Quote::new(dec!(0.25)))),
        Quote::new(config.metering.request_cost),
    );
    for n in 1..=3 {
        match meter.charge("0xdemo") {
            Ok(r) => println!("  request {n}: balance {}", r.balance.value().round_dp(2)),
            Err(e) => println!("  request {n}: {e}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses() {
        let cli = Cli::try_parse_from(["dex-sim", "liquidation", "--entry", "2500", "--leverage", "10", "--side", "short"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Liquidation { leverage: 10, side: Side::Short, .. }));

        let cli = Cli::try_parse_from(["dex-sim", "quote", "USDC", "ETH", "1000", "--json"]).unwrap();
        assert!(cli.json);
    }

    #[test]
    fn sim_runs_offline() {
        run_sim(&Config::default()).unwrap();
    }
}
