use anyhow::{anyhow, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use stock_saver::api::EastMoneyClient;
use stock_saver::models::{Adjust, Config, OutputEncoding, Period, Target, TradeQuery};
use stock_saver::stock_saver::{SaveReport, StockSaver};
use stock_saver::storage::CsvDatasetWriter;
use stock_saver::utils::{parse_date, parse_symbol_list, read_symbols_file, write_symbols_file};

/// Exit code when the batch ran but some stocks failed
const EXIT_PARTIAL_FAILURE: i32 = 2;

/// A-share trading history downloader
#[derive(Parser)]
#[command(name = "stock-saver")]
#[command(version = "0.1.0")]
#[command(about = "Download A-share trading history from EastMoney into local CSV files")]
#[command(long_about = "
Fetches daily, weekly or monthly OHLC history for a list of A-share codes (or the
whole market) and stores one CSV per stock under
<root>/data/stock/trade/<period>/<code>_<start>_<end>.csv.

A stock that fails is reported at the end and skipped; the rest of the batch keeps
going. Use --failed-out to save the failed codes and --symbols-file to retry only
those.

Examples:
  stock-saver save-trade -s 20210301 -e 20210616 --symbols 000001,600519
  stock-saver save-trade -s 20200101 -p weekly -a qfq --failed-out failed.txt
  stock-saver save-trade -s 20200101 --symbols-file failed.txt
  stock-saver save-trade -s 20200101 --symbols 000001 --encoding utf-8
  stock-saver list-symbols --output symbols.txt
")]
#[command(help_template = "
{name} {version}

{about}

{usage-heading} {usage}

{all-args}

{long-about}
")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Show debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Download trading history and save one CSV per stock
    SaveTrade(SaveTradeArgs),
    /// Print or save every listed A-share code
    ListSymbols {
        /// Write the codes to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct SaveTradeArgs {
    /// Start date (YYYYMMDD)
    #[arg(long, short = 's', help = "Start date in YYYYMMDD format (e.g., 20210301)")]
    start_date: String,

    /// End date (YYYYMMDD, defaults to today)
    #[arg(long, short = 'e', help = "End date in YYYYMMDD format. Defaults to today if not provided")]
    end_date: Option<String>,

    /// Bar period: daily, weekly or monthly
    #[arg(long, short = 'p', default_value = "daily")]
    period: String,

    /// Price adjustment: none, qfq or hfq
    #[arg(long, short = 'a', default_value = "hfq")]
    adjust: String,

    /// Comma separated stock codes; the whole market when neither this nor --symbols-file is given
    #[arg(long, conflicts_with = "symbols_file")]
    symbols: Option<String>,

    /// File with stock codes, one per line
    #[arg(long)]
    symbols_file: Option<PathBuf>,

    /// Storage root (defaults to STOCK_DATA_ROOT or the current directory)
    #[arg(long, short = 'r')]
    root: Option<PathBuf>,

    /// CSV text encoding: gbk or utf-8 (defaults to OUTPUT_ENCODING or gbk)
    #[arg(long)]
    encoding: Option<String>,

    /// Write failed stock codes to this file
    #[arg(long)]
    failed_out: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "stock_saver=debug" } else { "stock_saver=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("⚠️ Logging was already initialized");
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::SaveTrade(args) => run_save_trade(args).await,
        Command::ListSymbols { output } => run_list_symbols(output).await.map(|_| 0),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run_save_trade(args: SaveTradeArgs) -> Result<i32> {
    let start_date = parse_date(&args.start_date, "start-date")?;
    let end_date = match &args.end_date {
        Some(end_date) => parse_date(end_date, "end-date")?,
        None => Local::now().date_naive(),
    };
    let period: Period = args.period.parse()?;
    let adjust: Adjust = args.adjust.parse()?;
    let query = TradeQuery::new(start_date, end_date, period, adjust)?;

    let target = match (&args.symbols, &args.symbols_file) {
        (Some(list), _) => Target::Symbols(parse_symbol_list(list)),
        (None, Some(path)) => Target::Symbols(read_symbols_file(path)?),
        (None, None) => Target::All,
    };
    if let Target::Symbols(symbols) = &target {
        if symbols.is_empty() {
            return Err(anyhow!("No stock codes given; omit --symbols/--symbols-file to fetch the whole market"));
        }
    }

    info!("📋 Loading configuration...");
    let config = Config::from_env()?;
    let root = args.root.clone().unwrap_or_else(|| config.data_root.clone());
    let encoding: OutputEncoding = match &args.encoding {
        Some(name) => name.parse()?,
        None => config.output_encoding,
    };

    let client = EastMoneyClient::new(&config)?;
    let saver = StockSaver::with_writer(client, CsvDatasetWriter::with_encoding(encoding), root)
        .show_progress(!args.no_progress);

    let report = saver.save_trade_data(&query, target).await?;
    print_summary(&report);

    if let Some(path) = &args.failed_out {
        write_symbols_file(path, report.failed_symbols())?;
        println!("📝 Failed codes written to {}", path.display());
    }

    Ok(if report.all_succeeded() { 0 } else { EXIT_PARTIAL_FAILURE })
}

async fn run_list_symbols(output: Option<PathBuf>) -> Result<()> {
    let config = Config::from_env()?;
    let client = EastMoneyClient::new(&config)?;
    let saver = StockSaver::new(client, config.data_root.clone());

    let symbols = saver.list_symbols().await?;
    match output {
        Some(path) => {
            write_symbols_file(&path, &symbols)?;
            println!("✅ {} codes written to {}", symbols.len(), path.display());
        }
        None => {
            for symbol in &symbols {
                println!("{}", symbol);
            }
        }
    }

    Ok(())
}

fn print_summary(report: &SaveReport) {
    println!("\n📊 Download Summary:");
    println!("  Directory: {}", report.save_dir.display());
    println!("  Total Stocks: {}", report.total);
    println!("  Successful: {}", report.succeeded);
    println!("  Failed: {}", report.failed.len());
    println!("  Records Written: {}", report.records_written);
    println!("  Success Rate: {:.1}%", report.success_rate());

    if !report.all_succeeded() {
        println!("\n❌ The following stocks failed, please retry:");
        for (symbol, reason) in &report.errors {
            println!("  {} - {}", symbol, reason);
        }
    }
}
