use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(name = "rebal")]
#[command(about = "Portfolio rebalancing problem tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> desk -> account overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Assemble a rebalance problem and report what the solver would receive
    Validate {
        /// Problem file (.json, .yaml or .yml)
        #[arg(long)]
        problem: String,

        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// What to do with config keys the problem's run mode never reads
        #[arg(long, value_enum, default_value_t = UnusedKeys::Warn)]
        unused_keys: UnusedKeys,

        /// Write the canonical specification JSON here
        #[arg(long)]
        out: Option<String>,
    },

    /// Simulate selling shares from one portfolio's tax lots
    Lots {
        /// Problem file (.json, .yaml or .yml)
        #[arg(long)]
        problem: String,

        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Portfolio id in the problem's ledger
        #[arg(long)]
        portfolio: String,

        #[arg(long)]
        asset: String,

        #[arg(long)]
        shares: f64,

        #[arg(long)]
        price: f64,

        /// Which outcome a TRADEOFF wash-sale rule commits
        #[arg(long, value_enum, default_value_t = Tradeoff::Disallow)]
        policy: Tradeoff,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum UnusedKeys {
    Warn,
    Fail,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Tradeoff {
    Disallow,
    Allow,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = rebal_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Validate {
            problem,
            config_paths,
            unused_keys,
            out,
        } => {
            let policy = match unused_keys {
                UnusedKeys::Warn => rebal_config::UnusedKeyPolicy::Warn,
                UnusedKeys::Fail => rebal_config::UnusedKeyPolicy::Fail,
            };
            commands::validate::run(&problem, &config_paths, policy, out.as_deref())?;
        }

        Commands::Lots {
            problem,
            config_paths,
            portfolio,
            asset,
            shares,
            price,
            policy,
        } => {
            let policy = match policy {
                Tradeoff::Disallow => rebal_tax::TradeoffPolicy::Disallow,
                Tradeoff::Allow => rebal_tax::TradeoffPolicy::Allow,
            };
            commands::lots::run(
                &problem,
                &config_paths,
                commands::lots::SaleArgs {
                    portfolio: &portfolio,
                    asset: &asset,
                    shares,
                    price,
                    policy,
                },
            )?;
        }
    }

    Ok(())
}
