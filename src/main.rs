use clap::{Parser, Subcommand};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use sugoroku::board::Language;
use sugoroku::cli::commands::{self, SimulateOptions};
use sugoroku::config::server::ServerConfig;

#[derive(Parser)]
#[command(name = "sugoroku")]
#[command(about = "Backend for an AI-generated sugoroku party game")]
#[command(version)]
struct Cli {
    /// Path to the configuration file (defaults apply when it does not exist)
    #[arg(short, long, default_value = "sugoroku.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,

    /// Print a template board as JSON
    Template {
        /// Number of tiles (clamped to 8-24)
        #[arg(short, long, default_value_t = 10)]
        tiles: i64,

        /// Template language
        #[arg(short, long, value_enum, ignore_case = true, default_value_t = Language::Ja)]
        language: Language,
    },

    /// Play a game in-process and print every turn
    Simulate {
        /// Number of players
        #[arg(short, long, default_value_t = 2)]
        players: usize,

        /// Session length in minutes (10 gives a short board)
        #[arg(long, default_value_t = 10)]
        session_minutes: u32,

        /// Dice seed
        #[arg(short, long, default_value_t = 42)]
        seed: u64,

        /// Maximum number of full rounds
        #[arg(short, long, default_value_t = 30)]
        rounds: u32,

        /// Board language
        #[arg(short, long, value_enum, ignore_case = true, default_value_t = Language::Ja)]
        language: Language,

        /// Call the AI service using the configured API key
        #[arg(long)]
        online: bool,

        /// Base URL of a running server to play against (e.g. http://127.0.0.1:3001)
        #[arg(long)]
        server: Option<String>,
    },
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ServerConfig::load_or_default(Path::new(&cli.config)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(&config.log_level, cli.json_logs);

    match cli.command {
        Commands::Serve => {
            if let Err(e) = commands::run_server(&config).await {
                eprintln!("Server error: {}", e);
                std::process::exit(1);
            }
        }

        Commands::Template { tiles, language } => {
            match commands::template_json(tiles, language) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Simulate {
            players,
            session_minutes,
            seed,
            rounds,
            language,
            online,
            server,
        } => {
            let options = SimulateOptions {
                players,
                session_minutes,
                seed,
                rounds,
                language,
                online,
                server,
            };
            if let Err(e) = commands::simulate(&config, &options).await {
                eprintln!("Simulation error: {}", e);
                std::process::exit(1);
            }
        }
    }
}
