//! FlashPool - A Pooled Client for Redis-Compatible Servers
//!
//! Command-line entry point: connects through the pool, runs a single
//! command and prints the reply the way redis-cli does.

use bytes::Bytes;
use flashpool::{PoolConfig, PoolHandle};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Client configuration
struct Config {
    /// Host to connect to
    host: String,
    /// Port to connect to
    port: u16,
    /// AUTH password, empty for none
    password: String,
    /// Database index
    db: i64,
    /// Log the command and its reply
    trace: bool,
    /// Command name followed by its arguments
    command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: flashpool::DEFAULT_HOST.to_string(),
            port: flashpool::DEFAULT_PORT,
            password: String::new(),
            db: 0,
            trace: false,
            command: Vec::new(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let mut password = None;
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = value_of(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = value_of(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--password" | "-a" => {
                    password = Some(value_of(&args, i, "--password").to_string());
                    i += 2;
                }
                "--db" | "-n" => {
                    config.db = value_of(&args, i, "--db").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid database index");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--trace" | "-t" => {
                    config.trace = true;
                    i += 1;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("FlashPool version {}", flashpool::VERSION);
                    std::process::exit(0);
                }
                arg if arg.starts_with('-') => {
                    eprintln!("Unknown argument: {}", arg);
                    print_help();
                    std::process::exit(1);
                }
                _ => {
                    // Everything from the first positional on is the command.
                    config.command = args[i..].to_vec();
                    break;
                }
            }
        }

        config.password = password
            .or_else(|| std::env::var("FLASHPOOL_PASSWORD").ok())
            .unwrap_or_default();
        config
    }

    /// Returns the server address as a string
    fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.server_address(), self.password.clone())
            .with_database(self.db)
            .with_connect_timeout(Duration::from_secs(5))
    }
}

fn value_of<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
FlashPool - A Pooled Client for Redis-Compatible Servers

USAGE:
    flashpool [OPTIONS] [COMMAND [ARGS...]]

OPTIONS:
    -h, --host <HOST>          Server host (default: 127.0.0.1)
    -p, --port <PORT>          Server port (default: 6379)
    -a, --password <PASSWORD>  AUTH password (default: $FLASHPOOL_PASSWORD)
    -n, --db <INDEX>           Database index (default: 0)
    -t, --trace                Log the command and its reply
    -v, --version              Print version information
        --help                 Print this help message

EXAMPLES:
    flashpool                          # PING 127.0.0.1:6379
    flashpool SET name "Ariz"          # Run a single command
    flashpool --trace GET name         # Same, with a trace record
    RUST_LOG=debug flashpool PING      # Show pool internals
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let redis = PoolHandle::connect_with(config.pool_config()).await?;

    let (name, args) = match config.command.split_first() {
        Some((name, args)) => (name.clone(), args.to_vec()),
        None => ("PING".to_string(), Vec::new()),
    };
    let args: Vec<Bytes> = args.into_iter().map(Bytes::from).collect();

    let mut conn = redis.get_connection().await?;
    if config.trace {
        conn = conn.arm_trace();
    }
    let result = conn.execute(&name, &args).await;
    conn.close();

    let stats = redis.pool().stats();
    debug!(
        dialed = stats.dialed,
        reused = stats.reused,
        "Command complete"
    );
    redis.shutdown();

    match result {
        Ok(reply) => {
            println!("{}", reply);
            Ok(())
        }
        Err(err) => {
            println!("(error) {}", err);
            std::process::exit(1);
        }
    }
}
