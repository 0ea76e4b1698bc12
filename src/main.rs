//! wafstate - Persistent Collection State Demo
//!
//! Runs `setvar` directives against a WAF backed by the in-memory engine,
//! once per simulated request, then prints the resulting collections.

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wafstate::actions::{self, Action, RuleInfo};
use wafstate::collection::CollectionName;
use wafstate::storage::{ExpiryConfig, MemoryEngine};
use wafstate::waf::{Waf, WafConfig};

/// Demo configuration
struct Config {
    /// Session id SESSION is bound to
    session: Option<String>,
    /// Client address IP is bound to
    ip: String,
    /// Number of simulated requests
    repeat: u32,
    /// `setvar` arguments, in evaluation order
    directives: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: None,
            ip: "127.0.0.1".to_string(),
            repeat: 1,
            directives: Vec::new(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--session" | "-s" => {
                    if i + 1 < args.len() {
                        config.session = Some(args[i + 1].clone());
                        i += 2;
                    } else {
                        eprintln!("Error: --session requires a value");
                        std::process::exit(1);
                    }
                }
                "--ip" => {
                    if i + 1 < args.len() {
                        config.ip = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --ip requires a value");
                        std::process::exit(1);
                    }
                }
                "--repeat" | "-n" => {
                    if i + 1 < args.len() {
                        config.repeat = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid repeat count");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --repeat requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("wafstate version {}", wafstate::VERSION);
                    std::process::exit(0);
                }
                arg if arg.starts_with("--") => {
                    eprintln!("Unknown argument: {}", arg);
                    print_help();
                    std::process::exit(1);
                }
                directive => {
                    config.directives.push(directive.to_string());
                    i += 1;
                }
            }
        }

        config
    }
}

fn print_help() {
    println!(
        r#"
wafstate - Persistent collection state for a WAF

USAGE:
    wafstate [OPTIONS] <DIRECTIVE>...

OPTIONS:
    -s, --session <ID>     Bind SESSION to this id
        --ip <ADDR>        Client address IP is bound to (default: 127.0.0.1)
    -n, --repeat <N>       Number of simulated requests (default: 1)
    -v, --version          Print version information
    -h, --help             Print this help message

DIRECTIVES:
    setvar arguments: [!]COLLECTION.KEY[=VALUE]
    VALUE may start with + or - for a numeric delta, and may use %{{COLLECTION.KEY}}.

EXAMPLES:
    wafstate -n 3 --session abc 'SESSION.hits=+1' 'IP.last_session=%{{session.hits}}'
    wafstate 'TX.score=+5' 'TX.score=-2' '!TX.flag'

Set RUST_LOG=debug to see every evaluation.
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    if config.directives.is_empty() {
        print_help();
        anyhow::bail!("no directives given");
    }

    let rules: Vec<Box<dyn Action>> = config
        .directives
        .iter()
        .map(|d| actions::get("setvar", d))
        .collect::<Result<_, _>>()?;

    let provider = MemoryEngine::provider(ExpiryConfig::default());
    let waf = Waf::new(WafConfig::new().with_engine_provider(provider))?;

    for request in 0..config.repeat {
        let mut tx = waf.new_transaction();
        tx.process_connection(&config.ip);
        if let Some(session) = &config.session {
            tx.init_collection(CollectionName::Session, session.as_str())?;
        }

        for (n, rule) in rules.iter().enumerate() {
            rule.evaluate(&RuleInfo::new(n as i64 + 1), &mut tx);
        }

        if request + 1 == config.repeat {
            print_collections(&tx);
        }
        tx.close();
    }

    let stats = waf.pool_stats();
    info!(
        requests = config.repeat,
        created = stats.created,
        reused = stats.reused,
        "Run complete"
    );

    // Signals the expiry sweeper; the runtime drops it on exit
    waf.close_persistent_engine()?;

    Ok(())
}

/// Prints every collection the transaction can see
fn print_collections(tx: &wafstate::Transaction) {
    for name in CollectionName::ALL {
        let vars = if name == CollectionName::Tx {
            tx.tx_collection().find_all()
        } else {
            let Some(col) = tx.persistent(name) else {
                continue;
            };
            match col.find_all() {
                Ok(vars) => {
                    let mut vars: Vec<_> = vars.into_iter().collect();
                    vars.sort();
                    vars
                }
                Err(e) => {
                    warn!(collection = %name, error = %e, "Failed to read collection");
                    continue;
                }
            }
        };

        if vars.is_empty() {
            continue;
        }
        println!("{}", name);
        for (key, value) in vars {
            println!("    {} = {}", key, value);
        }
    }
}
