use std::net::TcpListener;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use ringkv_node::config;
use ringkv_node::endpoint::serve;
use ringkv_node::logging::init_logging;
use ringkv_node::logging::LogLevel;
use ringkv_node::prelude::Stabilizer;
use ringkv_node::prelude::Swarm;
use ringkv_node::prelude::SwarmBuilder;
use ringkv_node::prelude::SwarmConfig;
use ringkv_node::transport::HttpTransport;
use ringkv_node::util::split_members;

#[derive(Parser, Debug)]
#[command(about, version, author)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value_t = LogLevel::Info, value_enum, env)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    #[command(about = "Writes a default configuration file.")]
    Init(InitCommand),
    #[command(about = "Starts a long-running node.")]
    Run(RunCommand),
}

#[derive(Args, Debug)]
struct InitCommand {
    #[arg(
        long,
        default_value = config::DEFAULT_CONFIG_LOCATION,
        help = "The location of config file"
    )]
    pub location: String,
}

#[derive(Args, Debug)]
struct RunCommand {
    #[arg(
        long,
        short = 'c',
        env,
        default_value = config::DEFAULT_CONFIG_LOCATION,
        help = "Config file location. Defaults are used when it does not exist"
    )]
    pub config: String,

    #[arg(
        long,
        short = 'b',
        help = "Listen address. If not provided, use bind in config file or 127.0.0.1:50000",
        env
    )]
    pub bind: Option<String>,

    #[arg(
        long,
        help = "Address other nodes reach this node at. If not provided, use advertise in config file or the listen address",
        env
    )]
    pub advertise: Option<String>,

    #[arg(
        long,
        help = "Comma separated list of every ring member, to build the ring without joins",
        env
    )]
    pub network: Option<String>,

    #[arg(long, help = "Address of a ring member to join through", env)]
    pub join: Option<String>,
}

fn load_config(args: &RunCommand) -> anyhow::Result<config::Config> {
    let mut c = match config::Config::read_fs(&args.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("no usable config at {}: {}, using defaults", args.config, e);
            config::Config::default()
        }
    };
    if let Some(bind) = &args.bind {
        c.bind = bind.clone();
    }
    if let Some(advertise) = &args.advertise {
        c.advertise = Some(advertise.clone());
    }
    if let Some(network) = &args.network {
        c.network = split_members(network);
    }
    if let Some(join) = &args.join {
        c.join = Some(join.clone());
    }
    Ok(c)
}

async fn startup(swarm: Arc<Swarm>, c: config::Config) {
    if !c.network.is_empty() {
        if let Err(e) = swarm.set_network(&c.network) {
            tracing::error!("failed to build ring from network list: {}", e);
        }
    }
    if let Some(contact) = c.join {
        match swarm.join(&contact).await {
            Ok(()) => tracing::info!("joined through {}", contact),
            Err(e) => tracing::error!("failed to join through {}: {}", contact, e),
        }
    }
}

async fn daemon_run(args: RunCommand) -> anyhow::Result<()> {
    let c = load_config(&args)?;
    let swarm_config = SwarmConfig::try_from(&c)?;
    let transport = Arc::new(HttpTransport::from_config(&c)?);
    let swarm = Arc::new(SwarmBuilder::new(swarm_config, transport).build()?);
    println!("Did: {}", swarm.did());

    // Bound before joining, so early calls from the new neighbours queue up.
    let listener = TcpListener::bind(&c.bind)?;
    let stabilizer = Arc::new(Stabilizer::new(swarm.clone()));
    tokio::spawn(stabilizer.wait());

    let (served, ()) = futures::join!(serve(listener, swarm.clone()), startup(swarm, c));
    served
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    match cli.command {
        Command::Run(args) => daemon_run(args).await,
        Command::Init(args) => {
            let p = config::Config::default().write_fs(args.location.as_str())?;
            println!("Your config file has saved to: {}", p);
            Ok(())
        }
    }
}
