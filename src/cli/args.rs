use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "roomcap")]
#[command(about = "Interview room capture and chunked upload", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the stub upload backend
    Serve(ServeCliArgs),
    /// Record a synthetic interview session and upload its segments
    Simulate(SimulateCliArgs),
    /// Show the config file location and current settings
    Config,
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct ServeCliArgs {
    /// Port to listen on (default: sink.port from config)
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Write received segments and images to the data directory
    #[arg(long)]
    pub persist: bool,
}

#[derive(ClapArgs, Debug)]
pub struct SimulateCliArgs {
    /// Total recording time in seconds
    #[arg(short, long, default_value = "5")]
    pub seconds: u64,
    /// Switch to screen share after this many seconds
    #[arg(long)]
    pub switch_after: Option<u64>,
    /// Segment interval in milliseconds (default: recorder.interval_ms from config)
    #[arg(long)]
    pub interval_ms: Option<u64>,
    /// Upload base URL; an in-process sink is started when omitted
    #[arg(short, long)]
    pub endpoint: Option<String>,
    /// Room identifier (random when omitted)
    #[arg(long)]
    pub room: Option<String>,
    /// User identifier sent with each segment
    #[arg(long)]
    pub user: Option<String>,
    /// Refuse screen share, to exercise the fallback to the camera
    #[arg(long)]
    pub deny_screen: bool,
}
