//! Command-line interface definitions and parsing

use clap::Parser;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// TCP port to listen on (overrides the configured port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind the TCP server to (overrides the configured address)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Peripheral name to connect to (overrides the saved device)
    #[arg(long)]
    pub name: Option<String>,

    /// Peripheral MAC address to connect to, e.g. AA:0B:CC:11:22:33
    #[arg(long)]
    pub mac: Option<String>,

    /// Forget the saved device and wait for a new one
    #[arg(long)]
    pub forget: bool,
}
