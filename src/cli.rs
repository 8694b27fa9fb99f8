use clap::{Parser, Subcommand};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "dfc")]
#[command(about = "Datafile collector", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the collector with its control surface
    Server(ServerArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the control surface to; overrides `server.bind_addr`
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Wait for `/start` instead of collecting immediately
    #[arg(long)]
    pub idle: bool,
}
