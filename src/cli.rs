use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gtop", version)]
#[command(about = "GPU process monitor with container and Triton awareness", long_about = None)]
pub struct Cli {
    /// Use synthetic devices, processes, containers and models
    #[arg(short, long, default_value_t = false)]
    pub demo: bool,

    /// Print one snapshot as JSON and exit
    #[arg(short, long, default_value_t = false)]
    pub query: bool,

    /// Config file (overrides GTOP_CONFIG)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
