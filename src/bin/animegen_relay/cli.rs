use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "animegen-relay",
    version,
    about = "Relays anime image-generation requests to Replicate and waits for the result"
)]
pub(crate) struct RelayCli {
    /// TOML file with `[provider]` and `[server]` sections.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Dotenv file whose entries take precedence over the process environment.
    #[arg(long, value_name = "PATH")]
    pub dotenv: Option<PathBuf>,

    /// Overrides HOST/PORT.
    #[arg(long, visible_alias = "addr", value_name = "HOST:PORT")]
    pub listen: Option<String>,

    #[arg(long)]
    pub json_logs: bool,
}
