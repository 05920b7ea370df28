use clap::Parser;

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "VITALS_LISTEN_ADDR", default_value = "0.0.0.0:7878")]
    pub listen_addr: String,

    #[arg(long, env = "VITALS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
