use chrono_tz::Tz;
use clap::Parser;
use vitals_relay::session::RoomId;

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "VITALS_ROOM")]
    pub room: RoomId,

    #[arg(long, env = "VITALS_RELAY_ADDR", default_value = "127.0.0.1:7878")]
    pub relay_addr: String,

    #[arg(long, env = "TZ", default_value = "UTC")]
    pub timezone: Tz,

    #[arg(long, env = "VITALS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
