use clap::Parser;
use macaddr::MacAddr6;
use vitals_relay::session::RoomId;

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "VITALS_ROOM")]
    pub room: RoomId,

    #[arg(long, env = "VITALS_RELAY_ADDR", default_value = "127.0.0.1:7878")]
    pub relay_addr: String,

    /// Connect only to the device with this address.
    #[arg(long, env = "VITALS_DEVICE_ADDRESS")]
    pub device_address: Option<MacAddr6>,

    #[arg(long, env = "VITALS_SCAN_TIMEOUT_SECS", default_value_t = 30)]
    pub scan_timeout_secs: u64,

    #[arg(long, env = "VITALS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
