use std::net::SocketAddr;
use std::time::Duration;

use gridproto::room::RoomId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// One tick task per room, lock-based state store.
    Parallel,
    /// One scheduler for all rooms, channel-serialised state store.
    Single,
}

impl Mode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parallel" => Some(Mode::Parallel),
            "single" => Some(Mode::Single),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Parallel => "parallel",
            Mode::Single => "single",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind: SocketAddr,
    pub mode: Mode,
    pub room_id: RoomId,
    pub idle_timeout: Duration,
    pub tick_hz: u32,
    pub map_width: i32,
    pub map_height: i32,
}

impl Config {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }
}

fn usage_and_exit() -> ! {
    eprintln!(
        "grid_server\n\n\
USAGE:\n  grid_server [--bind HOST:PORT] [--mode parallel|single] [--room-id HEX32]\n\n\
ENV:\n  BIND               default 127.0.0.1:9090\n  MODE               default parallel\n  ROOM_ID            default random (32 hex digits)\n  IDLE_TIMEOUT_SECS  default 30 (0 disables idle close)\n  TICK_HZ            default 60\n  MAP_WIDTH          default 32\n  MAP_HEIGHT         default 32\n"
    );
    std::process::exit(2);
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => v.parse().unwrap_or_else(|_| usage_and_exit()),
        Err(_) => default,
    }
}

pub fn parse_args() -> Config {
    let mut bind: SocketAddr = std::env::var("BIND")
        .unwrap_or_else(|_| "127.0.0.1:9090".to_string())
        .parse()
        .unwrap_or_else(|_| usage_and_exit());

    let mut mode = match std::env::var("MODE") {
        Ok(v) => Mode::parse(&v).unwrap_or_else(|| usage_and_exit()),
        Err(_) => Mode::Parallel,
    };

    let mut room_id = match std::env::var("ROOM_ID") {
        Ok(v) => RoomId::parse_hex(&v).unwrap_or_else(|_| usage_and_exit()),
        Err(_) => RoomId::generate(),
    };

    let idle_secs: u64 = env_or("IDLE_TIMEOUT_SECS", 30);
    let tick_hz: u32 = env_or("TICK_HZ", 60);
    let map_width: i32 = env_or("MAP_WIDTH", 32);
    let map_height: i32 = env_or("MAP_HEIGHT", 32);

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--bind" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                bind = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--mode" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                mode = Mode::parse(&v).unwrap_or_else(|| usage_and_exit());
            }
            "--room-id" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                room_id = RoomId::parse_hex(&v).unwrap_or_else(|_| usage_and_exit());
            }
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    Config {
        bind,
        mode,
        room_id,
        idle_timeout: Duration::from_secs(idle_secs),
        tick_hz,
        map_width,
        map_height,
    }
}
