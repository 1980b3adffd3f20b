//! Publisher configuration
//!
//! Built once at startup from defaults, an optional config file, `IONPUB_*` environment
//! variables and command-line arguments (later sources win), then passed around immutably.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_ADDR: &str = "localhost:7000";
pub const DEFAULT_PATH: &str = "/ws";
pub const DEFAULT_ROOM: &str = "test room";
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Publish local media to an ion-sfu room", long_about = None)]
pub struct Args {
    /// SFU server address (host:port, or a full ws:// / wss:// URL)
    #[arg(short, long)]
    pub addr: Option<String>,

    /// Room to join
    #[arg(short, long)]
    pub room: Option<String>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// STUN/TURN server URL; repeat for several
    #[arg(long = "ice-server")]
    pub ice_servers: Vec<String>,

    /// VP8 IVF file to publish as video
    #[arg(long)]
    pub video: Option<PathBuf>,

    /// Opus Ogg file to publish as audio
    #[arg(long)]
    pub audio: Option<PathBuf>,

    /// Play media files once instead of looping them
    #[arg(long)]
    pub no_loop: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    pub addr: String,
    pub path: String,
    pub room: String,
    pub ice_servers: Vec<String>,
    pub video: Option<PathBuf>,
    pub audio: Option<PathBuf>,
    pub loop_media: bool,
}

impl PublisherConfig {
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("addr", DEFAULT_ADDR)?
            .set_default("path", DEFAULT_PATH)?
            .set_default("room", DEFAULT_ROOM)?
            .set_default("ice_servers", vec![DEFAULT_STUN_SERVER])?
            .set_default("loop_media", true)?;

        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder = builder
            .add_source(
                config::Environment::with_prefix("IONPUB")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("ice_servers"),
            )
            .set_override_option("addr", args.addr.clone())?
            .set_override_option("room", args.room.clone())?
            .set_override_option("video", path_string(&args.video))?
            .set_override_option("audio", path_string(&args.audio))?;

        if !args.ice_servers.is_empty() {
            builder = builder.set_override("ice_servers", args.ice_servers.clone())?;
        }
        if args.no_loop {
            builder = builder.set_override("loop_media", false)?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// WebSocket URL of the SFU signaling endpoint
    pub fn signaling_url(&self) -> String {
        if self.addr.starts_with("ws://") || self.addr.starts_with("wss://") {
            self.addr.clone()
        } else {
            format!("ws://{}{}", self.addr, self.path)
        }
    }
}

fn path_string(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().into_owned())
}
