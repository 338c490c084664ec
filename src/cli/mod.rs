use crate::client::{ClientConfig, TorrentClient};
use crate::error::Result;
use crate::torrent::Metainfo;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "swarmget")]
#[command(about = "Download a single-file torrent from its swarm", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a torrent
    Download {
        /// Path to the .torrent file
        #[arg(short, long)]
        torrent: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "./downloads")]
        output: PathBuf,

        /// Percentage of pieces to download
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u8).range(1..=100))]
        percent: u8,

        /// Port announced to the tracker
        #[arg(short, long, default_value_t = 6881)]
        port: u16,

        /// Peer connect timeout in milliseconds
        #[arg(long, default_value_t = 500)]
        connect_timeout_ms: u64,

        /// Peer read timeout in milliseconds
        #[arg(long, default_value_t = 5000)]
        read_timeout_ms: u64,
    },

    /// Show information about a torrent file
    Info {
        /// Path to the .torrent file
        torrent: PathBuf,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Download {
                torrent,
                output,
                percent,
                port,
                connect_timeout_ms,
                read_timeout_ms,
            } => {
                let config = ClientConfig {
                    output_dir: output.clone(),
                    port: *port,
                    percent: *percent,
                    connect_timeout: Duration::from_millis(*connect_timeout_ms),
                    read_timeout: Duration::from_millis(*read_timeout_ms),
                    ..ClientConfig::default()
                };

                let client = TorrentClient::new(config);
                let report = client.download(torrent).await?;
                println!(
                    "Saved {} of {} pieces ({} requested) to {} in {} rounds",
                    report.saved_pieces,
                    report.total_pieces,
                    report.target_pieces,
                    report.path.display(),
                    report.rounds
                );
            }

            Commands::Info { torrent } => {
                self.show_torrent_info(torrent).await?;
            }
        }

        Ok(())
    }

    async fn show_torrent_info(&self, torrent_path: &Path) -> Result<()> {
        let metainfo = crate::torrent::load_torrent_file(torrent_path).await?;
        print!("{}", describe(&metainfo));
        Ok(())
    }
}

fn describe(metainfo: &Metainfo) -> String {
    let mut out = String::new();
    out.push_str("Torrent Information\n");
    out.push_str("==================\n");
    out.push_str(&format!("Name: {}\n", metainfo.info.name));
    out.push_str(&format!("Tracker: {}\n", metainfo.announce));
    if let Some(comment) = &metainfo.comment {
        out.push_str(&format!("Comment: {}\n", comment));
    }
    out.push_str(&format!("Total Size: {} bytes\n", metainfo.info.length));
    out.push_str(&format!("Piece Length: {} bytes\n", metainfo.info.piece_length));
    out.push_str(&format!("Number of Pieces: {}\n", metainfo.info.piece_count()));
    out.push_str(&format!("Info Hash: {}\n", metainfo.info_hash_hex()));
    out
}
