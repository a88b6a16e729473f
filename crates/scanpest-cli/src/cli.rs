use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "scanpest")]
#[command(about = "Keep pest detection records and sync them with the detection server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// User whose detections are used (overrides profile and SCANPEST_USER_ID)
    #[arg(long, global = true, value_name = "ID")]
    pub user: Option<i64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a detector result for an image
    Record {
        /// Source image
        image: PathBuf,
        /// Bounding box as x1,y1,x2,y2,confidence,class_index,class_name
        #[arg(long = "box", value_name = "SPEC")]
        boxes: Vec<String>,
        /// Capture time in Unix milliseconds (defaults to now)
        #[arg(long, value_name = "MILLIS")]
        captured_at: Option<i64>,
    },
    /// List detection history
    List {
        /// Only detections containing this pest
        #[arg(long, value_name = "NAME")]
        pest: Option<String>,
        /// Oldest first
        #[arg(long)]
        ascending: bool,
        /// Number of detections to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one detection with its boxes
    Show {
        /// Detection ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Count detected boxes per pest
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete detections (removed from the server on next sync)
    Delete {
        /// Detection ID
        #[arg(required_unless_present_any = ["pest", "all"], conflicts_with_all = ["pest", "all"])]
        id: Option<String>,
        /// Delete every detection containing this pest
        #[arg(long, value_name = "NAME", conflicts_with = "all")]
        pest: Option<String>,
        /// Delete every detection of the user
        #[arg(long)]
        all: bool,
    },
    /// Set or clear a detection's note
    Note {
        /// Detection ID
        id: String,
        /// Note text
        #[arg(required_unless_present = "clear")]
        text: Vec<String>,
        /// Remove the note
        #[arg(long, conflicts_with = "text")]
        clear: bool,
    },
    /// Synchronize with the detection server
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        /// Server auth token (defaults to SCANPEST_TOKEN)
        #[arg(long, global = true, value_name = "TOKEN")]
        token: Option<String>,
        /// Output the report as JSON
        #[arg(long, global = true)]
        json: bool,
    },
    /// Draw a detection's boxes onto a copy of its image
    Annotate {
        /// Detection ID
        id: String,
        /// Output image (defaults to <image>-annotated.png next to the source)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// TrueType/OpenType font for labels; boxes only when omitted
        #[arg(long, value_name = "PATH")]
        font: Option<PathBuf>,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Subcommand)]
pub enum SyncCommands {
    /// Push, pull, deletions and notes (default)
    All,
    /// Upload detections the server has not acknowledged
    Push,
    /// Fetch detections missing locally
    Pull,
    /// Exchange deletions with the server
    Deletions,
    /// Merge pending note edits
    Notes,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Detection server base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Default user ID
        #[arg(long, value_name = "ID")]
        user_id: Option<i64>,
        /// Directory for images of pulled detections
        #[arg(long, value_name = "PATH")]
        media_dir: Option<PathBuf>,
        /// Request timeout in seconds
        #[arg(long, value_name = "SECS")]
        request_timeout_secs: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show,
}
