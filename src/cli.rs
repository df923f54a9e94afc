use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Finds cover images for a book catalog", long_about = None)]
pub struct Args {
    /// Directory holding config.yaml.
    /// Defaults to $BOOKCOVERS_BASE_PATH or ~/.local/share/bookcovers
    #[clap(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Debug logging. Also hides the progress bar.
    #[clap(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve covers for every book in a JSON catalog and rewrite it in place
    Resolve {
        /// Catalog file: a JSON array of objects with title and author
        catalog: PathBuf,

        /// Parallel workers
        #[clap(short, long)]
        workers: Option<usize>,

        /// Where downloaded covers go, relative to the catalog
        #[clap(long)]
        covers_dir: Option<String>,

        /// Store the resolved url instead of downloading the image
        #[clap(long, default_value = "false")]
        no_download: bool,

        /// Stop dispatching new books after this many seconds
        #[clap(long)]
        timeout: Option<u64>,

        /// Write the catalog once at the end instead of after every book
        #[clap(long, default_value = "false")]
        batch: bool,
    },

    /// Resolve a single book and print the resolution report
    Lookup {
        /// Book title
        #[clap(short, long)]
        title: String,

        /// Book author
        #[clap(short, long, default_value = "")]
        author: String,

        /// Purchase link, tried before any search
        #[clap(short, long)]
        link: Option<String>,
    },

    /// List configured sources in cascade order
    Sources {},
}
