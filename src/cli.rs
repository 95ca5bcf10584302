//! The CLI surface: a single `clap`-derived `Args` struct. Option binding
//! and process wiring otherwise stop here — the core doesn't know about
//! `clap` or `std::env`.

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(name = "docplug")]
#[clap(version)]
#[clap(about = "Generates synthetic documents from a JSON template and bulk-inserts them into a document database collection", long_about = None)]
pub struct Cli {
    /// Path to a file containing the JSON template, or the template text
    /// itself. Reads from standard input when omitted.
    pub template: Option<String>,

    /// target number of documents to insert; omit to run until cancelled
    #[clap(short = 'n', long = "num")]
    pub num: Option<u64>,

    /// number of insertion worker threads
    #[clap(short = 'j', long = "num-insertion-workers", default_value_t = 1)]
    pub num_insertion_workers: usize,

    /// number of documents per bulk-insert batch
    #[clap(short = 'b', long = "bulk-buffer-size", default_value_t = 1000)]
    pub bulk_buffer_size: usize,

    /// drop the destination collection before inserting
    #[clap(long)]
    pub drop: bool,

    /// treat any propagating insert error as fatal instead of logging and
    /// continuing with the next batch
    #[clap(long = "stop-on-error")]
    pub stop_on_error: bool,

    /// write concern passed to the store session
    #[clap(long = "write-concern", default_value = "majority")]
    pub write_concern: String,

    /// destination server host
    #[clap(long, default_value = "127.0.0.1")]
    pub host: String,

    /// destination server port
    #[clap(long, default_value_t = 27017)]
    pub port: u16,

    /// destination database name
    #[clap(long, default_value = "test")]
    pub db: String,

    /// destination collection name
    #[clap(long, default_value = "docplug")]
    pub collection: String,

    /// username for the destination server (accepted but not used: the
    /// reference wire adapter does not implement authentication)
    #[clap(long)]
    pub username: Option<String>,

    /// password for the destination server (accepted but not used: the
    /// reference wire adapter does not implement authentication)
    #[clap(long)]
    pub password: Option<String>,

    /// suppress the final "inserted N document(s)" summary line
    #[clap(short = 'q', long)]
    pub quiet: bool,
}
