use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use extent_fs::SizePolicy;

#[derive(Parser)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Format a new image and copy every regular file of a directory into it
    Pack {
        /// Directory holding the files to pack
        #[arg(long, short)]
        source: PathBuf,

        /// Image file to create
        #[arg(long, short)]
        image: PathBuf,

        /// Image size in MiB
        #[arg(long, default_value_t = 16)]
        size_mib: u64,

        /// Number of inode slots, including the reserved slot 0
        #[arg(long, default_value_t = 256)]
        inodes: u32,

        /// How a write updates the file size
        #[arg(long, value_enum, default_value_t = Policy::WriteEnd)]
        policy: Policy,
    },

    /// Print the counters and every allocated inode of an image, then verify it
    Inspect {
        #[arg(long, short)]
        image: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Policy {
    WriteEnd,
    Extend,
}

impl From<Policy> for SizePolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::WriteEnd => SizePolicy::WriteEnd,
            Policy::Extend => SizePolicy::Extend,
        }
    }
}
