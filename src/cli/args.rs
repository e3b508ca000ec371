use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "unitefs")]
#[command(
    version,
    about = "Mount several directories as one read-only merged filesystem"
)]
pub struct Args {
    #[arg(help = "Directory to mount the union on")]
    pub mountpoint: PathBuf,

    #[arg(
        required = true,
        help = "Source directories, earliest first; earlier sources win file name collisions"
    )]
    pub sources: Vec<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Read configuration from FILE")]
    pub config: Option<PathBuf>,

    #[arg(
        short,
        long,
        value_name = "GLOB",
        help = "Leave out entries matching GLOB (repeatable)"
    )]
    pub exclude: Vec<String>,

    #[arg(long, help = "Let other users access the mount")]
    pub allow_other: bool,

    #[arg(long, help = "Print the merged tree and exit without mounting")]
    pub print_tree: bool,
}
