use std::fs::File;
use std::io::{BufReader, Result};
use std::path::PathBuf;

use clap::Parser;

use sqfs::image::Image;

/// Prints the superblock and fragment table of an image.
#[derive(Parser, Debug)]
#[command(version, about, long_about)]
struct Args {
    #[arg(short, long)]
    image: PathBuf,

    /// Also print the raw 16 byte entries
    #[arg(short, long)]
    raw: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let image = Image::new(BufReader::new(File::open(&args.image)?))?;

    println!("{}", image.superblock());
    println!("compressor {}", image.compressor());

    let fragments = image.fragments()?;
    println!("{} fragment blocks", fragments.len());
    for (index, entry) in fragments.iter().enumerate() {
        if args.raw {
            println!("{:>6} {} {:02x?}", index, entry, entry.as_bytes());
        } else {
            println!("{:>6} {}", index, entry);
        }
    }
    Ok(())
}
