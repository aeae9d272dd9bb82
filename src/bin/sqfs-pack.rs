use sqfs::{Compressor, DataWriterConfig, FileOptions, ImageWriter};
use std::{
    env, fs,
    io::{BufReader, BufWriter, Result},
    process,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1);
    let (Some(image), inputs) = (args.next(), args.collect::<Vec<_>>()) else {
        eprintln!("usage: sqfs-pack <image> <files...>");
        process::exit(1);
    };

    let output = BufWriter::new(fs::File::create(&image)?);
    let mut writer = ImageWriter::create(output, DataWriterConfig::default(), Compressor::default())?;

    for name in &inputs {
        let input = BufReader::new(fs::File::open(name)?);
        let record = writer.add_file(input, FileOptions::default())?;
        println!(
            "{}: {} bytes, blocks {:?}, fragment {:?}",
            name,
            record.size,
            record.block_sizes(),
            record.fragment.map(|f| (f.index, f.offset, f.size))
        );
        for block in &record.blocks {
            println!(
                "  {:>10} {:>8} {}",
                block.offset,
                block.stored_size(),
                if block.is_sparse() {
                    "sparse"
                } else if block.deduplicated {
                    "dedup"
                } else if block.is_compressed() {
                    "compressed"
                } else {
                    "raw"
                }
            );
        }
    }

    let stats = writer.data().stats();
    writer
        .finish()?
        .into_inner()
        .map_err(|e| e.into_error())?;
    eprintln!(
        "{} files, {} blocks written, {} deduplicated, {} sparse",
        inputs.len(),
        stats.blocks_written,
        stats.blocks_deduplicated,
        stats.sparse_blocks
    );
    Ok(())
}
