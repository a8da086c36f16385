use clap::{Parser, Subcommand};
use lcsio::index::read_random_access_at_end;
use lcsio::record::RecordRead;
use lcsio::registry::{RecordKind, INDEX_BLOCK_NAME};
use lcsio::{
    seek_stream, valid_sio_name, RecordIndex, RecordReader, RecordRegistry, SioConfig, Unpack,
};
use log::info;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "lcsio-dump", about = "Inspect LCIO-SIO record streams")]
struct Cli {
    /// Log filter: error, warn, info, debug, trace
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
    /// JSON file with codec options
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk every record of a file
    List {
        input: PathBuf,
        /// Records to unpack: event, header, run, access, index, all
        #[arg(short, long, value_delimiter = ',')]
        only: Vec<String>,
        /// Show the first N payload bytes of every block
        #[arg(long, default_value = "0")]
        hex: usize,
    },
    /// Print the trailing random access record and the index it points to
    Access {
        input: PathBuf,
    },
    /// Print the SIO name derived from each label
    Name {
        #[arg(required = true, num_args = 1..)]
        labels: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level)).init();

    let config = match &cli.config {
        Some(path) => SioConfig::from_json_file(path)?,
        None       => SioConfig::default(),
    };

    match cli.command {
        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, only, hex } => {
            let mask = parse_mask(&only)?;
            let mut stream = open(&input)?;
            let mut registry = RecordRegistry::from_config(&config);
            let scoped = Unpack::new(&mut registry, mask);
            let mut reader = RecordReader::from_config(&config);

            let mut count = 0usize;
            while let Some(read) = reader.read_next(&mut stream, &scoped)? {
                count += 1;
                match read {
                    RecordRead::Unpacked(rec) => {
                        println!("{:>12}  {}", rec.location, rec.kind.record_name());
                        for block in &rec.blocks {
                            let preview = if hex > 0 {
                                hex::encode(&block.payload[..hex.min(block.payload.len())])
                            } else {
                                String::new()
                            };
                            println!("{:>12}    {:<24} {} {:>8} B  {}",
                                "", block.name, block.version, block.payload.len(), preview);
                        }
                    }
                    RecordRead::Skipped { name, location, .. } => {
                        println!("{location:>12}  {name} (skipped)");
                    }
                }
            }
            info!("{count} record(s) in {}", input.display());
        }

        // ── Access ───────────────────────────────────────────────────────────
        Commands::Access { input } => {
            let mut stream = open(&input)?;
            let mut reader = RecordReader::from_config(&config);
            let ra = read_random_access_at_end(&mut reader, &mut stream)?;

            println!("── Random access ────────────────────────────────────────");
            println!("  First        run {} event {}", ra.min.run, ra.min.event);
            println!("  Last         run {} event {}", ra.max.run, ra.max.event);
            println!("  Run headers  {}", ra.run_headers);
            println!("  Events       {}", ra.events);
            println!("  Index at     {}", ra.index_location);
            println!("  Previous at  {}", ra.prev_location);
            println!("  First record {}", ra.first_record_location);

            if ra.index_location > 0 {
                let mut registry = RecordRegistry::new();
                let scoped = Unpack::new(&mut registry, Unpack::INDEX);
                seek_stream(&mut stream, ra.index_location)?;
                let index = match reader.read_next(&mut stream, &scoped)? {
                    Some(RecordRead::Unpacked(rec)) if rec.kind == RecordKind::Index => rec
                        .block(INDEX_BLOCK_NAME)
                        .map(RecordIndex::decode)
                        .transpose()?,
                    _ => None,
                };
                match index {
                    Some(index) => {
                        println!("  Index entries ({}):", index.len());
                        for (key, location) in index.iter() {
                            println!("    run {:>6} event {:>8}  @ {}", key.run, key.event, location);
                        }
                    }
                    None => println!("  No index record at {}", ra.index_location),
                }
            }
        }

        // ── Name ─────────────────────────────────────────────────────────────
        Commands::Name { labels } => {
            for label in labels {
                println!("{label:<32} {}", valid_sio_name(&label));
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn open(path: &Path) -> std::io::Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

fn parse_mask(only: &[String]) -> Result<u32, String> {
    if only.is_empty() {
        return Ok(Unpack::ALL);
    }
    only.iter().try_fold(0u32, |mask, name| {
        let bit = match name.to_lowercase().as_str() {
            "event"  => Unpack::EVENT,
            "header" => Unpack::HEADER,
            "run"    => Unpack::RUN,
            "access" => Unpack::ACCESS,
            "index"  => Unpack::INDEX,
            "all"    => Unpack::ALL,
            other    => return Err(format!("unknown record kind '{other}'")),
        };
        Ok(mask | bit)
    })
}
