use clap::{Parser, Subcommand};
use oxplist::{Format, Value};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "oxplist", about = "Property list inspection and conversion")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a plist between the binary and XML serializations
    Convert {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Target format: xml (default) or binary
        #[arg(short, long, default_value = "xml")]
        format: String,
    },
    /// Parse a plist and print its value tree
    Print {
        input: PathBuf,
    },
    /// Show document-level facts without dumping the contents
    Info {
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {

        // ── Convert ──────────────────────────────────────────────────────────
        Commands::Convert { input, output, format } => {
            let target = parse_format(&format);
            let value = oxplist::decode(&std::fs::read(&input)?)?;
            let bytes = oxplist::encode(&value, target)?;
            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(&output, &bytes)?;
            println!("Wrote {} ({} bytes, {})", output.display(), bytes.len(), target);
        }

        // ── Print ────────────────────────────────────────────────────────────
        Commands::Print { input } => {
            let value = oxplist::decode(&std::fs::read(&input)?)?;
            println!("{}", value);
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let data   = std::fs::read(&input)?;
            let format = Format::detect(&data).ok_or("unrecognized plist format")?;
            let value  = oxplist::decode(&data)?;

            println!("── Property list ────────────────────────────────────────");
            println!("  Path    {}", input.display());
            println!("  Format  {}", format);
            println!("  Size    {} B", data.len());
            println!("  Root    {}", value.type_name());
            println!("  Nodes   {}", count_nodes(&value));
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn parse_format(s: &str) -> Format {
    Format::from_name(s).unwrap_or_else(|| {
        eprintln!("Unknown format '{}', defaulting to xml", s);
        Format::Xml
    })
}

fn count_nodes(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(count_nodes).sum::<usize>(),
        Value::Dict(dict) => 1 + dict.values().map(count_nodes).sum::<usize>(),
        _ => 1,
    }
}
