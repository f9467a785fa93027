use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use zar::{Decoder, Encoder, Header};

#[derive(Parser)]
#[command(name = "zar", version, about = "The zar encrypted archive CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack files and directories into an encrypted archive
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// Passphrase (or set ZAR_PASSWORD)
        #[arg(short, long, env = "ZAR_PASSWORD")]
        password: String,
        /// Optional note stored in the almanac
        #[arg(short, long)]
        note: Option<String>,
        #[arg(required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// Extract an archive
    Unpack {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(short, long, env = "ZAR_PASSWORD")]
        password: String,
    },
    /// List archive contents without extracting
    List {
        input: PathBuf,
        #[arg(short, long, env = "ZAR_PASSWORD")]
        password: String,
    },
    /// Show archive metadata
    Info {
        input: PathBuf,
        #[arg(short, long, env = "ZAR_PASSWORD")]
        password: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    match Cli::parse().command {
        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, password, note, input } => {
            let mut enc = Encoder::new(File::create(&output)?, password.as_bytes())?;
            if let Some(note) = note {
                enc.set_note(note.into_bytes())?;
            }

            let mut total = 0u64;
            for path in &input {
                for (name, file_path) in collect_files(path)? {
                    let modified = mtime_seconds(&file_path)?;
                    let mut reader = File::open(&file_path)?;
                    let n = enc.add(&name, modified, &mut reader)?;
                    total += n;
                    println!("  packed  {name} ({n} B)");
                }
            }
            enc.close()?;

            let on_disk = std::fs::metadata(&output)?.len();
            println!("Created: {}  ({total} B in, {on_disk} B on disk)", output.display());
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir, password } => {
            let mut dec = open_archive(&input, &password)?;
            let count = dec.read_almanac()?.files.len();
            dec.extract(&output_dir)?;
            println!("Unpacked {count} file(s) to: {}", output_dir.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, password } => {
            let mut dec = open_archive(&input, &password)?;
            let almanac = dec.read_almanac()?;

            println!("Archive: {}", input.display());
            println!("{:<40} {:>12} {:>12}  {}", "Name", "Size", "Block", "Modified");
            for file in &almanac.files {
                println!(
                    "{:<40} {:>12} {:>12}  {}",
                    file.name,
                    file.size,
                    file.block_offset,
                    render_timestamp(file.modified),
                );
            }
            if !almanac.note.is_empty() {
                println!("Note: {}", String::from_utf8_lossy(&almanac.note));
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, password } => {
            let file_size = std::fs::metadata(&input)?.len();
            let mut dec = open_archive(&input, &password)?;
            let body_len = dec.body_len();
            let salt = hex::encode(dec.salt());
            let iv = hex::encode(dec.iv());
            let almanac = dec.read_almanac()?;
            let suite = Header::CURRENT;

            println!("── zar archive ──────────────────────────────────────────");
            println!("  Path          {}", input.display());
            println!("  File size     {file_size} B");
            println!("  Body          {body_len} B ({} cipher blocks)", body_len / 16);
            println!("  Salt          {salt}");
            println!("  IV            {iv}");
            println!("  Files         {}", almanac.files.len());
            println!("  Note          {} B", almanac.note.len());
            println!(
                "  Suite         cipher={} mac={} compression={} (declared, headerless)",
                suite.cipher_suite, suite.mac, suite.compression,
            );
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn open_archive(path: &Path, password: &str) -> Result<Decoder<File>, Box<dyn std::error::Error>> {
    let len = std::fs::metadata(path)?.len();
    Ok(Decoder::new(File::open(path)?, password.as_bytes(), len)?)
}

/// Expand a file or directory into `(entry_name, path)` pairs. Directory
/// entries are named relative to the directory's parent so the directory
/// itself appears in the archive.
fn collect_files(path: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();

    if path.is_dir() {
        let root = path.parent().unwrap_or_else(|| Path::new(""));
        walk(path, root, &mut out)?;
    } else {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        out.push((name, path.to_path_buf()));
    }

    Ok(out)
}

fn walk(dir: &Path, root: &Path, out: &mut Vec<(String, PathBuf)>) -> std::io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, root, out)?;
        } else {
            let name = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            out.push((name, path));
        }
    }
    Ok(())
}

fn mtime_seconds(path: &Path) -> std::io::Result<u64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0))
}

fn render_timestamp(seconds: u64) -> String {
    chrono::DateTime::from_timestamp(seconds as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| seconds.to_string())
}
