// SPDX-License-Identifier: MIT

mod image;

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use dkbfs::prelude::*;

use crate::image::{ImageOptions, ImageSession};

#[derive(Parser)]
#[command(name = "dkbtool", version, about = "DISK BASIC image tool", long_about = None)]
struct Cli {
    /// Disk image file
    image: PathBuf,

    /// First sector of the partition inside the image
    #[arg(long, default_value_t = 0, global = true)]
    offset: u32,

    /// Sector count of the partition (defaults to the rest of the image)
    #[arg(long, global = true)]
    sectors: Option<u32>,

    /// Sector size; every template's size is tried when unset
    #[arg(long, global = true)]
    sector_size: Option<u16>,

    /// Template name or category (`fat12`, `msdos`, `os9`, ...)
    #[arg(long, global = true)]
    hint: Option<String>,

    /// TOML file with extra templates
    #[arg(long, global = true)]
    templates: Option<PathBuf>,

    /// Mount write-protected
    #[arg(long, global = true)]
    read_only: bool,

    /// Log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the detected format and volume figures
    Info,
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Copy a file out of the image
    Get {
        path: String,
        /// Destination (stdout when omitted)
        dest: Option<PathBuf>,
        /// Strip the text terminator
        #[arg(long)]
        text: bool,
    },
    /// Copy a host file into the image
    Put {
        source: PathBuf,
        /// Target path inside the image (host file name when omitted)
        target: Option<String>,
        /// Append the text terminator
        #[arg(long)]
        text: bool,
        /// Attributes, e.g. "READ_ONLY | HIDDEN"
        #[arg(long)]
        attr: Option<String>,
    },
    /// Delete a file or a directory tree
    Rm { path: String },
    /// Create a directory
    Mkdir { path: String },
    /// Rename an entry in place
    Rename { path: String, name: String },
    /// Replace the attributes of an entry
    Attr { path: String, attr: String },
    /// Format the image with a template
    Format {
        template: String,
        #[arg(long)]
        label: Option<String>,
    },
    /// Show free space
    Free,
    /// Run the integrity checks
    Check,
    /// List the known templates
    Templates,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut table = TemplateTable::builtin();
    if let Some(path) = &cli.templates {
        let extra = TemplateTable::from_file(path)?;
        log::debug!("{} template(s) from {}", extra.len(), path.display());
        table.extend(extra);
    }
    let options = ImageOptions {
        offset: cli.offset,
        sectors: cli.sectors,
        sector_size: cli.sector_size,
        hint: cli.hint.clone(),
        templates: Arc::new(table),
        read_only: cli.read_only,
    };

    match cli.command {
        Commands::Templates => {
            for t in options.templates.iter() {
                println!(
                    "{:<14} {:<9} {:>5} x {:<5} {}",
                    t.name.bold(),
                    t.type_number().name(),
                    t.total_sectors(),
                    t.sector_size,
                    t.description
                );
            }
            Ok(())
        }
        Commands::Format { template, label } => {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&cli.image)
                .with_context(|| format!("cannot open {}", cli.image.display()))?;
            let vol = VolumeMeta {
                label,
                ..Default::default()
            };
            let mut s = options.format(&mut file, &template, &vol)?;
            println!("[dkbtool] Formatted {} as {}", cli.image.display(), template.green());
            print_info(&mut s);
            Ok(())
        }
        command => {
            let mut file = open_image(&cli.image, cli.read_only)?;
            let mut s = options.mount(&mut file)?;
            run(&mut s, command)
        }
    }
}

fn open_image(path: &Path, read_only: bool) -> anyhow::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(!read_only)
        .open(path)
        .with_context(|| format!("cannot open {}", path.display()))
}

fn run(s: &mut ImageSession<'_>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Info => print_info(s),
        Commands::Ls { path } => {
            let dir = s.find_path(&path)?;
            for id in s.list_dir(dir)? {
                println!("{}", listing_line(s.entry(id)?));
            }
        }
        Commands::Get { path, dest, text } => {
            let id = s.find_path(&path)?;
            let data = s.read_file(id, load_mode(text))?;
            match dest {
                Some(p) => std::fs::write(&p, &data)
                    .with_context(|| format!("cannot write {}", p.display()))?,
                None => std::io::stdout().write_all(&data)?,
            }
        }
        Commands::Put {
            source,
            target,
            text,
            attr,
        } => {
            let host_name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target = target.unwrap_or(host_name);
            let name = enter_parent(s, &target)?;
            let (base, ext) = split_name_ext(name);
            let attr = attr.as_deref().map(parse_attr).transpose()?.unwrap_or(FileAttr::empty());
            let entry = DirectoryEntry::new_file(base, ext, attr);
            let mut file = File::open(&source)
                .with_context(|| format!("cannot open {}", source.display()))?;
            let id = s.save(&mut file, &entry, load_mode(text))?;
            println!("[dkbtool] Saved {}", s.path_of(id)?.green());
        }
        Commands::Rm { path } => {
            let id = s.find_path(&path)?;
            s.delete(id)?;
        }
        Commands::Mkdir { path } => {
            let name = enter_parent(s, &path)?;
            s.make_directory(name)?;
        }
        Commands::Rename { path, name } => {
            let id = s.find_path(&path)?;
            s.rename(id, &name)?;
        }
        Commands::Attr { path, attr } => {
            let id = s.find_path(&path)?;
            s.change_attributes(id, parse_attr(&attr)?)?;
        }
        Commands::Free => {
            let free = s.free_space()?;
            println!(
                "{} of {} groups free ({} of {} bytes)",
                free.free_groups,
                free.total_groups,
                free.free_bytes(),
                free.total_bytes()
            );
        }
        Commands::Check => {
            let rep = s.check()?;
            if rep.is_empty() {
                println!("[dkbtool] {}", "No problems found".green());
            } else {
                print!("{rep}");
            }
            if rep.has_error() {
                bail!("check failed: {}", rep.first_error().unwrap_or("error"));
            }
        }
        Commands::Format { .. } | Commands::Templates => bail!("command runs without a mounted volume"),
    }
    s.store_mut().flush()?;
    Ok(())
}

/// Changes into the directory part of `path` and returns the last component.
fn enter_parent<'p>(s: &mut ImageSession<'_>, path: &'p str) -> anyhow::Result<&'p str> {
    let path = path.trim_end_matches('/');
    let (dir, name) = match path.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((dir, name)) => (dir, name),
        None => ("", path),
    };
    if !dir.is_empty() {
        s.change_directory_path(dir)?;
    }
    if name.is_empty() {
        bail!("missing file name in {path:?}");
    }
    Ok(name)
}

fn parse_attr(text: &str) -> anyhow::Result<FileAttr> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("none") {
        return Ok(FileAttr::empty());
    }
    Ok(FileAttr::parse(&text.to_ascii_uppercase())?)
}

fn load_mode(text: bool) -> LoadMode {
    if text { LoadMode::Text } else { LoadMode::Binary }
}

fn listing_line(e: &DirectoryEntry) -> String {
    let date = e.modified.map_or_else(
        || "----------------".to_string(),
        |d| {
            format!(
                "{:04}-{:02}-{:02} {:02}:{:02}",
                d.year(),
                d.month() as u8,
                d.day(),
                d.hour(),
                d.minute()
            )
        },
    );
    let name = e.full_name();
    let name = if e.is_dir() {
        format!("{name}/").blue().bold()
    } else {
        name.normal()
    };
    format!("{} {:>10} {date} {name}", e.attr.short(), e.size)
}

fn print_info(s: &mut ImageSession<'_>) {
    let (name, driver) = match s.driver() {
        Some(d) => (d.params().name.clone(), d.name()),
        None => return,
    };
    let store = s.store();
    println!("  {:<10}{} ({})", "template", name.bold(), driver);
    println!("  {:<10}{:.3}", "score", s.score());
    println!(
        "  {:<10}{} x {} bytes",
        "sectors",
        store.sector_count(),
        store.sector_size()
    );
    if let Some(label) = s.volume_label() {
        println!("  {:<10}{}", "label", label);
    }
    match s.free_space() {
        Ok(free) => println!(
            "  {:<10}{} / {} groups ({} bytes)",
            "free",
            free.free_groups,
            free.total_groups,
            free.free_bytes()
        ),
        Err(e) => println!("  {:<10}{}", "free", e.to_string().red()),
    }
}
