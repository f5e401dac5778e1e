use std::path::{Path, PathBuf};

use crate::config::get_config;
use crate::disc::browse::entry::count_files;
use crate::disc::svod::SplitVirtualDisc;
use crate::disc::{open_image, remap_god_to_sector, remap_sector_to_god, DiscError, DiscResult, GodAddress};

pub fn parse_flags<'a>() -> clap::ArgMatches<'a> {
    app().get_matches()
}

fn app<'a, 'b>() -> clap::App<'a, 'b> {
    clap::App::new("xdisc")
        .version(clap::crate_version!())
        .about("Read, extract and rehash Xbox 360 disc images, split virtual discs and package images")
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .arg(
            clap::Arg::from_usage("-d --debug 'Enable debug output'")
                .global(true)
        )
        .subcommand(
            clap::SubCommand::with_name("info")
                .about("Show what kind of image a path holds")
                .arg(clap::Arg::from_usage("<PATH> 'Disc image, split virtual disc root or package directory'")),
        )
        .subcommand(
            clap::SubCommand::with_name("list")
                .about("List every file and directory on the disc")
                .arg(clap::Arg::from_usage("<PATH> 'Disc image, split virtual disc root or package directory'")),
        )
        .subcommand(
            clap::SubCommand::with_name("extract")
                .about("Extract the disc contents, or a single file")
                .arg(clap::Arg::from_usage("<PATH> 'Disc image, split virtual disc root or package directory'"))
                .arg(clap::Arg::from_usage("-o, --output [output_dir] 'Destination folder (defaults to the configured output_dir)'"))
                .arg(clap::Arg::from_usage("-f, --file [entry_path] 'Path of a single file on the disc, e.g. media/intro.wmv'")),
        )
        .subcommand(
            clap::SubCommand::with_name("rehash")
                .about("Rebuild the hash tables of a split virtual disc and update its root descriptor")
                .arg(clap::Arg::from_usage("<SVOD_ROOT> 'Root descriptor file of the split virtual disc'")),
        )
        .subcommand(
            clap::SubCommand::with_name("remap")
                .about("Translate between disc sectors and package part file offsets")
                .arg(clap::Arg::from_usage("--sector [sector] 'Disc sector to locate in the package'"))
                .arg(clap::Arg::from_usage("--offset [offset] 'Byte offset within a part file'").requires("part"))
                .arg(clap::Arg::from_usage("--part [part] 'Part file index'").requires("offset"))
                .group(
                    clap::ArgGroup::with_name("address")
                        .args(&["sector", "offset"])
                        .required(true),
                ),
        )
}

/// Dispatch the parsed subcommand
pub fn run(matches: &clap::ArgMatches) -> DiscResult<()> {
    match matches.subcommand() {
        ("info", Some(cmd)) => info(&required_path(cmd, "PATH")?),
        ("list", Some(cmd)) => list(&required_path(cmd, "PATH")?),
        ("extract", Some(cmd)) => {
            let output = cmd
                .value_of("output")
                .map(PathBuf::from)
                .unwrap_or_else(|| get_config().extract.output_dir.clone());
            extract(&required_path(cmd, "PATH")?, &output, cmd.value_of("file"))
        }
        ("rehash", Some(cmd)) => rehash(&required_path(cmd, "SVOD_ROOT")?),
        ("remap", Some(cmd)) => remap(cmd),
        _ => Err(DiscError::InvalidArgument(
            "Unknown subcommand. Use --help for details.".to_string(),
        )),
    }
}

fn required_path(cmd: &clap::ArgMatches, name: &str) -> DiscResult<PathBuf> {
    cmd.value_of(name)
        .map(PathBuf::from)
        .ok_or_else(|| DiscError::InvalidArgument(format!("{} is required.", name)))
}

fn info(path: &Path) -> DiscResult<()> {
    let (format, image) = open_image(path)?;
    println!("{}", path.display());
    println!("  {:<14} {}", "Format", format.display_name());
    for (key, value) in image.properties() {
        println!("  {:<14} {}", key, value);
    }
    Ok(())
}

fn list(path: &Path) -> DiscResult<()> {
    let (_, mut image) = open_image(path)?;
    let file_count = count_files(image.list()?);
    let entries = image.list_entries()?;
    for entry in &entries {
        if entry.is_directory() {
            println!("{:>12}  {}/", "<DIR>", entry.path);
        } else {
            println!("{:>12}  {}", entry.size_string(), entry.path);
        }
    }
    println!(
        "{} files, {} directories",
        file_count,
        entries.len() as u64 - file_count
    );
    Ok(())
}

fn extract(path: &Path, output: &Path, file: Option<&str>) -> DiscResult<()> {
    let (_, mut image) = open_image(path)?;
    let show_progress = get_config().extract.show_progress;

    match file {
        Some(entry_path) => {
            let entry = image.find_entry(entry_path)?;
            let mut report = |done: u64, total: u64| {
                eprint!("\r{}: {} / {} bytes", entry_path, done, total);
            };
            let progress: Option<&mut dyn FnMut(u64, u64)> =
                if show_progress { Some(&mut report) } else { None };
            let written = image.extract_one(&entry, output, progress)?;
            if show_progress {
                eprintln!();
            }
            println!("Wrote {}", written.display());
        }
        None => {
            let mut report = |done: u64, total: u64| {
                eprint!("\rExtracted {} / {} files", done, total);
            };
            let progress: Option<&mut dyn FnMut(u64, u64)> =
                if show_progress { Some(&mut report) } else { None };
            let count = image.extract_all(output, progress)?;
            if show_progress {
                eprintln!();
            }
            println!("Extracted {} files to {}", count, output.display());
        }
    }
    Ok(())
}

fn rehash(root: &Path) -> DiscResult<()> {
    let mut disc = SplitVirtualDisc::open_writable(root)?;
    let show_progress = get_config().extract.show_progress;

    let mut report = |done: u64, total: u64| {
        eprint!("\rHashed {} / {} part files", done, total);
    };
    let progress: Option<&mut dyn FnMut(u64, u64)> =
        if show_progress { Some(&mut report) } else { None };
    let root_hash = disc.rehash(progress)?;
    if show_progress {
        eprintln!();
    }

    let hex: String = root_hash.iter().map(|b| format!("{:02X}", b)).collect();
    println!("Root hash {}", hex);
    Ok(())
}

fn remap(cmd: &clap::ArgMatches) -> DiscResult<()> {
    if let Some(sector) = cmd.value_of("sector") {
        let sector = parse_number(sector)?;
        let address = remap_sector_to_god(sector);
        println!(
            "Sector 0x{:X} -> Data{:04} offset 0x{:X}",
            sector, address.part_index, address.offset
        );
        return Ok(());
    }

    let offset = cmd
        .value_of("offset")
        .ok_or_else(|| DiscError::InvalidArgument("--offset is required.".to_string()))?;
    let part = cmd
        .value_of("part")
        .ok_or_else(|| DiscError::InvalidArgument("--part is required.".to_string()))?;
    let address = GodAddress {
        offset: parse_number(offset)?,
        part_index: parse_number(part)? as usize,
    };
    let sector = remap_god_to_sector(address)?;
    println!(
        "Data{:04} offset 0x{:X} -> sector 0x{:X}",
        address.part_index, address.offset, sector
    );
    Ok(())
}

/// Parse a decimal or `0x`-prefixed hexadecimal number
fn parse_number(value: &str) -> DiscResult<u64> {
    let trimmed = value.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|_| DiscError::InvalidArgument(format!("'{}' is not a number", value)))
}
