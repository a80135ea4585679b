//! Trace-replay driver for the `balloc` buddy allocator.
//!
//! Reads a trace file of `A size` / `F id` lines and replays them against a
//! `BuddyAllocator`, optionally dumping the free-list census after each line.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use balloc::{AllocError, BuddyAllocator, FreeError, DEFAULT_MAX_ORDER, DEFAULT_MIN_ORDER};
use clap::Parser;

/// Replay an allocation trace against a binary buddy allocator.
#[derive(Parser, Debug)]
#[command(name = "balloc-trace", version, about)]
struct Args {
    /// Path to the trace file, or `-` to read from stdin.
    #[arg(long, default_value = "-")]
    trace: String,

    /// Minimum block order (page order). Blocks are never split smaller than this.
    #[arg(long, default_value_t = DEFAULT_MIN_ORDER)]
    min_order: u32,

    /// Maximum block order. The arena is exactly `2^max_order` bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_ORDER)]
    max_order: u32,

    /// Dump the free-list census only once, at the end of the trace, instead of after
    /// every line.
    #[arg(long)]
    dump_at_end: bool,
}

/// One line of a trace file.
enum TraceLine {
    Alloc { size: usize },
    Free { id: usize },
}

fn parse_line(line: &str) -> Option<TraceLine> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut parts = line.split_whitespace();
    let op = parts.next()?;
    let arg = parts.next()?;

    match op {
        "A" => arg.parse::<usize>().ok().map(|size| TraceLine::Alloc { size }),
        "F" => arg.parse::<usize>().ok().map(|id| TraceLine::Free { id }),
        _ => {
            log::warn!("skipping unrecognized trace line: {line:?}");
            None
        }
    }
}

fn open_trace(path: &str) -> io::Result<Box<dyn BufRead>> {
    if path == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        Ok(Box::new(BufReader::new(File::open(PathBuf::from(path))?)))
    }
}

fn run(args: Args) -> io::Result<()> {
    let mut allocator = BuddyAllocator::new(args.min_order, args.max_order);
    let mut allocations: Vec<usize> = Vec::new();

    let reader = open_trace(&args.trace)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let Some(parsed) = parse_line(&line) else {
            continue;
        };

        match parsed {
            TraceLine::Alloc { size } => match allocator.alloc(size) {
                Ok(addr) => {
                    log::debug!("line {}: A {size} -> {addr:#x}", lineno + 1);
                    allocations.push(addr);
                }
                Err(AllocError::InvalidSize { requested, max_size }) => {
                    log::error!(
                        "line {}: A {size} invalid (requested {requested}, max {max_size})",
                        lineno + 1
                    );
                }
                Err(AllocError::OutOfMemory { order }) => {
                    log::error!(
                        "line {}: A {size} failed: out of memory at order {order}",
                        lineno + 1
                    );
                }
            },
            TraceLine::Free { id } => match allocations.get(id) {
                Some(&addr) => match allocator.free(addr) {
                    Ok(()) => log::debug!("line {}: F {id} -> freed {addr:#x}", lineno + 1),
                    Err(FreeError::OutOfBounds { address }) => {
                        log::error!(
                            "line {}: F {id} failed: {address:#x} out of bounds",
                            lineno + 1
                        );
                    }
                    Err(FreeError::NotAllocated { address }) => {
                        log::error!(
                            "line {}: F {id} failed: {address:#x} not allocated (double free or unknown address)",
                            lineno + 1
                        );
                    }
                },
                None => {
                    log::error!(
                        "line {}: F {id} references an allocation that was never made",
                        lineno + 1
                    );
                }
            },
        }

        if !args.dump_at_end {
            dump_to(&allocator, &mut out)?;
        }
    }

    if args.dump_at_end {
        dump_to(&allocator, &mut out)?;
    }

    Ok(())
}

fn dump_to(allocator: &BuddyAllocator, out: &mut impl Write) -> io::Result<()> {
    allocator
        .dump(&mut DumpAdapter(out))
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "failed to write dump output"))
}

/// Adapts a `std::io::Write` sink to `core::fmt::Write` for `BuddyAllocator::dump`.
struct DumpAdapter<'a, W: Write>(&'a mut W);

impl<W: Write> core::fmt::Write for DumpAdapter<'_, W> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.write_all(s.as_bytes()).map_err(|_| core::fmt::Error)
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("trace replay failed: {err}");
            ExitCode::FAILURE
        }
    }
}
