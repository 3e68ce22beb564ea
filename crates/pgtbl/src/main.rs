use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use rvmmu::{
    AddressTranslator, MemoryReader, PageTableWalker, PhysicalAddress, RegisterSource,
    VirtualAddress, decode_mcause, decode_scause, ensure_supported_architecture,
};

use pgtbl::backend::{QemuMonitor, open_image};
use pgtbl::console::Console;
use pgtbl::hex::{RootArg, parse_hex};
use pgtbl::registers::{RegisterFile, RegisterOverride, Registers};
use pgtbl::render;

#[derive(Parser)]
#[command(name = "pgtbl")]
#[command(about = "RISC-V Sv39 page table dump and address translation tool")]
struct Args {
    /// Raw physical memory image
    #[arg(long, env = "PGTBL_IMAGE", global = true)]
    image: Option<PathBuf>,

    /// Physical address of the first byte of the image
    #[arg(long, env = "PGTBL_IMAGE_BASE", default_value = "0x80000000", value_parser = parse_hex, global = true)]
    image_base: u64,

    /// QEMU human monitor listening on TCP (HOST:PORT)
    #[arg(long, env = "PGTBL_MONITOR", global = true)]
    monitor: Option<String>,

    /// Connect and read timeout for the monitor, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Saved `info registers` output
    #[arg(long, global = true)]
    registers: Option<PathBuf>,

    /// Register override (NAME=HEX), may be repeated
    #[arg(long = "reg", value_name = "NAME=HEX", global = true)]
    overrides: Vec<RegisterOverride>,

    /// Target architecture
    #[arg(long, default_value = "riscv:rv64", global = true)]
    arch: String,

    /// Raise the log level, may be repeated
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dump every mapping below a root table, or the one covering VADDR
    DumpPgtbl {
        /// Root table address, or `-` to take it from satp
        root: Option<RootArg>,

        /// Only show the mapping covering this virtual address
        #[arg(value_parser = parse_hex)]
        vaddr: Option<u64>,
    },
    /// Translate a virtual address the way the MMU would
    TranslateVaddr {
        /// Virtual address to translate
        #[arg(value_parser = parse_hex)]
        vaddr: u64,

        /// Root table address, or `-` to take it from satp
        root: Option<RootArg>,
    },
    /// Decode the last trap taken into M-mode
    Mcause,
    /// Decode the last trap taken into S-mode
    Scause,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    Console::init(args.verbose).context("failed to install logger")?;

    ensure_supported_architecture(&args.arch)?;

    let monitor = args
        .monitor
        .as_deref()
        .map(|address| {
            QemuMonitor::connect(address, args.timeout.map(Duration::from_secs))
                .with_context(|| format!("failed to connect to monitor at {address}"))
        })
        .transpose()?;

    let mut registers = Registers::new().with_overrides(args.overrides.iter().cloned());
    if let Some(path) = &args.registers {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read register file {}", path.display()))?;
        registers = registers.with_saved(RegisterFile::parse(&text));
    }
    if let Some(monitor) = &monitor {
        registers = registers.with_live(monitor);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Command::DumpPgtbl { root, vaddr } => {
            let memory = open_memory(&args, monitor.as_ref())?;
            let root = resolve_root(root, &registers, &mut out)?;
            let walker = PageTableWalker::new(memory.as_ref());

            match vaddr.map(VirtualAddress::new) {
                Some(vaddr) => match walker.find(root, vaddr)? {
                    Some(found) => render::render_found(&mut out, vaddr, &found)?,
                    None => bail!("no mapping covers {vaddr}"),
                },
                None => render::render_dump(&mut out, &walker.dump(root)?)?,
            }
        }
        Command::TranslateVaddr { vaddr, root } => {
            let memory = open_memory(&args, monitor.as_ref())?;
            let root = resolve_root(root, &registers, &mut out)?;
            let translation =
                AddressTranslator::new(memory.as_ref()).translate(root, VirtualAddress::new(vaddr))?;
            render::render_translation(&mut out, &translation)?;
        }
        Command::Mcause => render::render_trap(&mut out, &decode_mcause(&registers)?)?,
        Command::Scause => render::render_trap(&mut out, &decode_scause(&registers)?)?,
    }

    out.flush()?;
    Ok(())
}

/// Picks the memory backend: the live monitor if there is one, else the image.
fn open_memory<'m>(
    args: &Args,
    monitor: Option<&'m QemuMonitor>,
) -> anyhow::Result<Box<dyn MemoryReader + 'm>> {
    if let Some(monitor) = monitor {
        return Ok(Box::new(monitor));
    }

    let Some(path) = &args.image else {
        bail!("no memory source, use --monitor or --image");
    };

    let image = open_image(path, PhysicalAddress::new(args.image_base))
        .with_context(|| format!("failed to open memory image {}", path.display()))?;
    Ok(Box::new(image))
}

/// Returns the given root, or the one `satp` points at. The decoded `satp` is printed.
fn resolve_root(
    root: Option<RootArg>,
    registers: &impl RegisterSource,
    out: &mut impl Write,
) -> anyhow::Result<PhysicalAddress> {
    match root {
        Some(RootArg::Address(address)) => Ok(address),
        Some(RootArg::FromSatp) | None => {
            let satp = registers.read_satp()?;
            render::render_satp(out, &satp)?;
            Ok(satp.root_table()?)
        }
    }
}
