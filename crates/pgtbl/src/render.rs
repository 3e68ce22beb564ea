//! Text output for the `pgtbl` commands.
//!
//! Nested tables are indented two spaces per level below the root.

use std::io::{self, Write};

use rvmmu::cause::{Cause, CauseCode};
use rvmmu::{
    DumpRecord, FoundMapping, HumanAddress, HumanSize, PAGE_TABLE_LEVELS, PageTableDump, Satp,
    TraceStep, Translation, TrapKind, TrapReport, VirtualAddress,
};

fn indent(level: usize) -> String {
    " ".repeat((PAGE_TABLE_LEVELS - 1 - level) * 2)
}

pub fn render_satp(out: &mut impl Write, satp: &Satp) -> io::Result<()> {
    writeln!(out, "{satp}")
}

/// Prints every record of a dump followed by a summary line.
pub fn render_dump(out: &mut impl Write, dump: &PageTableDump) -> io::Result<()> {
    for record in &dump.records {
        match record {
            DumpRecord::Table { level, address } => writeln!(
                out,
                "{}L{level} table {}",
                indent(*level),
                HumanAddress::from(*address)
            )?,
            DumpRecord::Pointer {
                level,
                index,
                entry_addr,
                pte,
            } => writeln!(
                out,
                "{}  [{index:3}] {}: {pte}",
                indent(*level),
                HumanAddress::from(*entry_addr)
            )?,
            DumpRecord::Leaf(mapping) => writeln!(
                out,
                "{}  [{:3}] {}: {} -> {} {} {}",
                indent(mapping.level),
                mapping.index,
                HumanAddress::from(mapping.entry_addr),
                HumanAddress::from(mapping.vaddr),
                HumanAddress::from(mapping.paddr),
                HumanSize(mapping.page_size()),
                mapping.pte
            )?,
        }
    }

    let summary = dump.summary();
    writeln!(
        out,
        "tables: {}, pointers: {}, leaves: {} (4KiB: {}, 2MiB: {}, 1GiB: {})",
        summary.tables,
        summary.pointers,
        summary.total_leaves(),
        summary.leaves[0],
        summary.leaves[1],
        summary.leaves[2]
    )
}

fn render_trace(out: &mut impl Write, trace: &[TraceStep]) -> io::Result<()> {
    writeln!(out, "  trace:")?;
    for step in trace {
        writeln!(out, "    {step}")?;
    }
    Ok(())
}

pub fn render_found(out: &mut impl Write, vaddr: VirtualAddress, found: &FoundMapping) -> io::Result<()> {
    let mapping = &found.mapping;
    writeln!(
        out,
        "{} -> {}",
        HumanAddress::from(vaddr),
        HumanAddress::from(found.paddr)
    )?;
    writeln!(
        out,
        "  L{} leaf {} -> {} {} {}",
        mapping.level,
        HumanAddress::from(mapping.vaddr),
        HumanAddress::from(mapping.paddr),
        HumanSize(mapping.page_size()),
        mapping.pte
    )?;
    render_trace(out, &found.trace)
}

pub fn render_translation(out: &mut impl Write, translation: &Translation) -> io::Result<()> {
    writeln!(
        out,
        "{} -> {}",
        HumanAddress::from(translation.vaddr),
        HumanAddress::from(translation.paddr)
    )?;
    writeln!(
        out,
        "  level {} ({} page), permissions {}",
        translation.level,
        HumanSize(translation.page_size()),
        translation.permissions()
    )?;
    render_trace(out, &translation.trace)
}

pub fn render_trap<I: CauseCode, E: CauseCode>(
    out: &mut impl Write,
    report: &TrapReport<Cause<I, E>>,
) -> io::Result<()> {
    let kind = report.kind;
    let class = if report.cause.is_interrupt() {
        "interrupt"
    } else {
        "exception"
    };
    let field = match kind {
        TrapKind::Machine => "MPP",
        TrapKind::Supervisor => "SPP",
    };

    writeln!(
        out,
        "{:<8}{:#x} {} ({class})",
        kind.cause_register(),
        report.raw_cause,
        report.cause
    )?;
    writeln!(out, "{:<8}{:#x}", kind.epc_register(), report.epc)?;
    writeln!(out, "{:<8}{:#x}", kind.tval_register(), report.tval)?;
    writeln!(
        out,
        "previous privilege: {} ({}.{field})",
        report.previous_privilege,
        kind.status_register()
    )
}
