//! Register values from the command line, a saved register dump or a live monitor.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::str::FromStr;

use rvmmu::{Error, RegisterSource};

use crate::backend::MonitorError;
use crate::hex::{ParseHexError, parse_hex};

/// A set of named register values.
///
/// Names are stored in lowercase. Registers printed with an alias, such as
/// `x2/sp`, are stored under both names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    values: BTreeMap<String, u64>,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the output of `info registers`.
    ///
    /// Two layouts are understood: QEMU's monitor, which prints one or more
    /// `name value` pairs per line with bare hex values, and GDB, which prints
    /// `name 0xvalue natural` with anything after the hex value ignored.
    /// Lines that match neither are skipped with a warning.
    pub fn parse(text: &str) -> Self {
        let mut file = Self::new();

        for (number, line) in text.lines().enumerate() {
            let tokens: Vec<&str> = line.split_whitespace().filter(|&t| t != "=").collect();
            if tokens.is_empty() {
                continue;
            }

            match parse_line(&tokens) {
                Some(pairs) => {
                    for (name, value) in pairs {
                        file.insert_aliases(name, value);
                    }
                }
                None => log::warn!("skipping unparseable register line {}: {:?}", number + 1, line.trim()),
            }
        }

        file
    }

    pub fn insert(&mut self, name: &str, value: u64) {
        self.values.insert(name.to_ascii_lowercase(), value);
    }

    fn insert_aliases(&mut self, names: &str, value: u64) {
        for name in names.split('/').filter(|name| !name.is_empty()) {
            self.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.values.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn parse_line<'t>(tokens: &[&'t str]) -> Option<Vec<(&'t str, u64)>> {
    if let [name, value, ..] = tokens
        && (value.starts_with("0x") || value.starts_with("0X"))
    {
        return Some(vec![(*name, parse_hex(value).ok()?)]);
    }

    if tokens.len() % 2 != 0 {
        return None;
    }

    tokens
        .chunks_exact(2)
        .map(|pair| parse_hex(pair[1]).ok().map(|value| (pair[0], value)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseOverrideError {
    #[error("expected NAME=HEX, got {0:?}")]
    MissingEquals(String),
    #[error("register name is empty")]
    EmptyName,
    #[error(transparent)]
    Value(#[from] ParseHexError),
}

/// A `--reg NAME=HEX` command line override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOverride {
    pub name: String,
    pub value: u64,
}

impl FromStr for RegisterOverride {
    type Err = ParseOverrideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| ParseOverrideError::MissingEquals(s.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ParseOverrideError::EmptyName);
        }

        Ok(Self {
            name: name.to_ascii_lowercase(),
            value: parse_hex(value)?,
        })
    }
}

/// Something that can dump the current registers of the target.
pub trait LiveRegisters {
    fn info_registers(&self) -> Result<RegisterFile, MonitorError>;
}

/// Resolves registers from overrides first, then a saved dump, then the live target.
///
/// The live target is asked at most once; its answer is kept for the rest of
/// the invocation so that all registers of one report come from the same stop.
#[derive(Default)]
pub struct Registers<'m> {
    overrides: RegisterFile,
    saved: Option<RegisterFile>,
    live: Option<&'m dyn LiveRegisters>,
    snapshot: RefCell<Option<RegisterFile>>,
}

impl<'m> Registers<'m> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = RegisterOverride>) -> Self {
        for RegisterOverride { name, value } in overrides {
            self.overrides.insert(&name, value);
        }
        self
    }

    pub fn with_saved(mut self, saved: RegisterFile) -> Self {
        self.saved = Some(saved);
        self
    }

    pub fn with_live(mut self, live: &'m dyn LiveRegisters) -> Self {
        self.live = Some(live);
        self
    }

    fn read_live(&self, live: &dyn LiveRegisters, name: &str) -> rvmmu::Result<u64> {
        let mut snapshot = self.snapshot.borrow_mut();
        if snapshot.is_none() {
            let registers = live
                .info_registers()
                .map_err(|err| unavailable(name, err.to_string()))?;
            if registers.is_empty() {
                return Err(unavailable(name, "the monitor printed no registers"));
            }
            log::debug!("monitor reported {} registers", registers.len());
            *snapshot = Some(registers);
        }

        snapshot
            .as_ref()
            .and_then(|registers| registers.get(name))
            .ok_or_else(|| unavailable(name, "not reported by the monitor"))
    }
}

impl RegisterSource for Registers<'_> {
    fn read_register(&self, name: &str) -> rvmmu::Result<u64> {
        if let Some(value) = self.overrides.get(name) {
            log::debug!("{name}={value:#x} from the command line");
            return Ok(value);
        }

        if let Some(value) = self.saved.as_ref().and_then(|saved| saved.get(name)) {
            log::debug!("{name}={value:#x} from the register file");
            return Ok(value);
        }

        match self.live {
            Some(live) => self.read_live(live, name),
            None if self.saved.is_some() => Err(unavailable(name, "not in the register file")),
            None => Err(unavailable(
                name,
                "no register source, use --reg, --registers or --monitor",
            )),
        }
    }
}

fn unavailable(name: &str, reason: impl Into<String>) -> Error {
    Error::RegisterUnavailable {
        name: name.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    const QEMU_INFO_REGISTERS: &str = "\
 V      =   0
 pc       0000000080200a14
 mhartid  0000000000000000
 mstatus  0000000a000000a0
 satp     8000000000080400
 mcause   8000000000000005
 scause   000000000000000d
 x0/zero  0000000000000000 x1/ra    0000000080200b34 x2/sp    0000000080212f60
";

    #[test]
    fn parses_qemu_layout() {
        let file = RegisterFile::parse(QEMU_INFO_REGISTERS);
        assert_eq!(file.get("pc"), Some(0x8020_0a14));
        assert_eq!(file.get("satp"), Some(0x8000_0000_0008_0400));
        assert_eq!(file.get("mcause"), Some(0x8000_0000_0000_0005));
        assert_eq!(file.get("v"), Some(0));
        assert_eq!(file.get("x2"), Some(0x8021_2f60));
        assert_eq!(file.get("sp"), Some(0x8021_2f60));
        assert_eq!(file.get("SP"), Some(0x8021_2f60));
    }

    #[test]
    fn parses_gdb_layout() {
        let file = RegisterFile::parse(
            "pc             0x80200a14       0x80200a14 <kmain+20>\n\
             mstatus        0xa00000080      SD:0 VM:00 MXR:0 PUM:0 MPRV:0 XS:0 FS:0 MPP:0 HPP:0 SPP:0 MPIE:1 HPIE:0\n\
             scause         0xd      13\n",
        );
        assert_eq!(file.get("pc"), Some(0x8020_0a14));
        assert_eq!(file.get("mstatus"), Some(0xa_0000_0080));
        assert_eq!(file.get("scause"), Some(0xd));
        assert_eq!(file.len(), 3);
    }

    #[test]
    fn skips_garbage_lines() {
        let file = RegisterFile::parse("info registers\nsatp 80000\nlonely\n");
        assert_eq!(file.get("satp"), Some(0x80000));
        assert_eq!(file.len(), 1);
    }

    #[test]
    fn override_syntax() {
        assert_eq!(
            "SATP=0x8000_0000_0008_0400".parse(),
            Ok(RegisterOverride {
                name: "satp".into(),
                value: 0x8000_0000_0008_0400
            })
        );
        assert_eq!(
            "satp".parse::<RegisterOverride>(),
            Err(ParseOverrideError::MissingEquals("satp".into()))
        );
        assert_eq!("=1".parse::<RegisterOverride>(), Err(ParseOverrideError::EmptyName));
        assert!(matches!(
            "satp=zz".parse::<RegisterOverride>(),
            Err(ParseOverrideError::Value(_))
        ));
    }

    struct CountingMonitor {
        calls: Cell<usize>,
    }

    impl LiveRegisters for CountingMonitor {
        fn info_registers(&self) -> Result<RegisterFile, MonitorError> {
            self.calls.set(self.calls.get() + 1);
            Ok(RegisterFile::parse(QEMU_INFO_REGISTERS))
        }
    }

    #[test]
    fn resolution_order() {
        let monitor = CountingMonitor { calls: Cell::new(0) };
        let mut saved = RegisterFile::new();
        saved.insert("scause", 0xf);
        saved.insert("satp", 1);

        let registers = Registers::new()
            .with_overrides([RegisterOverride {
                name: "satp".into(),
                value: 2,
            }])
            .with_saved(saved)
            .with_live(&monitor);

        assert_eq!(registers.read_register("satp"), Ok(2));
        assert_eq!(registers.read_register("scause"), Ok(0xf));
        assert_eq!(monitor.calls.get(), 0);

        assert_eq!(registers.read_register("mcause"), Ok(0x8000_0000_0000_0005));
        assert_eq!(registers.read_register("pc"), Ok(0x8020_0a14));
        assert_eq!(monitor.calls.get(), 1);

        assert!(matches!(
            registers.read_register("stval"),
            Err(Error::RegisterUnavailable { name, .. }) if name == "stval"
        ));
    }

    struct Monitor {
        info_registers: &'static str,
    }

    impl LiveRegisters for Monitor {
        fn info_registers(&self) -> Result<RegisterFile, MonitorError> {
            Ok(RegisterFile::parse(self.info_registers))
        }
    }

    #[test]
    fn supervisor_trap_from_qemu_without_sstatus() {
        let monitor = Monitor {
            info_registers: " pc       0000000080200a14
 mstatus  0000000a00000120
 satp     8000000000080400
 scause   000000000000000d
 sepc     0000000080200a10
 stval    0000000000001008
",
        };
        let registers = Registers::new().with_live(&monitor);

        let report = rvmmu::decode_scause(&registers).unwrap();
        assert_eq!(
            report.cause,
            rvmmu::cause::Cause::Exception(rvmmu::cause::SupervisorException::LoadPageFault)
        );
        assert_eq!(report.epc, 0x8020_0a10);
        assert_eq!(report.tval, 0x1008);
        assert_eq!(
            report.previous_privilege,
            rvmmu::cause::PrivilegeLevel::Supervisor
        );
    }

    #[test]
    fn empty_monitor_answer() {
        let monitor = Monitor {
            info_registers: "\n",
        };
        let registers = Registers::new().with_live(&monitor);
        assert!(matches!(
            registers.read_register("satp"),
            Err(Error::RegisterUnavailable { reason, .. }) if reason.contains("no registers")
        ));
    }

    #[test]
    fn no_source_configured() {
        let registers = Registers::new();
        let err = registers.read_register("satp").unwrap_err();
        assert!(err.to_string().contains("--registers"), "{err}");
    }
}
