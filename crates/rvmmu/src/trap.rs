//! Trap reports built from the registers of a stopped hart.

use crate::Satp;
use crate::cause::{Cause, CauseCode, MachineCause, PrivilegeLevel, SupervisorCause};
use crate::error::{Error, Result};

/// Anything that can produce the value of a named CSR.
///
/// Names are the lowercase CSR names (`mcause`, `satp`, ...).
pub trait RegisterSource {
    fn read_register(&self, name: &str) -> Result<u64>;

    /// Reads and decodes `satp`.
    fn read_satp(&self) -> Result<Satp> {
        self.read_register("satp").map(Satp::from_bits)
    }
}

impl<S: RegisterSource + ?Sized> RegisterSource for &S {
    fn read_register(&self, name: &str) -> Result<u64> {
        (**self).read_register(name)
    }
}

/// The privilege level a trap was taken into.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TrapKind {
    Machine,
    Supervisor,
}

impl TrapKind {
    pub const fn cause_register(self) -> &'static str {
        match self {
            Self::Machine => "mcause",
            Self::Supervisor => "scause",
        }
    }

    pub const fn epc_register(self) -> &'static str {
        match self {
            Self::Machine => "mepc",
            Self::Supervisor => "sepc",
        }
    }

    pub const fn tval_register(self) -> &'static str {
        match self {
            Self::Machine => "mtval",
            Self::Supervisor => "stval",
        }
    }

    pub const fn status_register(self) -> &'static str {
        match self {
            Self::Machine => "mstatus",
            Self::Supervisor => "sstatus",
        }
    }

    /// Decodes the previous privilege field of this kind's status register.
    pub const fn previous_privilege(self, status: u64) -> PrivilegeLevel {
        match self {
            Self::Machine => PrivilegeLevel::from_mstatus(status),
            Self::Supervisor => PrivilegeLevel::from_sstatus(status),
        }
    }
}

/// Why and where the last trap happened.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TrapReport<C> {
    pub kind: TrapKind,
    pub cause: C,
    /// The cause register as read.
    pub raw_cause: u64,
    /// Exception program counter.
    pub epc: u64,
    /// Trap value: the faulting address or instruction, depending on the cause.
    pub tval: u64,
    pub previous_privilege: PrivilegeLevel,
}

fn decode<I, E, S>(kind: TrapKind, registers: &S) -> Result<TrapReport<Cause<I, E>>>
where
    I: CauseCode,
    E: CauseCode,
    S: RegisterSource + ?Sized,
{
    let register = kind.cause_register();
    let raw_cause = registers.read_register(register)?;
    let cause = Cause::decode(register, raw_cause)?;
    let epc = registers.read_register(kind.epc_register())?;
    let tval = registers.read_register(kind.tval_register())?;
    let status = read_status(kind, registers)?;

    log::debug!("{register}={raw_cause:#x} decoded as {cause}");

    Ok(TrapReport {
        kind,
        cause,
        raw_cause,
        epc,
        tval,
        previous_privilege: kind.previous_privilege(status),
    })
}

/// Reads the status register of `kind`.
///
/// `sstatus` is a restricted view of `mstatus` with SPP at bit 8 in both, and
/// not every source reports it (QEMU's `info registers` leaves it out), so
/// `mstatus` stands in when it is unavailable.
fn read_status<S: RegisterSource + ?Sized>(kind: TrapKind, registers: &S) -> Result<u64> {
    match registers.read_register(kind.status_register()) {
        Err(Error::RegisterUnavailable { .. }) if kind == TrapKind::Supervisor => {
            log::debug!("sstatus unavailable, taking SPP from mstatus");
            registers.read_register("mstatus")
        }
        status => status,
    }
}

/// Decodes the last trap taken into M-mode.
pub fn decode_mcause<S: RegisterSource + ?Sized>(registers: &S) -> Result<TrapReport<MachineCause>> {
    decode(TrapKind::Machine, registers)
}

/// Decodes the last trap taken into S-mode.
pub fn decode_scause<S: RegisterSource + ?Sized>(
    registers: &S,
) -> Result<TrapReport<SupervisorCause>> {
    decode(TrapKind::Supervisor, registers)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::Error;
    use crate::cause::{MachineException, SupervisorException, SupervisorInterrupt};

    struct Registers(BTreeMap<&'static str, u64>);

    impl Registers {
        fn new(values: &[(&'static str, u64)]) -> Self {
            Self(values.iter().copied().collect())
        }
    }

    impl RegisterSource for Registers {
        fn read_register(&self, name: &str) -> Result<u64> {
            self.0.get(name).copied().ok_or_else(|| Error::RegisterUnavailable {
                name: name.to_string(),
                reason: "not set".to_string(),
            })
        }
    }

    #[test]
    fn machine_trap() {
        let registers = Registers::new(&[
            ("mcause", 0xd),
            ("mepc", 0x8020_0a14),
            ("mtval", 0xdead_b000),
            ("mstatus", 0xa_0000_1800),
        ]);

        let report = decode_mcause(&registers).unwrap();
        assert_eq!(report.cause, Cause::Exception(MachineException::LoadPageFault));
        assert_eq!(report.epc, 0x8020_0a14);
        assert_eq!(report.tval, 0xdead_b000);
        assert_eq!(report.previous_privilege, PrivilegeLevel::Machine);
    }

    #[test]
    fn supervisor_trap_from_user() {
        let registers = Registers::new(&[
            ("scause", 0x8000_0000_0000_0005),
            ("sepc", 0x1_0000),
            ("stval", 0),
            ("sstatus", 0x2),
        ]);

        let report = decode_scause(&registers).unwrap();
        assert_eq!(
            report.cause,
            Cause::Interrupt(SupervisorInterrupt::SupervisorTimerInterrupt)
        );
        assert_eq!(report.previous_privilege, PrivilegeLevel::User);
        assert_eq!(report.kind, TrapKind::Supervisor);
    }

    #[test]
    fn supervisor_status_only_knows_two_levels() {
        let registers = Registers::new(&[
            ("scause", 8),
            ("sepc", 0),
            ("stval", 0),
            ("sstatus", 1 << 8),
        ]);

        let report = decode_scause(&registers).unwrap();
        assert_eq!(
            report.cause,
            Cause::Exception(SupervisorException::EnvironmentCallFromUMode)
        );
        assert_eq!(report.previous_privilege, PrivilegeLevel::Supervisor);
    }

    #[test]
    fn supervisor_status_falls_back_to_mstatus() {
        let registers = Registers::new(&[
            ("scause", 0xd),
            ("sepc", 0x8020_0a14),
            ("stval", 0x10),
            ("mstatus", 0xa_0000_0120),
        ]);

        let report = decode_scause(&registers).unwrap();
        assert_eq!(report.previous_privilege, PrivilegeLevel::Supervisor);
        assert_eq!(report.tval, 0x10);
    }

    #[test]
    fn sstatus_wins_over_mstatus() {
        let registers = Registers::new(&[
            ("scause", 0xd),
            ("sepc", 0),
            ("stval", 0),
            ("sstatus", 0),
            ("mstatus", 1 << 8),
        ]);

        let report = decode_scause(&registers).unwrap();
        assert_eq!(report.previous_privilege, PrivilegeLevel::User);
    }

    #[test]
    fn unknown_codes_are_rejected() {
        let registers = Registers::new(&[("scause", 11)]);
        assert_eq!(
            decode_scause(&registers),
            Err(Error::UnknownCauseCode {
                register: "scause",
                value: 11
            })
        );
    }

    #[test]
    fn missing_registers_propagate() {
        let registers = Registers::new(&[("mcause", 2)]);
        assert!(matches!(
            decode_mcause(&registers),
            Err(Error::RegisterUnavailable { name, .. }) if name == "mepc"
        ));
    }

    #[test]
    fn satp_through_source() {
        let registers = Registers::new(&[("satp", 0x8000_0000_0008_0400)]);
        assert_eq!(
            registers.read_satp().and_then(|satp| satp.root_table()),
            Ok(crate::PhysicalAddress::new(0x8040_0000))
        );
    }
}
