//! Trap cause and privilege level decoding.
//!
//! `mcause` and `scause` share a layout: the top bit tells interrupts from
//! exceptions and the remaining bits hold a code. Each register has its own
//! closed set of codes; anything outside that set is reported as
//! [`Error::UnknownCauseCode`] rather than guessed at.

use core::fmt;

use crate::error::{Error, Result};

/// Set in a cause register when the trap was caused by an interrupt.
pub const INTERRUPT_BIT: u64 = 1 << 63;

/// A closed set of cause codes.
pub trait CauseCode: Sized + Copy {
    /// Looks up the code with the interrupt bit already stripped.
    fn from_code(code: u64) -> Option<Self>;
    /// Returns the numeric code, without the interrupt bit.
    fn code(self) -> u64;
    /// Returns the name of the code.
    fn name(self) -> &'static str;
}

macro_rules! cause_codes {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[doc = $doc:literal])* $variant:ident = $code:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum $name {
            $($(#[doc = $doc])* $variant = $code,)*
        }

        impl CauseCode for $name {
            #[inline]
            fn from_code(code: u64) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)*
                    _ => None,
                }
            }

            #[inline]
            fn code(self) -> u64 {
                self as u64
            }

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

cause_codes! {
    /// Interrupts that can be reported in `mcause`.
    pub enum MachineInterrupt {
        SupervisorSoftwareInterrupt = 1,
        MachineSoftwareInterrupt = 3,
        SupervisorTimerInterrupt = 5,
        MachineTimerInterrupt = 7,
        SupervisorExternalInterrupt = 9,
        MachineExternalInterrupt = 11,
    }
}

cause_codes! {
    /// Exceptions that can be reported in `mcause`.
    pub enum MachineException {
        InstructionAddressMisaligned = 0,
        InstructionAccessFault = 1,
        IllegalInstruction = 2,
        Breakpoint = 3,
        LoadAddressMisaligned = 4,
        LoadAccessFault = 5,
        /// Store/AMO address misaligned
        StoreAddressMisaligned = 6,
        /// Store/AMO access fault
        StoreAccessFault = 7,
        EnvironmentCallFromUMode = 8,
        EnvironmentCallFromSMode = 9,
        EnvironmentCallFromMMode = 11,
        InstructionPageFault = 12,
        LoadPageFault = 13,
        /// Store/AMO page fault
        StorePageFault = 15,
    }
}

cause_codes! {
    /// Interrupts that can be reported in `scause`.
    pub enum SupervisorInterrupt {
        SupervisorSoftwareInterrupt = 1,
        SupervisorTimerInterrupt = 5,
        SupervisorExternalInterrupt = 9,
    }
}

cause_codes! {
    /// Exceptions that can be reported in `scause`.
    ///
    /// Environment calls from M-mode never trap into S-mode, so there is no
    /// counterpart to [`MachineException::EnvironmentCallFromMMode`].
    pub enum SupervisorException {
        InstructionAddressMisaligned = 0,
        InstructionAccessFault = 1,
        IllegalInstruction = 2,
        Breakpoint = 3,
        LoadAddressMisaligned = 4,
        LoadAccessFault = 5,
        StoreAddressMisaligned = 6,
        StoreAccessFault = 7,
        EnvironmentCallFromUMode = 8,
        EnvironmentCallFromSMode = 9,
        InstructionPageFault = 12,
        LoadPageFault = 13,
        StorePageFault = 15,
    }
}

/// The decoded contents of a cause register.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Cause<I, E> {
    Interrupt(I),
    Exception(E),
}

pub type MachineCause = Cause<MachineInterrupt, MachineException>;
pub type SupervisorCause = Cause<SupervisorInterrupt, SupervisorException>;

impl<I: CauseCode, E: CauseCode> Cause<I, E> {
    /// Decodes the raw value of the cause register named `register`.
    pub fn decode(register: &'static str, bits: u64) -> Result<Self> {
        let code = bits & !INTERRUPT_BIT;
        let cause = if bits & INTERRUPT_BIT != 0 {
            I::from_code(code).map(Self::Interrupt)
        } else {
            E::from_code(code).map(Self::Exception)
        };

        cause.ok_or(Error::UnknownCauseCode {
            register,
            value: bits,
        })
    }

    /// Is trap cause an interrupt.
    #[inline]
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupt(_))
    }

    /// Returns the raw register value this cause decodes from.
    pub fn bits(&self) -> u64 {
        match self {
            Self::Interrupt(interrupt) => INTERRUPT_BIT | interrupt.code(),
            Self::Exception(exception) => exception.code(),
        }
    }

    /// Returns the name of the interrupt or exception.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Interrupt(interrupt) => interrupt.name(),
            Self::Exception(exception) => exception.name(),
        }
    }
}

impl MachineCause {
    pub fn from_mcause(bits: u64) -> Result<Self> {
        Self::decode("mcause", bits)
    }
}

impl SupervisorCause {
    pub fn from_scause(bits: u64) -> Result<Self> {
        Self::decode("scause", bits)
    }
}

impl<I: CauseCode, E: CauseCode> fmt::Display for Cause<I, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A privilege level as encoded in the previous-privilege fields of the status registers.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PrivilegeLevel {
    User = 0,
    Supervisor = 1,
    /// Encoding 2 is reserved. It still decodes, so a corrupted status register
    /// can be shown as what it is.
    Reserved = 2,
    Machine = 3,
}

impl PrivilegeLevel {
    /// Decodes the low two bits of `bits`.
    pub const fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            0 => Self::User,
            1 => Self::Supervisor,
            2 => Self::Reserved,
            _ => Self::Machine,
        }
    }

    /// Decodes `mstatus.MPP` (bits 11-12).
    pub const fn from_mstatus(mstatus: u64) -> Self {
        Self::from_bits(mstatus >> 11)
    }

    /// Decodes `sstatus.SPP` (bit 8). Only user and supervisor can come out of this.
    pub const fn from_sstatus(sstatus: u64) -> Self {
        Self::from_bits((sstatus >> 8) & 0b1)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Supervisor => "Supervisor",
            Self::Reserved => "Reserved",
            Self::Machine => "Machine",
        }
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
