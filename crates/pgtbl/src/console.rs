//! Defines the logger that reports diagnostics on stderr.

use std::io::Write;

use log::LevelFilter;
use spin::Once;

pub struct Console {
    level: LevelFilter,
}

static DEFAULT: Once<Console> = Once::new();

impl Console {
    /// Installs the console as the global logger.
    ///
    /// `verbosity` is the number of `-v` flags: warnings and errors are always
    /// shown, each flag adds one more level. Only the first call decides the
    /// level.
    pub fn init(verbosity: u8) -> Result<&'static Self, log::SetLoggerError> {
        let console = Self::default(verbosity);
        console.install()?;
        Ok(console)
    }

    pub fn default(verbosity: u8) -> &'static Self {
        DEFAULT.call_once(|| Console {
            level: level_for_verbosity(verbosity),
        })
    }

    pub fn install(&'static self) -> Result<(), log::SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.level);
        Ok(())
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

pub fn level_for_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

impl log::Log for Console {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let detailed = self.level == LevelFilter::Trace;
        // Nothing sensible left to do if stderr is gone.
        let _ = write_log_entry_to(&mut std::io::stderr().lock(), record, detailed);
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn write_log_entry_to(
    writer: &mut impl Write,
    record: &log::Record,
    detailed: bool,
) -> std::io::Result<()> {
    if detailed {
        return writeln!(
            writer,
            "[{} {}:{} {}] {}",
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.target(),
            record.args()
        );
    }
    writeln!(writer, "[{:5}] {}", record.level(), record.args())
}
