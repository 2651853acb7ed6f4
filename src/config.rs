use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Args;

/// Size of one PRG bank in the NESASM sense, i.e. the unit `.bank` directives count in.
pub const DEFAULT_PRG_BANK_SIZE: usize = 0x2000;

/// Debounce between the last edit and a re-index.
pub const DEFAULT_REPARSE_DELAY_MS: u64 = 1000;

/// Describes how a disassembly project is laid out on disk.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    #[clap(long, default_value = "smb3.asm")]
    #[clap(help = "Entry assembly file, relative to the project root")]
    pub entry_file: PathBuf,

    #[clap(long, default_value = "PRG")]
    #[clap(help = "Directory holding the bank files, relative to the project root")]
    pub bank_dir: PathBuf,

    #[clap(long, default_value = "prg")]
    #[clap(help = "File name prefix of bank files, followed by the bank number")]
    pub bank_prefix: String,

    #[clap(long, default_value_t = DEFAULT_PRG_BANK_SIZE, value_parser = parse_size)]
    #[clap(help = "Size of a PRG bank in bytes, decimal or $-prefixed hex")]
    pub prg_bank_size: usize,

    #[clap(long, default_value_t = DEFAULT_REPARSE_DELAY_MS)]
    #[clap(help = "Milliseconds without edits before the index is rebuilt")]
    pub reparse_delay_ms: u64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            entry_file: PathBuf::from("smb3.asm"),
            bank_dir: PathBuf::from("PRG"),
            bank_prefix: "prg".to_owned(),
            prg_bank_size: DEFAULT_PRG_BANK_SIZE,
            reparse_delay_ms: DEFAULT_REPARSE_DELAY_MS,
        }
    }
}

impl ProjectConfig {
    pub fn reparse_delay(&self) -> Duration {
        Duration::from_millis(self.reparse_delay_ms)
    }

    /// Matches `<bank_dir>/<bank_prefix>[0-9]*.asm`.
    pub fn is_bank_file(&self, path: &Path) -> bool {
        if path.parent() != Some(self.bank_dir.as_path()) {
            return false;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("asm") {
            return false;
        }

        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(self.bank_prefix.as_str()))
            .and_then(|rest| rest.chars().next())
            .is_some_and(|ch| ch.is_ascii_digit())
    }
}

/// Parses `8192` or `$2000`.
pub fn parse_size(arg: &str) -> Result<usize, String> {
    let parsed = match arg.strip_prefix('$') {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => arg.parse(),
    };
    parsed.map_err(|err| format!("Invalid size '{}': {}", arg, err))
}
