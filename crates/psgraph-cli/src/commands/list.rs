//! List Command Implementation

use anyhow::Result;
use clap::Args;
use psgraph_passes::{default_server_passes, registry, PsMode};

/// Parameter-server mode as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    Sync,
    Async,
    HalfAsync,
    Geo,
}

impl From<ModeArg> for PsMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sync => PsMode::Sync,
            ModeArg::Async => PsMode::Async,
            ModeArg::HalfAsync => PsMode::HalfAsync,
            ModeArg::Geo => PsMode::Geo,
        }
    }
}

impl std::fmt::Display for ModeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", PsMode::from(*self))
    }
}

/// List registered passes
///
/// Without `--mode`, prints every registered pass in registration order.
/// With `--mode`, prints the default server pipeline for that mode.
#[derive(Args, Debug, Clone)]
pub struct ListCommand {
    /// Show the default server pass order for this mode
    #[arg(long, short = 'm')]
    pub mode: Option<ModeArg>,
}

impl ListCommand {
    /// Pass names this command prints, one per line.
    pub fn pass_names(&self) -> Result<Vec<&'static str>> {
        Ok(match self.mode {
            Some(mode) => default_server_passes(mode.into()),
            None => registry::global()?.names().collect(),
        })
    }

    /// Execute the list command
    pub fn run(&self) -> Result<()> {
        for name in self.pass_names()? {
            println!("{name}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_arg_display() {
        assert_eq!(ModeArg::HalfAsync.to_string(), "half_async");
        assert_eq!(PsMode::from(ModeArg::Geo), PsMode::Geo);
    }

    #[test]
    fn test_list_all_registered() {
        let cmd = ListCommand { mode: None };
        let names = cmd.pass_names().unwrap();
        assert_eq!(names.len(), 7);
        assert_eq!(names[0], "add_lr_decay_table_pass");
    }

    #[test]
    fn test_list_for_mode() {
        let cmd = ListCommand {
            mode: Some(ModeArg::Geo),
        };
        assert_eq!(cmd.pass_names().unwrap(), default_server_passes(PsMode::Geo));
    }
}
