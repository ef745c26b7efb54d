//! Thin `clap`-derived CLI wrapper over [`crate::controller::ProcessingController`].
//! The idiom is learned from `adamtc007-ob-poc`/`monokrome-foiacquire`, both
//! of which use `clap::Parser`; the teacher itself drives its `main.rs`
//! through an interactive stdin menu, a poor fit for the flag-driven,
//! batch-processing surface this spec asks for.

use crate::params::ParameterService;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "arrow-engine", about = "Multi-threaded event-processing execution engine")]
pub struct Cli {
    /// Source specifications, consumed by source generators.
    pub sources: Vec<String>,

    /// Set a parameter: `-Pkey=value`. Repeatable.
    #[arg(short = 'P', value_name = "key=value", action = clap::ArgAction::Append)]
    pub params: Vec<String>,

    /// Run the benchmarking harness. Recognized, not implemented by the
    /// core (external collaborator per spec.md §1); logged and ignored.
    #[arg(long)]
    pub benchmark: bool,

    /// Enable call-graph `.dot` output.
    #[arg(long)]
    pub janadot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    UnhandledException = 1,
    Timeout = 2,
}

impl Cli {
    /// Parses `-Pkey=value` and `-Pplugin=<name>` entries into the
    /// parameter service. clap's derive has no native repeated-key-value-
    /// map primitive, so this is hand-parsed, matching the spec's own
    /// description of how the CLI maps onto the parameter service.
    pub fn apply_params(&self, params: &ParameterService) {
        for entry in &self.params {
            match entry.split_once('=') {
                Some((key, value)) => {
                    if key == "plugin" {
                        log::info!(target: "arrow_engine::cli", "plugin `{value}` requested; plugin loading is an external collaborator, ignoring");
                        continue;
                    }
                    params.set(key.to_string(), value.to_string());
                }
                None => {
                    log::warn!(target: "arrow_engine::cli", "ignoring malformed -P entry `{entry}` (expected key=value)");
                }
            }
        }
        if self.benchmark {
            log::info!(target: "arrow_engine::cli", "--benchmark requested; the benchmarking harness is an external collaborator, running normally instead");
        }
        if self.janadot {
            log::info!(target: "arrow_engine::cli", "--janadot requested; call-graph export will be written after the run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_params() {
        let cli = Cli::parse_from(["arrow-engine", "-Pnthreads=4", "-Plog:debug=core"]);
        let params = ParameterService::new();
        cli.apply_params(&params);
        assert_eq!(params.nthreads(), 4);
        assert_eq!(
            params.get("log:debug").unwrap().as_str().unwrap(),
            "core"
        );
    }

    #[test]
    fn skips_plugin_entries() {
        let cli = Cli::parse_from(["arrow-engine", "-Pplugin=foo"]);
        let params = ParameterService::new();
        cli.apply_params(&params);
        assert!(params.filter_prefix("plugin").is_empty());
    }
}
