use clap::Subcommand;

use super::config::ConfigArgs;
use super::diagnose::DiagnoseArgs;
use super::resolve::ResolveArgs;
use super::score::ScoreArgs;
use super::validate::ValidateArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Resolve a selector set against a document fixture
    Resolve(ResolveArgs),

    /// Score the stability of a selector set
    Score(ScoreArgs),

    /// Check whether a selector set is stable enough to publish
    Validate(ValidateArgs),

    /// Resolve a list of named selector sets and report each one
    Diagnose(DiagnoseArgs),

    /// Manage Waypoint configuration
    Config(ConfigArgs),
}
