pub mod app;
pub mod commands;
pub mod config;
pub mod context;
pub mod diagnose;
pub mod dispatch;
pub mod env;
pub mod inputs;
pub mod observer;
pub mod output;
pub mod resolve;
pub mod runtime;
pub mod score;
pub mod validate;

pub use config::{cmd_config, ConfigArgs};
pub use diagnose::{cmd_diagnose, DiagnoseArgs};
pub use resolve::{cmd_resolve, ResolveArgs};
pub use score::{cmd_score, ScoreArgs};
pub use validate::{cmd_validate, ValidateArgs};
