//! CLI commands

mod completions;
mod fmt;
mod init;
mod list;
mod run;
mod selection;
mod validate;

pub use completions::CompletionsCommand;
pub use fmt::FmtCommand;
pub use init::InitCommand;
pub use list::ListCommand;
pub use run::RunCommand;
pub use validate::ValidateCommand;
