pub mod cli;
pub mod logging;

pub use cli::{handle_command, Cli, Commands, HumanDuration};
pub use logging::init_logging;
