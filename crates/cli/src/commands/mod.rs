use clap::Subcommand;
use cleaners_config::CleanersConfig;
use cleaners_core::Result;
use cleaners_registry::CleanupRegistry;

pub mod rooms;
pub mod threads;

/// What every scenario runs against
pub struct Context {
    pub registry: CleanupRegistry,
    pub config: CleanersConfig,
    pub tasks: usize,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Counted resources released by scope, explicitly, and by abandonment
    Rooms,

    /// Worker pools released by abandonment, explicitly, and by scope
    #[command(visible_alias = "pools")]
    Threads,

    /// Run every scenario
    All,
}

impl Commands {
    pub fn execute(self, context: &Context) -> Result<()> {
        match self {
            Commands::Rooms => rooms::run(context),
            Commands::Threads => threads::run(context),
            Commands::All => {
                rooms::run(context)?;
                threads::run(context)
            }
        }
    }
}
