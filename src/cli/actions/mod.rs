pub mod server;

// Dispatch lives in run.rs so this file stays declarations-only as the
// action set grows.
mod run;

/// Parsed outcome of the CLI: everything needed to run one action.
#[derive(Debug)]
pub enum Action {
    Server(server::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
