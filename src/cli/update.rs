//! `portunix update`: self-update.

use clap::Args;

use crate::config::PortunixHome;
use crate::error::Result;
use crate::update;

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Check for an update without applying it.
    #[arg(long)]
    pub check_only: bool,
    /// Override the release feed's owner/repo instead of reading it from
    /// `config.yaml`.
    #[arg(long)]
    pub repo: Option<String>,
}

pub async fn execute(args: UpdateArgs) -> Result<()> {
    let repo = match args.repo {
        Some(repo) => repo,
        None => PortunixHome::resolve()?.load_config()?.update_repo,
    };

    let info = tokio::task::spawn_blocking(move || update::check(&repo))
        .await
        .map_err(|e| crate::error::Error::backend_unavailable("update", e.to_string()))??;

    let Some(info) = info else {
        println!("already running the latest version ({})", update::current_version());
        return Ok(());
    };
    println!("update available: {} -> {}", info.current_version, info.latest_version);

    if args.check_only {
        return Ok(());
    }
    tokio::task::spawn_blocking(move || update::apply(&info))
        .await
        .map_err(|e| crate::error::Error::backend_unavailable("update", e.to_string()))??;
    println!("updated successfully");
    Ok(())
}
