use anyhow::Result;
use tracing_subscriber::fmt;

/// Installs the fmt subscriber. Quiet unless `verbose`, so piped JSON output
/// stays clean; logs go to stderr.
pub fn init(verbose: bool) -> Result<()> {
    if !verbose {
        return Ok(());
    }
    let _ = fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    Ok(())
}
