use anyhow::Context;
use galaxy_frame::FrameConfig;
use std::path::Path;

/// Load a JSON config file, or the defaults when no path is given. The
/// result is validated before it is returned.
pub fn load(path: Option<&Path>) -> anyhow::Result<FrameConfig> {
    let config = match path {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("opening config {}", path.display()))?;
            let config: FrameConfig = serde_json::from_reader(std::io::BufReader::new(file))
                .with_context(|| format!("parsing config {}", path.display()))?;
            tracing::debug!(path = %path.display(), "config loaded");
            config
        }
        None => FrameConfig::default(),
    };
    config.validate().context("validating config")?;
    Ok(config)
}
