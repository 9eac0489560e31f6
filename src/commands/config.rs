//! Configuration display command.

use echoless::config::{EcholessConfig, default_config_path};

/// Config command.
pub fn cmd_config(config: &EcholessConfig, path_only: bool) -> anyhow::Result<()> {
    if path_only {
        match default_config_path() {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("no configuration directory on this platform"),
        }
        return Ok(());
    }

    print!("{}", config.to_toml()?);
    Ok(())
}
