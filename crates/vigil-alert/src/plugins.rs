//! Alert plugin discovery.

use std::path::Path;

use crate::error::{AlertError, AlertResult};

/// List the plugin file names available in `plugins_dir`, sorted.
///
/// Subdirectories are skipped.
pub fn list_alert_plugins(plugins_dir: &Path) -> AlertResult<Vec<String>> {
    let listing_error = |source| AlertError::ListPlugins {
        dir: plugins_dir.to_path_buf(),
        source,
    };

    let mut plugins = Vec::new();
    for entry in std::fs::read_dir(plugins_dir).map_err(listing_error)? {
        let entry = entry.map_err(listing_error)?;
        // Follows symlinks, so a link to a script counts as a plugin.
        if entry.path().is_dir() {
            continue;
        }
        plugins.push(entry.file_name().to_string_lossy().into_owned());
    }
    plugins.sort();
    Ok(plugins)
}
