//! Persistence seam for the configuration document.

use crate::account::PulseConfig;
use crate::error::Result;

/// Loads and stores the whole [`PulseConfig`] document.
///
/// Writes replace the document wholesale; there is no partial update.
pub trait ConfigRepository: Send + Sync {
    /// Loads the document.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(config))`: Successfully loaded
    /// - `Ok(None)`: File doesn't exist or is empty
    /// - `Err`: The file could not be read or parsed
    fn load(&self) -> Result<Option<PulseConfig>>;

    /// Replaces the stored document.
    fn save(&self, config: &PulseConfig) -> Result<()>;

    /// Copies the stored document aside, untouched, before it is replaced by
    /// defaults. Returns where the copy went, or `None` if there was nothing
    /// to copy.
    fn backup(&self) -> Result<Option<String>> {
        Ok(None)
    }
}
