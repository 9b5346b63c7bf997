//! Entry Point Discovery
//!
//! The hosting page marks one script tag with a `data-main` attribute naming
//! the entry script, e.g. `scripts/app/main.js`. The directory part becomes
//! the loader's base path; every module name is resolved against it.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::error::{LoadError, LoadResult};

static ENTRY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:[\w.\-]*/)*)(\w+)\.js$").expect("entry pattern is a valid regex")
});

/// Where the page's entry script lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPoint {
    base_path: String,
    module_name: String,
}

impl EntryPoint {
    /// Split a declaration into its directory prefix and `name.js` file.
    ///
    /// # Examples
    /// - `"js/app/main.js"` -> base `"js/app/"`, file `"main.js"`
    /// - `"main.js"` -> base `""`, file `"main.js"`
    /// - `"js/app/"` -> `LoadError::InvalidEntryPoint`
    pub fn parse(declaration: &str) -> LoadResult<Self> {
        let captures = ENTRY_PATTERN
            .captures(declaration.trim())
            .ok_or_else(|| LoadError::InvalidEntryPoint(declaration.to_string()))?;
        let base_path = captures.get(1).map_or("", |m| m.as_str()).to_string();
        let module_name = captures.get(2).map_or("", |m| m.as_str()).to_string();
        debug!(
            target: "modloader::bootstrap",
            base_path = %base_path,
            module = %module_name,
            "Parsed entry point"
        );
        Ok(Self {
            base_path,
            module_name,
        })
    }

    /// Find the entry declaration among the page's script tags.
    ///
    /// Each item is one script tag's `data-main` attribute, `None` when the
    /// tag has none. The last non-empty declaration wins.
    pub fn discover<'a, I>(data_main_attributes: I) -> LoadResult<Self>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let declaration = data_main_attributes
            .into_iter()
            .flatten()
            .filter(|value| !value.trim().is_empty())
            .last()
            .ok_or(LoadError::MissingEntryPoint)?;
        Self::parse(declaration)
    }

    /// Directory prefix, including the trailing `/` when present.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Stem of the entry file.
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// The entry file name, e.g. `main.js`.
    pub fn entry_file(&self) -> String {
        format!("{}.js", self.module_name)
    }

    /// Full path of the entry script.
    pub fn entry_path(&self) -> String {
        format!("{}{}", self.base_path, self.entry_file())
    }
}
