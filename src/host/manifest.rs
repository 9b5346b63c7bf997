//! Graph Manifests
//!
//! A TOML description of a script set for `ScriptHost`. Each module becomes
//! a script that defines it; the entry script requires the listed names.
//!
//! ## Format
//!
//! ```toml
//! entry = "js/app/main.js"
//! requires = ["app"]
//!
//! [modules.app]
//! deps = ["util", "net"]
//!
//! [modules.util]
//! value = "utilities"
//!
//! [modules.net]
//! deps = ["util"]
//! fail = "factory"
//! ```
//!
//! A module's export is its `value` (default: its name), followed by its
//! dependencies' exports in parentheses, e.g. `app(utilities, net(utilities))`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Deserialize;
use tracing::warn;

use super::script_host::ScriptHost;
use crate::loader::{EntryPoint, LoadError, LoadResult};

/// A module graph served by the bundled host.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphManifest {
    /// `data-main` style path of the entry script.
    pub entry: String,

    /// Names the entry script requires.
    #[serde(default)]
    pub requires: Vec<String>,

    /// Module scripts by name.
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleSpec>,
}

/// One module script.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleSpec {
    /// Dependency names in declaration order.
    #[serde(default)]
    pub deps: Vec<String>,

    /// Export value; the module name when absent.
    #[serde(default)]
    pub value: Option<String>,

    /// How the module should fail, if at all.
    #[serde(default)]
    pub fail: Option<FailMode>,
}

/// Failure injected into a module script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// No script is served for the module.
    Fetch,
    /// The factory returns an error.
    Factory,
    /// The factory returns no value.
    Empty,
}

/// Errors raised while reading or installing a manifest.
#[derive(Debug)]
pub enum ManifestError {
    Io { path: PathBuf, message: String },
    Parse(String),
    /// The entry declaration is not a valid script path.
    Entry(LoadError),
    /// A module would be served from the entry script's path.
    EntryConflict(String),
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestError::Io { path, message } => {
                write!(f, "Failed to read manifest '{}': {}", path.display(), message)
            }
            ManifestError::Parse(message) => write!(f, "Invalid manifest: {}", message),
            ManifestError::Entry(err) => write!(f, "Invalid manifest entry: {}", err),
            ManifestError::EntryConflict(name) => {
                write!(f, "Module '{}' shares its path with the entry script", name)
            }
        }
    }
}

impl std::error::Error for ManifestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ManifestError::Entry(err) => Some(err),
            _ => None,
        }
    }
}

/// Result of the entry script's `require`, once it has settled.
#[derive(Clone, Debug, Default)]
pub struct EntryOutcome {
    slot: Rc<RefCell<Option<LoadResult<Vec<String>>>>>,
}

impl EntryOutcome {
    /// `None` while the entry script has not run or its requirements are pending.
    pub fn get(&self) -> Option<LoadResult<Vec<String>>> {
        self.slot.borrow().clone()
    }

    fn set(&self, result: LoadResult<Vec<String>>) {
        *self.slot.borrow_mut() = Some(result);
    }
}

impl GraphManifest {
    /// Parse a manifest from TOML content.
    pub fn from_toml_str(content: &str) -> Result<Self, ManifestError> {
        toml::from_str(content).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn entry_point(&self) -> Result<EntryPoint, ManifestError> {
        EntryPoint::parse(&self.entry).map_err(ManifestError::Entry)
    }

    /// Register every script of the manifest on `host`.
    ///
    /// Module scripts are served from `<entry base><name>.js`. Returns the
    /// entry point to bootstrap from and the slot its outcome lands in.
    pub fn install(
        &self,
        host: &ScriptHost<String>,
    ) -> Result<(EntryPoint, EntryOutcome), ManifestError> {
        let entry = self.entry_point()?;
        if self.modules.contains_key(entry.module_name()) {
            return Err(ManifestError::EntryConflict(entry.module_name().to_string()));
        }

        for (name, spec) in &self.modules {
            if spec.fail == Some(FailMode::Fetch) {
                continue;
            }
            let name = name.clone();
            let spec = spec.clone();
            let path = format!("{}{}.js", entry.base_path(), name);
            host.register(path, move |loader| {
                let label = spec.value.clone().unwrap_or_else(|| name.clone());
                let failure = spec.fail;
                let module = name.clone();
                let result = loader.define(&name, spec.deps.clone(), move |args| match failure {
                    Some(FailMode::Factory) => Err(format!("{} refused to build", module).into()),
                    Some(FailMode::Empty) => Ok(None),
                    _ => Ok(Some(render_export(&label, &args))),
                });
                if let Err(err) = result {
                    warn!(target: "modloader::host", module = %name, %err, "Script define rejected");
                }
            });
        }

        let outcome = EntryOutcome::default();
        let requires = self.requires.clone();
        let sink = outcome.clone();
        host.register(entry.entry_path(), move |loader| {
            let on_success = sink.clone();
            let on_failure = sink.clone();
            loader.require_with_error(
                requires.clone(),
                move |values| on_success.set(Ok(values)),
                move |err| on_failure.set(Err(err)),
            );
        });

        Ok((entry, outcome))
    }
}

fn render_export(label: &str, args: &[String]) -> String {
    if args.is_empty() {
        label.to_string()
    } else {
        format!("{}({})", label, args.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CompletionOrder;
    use crate::loader::{Loader, Status};

    const DIAMOND: &str = r#"
        entry = "js/app/main.js"
        requires = ["app"]

        [modules.app]
        deps = ["util", "net"]

        [modules.util]
        value = "utilities"

        [modules.net]
        deps = ["util"]
    "#;

    #[test]
    fn test_parse_manifest() {
        let manifest = GraphManifest::from_toml_str(DIAMOND).unwrap();
        assert_eq!(manifest.entry, "js/app/main.js");
        assert_eq!(manifest.requires, vec!["app".to_string()]);
        assert_eq!(manifest.modules.len(), 3);
        assert_eq!(manifest.modules["app"].deps, vec!["util", "net"]);
        assert_eq!(manifest.modules["util"].value.as_deref(), Some("utilities"));
        assert_eq!(manifest.modules["net"].fail, None);
    }

    #[test]
    fn test_parse_fail_modes() {
        let manifest = GraphManifest::from_toml_str(
            r#"
            entry = "main.js"
            [modules.a]
            fail = "fetch"
            [modules.b]
            fail = "empty"
            "#,
        )
        .unwrap();
        assert_eq!(manifest.modules["a"].fail, Some(FailMode::Fetch));
        assert_eq!(manifest.modules["b"].fail, Some(FailMode::Empty));
        assert!(manifest.requires.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            GraphManifest::from_toml_str("requires = []"),
            Err(ManifestError::Parse(_))
        ));
        assert!(matches!(
            GraphManifest::from_toml_str("entry = \"main.js\"\n[modules.a]\nfail = \"sometimes\""),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn test_bad_entry_rejected() {
        let manifest = GraphManifest::from_toml_str("entry = \"js/app/\"").unwrap();
        let host = ScriptHost::new();
        assert!(matches!(
            manifest.install(&host),
            Err(ManifestError::Entry(LoadError::InvalidEntryPoint(_)))
        ));
    }

    #[test]
    fn test_entry_conflict_rejected() {
        let manifest =
            GraphManifest::from_toml_str("entry = \"main.js\"\n[modules.main]\n").unwrap();
        let host = ScriptHost::new();
        assert!(matches!(
            manifest.install(&host),
            Err(ManifestError::EntryConflict(name)) if name == "main"
        ));
    }

    #[test]
    fn test_install_and_run() {
        let manifest = GraphManifest::from_toml_str(DIAMOND).unwrap();
        let host: Rc<ScriptHost<String>> = Rc::new(ScriptHost::new());
        let (entry, outcome) = manifest.install(&host).unwrap();
        let loader = Loader::with_entry(&entry, host.clone());

        assert!(outcome.get().is_none());
        host.run_to_idle(CompletionOrder::Lifo);

        assert_eq!(
            outcome.get(),
            Some(Ok(vec!["app(utilities, net(utilities))".to_string()]))
        );
        assert_eq!(host.fetch_count("js/app/util.js"), 1);
        assert_eq!(loader.module_status("net"), Some(Status::Success));
    }

    #[test]
    fn test_factory_failure_reaches_entry() {
        let manifest = GraphManifest::from_toml_str(
            r#"
            entry = "main.js"
            requires = ["app"]
            [modules.app]
            deps = ["net"]
            [modules.net]
            fail = "factory"
            "#,
        )
        .unwrap();
        let host: Rc<ScriptHost<String>> = Rc::new(ScriptHost::new());
        let (entry, outcome) = manifest.install(&host).unwrap();
        let loader = Loader::with_entry(&entry, host.clone());
        host.run_to_idle(CompletionOrder::Fifo);

        assert!(matches!(
            outcome.get(),
            Some(Err(LoadError::FactoryFailed { name, .. })) if name == "net"
        ));
        assert_eq!(loader.module_status("app"), Some(Status::Error));
    }
}
