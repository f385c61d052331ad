use crate::install::InstalledBinaries;
use crate::RuntimeError;
use helmwright_schema::keys::KUBECONFIG_ENV;
use helmwright_schema::ReleaseSet;
use helmwright_store::{materialize_manifest, materialize_values, StoreError};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One concrete call of the external tool.
///
/// `env` holds only the variables layered on top of the inherited process
/// environment, in the order they are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub global_args: Vec<String>,
    pub subcommand: Vec<String>,
    pub dir: PathBuf,
    pub env: Vec<(String, String)>,
    /// Files written for this call. Never removed by the builder.
    pub materialized: Vec<PathBuf>,
}

impl Invocation {
    /// Full argument vector after the program name.
    pub fn argv(&self) -> Vec<String> {
        self.global_args
            .iter()
            .chain(self.subcommand.iter())
            .cloned()
            .collect()
    }

    /// First sub-command token, e.g. `diff`.
    pub fn subcommand_name(&self) -> &str {
        self.subcommand.first().map_or("", String::as_str)
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in self.global_args.iter().chain(self.subcommand.iter()) {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Builds [`Invocation`]s from a release set.
///
/// Global flags are emitted in a fixed order with map keys sorted, so the
/// same release set always yields the same argv.
pub struct CommandBuilder<'a> {
    release_set: &'a ReleaseSet,
    binaries: Option<&'a InstalledBinaries>,
    extra_env: Vec<(String, String)>,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(release_set: &'a ReleaseSet) -> Self {
        Self {
            release_set,
            binaries: None,
            extra_env: Vec::new(),
        }
    }

    /// Use installed binaries in place of the configured ones.
    #[must_use]
    pub fn binaries(mut self, binaries: &'a InstalledBinaries) -> Self {
        self.binaries = Some(binaries);
        self
    }

    /// Add an environment variable applied after every derived one.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.push((key.into(), value.into()));
        self
    }

    /// Invocation of `<tool> <subcommand>` with every global flag.
    pub fn build(&self, subcommand: &[&str]) -> Result<Invocation, RuntimeError> {
        let rs = self.release_set;
        rs.validate()?;

        let dir = rs.working_dir();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Unavailable {
            path: dir.clone(),
            source: e,
        })?;

        let mut materialized = Vec::new();
        let file = if rs.content.is_empty() {
            manifest_arg(rs)?
        } else {
            let name = materialize_manifest(&dir, &rs.content)?;
            materialized.push(dir.join(&name));
            name
        };

        let mut args = Vec::new();
        if !rs.environment.is_empty() {
            push_flag(&mut args, "--environment", &rs.environment);
        }
        push_flag(&mut args, "--file", &file);
        push_flag(&mut args, "--helm-binary", &self.helm_bin());
        args.push("--no-color".to_owned());
        for (k, v) in &rs.selector {
            push_flag(&mut args, "--selector", &format!("{k}={v}"));
        }
        for s in &rs.selectors {
            push_flag(&mut args, "--selector", s);
        }
        for f in &rs.values_files {
            push_flag(&mut args, "--state-values-file", f);
        }
        for doc in &rs.values {
            let name = materialize_values(&dir, doc)?;
            materialized.push(dir.join(&name));
            push_flag(&mut args, "--state-values-file", &name);
        }
        for (k, v) in &rs.releases_values {
            push_flag(&mut args, "--set", &format!("{k}={v}"));
        }

        let invocation = Invocation {
            program: self.bin(),
            global_args: args,
            subcommand: subcommand.iter().map(|s| (*s).to_owned()).collect(),
            dir,
            env: self.environment()?,
            materialized,
        };

        debug!(
            wd = %invocation.dir.display(),
            args = %invocation,
            "generated command"
        );
        Ok(invocation)
    }

    /// Bare `<tool> version` call, without manifest flags.
    pub fn version(&self) -> Result<Invocation, RuntimeError> {
        let dir = self.release_set.working_dir();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Unavailable {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Invocation {
            program: self.bin(),
            global_args: Vec::new(),
            subcommand: vec!["version".to_owned()],
            dir,
            env: self.environment()?,
            materialized: Vec::new(),
        })
    }

    fn bin(&self) -> String {
        self.binaries
            .and_then(|b| b.bin.clone())
            .unwrap_or_else(|| self.release_set.bin.clone())
    }

    fn helm_bin(&self) -> String {
        self.binaries
            .and_then(|b| b.helm_bin.clone())
            .unwrap_or_else(|| self.release_set.helm_bin.clone())
    }

    fn environment(&self) -> Result<Vec<(String, String)>, RuntimeError> {
        let rs = self.release_set;
        let mut env: Vec<(String, String)> = rs
            .environment_variables
            .iter()
            .filter(|(k, _)| k.as_str() != KUBECONFIG_ENV)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let credentials = rs.credentials();
        if !credentials.is_empty() {
            let abs = absolute(Path::new(credentials))?;
            env.push((KUBECONFIG_ENV.to_owned(), abs.to_string_lossy().into_owned()));
        }

        if let Some(plugins) = self.binaries.and_then(|b| b.helm_plugins.as_ref()) {
            env.push(("HELM_PLUGINS".to_owned(), plugins.to_string_lossy().into_owned()));
        }

        for (k, v) in &self.extra_env {
            env.retain(|(existing, _)| existing != k);
            env.push((k.clone(), v.clone()));
        }
        Ok(env)
    }
}

fn push_flag(args: &mut Vec<String>, flag: &str, value: &str) {
    args.push(flag.to_owned());
    args.push(value.to_owned());
}

/// Explicit paths are passed absolute since the tool runs in the working
/// directory; the default name resolves inside it.
fn manifest_arg(rs: &ReleaseSet) -> Result<String, RuntimeError> {
    if rs.path.is_empty() {
        return Ok(rs.manifest_path().to_owned());
    }
    Ok(absolute(Path::new(&rs.path))?.to_string_lossy().into_owned())
}

fn absolute(path: &Path) -> Result<PathBuf, RuntimeError> {
    std::path::absolute(path).map_err(|e| {
        RuntimeError::Unavailable(StoreError::Unavailable {
            path: path.to_path_buf(),
            source: e,
        })
    })
}
