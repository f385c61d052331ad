use crate::concurrency::KeyedLocks;
use crate::fault::barrier;
use crate::gates::FeatureGates;
use crate::CoreError;
use helmwright_runtime::{
    prepare_binaries, resolve_version, run_tool, BinaryInstaller, CacheInstaller, CommandBuilder,
    InstalledBinaries, RunMode, ToolRunner, ToolVersion,
};
use helmwright_schema::keys::{self, KUBECONFIG_ENV};
use helmwright_schema::{
    compute_fingerprint, normalize_output, EngineConfig, FieldsExt, Fingerprint, OutputKind,
    ReadableFields, Release, ReleaseSet, ResourceId, WritableFields,
};
use helmwright_store::{DiffCache, ScratchDir, StateLayout};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Appended to a diff cut down to `max_diff_output_len`.
pub const TRUNCATION_NOTICE: &str = "[output truncated: diff exceeds max_diff_output_len]\n";

/// Used instead of [`TRUNCATION_NOTICE`] when the limit cannot hold it.
pub const SHORT_TRUNCATION_NOTICE: &str = "[truncated]\n";

/// Which attribute schema a resource uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[default]
    ReleaseSet,
    /// Single release, expanded into a one-release set.
    Release,
}

impl ResourceKind {
    /// Rebuild and validate the release set, before any tool is run.
    pub fn release_set<F: ReadableFields + ?Sized>(self, fields: &F) -> Result<ReleaseSet, CoreError> {
        let rs = match self {
            Self::ReleaseSet => ReleaseSet::from_fields(fields)?,
            Self::Release => Release::from_fields(fields)?.to_release_set()?,
        };
        rs.validate()?;
        Ok(rs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOptions {
    pub dry_run: bool,
    /// Credentials file overriding the release set's own for this diff.
    pub kubeconfig: Option<String>,
}

impl DiffOptions {
    fn kubeconfig(&self) -> Option<&str> {
        self.kubeconfig.as_deref().filter(|k| !k.is_empty())
    }
}

/// Central orchestration engine for the release set lifecycle.
///
/// Every entry point rebuilds the release set from the resource's attributes,
/// runs behind the fault barrier, and holds the working-directory lock for the
/// duration of each tool call.
pub struct Engine {
    config: EngineConfig,
    locks: Arc<KeyedLocks>,
    runner: Arc<dyn ToolRunner>,
    installer: Arc<dyn BinaryInstaller>,
    cache: DiffCache,
    gates: FeatureGates,
}

impl Engine {
    pub fn new(config: EngineConfig, runner: Arc<dyn ToolRunner>) -> Self {
        let installer: Arc<dyn BinaryInstaller> =
            Arc::new(CacheInstaller::new(config.install_cache_dir()));
        Self {
            locks: Arc::new(KeyedLocks::new()),
            runner,
            installer,
            cache: DiffCache::new(StateLayout::new(&config.state_root)),
            gates: FeatureGates::from_config(&config.compat),
            config,
        }
    }

    /// Share a lock manager with other engines driving the same tree.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<KeyedLocks>) -> Self {
        self.locks = locks;
        self
    }

    #[must_use]
    pub fn with_installer(mut self, installer: Arc<dyn BinaryInstaller>) -> Self {
        self.installer = installer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &DiffCache {
        &self.cache
    }

    pub fn locks(&self) -> &Arc<KeyedLocks> {
        &self.locks
    }

    /// Compute the change summary without touching live state.
    ///
    /// Idempotent within one desired state: the first computed diff is cached
    /// under the fingerprint and replayed by later calls.
    pub fn plan_diff<F: WritableFields + ?Sized>(
        &self,
        kind: ResourceKind,
        fields: &mut F,
        opts: &DiffOptions,
    ) -> Result<String, CoreError> {
        barrier("plan", || {
            let rs = kind.release_set(&*fields)?;
            self.diff_release_set(&rs, fields, opts)
        })
    }

    pub fn create<F: WritableFields + ?Sized>(
        &self,
        kind: ResourceKind,
        fields: &mut F,
    ) -> Result<(), CoreError> {
        barrier("create", || {
            let rs = kind.release_set(&*fields)?;
            info!("creating release set in {}", rs.working_dir().display());
            let binaries = self.binaries(&rs)?;
            let version = self.tool_version(&rs, &binaries)?;
            let fingerprint = match self.fingerprint(&rs, &binaries, &version) {
                Ok(fp) => Some(fp),
                Err(e) if e.is_invalid_config() => return Err(e),
                Err(e) => {
                    warn!("unable to compute fingerprint before apply: {e}");
                    None
                }
            };
            let result = self.apply_release_set(&rs, fields, &binaries, &version);
            if let Some(fp) = &fingerprint {
                self.cache.invalidate(fp);
            }
            result?;
            fields.set_id(&new_resource_id());
            Ok(())
        })
    }

    /// Surface configuration errors early. Tool failures are logged only.
    pub fn read<F: WritableFields + ?Sized>(
        &self,
        kind: ResourceKind,
        fields: &mut F,
    ) -> Result<(), CoreError> {
        barrier("read", || {
            let rs = kind.release_set(&*fields)?;
            // Outputs belong to the next plan.
            fields.set(keys::DIFF_OUTPUT, Value::from(""));
            fields.set(keys::APPLY_OUTPUT, Value::from(""));

            let result = self.binaries(&rs).and_then(|binaries| {
                self.locked(&rs, || {
                    let inv = CommandBuilder::new(&rs).binaries(&binaries).build(&["build"])?;
                    run_tool(self.runner.as_ref(), &inv, RunMode::Capture)?;
                    Ok(())
                })
            });
            match result {
                Err(e) if e.is_invalid_config() => Err(e),
                Err(e) => {
                    debug!("build error detected: {e}");
                    Ok(())
                }
                Ok(()) => Ok(()),
            }
        })
    }

    /// Apply the planned diff. A no-op when nothing was planned.
    ///
    /// The cached plan for the current fingerprint is dropped on every exit.
    pub fn update<F: WritableFields + ?Sized>(
        &self,
        kind: ResourceKind,
        fields: &mut F,
    ) -> Result<(), CoreError> {
        barrier("update", || {
            let rs = kind.release_set(&*fields)?;
            let binaries = self.binaries(&rs)?;
            let version = self.tool_version(&rs, &binaries)?;
            let fingerprint = self.fingerprint(&rs, &binaries, &version)?;

            let result = self.update_release_set(&rs, fields, &binaries, &version);
            self.cache.invalidate(&fingerprint);
            result
        })
    }

    pub fn delete<F: WritableFields + ?Sized>(
        &self,
        kind: ResourceKind,
        fields: &mut F,
    ) -> Result<(), CoreError> {
        barrier("delete", || {
            let rs = kind.release_set(&*fields)?;
            info!("destroying release set {}", fields.id());
            let binaries = self.binaries(&rs)?;
            self.locked(&rs, || {
                let inv = CommandBuilder::new(&rs).binaries(&binaries).build(&["destroy"])?;
                run_tool(self.runner.as_ref(), &inv, RunMode::Capture)?;
                Ok(())
            })?;
            fields.set_id("");
            Ok(())
        })
    }

    /// Adopt an existing manifest file as the inline content of a new
    /// release set resource.
    pub fn import<F: WritableFields + ?Sized>(
        &self,
        fields: &mut F,
        manifest: &Path,
    ) -> Result<(), CoreError> {
        barrier("import", || {
            let content = std::fs::read_to_string(manifest).map_err(|e| CoreError::MissingPath {
                path: manifest.display().to_string(),
                source: e,
            })?;
            info!("importing {}", manifest.display());
            fields.set(keys::CONTENT, Value::String(content));
            fields.set(keys::BIN, Value::from(keys::DEFAULT_BIN));
            fields.set(keys::DIRTY, Value::Bool(true));
            fields.set_id(&new_resource_id());
            Ok(())
        })
    }

    fn diff_release_set<F: WritableFields + ?Sized>(
        &self,
        rs: &ReleaseSet,
        fields: &mut F,
        opts: &DiffOptions,
    ) -> Result<String, CoreError> {
        debug!("detecting changes on release set {}", fields.id());
        fields.set(keys::DIFF_OUTPUT, Value::from(""));
        fields.set(keys::APPLY_OUTPUT, Value::from(""));

        if !should_diff(rs)? {
            info!("skipping diff: one or more files listed in skip_diff_on_missing_files are missing");
            return Ok(String::new());
        }

        if !rs.path.is_empty() && rs.content.is_empty() {
            std::fs::metadata(&rs.path).map_err(|e| CoreError::MissingPath {
                path: rs.path.clone(),
                source: e,
            })?;
        }

        match self.compute_diff(rs, opts) {
            Ok(diff) => {
                let shown = truncate_diff(&diff, self.config.max_diff_output_len);
                if !shown.is_empty() {
                    fields.set(keys::DIFF_OUTPUT, Value::String(shown.clone()));
                }
                fields.set(keys::ERROR, Value::from(""));
                Ok(shown)
            }
            Err(e) if e.is_tool_failure() => {
                let credentials = opts.kubeconfig().unwrap_or_else(|| rs.credentials());
                if !credentials.is_empty() && Path::new(credentials).exists() {
                    fields.set(keys::ERROR, Value::String(e.to_string()));
                    return Err(e);
                }
                warn!(
                    "ignoring diff error because the credentials for this release set may not exist yet: {e}"
                );
                fields.set(keys::ERROR, Value::from(""));
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }

    fn compute_diff(&self, rs: &ReleaseSet, opts: &DiffOptions) -> Result<String, CoreError> {
        let binaries = self.binaries(rs)?;
        let version = self.tool_version(rs, &binaries)?;
        let fingerprint = self.fingerprint(rs, &binaries, &version)?;

        if let Some(hit) = self.cache.lookup(&fingerprint)? {
            debug!(%fingerprint, "skipped running diff because a diff is already cached");
            return Ok(hit);
        }

        let concurrency = rs.concurrency.to_string();
        let mut args = vec![
            "diff",
            "--concurrency",
            concurrency.as_str(),
            "--detailed-exitcode",
            "--suppress-secrets",
            "--context",
            "3",
        ];
        if opts.dry_run {
            args.push("--dry-run");
        }

        let raw = self.locked(rs, || {
            let scratch = ScratchDir::create(self.cache.layout(), &rs.content_hash())?;
            let scratch_path = scratch.path().to_string_lossy().into_owned();
            let mut builder = CommandBuilder::new(rs)
                .binaries(&binaries)
                .env("TMPDIR", scratch_path.as_str())
                .env("HELMFILE_TEMPDIR", scratch_path.as_str());
            if let Some(kubeconfig) = opts.kubeconfig() {
                builder = builder.env(KUBECONFIG_ENV, kubeconfig);
            }
            let inv = builder.build(&args)?;
            Ok(run_tool(self.runner.as_ref(), &inv, RunMode::Diff)?)
        })?;

        let diff = normalize_output(&raw, OutputKind::Diff);
        if !diff.is_empty() {
            let path = self.cache.store(&fingerprint, &diff)?;
            debug!(path = %path.display(), "cached diff");
        }
        Ok(diff)
    }

    fn update_release_set<F: WritableFields + ?Sized>(
        &self,
        rs: &ReleaseSet,
        fields: &mut F,
        binaries: &InstalledBinaries,
        version: &ToolVersion,
    ) -> Result<(), CoreError> {
        fields.set(keys::DIRTY, Value::Bool(false));
        let planned = fields.get_str(keys::DIFF_OUTPUT)?.unwrap_or_default();
        if planned.is_empty() {
            debug!("no planned changes for {}; skipping apply", fields.id());
            return Ok(());
        }
        info!("updating release set {}", fields.id());
        self.apply_release_set(rs, fields, binaries, version)
    }

    fn apply_release_set<F: WritableFields + ?Sized>(
        &self,
        rs: &ReleaseSet,
        fields: &mut F,
        binaries: &InstalledBinaries,
        version: &ToolVersion,
    ) -> Result<(), CoreError> {
        let concurrency = rs.concurrency.to_string();
        let mut args = vec!["apply", "--concurrency", concurrency.as_str(), "--suppress-secrets"];
        args.extend(self.gates.apply_flags(version));

        let output = self.locked(rs, || {
            let inv = CommandBuilder::new(rs).binaries(binaries).build(&args)?;
            Ok(run_tool(self.runner.as_ref(), &inv, RunMode::Capture)?)
        })?;
        fields.set(keys::APPLY_OUTPUT, Value::String(output));
        Ok(())
    }

    fn fingerprint(
        &self,
        rs: &ReleaseSet,
        binaries: &InstalledBinaries,
        version: &ToolVersion,
    ) -> Result<Fingerprint, CoreError> {
        let (args, kind) = self.gates.fingerprint_command(version);
        let raw = self.locked(rs, || {
            let inv = CommandBuilder::new(rs).binaries(binaries).build(args)?;
            Ok(run_tool(self.runner.as_ref(), &inv, RunMode::Capture)?)
        })?;
        let fingerprint = compute_fingerprint(&normalize_output(&raw, kind), rs);
        debug!(%fingerprint, "computed fingerprint");
        Ok(fingerprint)
    }

    fn tool_version(
        &self,
        rs: &ReleaseSet,
        binaries: &InstalledBinaries,
    ) -> Result<ToolVersion, CoreError> {
        let inv = CommandBuilder::new(rs).binaries(binaries).version()?;
        Ok(resolve_version(
            Arc::clone(&self.runner),
            inv,
            self.config.install_timeout(),
        ))
    }

    fn binaries(&self, rs: &ReleaseSet) -> Result<InstalledBinaries, CoreError> {
        Ok(prepare_binaries(
            &self.installer,
            rs,
            self.config.install_timeout(),
        )?)
    }

    /// Hold the working-directory lock while `f` runs.
    fn locked<T>(
        &self,
        rs: &ReleaseSet,
        f: impl FnOnce() -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let dir = rs.working_dir();
        let key = std::path::absolute(&dir)
            .unwrap_or(dir)
            .to_string_lossy()
            .into_owned();
        let _guard = self.locks.acquire(&key);
        f()
    }
}

/// False when any `skip_diff_on_missing_files` entry does not exist.
fn should_diff(rs: &ReleaseSet) -> Result<bool, CoreError> {
    for path in &rs.skip_diff_on_missing_files {
        let abs = std::path::absolute(path)?;
        match std::fs::metadata(&abs) {
            Ok(_) => debug!("detected existing file: {}", abs.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("detected missing file: {}", abs.display());
                return Ok(false);
            }
            Err(e) => return Err(CoreError::Io(e)),
        }
    }
    Ok(true)
}

/// Cut `text` to at most `max` bytes at a line boundary and append
/// [`TRUNCATION_NOTICE`]. `max == 0` disables truncation. A limit too small
/// for the notice yields [`SHORT_TRUNCATION_NOTICE`] alone.
pub fn truncate_diff(text: &str, max: usize) -> String {
    if max == 0 || text.len() <= max {
        return text.to_owned();
    }
    if TRUNCATION_NOTICE.len() >= max {
        return SHORT_TRUNCATION_NOTICE.to_owned();
    }
    let budget = max - TRUNCATION_NOTICE.len();
    let cut = text.as_bytes()[..budget]
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1);
    let mut out = String::with_capacity(cut + TRUNCATION_NOTICE.len());
    out.push_str(&text[..cut]);
    out.push_str(TRUNCATION_NOTICE);
    out
}

/// Random opaque resource id.
pub fn new_resource_id() -> ResourceId {
    ResourceId::new(hex::encode(rand::random::<[u8; 10]>()))
}
