use helmwright_core::{CoreError, DiffOptions, Engine, KeyedLocks, ResourceKind, TRUNCATION_NOTICE};
use helmwright_runtime::{BinaryInstaller, Invocation, MockRunner, RuntimeError, Tool};
use helmwright_schema::{
    compute_fingerprint, keys, normalize_output, EngineConfig, FieldsExt, MemoryFields,
    OutputKind, ReadableFields, ReleaseSet, WritableFields,
};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const MANIFEST: &str = "releases:\n- name: web\n  chart: bitnami/nginx\n";
const DIFF: &str = "default, web, Deployment (apps) has changed:\n+   replicas: 3\n";

fn engine_with(state: &Path, runner: &Arc<MockRunner>, tweak: impl FnOnce(&mut EngineConfig)) -> Engine {
    let mut config = EngineConfig {
        state_root: state.to_path_buf(),
        ..EngineConfig::default()
    };
    tweak(&mut config);
    Engine::new(config, Arc::clone(runner) as Arc<dyn helmwright_runtime::ToolRunner>)
}

fn engine(state: &Path, runner: &Arc<MockRunner>) -> Engine {
    engine_with(state, runner, |_| {})
}

fn release_set(wd: &Path) -> MemoryFields {
    MemoryFields::new()
        .with(keys::CONTENT, MANIFEST)
        .with(keys::WORKING_DIRECTORY, wd.to_string_lossy().into_owned())
}

fn find<'a>(invocations: &'a [Invocation], sub: &str) -> &'a Invocation {
    invocations
        .iter()
        .find(|i| i.subcommand_name() == sub)
        .unwrap_or_else(|| panic!("no {sub} invocation recorded"))
}

#[test]
fn identical_output_gives_identical_fingerprint() {
    let rs = ReleaseSet {
        content: MANIFEST.to_owned(),
        ..ReleaseSet::default()
    };
    let raw = "Adding repo bitnami\n...Successfully got an update from the \"bitnami\" chart repository\nkind: Deployment\n";
    let a = compute_fingerprint(&normalize_output(raw, OutputKind::Template), &rs);
    let b = compute_fingerprint(&normalize_output(raw, OutputKind::Template), &rs.clone());
    assert_eq!(a, b);

    let other = ReleaseSet {
        environment: "staging".to_owned(),
        ..rs.clone()
    };
    assert_ne!(a, compute_fingerprint(&normalize_output(raw, OutputKind::Template), &other));
}

#[test]
fn normalization_is_idempotent() {
    let raw = "# Source: chart/templates/a.yaml\nfilepath: /tmp/x\n...Successfully got an update from the \"x\" chart repository\nkind: Service\n";
    for kind in [OutputKind::Diff, OutputKind::Template, OutputKind::EmbeddedBuild] {
        let once = normalize_output(raw, kind);
        assert_eq!(normalize_output(&once, kind), once);
    }
}

#[test]
fn second_plan_replays_cached_diff() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new().respond("diff", 2, DIFF));
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work"));

    let first = engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    let second = engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();

    assert_eq!(first, DIFF);
    assert_eq!(first, second);
    assert_eq!(runner.count("diff"), 1);
    assert_eq!(fields.get_str(keys::DIFF_OUTPUT).unwrap().as_deref(), Some(DIFF));
    assert_eq!(fields.get_str(keys::ERROR).unwrap().as_deref(), Some(""));
}

#[test]
fn update_consumes_cached_diff() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        MockRunner::new()
            .respond("diff", 2, DIFF)
            .respond("apply", 0, "UPDATED RELEASES:\nweb\n"),
    );
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work"));
    fields.set_id("existing");

    engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    engine.update(ResourceKind::ReleaseSet, &mut fields).unwrap();
    assert_eq!(runner.count("apply"), 1);
    assert_eq!(fields.get_bool(keys::DIRTY).unwrap(), Some(false));
    assert_eq!(
        fields.get_str(keys::APPLY_OUTPUT).unwrap().as_deref(),
        Some("UPDATED RELEASES:\nweb\n")
    );

    engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    assert_eq!(runner.count("diff"), 2);
}

#[test]
fn update_without_planned_diff_is_noop() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new());
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work"));

    engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    engine.update(ResourceKind::ReleaseSet, &mut fields).unwrap();
    assert_eq!(runner.count("apply"), 0);
}

#[test]
fn failed_apply_still_invalidates_cache() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        MockRunner::new()
            .respond("diff", 2, DIFF)
            .respond("apply", 1, "Error: UPGRADE FAILED"),
    );
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work"));

    engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    let err = engine.update(ResourceKind::ReleaseSet, &mut fields).unwrap_err();
    assert!(err.is_tool_failure());
    assert!(err.to_string().contains("UPGRADE FAILED"));

    engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    assert_eq!(runner.count("diff"), 2);
}

#[test]
fn content_and_path_conflict_runs_nothing() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new());
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work")).with(keys::PATH, "environments/prod.yaml");

    let plan = engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default());
    assert!(plan.unwrap_err().is_invalid_config());
    assert!(engine.create(ResourceKind::ReleaseSet, &mut fields).unwrap_err().is_invalid_config());
    assert!(engine.read(ResourceKind::ReleaseSet, &mut fields).unwrap_err().is_invalid_config());
    assert!(runner.invocations().is_empty());
    assert_eq!(fields.id(), "");
}

#[test]
fn kubeconfig_conflict_is_rejected() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new());
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work"))
        .with(keys::KUBECONFIG, "a.yaml")
        .with(keys::ENVIRONMENT_VARIABLES, json!({"KUBECONFIG": "b.yaml"}));

    let err = engine.delete(ResourceKind::ReleaseSet, &mut fields).unwrap_err();
    assert!(err.is_invalid_config());
    assert!(runner.invocations().is_empty());
}

#[test]
fn long_diff_is_truncated_at_line_boundary() {
    let state = tempfile::tempdir().unwrap();
    let long: String = (0..200).map(|i| format!("+ line {i}\n")).collect();
    let runner = Arc::new(MockRunner::new().respond("diff", 2, &long));
    let max = TRUNCATION_NOTICE.len() + 64;
    let engine = engine_with(state.path(), &runner, |c| c.max_diff_output_len = max);
    let mut fields = release_set(&state.path().join("work"));

    let shown = engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    assert!(shown.len() <= max);
    assert!(shown.ends_with(TRUNCATION_NOTICE));
    let kept = shown.strip_suffix(TRUNCATION_NOTICE).unwrap();
    assert!(long.starts_with(kept));
    assert!(kept.ends_with('\n'));

    let replayed = engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    assert_eq!(replayed, shown);
    assert_eq!(runner.count("diff"), 1);
}

#[test]
fn missing_guard_file_skips_diff_until_present() {
    let state = tempfile::tempdir().unwrap();
    let guard = state.path().join("kubeconfig-ready");
    let runner = Arc::new(MockRunner::new().respond("diff", 2, DIFF));
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work")).with(
        keys::SKIP_DIFF_ON_MISSING_FILES,
        json!([guard.to_string_lossy()]),
    );

    let skipped = engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    assert_eq!(skipped, "");
    assert_eq!(runner.count("diff"), 0);

    fs::write(&guard, "").unwrap();
    let planned = engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    assert_eq!(planned, DIFF);
    assert_eq!(runner.count("diff"), 1);
}

#[test]
fn identical_content_shares_one_manifest_file() {
    let state = tempfile::tempdir().unwrap();
    let wd = state.path().join("shared");
    let runner = Arc::new(MockRunner::new().respond("diff", 2, DIFF));
    let engine = engine(state.path(), &runner);

    let mut a = release_set(&wd);
    let mut b = release_set(&wd);
    engine.plan_diff(ResourceKind::ReleaseSet, &mut a, &DiffOptions::default()).unwrap();
    engine.plan_diff(ResourceKind::ReleaseSet, &mut b, &DiffOptions::default()).unwrap();

    let manifests: Vec<_> = fs::read_dir(&wd)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("helmfile-"))
        .collect();
    assert_eq!(manifests.len(), 1);
    assert_eq!(fs::read_to_string(wd.join(&manifests[0])).unwrap(), MANIFEST);
}

#[test]
fn concurrent_creates_in_one_directory_are_serialized() {
    let state = tempfile::tempdir().unwrap();
    let wd = state.path().join("shared");
    let runner = Arc::new(
        MockRunner::new()
            .respond("apply", 0, "ok\n")
            .with_delay(Duration::from_millis(40)),
    );
    let engine = engine(state.path(), &runner);

    let ids: Vec<String> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let engine = &engine;
                let wd = &wd;
                s.spawn(move || {
                    let mut fields = release_set(wd);
                    engine.create(ResourceKind::ReleaseSet, &mut fields).unwrap();
                    fields.id().to_owned()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| !id.is_empty()));
    assert_ne!(ids[0], ids[1]);
    assert_eq!(runner.count("apply"), 3);

    // `version` is not taken under the working-directory lock.
    let mut locked: Vec<_> = runner
        .calls()
        .into_iter()
        .filter(|c| c.invocation.subcommand_name() != "version")
        .collect();
    locked.sort_by_key(|c| c.started);
    for pair in locked.windows(2) {
        assert!(
            pair[0].finished <= pair[1].started,
            "{} overlapped {}",
            pair[0].invocation,
            pair[1].invocation
        );
    }
}

#[test]
fn tool_failure_with_existing_credentials_is_surfaced() {
    let state = tempfile::tempdir().unwrap();
    let kubeconfig = state.path().join("kubeconfig");
    fs::write(&kubeconfig, "apiVersion: v1\n").unwrap();
    let runner = Arc::new(MockRunner::new().respond("diff", 1, "Error: Kubernetes cluster unreachable"));
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work"))
        .with(keys::KUBECONFIG, kubeconfig.to_string_lossy().into_owned());

    let err = engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap_err();
    assert!(err.is_tool_failure());
    let recorded = fields.get_str(keys::ERROR).unwrap().unwrap_or_default();
    assert!(recorded.contains("cluster unreachable"));
}

#[test]
fn tool_failure_without_credentials_is_swallowed() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new().respond("diff", 1, "Error: Kubernetes cluster unreachable"));
    let engine = engine(state.path(), &runner);

    let mut no_creds = release_set(&state.path().join("a"));
    let diff = engine.plan_diff(ResourceKind::ReleaseSet, &mut no_creds, &DiffOptions::default()).unwrap();
    assert_eq!(diff, "");

    let mut pending = release_set(&state.path().join("b"))
        .with(keys::KUBECONFIG, state.path().join("not-yet.yaml").to_string_lossy().into_owned());
    let diff = engine.plan_diff(ResourceKind::ReleaseSet, &mut pending, &DiffOptions::default()).unwrap();
    assert_eq!(diff, "");
    assert_eq!(runner.count("diff"), 2);
}

#[test]
fn diff_options_reach_the_command() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new().respond("diff", 2, DIFF));
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work")).with(keys::CONCURRENCY, 4);
    let opts = DiffOptions {
        dry_run: true,
        kubeconfig: Some("/etc/kube/override.yaml".to_owned()),
    };

    engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &opts).unwrap();
    let invocations = runner.invocations();
    let diff = find(&invocations, "diff");
    assert_eq!(
        diff.subcommand,
        [
            "diff",
            "--concurrency",
            "4",
            "--detailed-exitcode",
            "--suppress-secrets",
            "--context",
            "3",
            "--dry-run"
        ]
    );
    assert_eq!(diff.env_var("KUBECONFIG"), Some("/etc/kube/override.yaml"));

    let scratch = diff.env_var("TMPDIR").unwrap();
    assert_eq!(diff.env_var("HELMFILE_TEMPDIR"), Some(scratch));
    assert!(Path::new(scratch).starts_with(state.path()));
    assert!(!Path::new(scratch).exists());
}

#[test]
fn version_gates_select_commands() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new().with_version("0.150.0").respond("diff", 2, DIFF));
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work"));

    engine.create(ResourceKind::ReleaseSet, &mut fields).unwrap();
    let invocations = runner.invocations();
    assert!(find(&invocations, "apply").subcommand.contains(&"--skip-diff-on-install".to_owned()));
    assert_eq!(find(&invocations, "build").subcommand, ["build", "--embed-values"]);
    assert_eq!(runner.count("template"), 0);
}

#[test]
fn old_or_unknown_versions_use_template() {
    for version in [Some("0.120.0"), None] {
        let state = tempfile::tempdir().unwrap();
        let mut mock = MockRunner::new();
        if let Some(v) = version {
            mock = mock.with_version(v);
        }
        let runner = Arc::new(mock);
        let engine = engine(state.path(), &runner);
        let mut fields = release_set(&state.path().join("work"));

        engine.create(ResourceKind::ReleaseSet, &mut fields).unwrap();
        let invocations = runner.invocations();
        assert!(!find(&invocations, "apply").subcommand.contains(&"--skip-diff-on-install".to_owned()));
        assert_eq!(runner.count("template"), 1);
        assert_eq!(runner.count("build"), 0);
    }
}

#[test]
fn read_swallows_tool_errors_and_clears_outputs() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new().respond("build", 1, "Error: context deadline exceeded"));
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work"))
        .with(keys::DIFF_OUTPUT, "stale")
        .with(keys::APPLY_OUTPUT, "stale");

    engine.read(ResourceKind::ReleaseSet, &mut fields).unwrap();
    assert_eq!(runner.count("build"), 1);
    assert_eq!(fields.get_str(keys::DIFF_OUTPUT).unwrap().as_deref(), Some(""));
    assert_eq!(fields.get_str(keys::APPLY_OUTPUT).unwrap().as_deref(), Some(""));
}

#[test]
fn delete_clears_id() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new());
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work"));
    fields.set_id("abc");

    engine.delete(ResourceKind::ReleaseSet, &mut fields).unwrap();
    assert_eq!(fields.id(), "");
    assert_eq!(runner.count("destroy"), 1);
}

#[test]
fn failed_delete_keeps_id() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new().respond("destroy", 1, "Error: release not found"));
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work"));
    fields.set_id("abc");

    assert!(engine.delete(ResourceKind::ReleaseSet, &mut fields).is_err());
    assert_eq!(fields.id(), "abc");
}

#[test]
fn missing_manifest_path_is_reported() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new());
    let engine = engine(state.path(), &runner);
    let missing = state.path().join("nope").join("helmfile.yaml");
    let mut fields = MemoryFields::new().with(keys::PATH, missing.to_string_lossy().into_owned());

    let err = engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap_err();
    assert!(matches!(err, CoreError::MissingPath { .. }));
    assert!(runner.invocations().is_empty());
}

#[test]
fn import_seeds_content() {
    let state = tempfile::tempdir().unwrap();
    let manifest = state.path().join("helmfile.yaml");
    fs::write(&manifest, MANIFEST).unwrap();
    let runner = Arc::new(MockRunner::new());
    let engine = engine(state.path(), &runner);

    let mut fields = MemoryFields::new();
    engine.import(&mut fields, &manifest).unwrap();
    assert!(!fields.id().is_empty());
    assert_eq!(fields.get_str(keys::CONTENT).unwrap().as_deref(), Some(MANIFEST));
    assert_eq!(fields.get_str(keys::BIN).unwrap().as_deref(), Some("helmfile"));
    assert_eq!(fields.get_bool(keys::DIRTY).unwrap(), Some(true));

    let err = engine.import(&mut MemoryFields::new(), &state.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, CoreError::MissingPath { .. }));
}

#[test]
fn release_kind_drives_generated_manifest() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new().respond("diff", 2, DIFF));
    let engine = engine(state.path(), &runner);
    let mut fields = MemoryFields::new()
        .with(keys::CHART, "bitnami/nginx")
        .with(keys::NAMESPACE, "web")
        .with(keys::WORKING_DIRECTORY, state.path().join("work").to_string_lossy().into_owned());
    fields.set_id("frontend");

    let diff = engine.plan_diff(ResourceKind::Release, &mut fields, &DiffOptions::default()).unwrap();
    assert_eq!(diff, DIFF);

    let invocations = runner.invocations();
    let inv = find(&invocations, "diff");
    let argv = inv.argv();
    assert_eq!(&argv[..2], ["--environment", "default"]);
    let manifest = inv.materialized.first().unwrap();
    let written = fs::read_to_string(manifest).unwrap();
    assert!(written.contains("\"name\":\"frontend\""));
    assert!(written.contains("\"namespace\":\"web\""));
}

#[test]
fn panic_in_tool_becomes_internal_error() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new().panic_on("diff"));
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work"));

    let err = engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap_err();
    match err {
        CoreError::Internal { operation, message, .. } => {
            assert_eq!(operation, "plan");
            assert!(message.contains("mock tool crashed on diff"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // The working-directory lock was released during unwinding.
    engine.read(ResourceKind::ReleaseSet, &mut fields).unwrap();
    assert_eq!(runner.count("build"), 1);
}

struct StubInstaller {
    root: PathBuf,
}

impl BinaryInstaller for StubInstaller {
    fn install(&self, tool: Tool, version: &str) -> Result<PathBuf, RuntimeError> {
        Ok(self.root.join(version).join(tool.as_str()))
    }
}

#[test]
fn pinned_versions_use_installed_binaries() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new());
    let bin = state.path().join("bin");
    let engine = engine(state.path(), &runner).with_installer(Arc::new(StubInstaller { root: bin.clone() }));
    let mut fields = release_set(&state.path().join("work"))
        .with(keys::VERSION, "0.150.0")
        .with(keys::HELM_VERSION, "3.14.0")
        .with(keys::HELM_DIFF_VERSION, "3.9.5");

    engine.read(ResourceKind::ReleaseSet, &mut fields).unwrap();
    let invocations = runner.invocations();
    let build = find(&invocations, "build");
    let helmfile = bin.join("0.150.0").join("helmfile");
    assert_eq!(build.program, helmfile.to_string_lossy());
    let argv = build.argv();
    let helm_flag = argv.iter().position(|a| a == "--helm-binary").unwrap();
    assert_eq!(argv[helm_flag + 1], bin.join("3.14.0").join("helm").to_string_lossy());
    let plugins = bin.join("3.9.5");
    assert_eq!(build.env_var("HELM_PLUGINS"), Some(plugins.to_string_lossy().as_ref()));
}

#[test]
fn shared_lock_manager_blocks_other_engines() {
    let state = tempfile::tempdir().unwrap();
    let wd = state.path().join("work");
    fs::create_dir_all(&wd).unwrap();
    let locks = Arc::new(KeyedLocks::new());
    let runner = Arc::new(MockRunner::new());
    let engine = engine(state.path(), &runner).with_locks(Arc::clone(&locks));

    let key = std::path::absolute(&wd).unwrap().to_string_lossy().into_owned();
    let guard = locks.acquire(&key);
    std::thread::scope(|s| {
        let reader = s.spawn(|| {
            let mut fields = release_set(&wd);
            engine.read(ResourceKind::ReleaseSet, &mut fields).unwrap();
        });
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(runner.count("build"), 0);
        drop(guard);
        reader.join().unwrap();
    });
    assert_eq!(runner.count("build"), 1);
    assert!(!engine.locks().is_held(&key));
}

#[test]
fn pending_manifest_path_defers_diff() {
    let state = tempfile::tempdir().unwrap();
    let manifest = state.path().join("generated").join("helmfile.yaml");
    let runner = Arc::new(MockRunner::new().respond("diff", 2, DIFF));
    let engine = engine(state.path(), &runner);
    let mut fields = MemoryFields::new()
        .with(keys::WORKING_DIRECTORY, state.path().join("work").to_string_lossy().into_owned())
        .with(keys::PATH, manifest.to_string_lossy().into_owned())
        .with(keys::SKIP_DIFF_ON_MISSING_FILES, json!([manifest.to_string_lossy()]));

    let diff = engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    assert_eq!(diff, "");
    assert!(runner.invocations().is_empty());
}

#[test]
fn update_fails_before_apply_when_fingerprint_fails() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        MockRunner::new()
            .respond("diff", 2, DIFF)
            .respond("apply", 0, "UPDATED RELEASES:\nweb\n"),
    );
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work"));

    engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    runner.queue_response("template", 1, "Error: cluster unreachable");
    let err = engine.update(ResourceKind::ReleaseSet, &mut fields).unwrap_err();
    assert!(err.is_tool_failure());
    assert_eq!(runner.count("apply"), 0);

    engine.update(ResourceKind::ReleaseSet, &mut fields).unwrap();
    assert_eq!(runner.count("apply"), 1);
    engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    assert_eq!(runner.count("diff"), 2);
}

#[test]
fn noop_update_still_drops_cached_plan() {
    let state = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new().respond("diff", 2, DIFF));
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work"));

    engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    fields.set(keys::DIFF_OUTPUT, json!(""));
    engine.update(ResourceKind::ReleaseSet, &mut fields).unwrap();
    assert_eq!(runner.count("apply"), 0);

    engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    assert_eq!(runner.count("diff"), 2);
}

#[test]
fn swallowed_failure_clears_previous_error() {
    let state = tempfile::tempdir().unwrap();
    let kubeconfig = state.path().join("kubeconfig");
    fs::write(&kubeconfig, "apiVersion: v1\n").unwrap();
    let runner = Arc::new(MockRunner::new().respond("diff", 1, "Error: Kubernetes cluster unreachable"));
    let engine = engine(state.path(), &runner);
    let mut fields = release_set(&state.path().join("work"))
        .with(keys::KUBECONFIG, kubeconfig.to_string_lossy().into_owned());

    engine
        .plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default())
        .unwrap_err();
    assert!(!fields.get_str(keys::ERROR).unwrap().unwrap_or_default().is_empty());

    fs::remove_file(&kubeconfig).unwrap();
    let diff = engine.plan_diff(ResourceKind::ReleaseSet, &mut fields, &DiffOptions::default()).unwrap();
    assert_eq!(diff, "");
    assert_eq!(fields.get_str(keys::ERROR).unwrap().as_deref(), Some(""));
}
