mod common;

use anyhow::Result;
use common::{TestProject, wait_until};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use vsproj_watch::capabilities::{MemoryLog, RecordingLauncher, RecordingReady};
use vsproj_watch::config::{Settings, WatchConfig};
use vsproj_watch::error::{ConfigError, SyncError};
use vsproj_watch::sync::{Capabilities, EngineState, SyncEngine};
use vsproj_watch::watch::{ScriptHandle, ScriptedWatchSource, WatchEvent};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    log: Arc<MemoryLog>,
    launcher: Arc<RecordingLauncher>,
    ready: Arc<RecordingReady>,
    script: ScriptHandle,
    engine: SyncEngine<ScriptedWatchSource>,
}

impl Harness {
    fn new(project: &TestProject) -> Self {
        Self::with_launcher(project, RecordingLauncher::new())
    }

    fn with_launcher(project: &TestProject, launcher: RecordingLauncher) -> Self {
        let log = Arc::new(MemoryLog::new());
        let launcher = Arc::new(launcher);
        let ready = Arc::new(RecordingReady::new());
        let (source, script) = ScriptedWatchSource::new();
        let capabilities = Capabilities::default()
            .with_log(log.clone())
            .with_launcher(launcher.clone())
            .with_ready(ready.clone());
        let engine = SyncEngine::new(source, Settings::default())
            .with_capabilities(capabilities)
            .with_working_dir(project.path());
        Self {
            log,
            launcher,
            ready,
            script,
            engine,
        }
    }
}

fn config(pattern: &str) -> WatchConfig {
    WatchConfig::new("App.csproj", pattern)
}

#[test]
fn test_initial_scan_is_applied_before_start_returns() -> Result<()> {
    let project = TestProject::default();
    let harness = Harness::new(&project);
    harness.script.add(project.file("a.ts"));
    harness.script.add(project.file("b.ts"));
    harness.script.ready();

    let running = harness.engine.start(&config("**/*.ts"))?;

    assert_eq!(running.state(), EngineState::Watching);
    let manifest = project.read_manifest();
    assert!(manifest.contains(r#"<Content Include="a.ts"/>"#));
    assert!(manifest.contains(r#"<Content Include="b.ts"/>"#));
    assert_eq!(harness.ready.calls().len(), 1);

    running.close();
    running.wait()?;
    Ok(())
}

#[test]
fn test_subscription_request() -> Result<()> {
    let project = TestProject::default();
    let harness = Harness::new(&project);
    harness.script.ready();

    let running = harness.engine.start(&config("src/**/*.ts"))?;

    let requests = harness.script.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].root, project.path());
    assert_eq!(requests[0].pattern, "src/**/*.ts");
    assert_eq!(requests[0].exclude, [project.manifest.clone()]);
    assert!(requests[0].ignore.contains(&"node_modules".to_string()));
    assert_eq!(running.manifest(), project.manifest);

    running.close();
    Ok(())
}

#[test]
fn test_events_after_ready_are_processed_in_order() -> Result<()> {
    let project = TestProject::default();
    let harness = Harness::new(&project);
    harness.script.ready();
    let running = harness.engine.start(&config("**/*"))?;

    harness.script.add(project.file("test.ts"));
    harness.script.remove(project.file("test.ts"));
    harness.script.add(project.file("foo.ts"));

    assert!(wait_until(TIMEOUT, || project.read_manifest().contains("foo.ts")));
    let manifest = project.read_manifest();
    assert!(!manifest.contains("test.ts"));
    assert!(harness.log.contains(Level::INFO, "Added \"test.ts\""));
    assert!(harness.log.contains(Level::INFO, "Removed \"test.ts\" and its empty group"));

    running.close();
    running.wait()?;
    Ok(())
}

#[test]
fn test_ready_hook_launched_once() -> Result<()> {
    let project = TestProject::default();
    let harness = Harness::new(&project);
    harness.script.ready();
    harness.script.send(WatchEvent::Ready);

    let running = harness
        .engine
        .start(&config("*.ts").with_on_ready("npm run serve"))?;
    // The duplicate ready signal is drained by the worker
    std::thread::sleep(Duration::from_millis(200));

    assert_eq!(
        harness.launcher.launches(),
        [("npm run serve".to_string(), project.path().to_path_buf())]
    );
    assert_eq!(
        harness.ready.calls(),
        [(project.manifest.clone(), "*.ts".to_string())]
    );

    running.close();
    Ok(())
}

#[test]
fn test_ready_hook_runs_in_working_dir() -> Result<()> {
    let project = TestProject::default();
    let web = project.file("web");
    fs::create_dir_all(&web)?;
    fs::write(web.join("Web.csproj"), "<Project/>")?;
    let harness = Harness::new(&project);
    harness.script.ready();

    let running = harness
        .engine
        .start(&WatchConfig::new("web/Web.csproj", "*.ts").with_on_ready("npm start"))?;

    assert_eq!(running.manifest(), web.join("Web.csproj"));
    assert_eq!(
        harness.launcher.launches(),
        [("npm start".to_string(), project.path().to_path_buf())]
    );

    running.close();
    Ok(())
}

#[test]
fn test_failed_hook_does_not_stop_engine() -> Result<()> {
    let project = TestProject::default();
    let harness = Harness::with_launcher(&project, RecordingLauncher::failing());
    harness.script.ready();

    let running = harness.engine.start(&config("*.ts").with_on_ready("boom"))?;

    assert_eq!(running.state(), EngineState::Watching);
    assert!(harness.log.contains(Level::WARN, "boom"));
    running.close();
    Ok(())
}

#[test]
fn test_malformed_manifest_does_not_stop_the_loop() -> Result<()> {
    let project = TestProject::default();
    let harness = Harness::new(&project);
    harness.script.ready();
    let running = harness.engine.start(&config("*.ts"))?;

    fs::write(&project.manifest, "<Project><oops></Project>")?;
    harness.script.add(project.file("a.ts"));
    assert!(wait_until(TIMEOUT, || harness.log.contains(Level::ERROR, "a.ts")));
    assert_eq!(running.state(), EngineState::Watching);

    fs::write(&project.manifest, "<Project/>")?;
    harness.script.add(project.file("b.ts"));
    assert!(wait_until(TIMEOUT, || project.read_manifest().contains("b.ts")));

    running.close();
    running.wait()?;
    Ok(())
}

#[test]
fn test_watch_errors_are_logged() -> Result<()> {
    let project = TestProject::default();
    let harness = Harness::new(&project);
    harness.script.ready();
    let running = harness.engine.start(&config("*.ts"))?;

    harness.script.send(WatchEvent::Error("inotify limit reached".to_string()));
    assert!(wait_until(TIMEOUT, || {
        harness.log.contains(Level::WARN, "inotify limit reached")
    }));
    assert_eq!(running.state(), EngineState::Watching);

    running.close();
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_non_unicode_path_is_skipped_with_reason() -> Result<()> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let project = TestProject::default();
    let harness = Harness::new(&project);
    harness.script.ready();
    let running = harness.engine.start(&config("*"))?;

    harness.script.add(project.path().join(OsStr::from_bytes(b"bad\xff.ts")));
    assert!(wait_until(TIMEOUT, || harness.log.contains(Level::WARN, "not valid UTF-8")));
    assert!(!harness.log.contains(Level::WARN, "outside the manifest directory"));
    assert_eq!(project.read_manifest(), "<Project></Project>");

    running.close();
    Ok(())
}

#[test]
fn test_verbose_records_no_ops() -> Result<()> {
    let project = TestProject::new(r#"<Project><ItemGroup><Content Include="a.ts"/></ItemGroup></Project>"#)?;
    let harness = Harness::new(&project);
    harness.script.add(project.file("a.ts"));
    harness.script.ready();

    let running = harness.engine.start(&config("*.ts").with_verbose(true))?;

    assert!(harness.log.contains(Level::DEBUG, "already listed"));
    running.close();
    Ok(())
}

#[test]
fn test_quiet_engine_skips_debug_records() -> Result<()> {
    let project = TestProject::new(r#"<Project><ItemGroup><Content Include="a.ts"/></ItemGroup></Project>"#)?;
    let harness = Harness::new(&project);
    harness.script.add(project.file("a.ts"));
    harness.script.ready();

    let running = harness.engine.start(&config("*.ts"))?;

    assert!(harness.log.entries().iter().all(|(level, _)| *level != Level::DEBUG));
    running.close();
    Ok(())
}

#[test]
fn test_close_is_idempotent_and_unsubscribes() -> Result<()> {
    let project = TestProject::default();
    let harness = Harness::new(&project);
    harness.script.ready();
    let running = harness.engine.start(&config("*.ts"))?;

    running.close();
    running.close();
    assert_eq!(running.state(), EngineState::Closed);
    assert!(harness.script.unsubscribed());

    let handle = running.close_handle();
    running.wait()?;
    handle.close();
    assert_eq!(handle.state(), EngineState::Closed);
    Ok(())
}

#[test]
fn test_no_events_processed_after_close() -> Result<()> {
    let project = TestProject::default();
    let harness = Harness::new(&project);
    harness.script.ready();
    let running = harness.engine.start(&config("*.ts"))?;

    running.close();
    running.wait()?;
    harness.script.add(project.file("late.ts"));
    std::thread::sleep(Duration::from_millis(200));

    assert!(!project.read_manifest().contains("late.ts"));
    Ok(())
}

#[test]
fn test_close_before_ready_is_deferred() -> Result<()> {
    let project = TestProject::default();
    let harness = Harness::new(&project);
    let close = harness.engine.close_handle();
    let script = harness.script.clone();
    let engine = harness.engine;
    let manifest = project.manifest.clone();

    let starter = std::thread::spawn(move || engine.start(&WatchConfig::new(manifest, "*.ts")));

    assert!(wait_until(TIMEOUT, || close.state() == EngineState::Initializing));
    close.close();
    assert_eq!(close.state(), EngineState::Initializing);

    script.add(project.file("scanned.ts"));
    script.ready();
    let running = starter
        .join()
        .map_err(|_| anyhow::anyhow!("start thread panicked"))??;

    assert_eq!(running.state(), EngineState::Closed);
    assert!(script.unsubscribed());
    assert!(project.read_manifest().contains("scanned.ts"));
    running.wait()?;
    Ok(())
}

#[test]
fn test_source_ending_closes_engine() -> Result<()> {
    let project = TestProject::default();
    let harness = Harness::new(&project);
    harness.script.ready();
    let running = harness.engine.start(&config("*.ts"))?;

    drop(harness.script);
    running.wait()?;
    Ok(())
}

#[test]
fn test_source_ending_before_ready_fails_start() {
    let project = TestProject::default();
    let harness = Harness::new(&project);
    let close = harness.engine.close_handle();
    drop(harness.script);

    let err = harness.engine.start(&config("*.ts")).unwrap_err();
    assert!(matches!(err, SyncError::Watch(_)));
    assert_eq!(close.state(), EngineState::Closed);
}

#[test]
fn test_configuration_errors_abort_startup() {
    let project = TestProject::default();

    let cases = [
        (WatchConfig::default(), "Expected csproj"),
        (
            WatchConfig {
                manifest_path: Some("App.csproj".into()),
                ..WatchConfig::default()
            },
            "Expected pattern",
        ),
        (WatchConfig::new("App.xml", "*.ts"), "Expected .csproj file"),
        (WatchConfig::new("Missing.csproj", "*.ts"), "Invalid csproj path"),
    ];

    for (config, message) in cases {
        let harness = Harness::new(&project);
        let close = harness.engine.close_handle();
        let err = harness.engine.start(&config).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)), "{err}");
        assert!(err.to_string().starts_with(message), "{err}");
        assert_eq!(close.state(), EngineState::Closed);
        assert!(harness.script.requests().is_empty());
        assert!(harness.ready.calls().is_empty());
    }

    let harness = Harness::new(&project);
    let err = harness.engine.start(&WatchConfig::default()).unwrap_err();
    assert!(matches!(err, SyncError::Config(ConfigError::MissingManifest)));
}
