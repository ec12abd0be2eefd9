//! Integration tests for the ExportOrchestrator
//!
//! These tests run full exports against a temporary project and verify:
//! - The happy path publishes a complete tree
//! - Item failures degrade the session without stopping later stages
//! - Gates (preflight, compile) stop the pipeline before anything is written
//! - Publishing replaces the previous tree

mod common;

use common::{FakeCompiler, FakeEditor, FakePackager, TestProject};
use launchpad_exporter::host::{AssetEntry, AssetKind, CompilerMessage};
use launchpad_exporter::models::{
    ContentTypes, ExportAbort, ExportStage, ItemIoError, StageOutcome, ValidationError,
};
use launchpad_exporter::services::{CompilePassMonitor, ExportOrchestrator, PreflightCoordinator};
use launchpad_exporter::{StateChange, StateManager};
use std::fs;
use std::sync::Arc;

struct Harness {
    project: TestProject,
    monitor: Arc<CompilePassMonitor>,
    packager: Arc<FakePackager>,
    orchestrator: ExportOrchestrator,
}

fn harness_with(editor: FakeEditor, packager: FakePackager) -> Harness {
    let project = TestProject::new();
    let monitor = Arc::new(CompilePassMonitor::new(Arc::new(FakeCompiler::default())));
    let packager = Arc::new(packager);
    let orchestrator = ExportOrchestrator::new(
        project.layout.clone(),
        Arc::new(PreflightCoordinator::new(Arc::new(editor))),
        Arc::clone(&monitor),
        packager.clone(),
    );

    Harness {
        project,
        monitor,
        packager,
        orchestrator,
    }
}

fn harness() -> Harness {
    harness_with(
        FakeEditor::clean(),
        FakePackager::with_assets(vec![
            AssetEntry::new("Assets/Prefabs/Door.prefab", AssetKind::General),
            AssetEntry::new("Assets/Scenes/Base.unity", AssetKind::Scene),
        ]),
    )
}

fn complete_pass(monitor: &CompilePassMonitor, errored_unit: Option<&str>) {
    match errored_unit {
        Some(unit) => monitor.on_unit_compiled(
            unit,
            &[CompilerMessage::error("CS0246: The type or namespace name could not be found")],
        ),
        None => monitor.on_unit_compiled("Foo.Scripts", &[]),
    }
    monitor.on_pass_completed();
}

#[tokio::test]
async fn test_happy_path_publishes_tree() {
    let h = harness();
    complete_pass(&h.monitor, None);
    h.project.add_assembly("Foo.Scripts");
    h.project.add_assembly("Foo.Patches");

    let settings = h.project.settings(&["Foo.Scripts", "Foo.Patches"]);
    let session = h.orchestrator.export(&settings).await;

    assert!(session.success, "{}", session.summary());
    assert!(!session.degraded);
    assert_eq!(session.assemblies_exported, 2);
    assert_eq!(session.bundles_produced, 1);

    let published = h.project.published("Foo");
    assert_eq!(session.published_path.as_ref(), Some(&published));
    assert!(published.join("Foo.Scripts.dll").is_file());
    assert!(published.join("Foo.Patches.dll").is_file());
    assert!(published.join("StandaloneWindows/foo.bundle").is_file());
    assert!(!h.project.output_dir.join(".Foo.publishing").exists());

    let stages: Vec<ExportStage> = session.stage_results.iter().map(|(s, _)| *s).collect();
    assert_eq!(stages, ExportStage::ALL.to_vec());
}

#[tokio::test]
async fn test_assets_tagged_with_bundle_and_variant() {
    let h = harness();
    let session = h.orchestrator.export(&h.project.settings(&[])).await;
    assert!(session.success);

    let tags = h.packager.tags.lock().unwrap().clone();
    assert_eq!(
        tags,
        vec![
            (
                "Assets/Prefabs/Door.prefab".to_string(),
                "Foo".to_string(),
                "assets".to_string()
            ),
            (
                "Assets/Scenes/Base.unity".to_string(),
                "Foo".to_string(),
                "scenes".to_string()
            ),
        ]
    );
}

#[tokio::test]
async fn test_missing_binary_degrades_session() {
    let h = harness();
    h.project.add_assembly("Foo.Scripts");
    h.project.add_assembly("Foo.Patches");

    let settings = h.project.settings(&["Foo.Scripts", "Foo.Missing", "Foo.Patches"]);
    let session = h.orchestrator.export(&settings).await;

    assert!(session.success);
    assert!(session.degraded);
    assert_eq!(session.assemblies_exported, 2);
    assert_eq!(session.item_errors.len(), 1);
    assert!(matches!(
        &session.item_errors[0],
        ItemIoError::MissingBinary { unit, .. } if unit == "Foo.Missing"
    ));
    assert_eq!(
        session.outcome_of(ExportStage::Assemblies),
        Some(&StageOutcome::Degraded { errors: 1 })
    );

    for stage in [
        ExportStage::AuxiliaryData,
        ExportStage::Bundles,
        ExportStage::Publish,
    ] {
        assert!(session.ran(stage), "stage {} did not run", stage);
    }
    assert!(h.project.published("Foo").join("Foo.Patches.dll").is_file());
}

#[tokio::test]
async fn test_missing_debug_symbols_skip_unit() {
    let h = harness();
    h.project.add_assembly("Foo.Scripts");
    h.project.add_debug_symbols("Foo.Scripts");
    h.project.add_assembly("Foo.Patches");

    let mut settings = h.project.settings(&["Foo.Scripts", "Foo.Patches"]);
    settings.include_debug_symbols = true;
    let session = h.orchestrator.export(&settings).await;

    assert_eq!(session.assemblies_exported, 1);
    assert!(matches!(
        &session.item_errors[0],
        ItemIoError::MissingDebugSymbols { unit, .. } if unit == "Foo.Patches"
    ));
    let published = h.project.published("Foo");
    assert!(published.join("Foo.Scripts.pdb").is_file());
    assert!(!published.join("Foo.Patches.dll").exists());
}

#[tokio::test]
async fn test_compile_errors_block_export() {
    let h = harness();
    complete_pass(&h.monitor, Some("Foo.Scripts"));
    h.project.add_assembly("Foo.Scripts");

    let prior = h.project.published("Foo");
    fs::create_dir_all(&prior).unwrap();
    fs::write(prior.join("previous.dll"), "old").unwrap();

    let session = h.orchestrator.export(&h.project.settings(&["Foo.Scripts"])).await;

    assert!(!session.success);
    assert_eq!(
        session.abort,
        Some(ExportAbort::CompileErrors {
            units: vec!["Foo.Scripts".to_string()]
        })
    );
    assert_eq!(session.stage_results.len(), 3);
    assert!(!h.project.layout.workspace_for("Foo").exists());
    assert_eq!(fs::read_to_string(prior.join("previous.dll")).unwrap(), "old");
}

#[tokio::test]
async fn test_preflight_cancel_short_circuits() {
    let h = harness_with(FakeEditor::cancelling(), FakePackager::default());
    h.project.add_assembly("Foo.Scripts");

    let session = h.orchestrator.export(&h.project.settings(&["Foo.Scripts"])).await;

    assert!(!session.success);
    assert_eq!(session.abort, Some(ExportAbort::Cancelled));
    assert!(!session.ran(ExportStage::CompileGate));
    assert!(!h.project.layout.workspace_for("Foo").exists());
    assert!(!h.project.published("Foo").exists());
    assert_eq!(h.packager.builds.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_data_directories_and_artifacts_copied_without_sidecars() {
    let h = harness();
    h.project.write("Assets/GameData/items.xml", "<Items/>");
    h.project.write("Assets/GameData/items.xml.meta", "guid: 1");
    h.project.write("Assets/About/About.xml", "<ModMetadata/>");
    h.project.write("README.md", "readme");
    h.project.write("Docs/guide.txt", "guide");

    let mut settings = h.project.settings(&[]);
    settings.artifacts = vec![
        "README.md".to_string(),
        "Docs".to_string(),
        "CHANGELOG.md".to_string(),
    ];
    let session = h.orchestrator.export(&settings).await;

    assert!(session.success);
    assert!(session.degraded);
    assert!(matches!(
        &session.item_errors[..],
        [ItemIoError::MissingArtifact { path }] if path.ends_with("CHANGELOG.md")
    ));

    let published = h.project.published("Foo");
    assert!(published.join("GameData/items.xml").is_file());
    assert!(!published.join("GameData/items.xml.meta").exists());
    assert!(published.join("About/About.xml").is_file());
    assert!(published.join("README.md").is_file());
    assert!(published.join("Docs/guide.txt").is_file());
}

#[tokio::test]
async fn test_publish_replaces_previous_tree() {
    let h = harness();
    h.project.add_assembly("Foo.Scripts");

    let prior = h.project.published("Foo");
    fs::create_dir_all(&prior).unwrap();
    fs::write(prior.join("stale.dll"), "old").unwrap();

    let session = h.orchestrator.export(&h.project.settings(&["Foo.Scripts"])).await;

    assert!(session.success);
    assert!(!prior.join("stale.dll").exists());
    assert!(prior.join("Foo.Scripts.dll").is_file());
}

#[tokio::test]
async fn test_packaging_failure_keeps_prior_output() {
    let packager = FakePackager {
        fail_build: true,
        ..FakePackager::default()
    };
    let h = harness_with(FakeEditor::clean(), packager);

    let prior = h.project.published("Foo");
    fs::create_dir_all(&prior).unwrap();
    fs::write(prior.join("previous.dll"), "old").unwrap();

    let session = h.orchestrator.export(&h.project.settings(&[])).await;

    assert!(!session.success);
    assert!(matches!(session.abort, Some(ExportAbort::Packaging(_))));
    assert!(!session.ran(ExportStage::Publish));
    assert!(prior.join("previous.dll").is_file());
}

#[tokio::test]
async fn test_content_types_select_stages() {
    let h = harness();
    h.project.add_assembly("Foo.Scripts");

    let mut settings = h.project.settings(&["Foo.Scripts"]);
    settings.content_types = ContentTypes::ASSEMBLIES;
    let session = h.orchestrator.export(&settings).await;

    assert!(session.success);
    assert_eq!(session.assemblies_exported, 1);
    assert!(matches!(
        session.outcome_of(ExportStage::Bundles),
        Some(StageOutcome::Skipped { .. })
    ));
    assert_eq!(h.packager.builds.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_export_reports_progress_through_state() {
    let h = harness();
    let state = StateManager::new();
    let mut rx = state.subscribe();
    let monitor = Arc::clone(&h.monitor);
    let orchestrator = ExportOrchestrator::new(
        h.project.layout.clone(),
        Arc::new(PreflightCoordinator::new(Arc::new(FakeEditor::clean()))),
        monitor,
        h.packager.clone(),
    )
    .with_state(state.clone());

    let session = orchestrator.export(&h.project.settings(&[])).await;
    assert!(session.success);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(StateChange::ExportStarted { .. })));
    assert_eq!(
        events.last(),
        Some(&StateChange::ExportFinished {
            success: true,
            degraded: false
        })
    );
    let stages = events
        .iter()
        .filter(|e| matches!(e, StateChange::StageChanged { .. }))
        .count();
    assert_eq!(stages, ExportStage::ALL.len());
    assert_eq!(state.snapshot().last_export_success, Some(true));
}

#[tokio::test]
async fn test_path_unsafe_name_leaves_project_untouched() {
    let h = harness();
    complete_pass(&h.monitor, None);
    let marker = h.project.write("Assets/Scripts/Door.cs", "class Door {}");
    fs::create_dir_all(&h.project.output_dir).unwrap();
    let neighbour = h.project.output_dir.join("OtherMod");
    fs::create_dir_all(&neighbour).unwrap();

    for name in ["..", ".", "../OtherMod", "/tmp"] {
        let mut settings = h.project.settings(&[]);
        settings.name = name.to_string();

        let session = h.orchestrator.export(&settings).await;

        assert!(!session.success, "name {:?} exported", name);
        assert!(
            matches!(
                session.abort,
                Some(ExportAbort::Validation(ValidationError::UnsafeName(_)))
            ),
            "unexpected abort for {:?}: {:?}",
            name,
            session.abort
        );
        assert_eq!(session.stage_results.len(), 1);
    }

    assert!(marker.is_file());
    assert!(h.project.layout.assets_dir.is_dir());
    assert!(neighbour.is_dir());
    assert!(!h.project.layout.scratch_dir.exists());
}
