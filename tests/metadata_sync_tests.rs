//! Integration tests for the MetadataSynchronizer
//!
//! These tests verify:
//! - Repeated ticks with no edits write nothing (property-based)
//! - Both sides converge after edits on either side
//! - Unrelated document content survives a push
//! - The background loop starts and stops cleanly

use camino::Utf8PathBuf;
use launchpad_exporter::models::{ExportSettings, MirroredField, MirroredFields};
use launchpad_exporter::services::{AboutDocument, MetadataSynchronizer, SkipReason};
use launchpad_exporter::{Metrics, StateChange, StateManager};
use proptest::prelude::*;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;

fn document(fields: &MirroredFields) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<ModMetadata>\n  <Name>{}</Name>\n  <Author>{}</Author>\n  <Version>{}</Version>\n  <Description>Adds doors</Description>\n  <Tags>x,y</Tags>\n</ModMetadata>\n",
        fields.name, fields.author, fields.version
    )
}

fn settings(fields: &MirroredFields) -> ExportSettings {
    ExportSettings {
        name: fields.name.clone(),
        author: fields.author.clone(),
        version: fields.version.clone(),
        ..ExportSettings::default()
    }
}

struct Fixture {
    _temp_dir: TempDir,
    path: Utf8PathBuf,
    state: StateManager,
    sync: MetadataSynchronizer,
}

impl Fixture {
    fn new(internal: &MirroredFields, external: &MirroredFields) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().join("Assets/About/About.xml")).unwrap();
        AboutDocument::write(&path, &document(external)).unwrap();

        let state = StateManager::with_settings(settings(internal));
        let sync = MetadataSynchronizer::new(path.clone(), state.clone());
        Self {
            _temp_dir: temp_dir,
            path,
            state,
            sync,
        }
    }

    fn external(&self) -> MirroredFields {
        AboutDocument::load(&self.path)
            .unwrap()
            .unwrap()
            .mirrored_fields()
    }

    fn internal(&self) -> MirroredFields {
        self.state.settings().mirrored_fields()
    }
}

fn fields() -> impl Strategy<Value = MirroredFields> {
    let value = "[A-Za-z0-9._-]{1,12}";
    (value, value, value).prop_map(|(n, a, v)| MirroredFields::new(n, a, v))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_ticks_converge_then_stay_quiet(internal in fields(), external in fields()) {
        let fixture = Fixture::new(&internal, &external);

        let first = fixture.sync.tick();
        prop_assert_eq!(first.skipped, None);
        prop_assert_eq!(fixture.internal(), internal.clone());
        prop_assert_eq!(fixture.external(), internal);

        let bytes = fs::read(&fixture.path).unwrap();
        prop_assert!(fixture.sync.tick().is_noop());
        prop_assert!(fixture.sync.tick().is_noop());
        prop_assert_eq!(fs::read(&fixture.path).unwrap(), bytes);
    }

    #[test]
    fn prop_external_edit_is_adopted(start in fields(), edited in fields()) {
        let fixture = Fixture::new(&start, &start);
        prop_assert!(fixture.sync.tick().is_noop());

        AboutDocument::write(&fixture.path, &document(&edited)).unwrap();
        let report = fixture.sync.tick();

        prop_assert_eq!(report.internal_writes, start.differing(&edited));
        prop_assert_eq!(report.external_writes, 0);
        prop_assert_eq!(fixture.internal(), edited.clone());
        prop_assert!(fixture.sync.tick().is_noop());
    }
}

const MALFORMED: &str = "<ModMetadata><Name>Foo</Author></ModMetadata>";

fn base() -> MirroredFields {
    MirroredFields::new("Foo", "Bar", "1.0.0")
}

#[test]
fn test_edits_to_different_fields_merge() {
    let fixture = Fixture::new(&base(), &base());
    fixture.sync.tick();

    fixture
        .state
        .set_mirrored(&[(MirroredField::Author, "Alice".to_string())]);
    let mut external = base();
    external.version = "1.1.0".to_string();
    AboutDocument::write(&fixture.path, &document(&external)).unwrap();

    let report = fixture.sync.tick();
    assert_eq!(report.internal_writes, vec![MirroredField::Version]);
    assert_eq!(report.external_writes, 1);

    let merged = MirroredFields::new("Foo", "Alice", "1.1.0");
    assert_eq!(fixture.internal(), merged);
    assert_eq!(fixture.external(), merged);
    assert!(fixture.sync.tick().is_noop());
}

#[test]
fn test_document_wins_same_field_conflict() {
    let fixture = Fixture::new(&base(), &base());
    fixture.sync.tick();

    fixture
        .state
        .set_mirrored(&[(MirroredField::Name, "Internal".to_string())]);
    let mut external = base();
    external.name = "External".to_string();
    AboutDocument::write(&fixture.path, &document(&external)).unwrap();

    let report = fixture.sync.tick();
    assert_eq!(report.internal_writes, vec![MirroredField::Name]);
    assert_eq!(report.external_writes, 0);
    assert_eq!(fixture.internal().name, "External");
    assert!(fixture.sync.tick().is_noop());
}

#[test]
fn test_push_preserves_other_document_content() {
    let fixture = Fixture::new(&base(), &base());
    fixture.sync.tick();

    fixture
        .state
        .set_mirrored(&[(MirroredField::Version, "2.0.0".to_string())]);
    let report = fixture.sync.tick();
    assert_eq!(report.external_writes, 1);

    let document = AboutDocument::load(&fixture.path).unwrap().unwrap();
    assert_eq!(document.child_text("Version"), Some("2.0.0"));
    assert_eq!(document.child_text("Tags"), Some("x,y"));
    assert_eq!(document.child_text("Description"), Some("Adds doors"));
}

#[test]
fn test_malformed_document_recovers() {
    let fixture = Fixture::new(&base(), &base());
    fixture.sync.tick();

    fs::write(&fixture.path, MALFORMED).unwrap();
    fixture
        .state
        .set_mirrored(&[(MirroredField::Author, "Alice".to_string())]);
    assert!(matches!(
        fixture.sync.tick().skipped,
        Some(SkipReason::Malformed(_))
    ));
    assert_eq!(fs::read_to_string(&fixture.path).unwrap(), MALFORMED);

    AboutDocument::write(&fixture.path, &document(&base())).unwrap();
    let report = fixture.sync.tick();
    assert_eq!(report.external_writes, 1);
    assert_eq!(fixture.external().author, "Alice");
}

#[test]
fn test_pull_emits_metadata_changed() {
    let fixture = Fixture::new(&base(), &base());
    fixture.sync.tick();
    let mut rx = fixture.state.subscribe();

    let mut external = base();
    external.name = "Baz".to_string();
    AboutDocument::write(&fixture.path, &document(&external)).unwrap();
    fixture.sync.tick();

    assert_eq!(
        rx.try_recv().unwrap(),
        StateChange::MetadataChanged {
            fields: vec![MirroredField::Name]
        }
    );
}

#[test]
fn test_apply_external_ignores_snapshots() {
    let internal = MirroredFields::new("Foo", "Bar", "1.0.0");
    let external = MirroredFields::new("Foo", "Alice", "1.2.0");
    let fixture = Fixture::new(&internal, &external);

    let report = fixture.sync.apply_external().unwrap();
    assert_eq!(
        report.internal_writes,
        vec![MirroredField::Author, MirroredField::Version]
    );
    assert_eq!(fixture.internal(), external);
    assert!(fixture.sync.tick().is_noop());
}

#[test]
fn test_metrics_count_pushes_and_pulls() {
    let metrics = Arc::new(Metrics::new());
    let temp_dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::try_from(temp_dir.path().join("About.xml")).unwrap();
    AboutDocument::write(&path, &document(&base())).unwrap();
    let state = StateManager::with_settings(settings(&MirroredFields::new("New", "Bar", "1.0.0")));
    let sync = MetadataSynchronizer::new(path.clone(), state).with_metrics(Arc::clone(&metrics));

    sync.tick();
    AboutDocument::write(&path, &document(&MirroredFields::new("New", "Bar", "3.0.0"))).unwrap();
    sync.tick();
    sync.set_enabled(false);
    sync.tick();

    assert_eq!(metrics.metadata_pushes.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.metadata_pulls.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.metadata_skips.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_background_loop_syncs_until_stopped() {
    let internal = MirroredFields::new("Foo", "Bar", "4.0.0");
    let fixture = Fixture::new(&internal, &base());
    let path = fixture.path.clone();
    let sync = Arc::new(MetadataSynchronizer::new(path.clone(), fixture.state.clone()));

    let handle = Arc::clone(&sync).start(Duration::from_millis(20));

    let pushed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let version = AboutDocument::load(&path)
                .ok()
                .flatten()
                .map(|d| d.mirrored_fields().version);
            if version.as_deref() == Some("4.0.0") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(pushed.is_ok(), "loop never pushed the settings");

    tokio::time::timeout(Duration::from_secs(5), handle.stop())
        .await
        .expect("loop did not stop");
}
