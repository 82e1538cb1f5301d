//! Dispatch lifecycle integration tests.
//!
//! These tests run the conversion loop against an in-memory catalog and a
//! temporary archive:
//! - Outputs, status updates and events for successful files
//! - Failures, panics and missing converters leave files pending
//! - Re-runs, tool filters, queries, dry runs and cancellation

use std::path::{Path, PathBuf};

use tokio::sync::watch;

use convertool_core::{
    catalog::{
        ConversionEvent, ConvertAction, ConvertOptions, Destination, EventFilter, FileCatalog,
        FileFilter, IgnoreAction, SourceKind, SourceQuery,
    },
    dispatch::{CommitPolicy, ConversionRunner, RunError, RunOptions, RunSummary, Stage},
    testing::{fixtures::ArchiveFixture, mock_registry, FAIL_OPTION, OUTPUTS_OPTION, PANIC_OPTION},
};

fn options() -> RunOptions {
    RunOptions {
        threads: 4,
        page_size: 3,
        ..Default::default()
    }
}

async fn run(archive: &ArchiveFixture, stage: Stage, options: RunOptions) -> RunSummary {
    ConversionRunner::new(archive.catalog(), mock_registry(), archive.layout(), options)
        .run(stage)
        .await
        .expect("run succeeds")
}

fn pending(archive: &ArchiveFixture, kind: SourceKind, destination: Destination) -> usize {
    archive
        .catalog()
        .select_sources(&SourceQuery::pending(kind, destination).with_limit(1000))
        .unwrap()
        .len()
}

fn events(archive: &ArchiveFixture, event_type: &str) -> usize {
    archive
        .catalog()
        .events(&EventFilter::new().with_event_type(event_type))
        .unwrap()
        .len()
}

fn destination_dir(archive: &ArchiveFixture, destination: Destination) -> PathBuf {
    archive.layout().destination_root(destination)
}

fn has_temp_dirs(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .any(|e| e.file_name().to_string_lossy().starts_with(".tmp_convertool_"))
        })
        .unwrap_or(false)
}

#[tokio::test]
async fn test_copy_produces_identical_master() {
    let archive = ArchiveFixture::new();
    let file = archive.add_original("docs/report.bin", b"\x00\x01payload", ConvertAction::new("copy", "copy"));

    let summary = run(&archive, Stage::OriginalToMaster, options()).await;

    assert_eq!(summary.converted, 1);
    let master_dir = destination_dir(&archive, Destination::Master);
    assert_eq!(
        std::fs::read(master_dir.join("docs/report.bin")).unwrap(),
        b"\x00\x01payload"
    );
    assert_eq!(pending(&archive, SourceKind::Original, Destination::Master), 0);

    let masters = archive
        .catalog()
        .converted_files(Destination::Master, file.uuid)
        .unwrap();
    assert_eq!(masters.len(), 1);
    assert_eq!(masters[0].relative_path, PathBuf::from("docs/report.bin"));
    assert_eq!(masters[0].checksum, file.checksum);
    assert!(!has_temp_dirs(&master_dir));
}

#[tokio::test]
async fn test_ignored_empty_file_gets_template() {
    let archive = ArchiveFixture::new();
    archive.add_ignored("empty/zero.dat", b"", IgnoreAction::new("empty"));

    let summary = run(&archive, Stage::OriginalToMaster, options()).await;

    assert_eq!(summary.converted, 1);
    let text = std::fs::read_to_string(
        destination_dir(&archive, Destination::Master).join("empty/zero.dat.txt"),
    )
    .unwrap();
    assert_eq!(text, "Den originale fil var tom.");
}

#[tokio::test]
async fn test_one_failure_in_a_batch() {
    let archive = ArchiveFixture::new();
    for i in 0..9 {
        archive.add_original(
            &format!("batch/file{i}.txt"),
            format!("content {i}").as_bytes(),
            ConvertAction::new("mock", "txt"),
        );
    }
    let broken = archive.add_original(
        "batch/broken.txt",
        b"broken",
        ConvertAction::new("mock", "txt").with_option(FAIL_OPTION, "cannot read"),
    );

    let summary = run(&archive, Stage::OriginalToMaster, options()).await;

    assert_eq!(summary.converted, 9);
    assert_eq!(summary.failed, 1);
    assert_eq!(events(&archive, "converted"), 9);
    assert_eq!(events(&archive, "error"), 1);

    let remaining = archive
        .catalog()
        .select_sources(&SourceQuery::pending(SourceKind::Original, Destination::Master))
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].uuid, broken.uuid);

    let master_dir = destination_dir(&archive, Destination::Master);
    assert!(!master_dir.join("batch/broken.txt").exists());
    assert_eq!(archive.files_in(&master_dir).len(), 9);
}

#[tokio::test]
async fn test_chain_without_intermediate_is_a_failure() {
    let archive = ArchiveFixture::new();
    let file = archive.add_original(
        "scans/a.txt",
        b"a",
        ConvertAction::new("mock-chain", "tif").with_option(OUTPUTS_OPTION, "0"),
    );

    let summary = run(&archive, Stage::OriginalToMaster, options()).await;

    assert_eq!(summary.converted, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(events(&archive, "converted"), 0);
    assert_eq!(events(&archive, "error"), 1);
    assert_eq!(pending(&archive, SourceKind::Original, Destination::Master), 1);
    assert!(archive
        .catalog()
        .converted_files(Destination::Master, file.uuid)
        .unwrap()
        .is_empty());
    let master_dir = destination_dir(&archive, Destination::Master);
    assert!(archive.files_in(&master_dir).is_empty());
}

#[tokio::test]
async fn test_rerun_skips_processed_files() {
    let archive = ArchiveFixture::new();
    archive.add_original("a.txt", b"a", ConvertAction::new("mock", "txt"));
    archive.add_original("b.txt", b"b", ConvertAction::new("mock-serial", "txt"));

    let first = run(&archive, Stage::OriginalToMaster, options()).await;
    let second = run(&archive, Stage::OriginalToMaster, options()).await;

    assert_eq!(first.converted, 2);
    assert_eq!(second, RunSummary::default());
    assert_eq!(events(&archive, "converted"), 2);
}

#[tokio::test]
async fn test_access_and_statutory_bits_are_independent() {
    let archive = ArchiveFixture::new();
    archive.add_master(
        "m/a.txt",
        b"master",
        Some(ConvertAction::new("mock", "txt")),
        Some(ConvertAction::new("mock", "txt")),
    );

    run(&archive, Stage::MasterToAccess, options()).await;
    assert_eq!(pending(&archive, SourceKind::Master, Destination::Access), 0);
    assert_eq!(pending(&archive, SourceKind::Master, Destination::Statutory), 1);

    run(&archive, Stage::MasterToStatutory, options()).await;
    assert_eq!(pending(&archive, SourceKind::Master, Destination::Statutory), 0);

    assert!(destination_dir(&archive, Destination::Access)
        .join("m/a.txt")
        .is_file());
    assert!(destination_dir(&archive, Destination::Statutory)
        .join("m/a.txt")
        .is_file());
}

#[tokio::test]
async fn test_panic_is_recorded_as_unexpected_error() {
    let archive = ArchiveFixture::new();
    archive.add_original(
        "a.txt",
        b"a",
        ConvertAction::new("mock", "txt").with_option(PANIC_OPTION, "converter bug"),
    );
    archive.add_original("b.txt", b"b", ConvertAction::new("mock", "txt"));

    let summary = run(&archive, Stage::OriginalToMaster, options()).await;

    assert_eq!(summary.converted, 1);
    assert_eq!(summary.failed, 1);
    let errors = archive
        .catalog()
        .events(&EventFilter::new().with_event_type("error"))
        .unwrap();
    match &errors[0].data {
        ConversionEvent::Error { error, message, .. } => {
            assert_eq!(error, "Panic");
            assert_eq!(message, "converter bug");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_unresolvable_files_are_skipped() {
    let archive = ArchiveFixture::new();
    archive.add_original("a.txt", b"a", ConvertAction::new("nope", "pdf"));
    archive.add_original("b.txt", b"b", ConvertAction::new("mock-unsupported", "txt"));
    archive.add_original("c.txt", b"c", ConvertAction::new("mock", "txt"));

    let summary = run(&archive, Stage::OriginalToMaster, options()).await;

    assert_eq!(summary.converted, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(events(&archive, "instruction_error"), 2);
    assert_eq!(pending(&archive, SourceKind::Original, Destination::Master), 2);
    assert!(!has_temp_dirs(&destination_dir(&archive, Destination::Master)));
}

#[tokio::test]
async fn test_tool_filters() {
    let archive = ArchiveFixture::new();
    archive.add_original("a.txt", b"a", ConvertAction::new("mock", "txt"));
    archive.add_original("b.txt", b"b", ConvertAction::new("mock-serial", "txt"));

    let summary = run(
        &archive,
        Stage::OriginalToMaster,
        RunOptions {
            tool_ignore: vec!["mock-serial".into()],
            ..options()
        },
    )
    .await;

    assert_eq!(summary.converted, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(events(&archive, "instruction_error"), 0);
    assert_eq!(pending(&archive, SourceKind::Original, Destination::Master), 1);
}

#[tokio::test]
async fn test_query_leaves_other_files_untouched() {
    let archive = ArchiveFixture::new();
    archive.add_original("docs/a.txt", b"a", ConvertAction::new("mock", "txt"));
    archive.add_original("docs/b.txt", b"b", ConvertAction::new("mock", "txt"));
    let other = archive.add_original("other/c.txt", b"c", ConvertAction::new("mock", "txt"));

    let summary = run(
        &archive,
        Stage::OriginalToMaster,
        RunOptions {
            filter: Some(FileFilter::parse("relative_path:docs/%").unwrap()),
            ..options()
        },
    )
    .await;

    assert_eq!(summary.converted, 2);
    assert_eq!(summary.skipped, 0);
    let master_dir = destination_dir(&archive, Destination::Master);
    assert!(master_dir.join("docs/a.txt").exists());
    assert!(!master_dir.join("other").exists());

    let stored = archive
        .catalog()
        .get_source(SourceKind::Original, other.uuid)
        .unwrap();
    assert_eq!(stored.processed, other.processed);
    assert!(archive
        .catalog()
        .converted_files(Destination::Master, other.uuid)
        .unwrap()
        .is_empty());
    assert!(archive
        .catalog()
        .events(&EventFilter::new().with_uuid(other.uuid))
        .unwrap()
        .is_empty());
    assert_eq!(pending(&archive, SourceKind::Original, Destination::Master), 1);
}

#[tokio::test]
async fn test_query_with_unknown_field_fails_before_starting() {
    let archive = ArchiveFixture::new();
    archive.add_original("a.txt", b"a", ConvertAction::new("mock", "txt"));

    let result = ConversionRunner::new(
        archive.catalog(),
        mock_registry(),
        archive.layout(),
        RunOptions {
            filter: Some(FileFilter::parse("convert_access=@null").unwrap()),
            ..options()
        },
    )
    .run(Stage::OriginalToMaster)
    .await;

    assert!(matches!(result, Err(RunError::Catalog(_))));
    assert!(archive.catalog().events(&EventFilter::new()).unwrap().is_empty());
    assert_eq!(pending(&archive, SourceKind::Original, Destination::Master), 1);
}

#[tokio::test]
async fn test_run_wide_options_yield_to_file_options() {
    let archive = ArchiveFixture::new();
    let shared = archive.add_original("a.txt", b"a", ConvertAction::new("mock", "txt"));
    let own = archive.add_original(
        "b.txt",
        b"b",
        ConvertAction::new("mock", "txt").with_option(OUTPUTS_OPTION, "1"),
    );

    let mut converter_options = ConvertOptions::new();
    converter_options.insert(OUTPUTS_OPTION.to_string(), "2".to_string());
    let summary = run(
        &archive,
        Stage::OriginalToMaster,
        RunOptions {
            converter_options,
            ..options()
        },
    )
    .await;

    assert_eq!(summary.converted, 2);
    let catalog = archive.catalog();
    assert_eq!(catalog.converted_files(Destination::Master, shared.uuid).unwrap().len(), 2);
    assert_eq!(catalog.converted_files(Destination::Master, own.uuid).unwrap().len(), 1);
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let archive = ArchiveFixture::new();
    archive.add_original("a.txt", b"a", ConvertAction::new("mock", "txt"));
    archive.add_original("b.txt", b"b", ConvertAction::new("nope", "txt"));

    let summary = run(
        &archive,
        Stage::OriginalToMaster,
        RunOptions {
            dry_run: true,
            ..options()
        },
    )
    .await;

    assert_eq!(summary.would_convert, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.converted, 0);
    assert!(!destination_dir(&archive, Destination::Master).exists());
    assert!(archive.catalog().events(&EventFilter::new()).unwrap().is_empty());
    assert_eq!(pending(&archive, SourceKind::Original, Destination::Master), 2);
}

#[tokio::test]
async fn test_paging_and_commit_at_end() {
    let archive = ArchiveFixture::new();
    for i in 0..7 {
        archive.add_original(
            &format!("p/{i}.txt"),
            b"x",
            ConvertAction::new(if i % 2 == 0 { "mock" } else { "mock-serial" }, "txt"),
        );
    }

    let summary = run(
        &archive,
        Stage::OriginalToMaster,
        RunOptions {
            page_size: 2,
            threads: 2,
            commit: CommitPolicy::AtEnd,
            ..options()
        },
    )
    .await;

    assert_eq!(summary.converted, 7);
    assert_eq!(pending(&archive, SourceKind::Original, Destination::Master), 0);
    assert_eq!(events(&archive, "start"), 1);
    assert_eq!(events(&archive, "end"), 1);
}

#[tokio::test]
async fn test_cancelled_run() {
    let archive = ArchiveFixture::new();
    archive.add_original("a.txt", b"a", ConvertAction::new("mock", "txt"));

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let result = ConversionRunner::new(archive.catalog(), mock_registry(), archive.layout(), options())
        .with_shutdown(rx)
        .run(Stage::OriginalToMaster)
        .await;

    assert!(matches!(result, Err(RunError::Cancelled)));
    assert_eq!(pending(&archive, SourceKind::Original, Destination::Master), 1);
    let ended = archive
        .catalog()
        .events(&EventFilter::new().with_event_type("end"))
        .unwrap();
    assert!(matches!(
        ended[0].data,
        ConversionEvent::RunEnded { cancelled: true, .. }
    ));
}
