//! End-to-end restore runs over a fixture tree.

mod common;

use common::*;
use rstest::*;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use teslacrack::{
    AesKey, ConfigError, KeyId, KeyStore, MemoryKeyStore, ScanError, ScanOptions, ScanStatistics,
    Scanner, scan,
};

// ============================================================================
// Fixtures
// ============================================================================

// Fields drop in order: the lock is released before the tree is removed.
struct Infected {
    locked: LockedDir,
    tree: Tree,
    _dir: TempDir,
}

impl Infected {
    fn options(&self) -> ScanOptions {
        ScanOptions::new([&self.tree.root])
    }

    /// Directory counters depend on whether the locked directory is really
    /// unreadable (it is not for root).
    fn expected_dirs(&self) -> (u64, u64) {
        if self.locked.is_effective() { (9, 1) } else { (10, 0) }
    }
}

#[fixture]
fn infected() -> Infected {
    let dir = TempDir::new().unwrap();
    let tree = build_tree(dir.path());
    let locked = LockedDir::lock(&tree.path("locked"));
    Infected {
        locked,
        tree,
        _dir: dir,
    }
}

fn assert_dirs(stats: &ScanStatistics, fixture: &Infected) {
    let (visited, noaccess) = fixture.expected_dirs();
    assert_eq!(stats.visited_ndirs, visited);
    assert_eq!(stats.noaccess_ndirs, noaccess);
    assert_eq!(stats.ndirs(), 10);
}

// ============================================================================
// Default runs
// ============================================================================

#[rstest]
fn test_default_run_counters(infected: Infected) {
    let store = key_store();
    let stats = scan(&infected.options(), &store).unwrap();

    assert_dirs(&stats, &infected);
    assert_eq!(stats.scanned_nfiles, 19);
    assert_eq!(stats.tesla_nfiles, 13);
    assert_eq!(stats.crypted_nfiles, 11);
    assert_eq!(stats.badheader_nfiles, 1);
    assert_eq!(stats.unknown_nfiles, 2);
    assert_eq!(stats.badexisting_nfiles, 1);
    assert_eq!(stats.skip_nfiles, 2);
    assert_eq!(stats.decrypted_nfiles, 6);
    assert_eq!(stats.overwrite_nfiles, 0);
    assert_eq!(stats.deleted_nfiles, 0);
    assert_eq!(stats.failed_nfiles, 2);
}

#[rstest]
fn test_default_run_restores_content(infected: Infected) {
    let store = key_store();
    scan(&infected.options(), &store).unwrap();

    for (output, plain) in &infected.tree.expected {
        assert_eq!(&fs::read(output).unwrap(), plain, "{}", output.display());
    }
    // Originals stay without --delete.
    assert!(infected.tree.path("a1.pdf.vvv").exists());
    // Bad existing output is left alone without --fix.
    assert_eq!(
        fs::read(infected.tree.path("sub4/stale.pdf")).unwrap(),
        b"garbage from an interrupted run"
    );
    assert!(!infected.tree.path("sub4/c1.pdf").exists());
    assert!(!infected.tree.path("sub5/d1.pdf").exists());
}

#[rstest]
fn test_key_store_is_updated(infected: Infected) {
    let store = key_store();
    scan(&infected.options(), &store).unwrap();

    let a = store.lookup(&KeyId::new(ID_A)).unwrap();
    assert_eq!(a.recovered_key, Some(AesKey::from_hex(KEY_A).unwrap()));

    let c = store.lookup(&KeyId::new(ID_C)).unwrap();
    assert!(c.recovered_key.is_none());

    assert_eq!(store.pending(), vec![KeyId::new(ID_D)]);
}

#[rstest]
fn test_dry_run_matches_real_run_and_touches_nothing(infected: Infected) {
    let before = snapshot(&infected.tree.root);

    let dry = scan(&infected.options().with_dry_run(true), &key_store()).unwrap();
    assert_eq!(snapshot(&infected.tree.root), before);

    let real = scan(&infected.options(), &key_store()).unwrap();
    assert_eq!(dry, real);
}

#[rstest]
fn test_second_run_is_idempotent(infected: Infected) {
    let store = key_store();
    scan(&infected.options(), &store).unwrap();
    let after_first = snapshot(&infected.tree.root);

    let stats = scan(&infected.options(), &store).unwrap();
    assert_eq!(stats.decrypted_nfiles, 0);
    assert_eq!(stats.skip_nfiles, 8);
    assert_eq!(stats.badexisting_nfiles, 1);
    assert_eq!(stats.failed_nfiles, 2);
    assert_eq!(snapshot(&infected.tree.root), after_first);
}

#[rstest]
fn test_sequential_and_parallel_agree(infected: Infected) {
    let parallel = scan(&infected.options().with_dry_run(true), &key_store()).unwrap();
    let sequential = scan(&infected.options().with_dry_run(true).sequential(), &key_store()).unwrap();
    assert_eq!(parallel, sequential);
}

// ============================================================================
// Policies after a first real run
// ============================================================================

#[fixture]
fn restored(infected: Infected) -> (Infected, MemoryKeyStore) {
    let store = key_store();
    scan(&infected.options(), &store).unwrap();
    (infected, store)
}

#[rstest]
fn test_fix_dry_run(restored: (Infected, MemoryKeyStore)) {
    let (infected, store) = restored;
    let before = snapshot(&infected.tree.root);

    let stats = scan(&infected.options().with_dry_run(true).with_fix(true), &store).unwrap();
    assert_eq!(stats.decrypted_nfiles, 1);
    assert_eq!(stats.overwrite_nfiles, 1);
    assert_eq!(stats.skip_nfiles, 7);
    assert_eq!(stats.badexisting_nfiles, 1);
    assert_eq!(stats.failed_nfiles, 2);
    assert_eq!(snapshot(&infected.tree.root), before);
}

#[rstest]
fn test_fix_rewrites_bad_output(restored: (Infected, MemoryKeyStore)) {
    let (infected, store) = restored;

    let stats = scan(&infected.options().with_fix(true), &store).unwrap();
    assert_eq!(stats.decrypted_nfiles, 1);
    assert_eq!(stats.overwrite_nfiles, 1);
    assert_eq!(fs::read(infected.tree.path("sub4/stale.pdf")).unwrap(), pdf("restored badly"));

    let stats = scan(&infected.options().with_fix(true), &store).unwrap();
    assert_eq!(stats.badexisting_nfiles, 0);
    assert_eq!(stats.skip_nfiles, 8);
}

#[rstest]
fn test_overwrite_dry_run(restored: (Infected, MemoryKeyStore)) {
    let (infected, store) = restored;

    let stats = scan(&infected.options().with_dry_run(true).with_overwrite(true), &store).unwrap();
    assert_eq!(stats.decrypted_nfiles, 8);
    assert_eq!(stats.overwrite_nfiles, 8);
    assert_eq!(stats.skip_nfiles, 0);
    assert_eq!(stats.badexisting_nfiles, 0);
    assert_eq!(stats.failed_nfiles, 2);
}

#[rstest]
fn test_delete_dry_run_only_deletes_decrypted(restored: (Infected, MemoryKeyStore)) {
    let (infected, store) = restored;

    let stats = scan(&infected.options().with_dry_run(true).with_delete(true), &store).unwrap();
    assert_eq!(stats.skip_nfiles, 8);
    assert_eq!(stats.decrypted_nfiles, 0);
    assert_eq!(stats.deleted_nfiles, 0);
}

#[rstest]
fn test_delete_old_dry_run(restored: (Infected, MemoryKeyStore)) {
    let (infected, store) = restored;
    let before = snapshot(&infected.tree.root);

    let stats = scan(&infected.options().with_dry_run(true).with_delete_old(true), &store).unwrap();
    assert_eq!(stats.skip_nfiles, 8);
    assert_eq!(stats.badexisting_nfiles, 1);
    assert_eq!(stats.deleted_nfiles, 8);
    assert_eq!(snapshot(&infected.tree.root), before);
}

#[rstest]
fn test_delete_old_removes_originals(restored: (Infected, MemoryKeyStore)) {
    let (infected, store) = restored;

    let stats = scan(&infected.options().with_delete_old(true), &store).unwrap();
    assert_eq!(stats.skip_nfiles, 8);
    assert_eq!(stats.deleted_nfiles, 8);
    assert!(!infected.tree.path("a1.pdf.vvv").exists());
    assert!(!infected.tree.path("sub3/done.pdf.vvv").exists());
    assert!(!infected.tree.path("sub4/stale.pdf.vvv").exists());
    // Files that were never decrypted keep their original.
    assert!(infected.tree.path("sub4/c1.pdf.vvv").exists());
    assert!(infected.tree.path("sub5/d1.pdf.vvv").exists());
}

// ============================================================================
// Other scenarios
// ============================================================================

#[rstest]
fn test_delete_after_decrypting(infected: Infected) {
    let stats = scan(&infected.options().with_delete(true), &key_store()).unwrap();
    assert_eq!(stats.decrypted_nfiles, 6);
    assert_eq!(stats.deleted_nfiles, 6);

    for output in infected.tree.expected.keys() {
        assert!(output.exists());
    }
    assert!(!infected.tree.path("a1.pdf.vvv").exists());
    assert!(!infected.tree.path("sub1/a2.docx.ccc").exists());
    assert!(infected.tree.path("sub3/done.pdf.vvv").exists());
    assert!(infected.tree.path("sub5/d1.pdf.vvv").exists());
}

/// Binary content that no candidate of `KEY_A`'s factors turns into a
/// recognisable file.
fn binary_blob() -> Vec<u8> {
    (0x80u8..0xC0).collect()
}

#[rstest]
#[case::parallel(true)]
#[case::sequential(false)]
fn test_unrecognised_sibling_does_not_block_key(#[case] parallel: bool) {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("a.dat.vvv"), &tesla_file(ID_A, KEY_A, &binary_blob()));
    write(&dir.path().join("b.pdf.vvv"), &tesla_file(ID_A, KEY_A, &pdf("sibling")));
    let store = key_store();

    let mut options = ScanOptions::new([dir.path()]);
    if !parallel {
        options = options.sequential();
    }
    let stats = scan(&options, &store).unwrap();

    assert_eq!(stats.decrypted_nfiles, 2);
    assert_eq!(stats.failed_nfiles, 0);
    assert_eq!(fs::read(dir.path().join("b.pdf")).unwrap(), pdf("sibling"));
    assert_eq!(fs::read(dir.path().join("a.dat")).unwrap(), binary_blob());
    assert_eq!(
        store.lookup(&KeyId::new(ID_A)).unwrap().recovered_key,
        Some(AesKey::from_hex(KEY_A).unwrap())
    );
}

#[rstest]
fn test_unrecognised_file_does_not_block_later_directories() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("a.dat.vvv"), &tesla_file(ID_A, KEY_A, &binary_blob()));
    write(&dir.path().join("sub/b.pdf.vvv"), &tesla_file(ID_A, KEY_A, &pdf("sibling")));

    let stats = scan(&ScanOptions::new([dir.path()]), &key_store()).unwrap();

    assert_eq!(stats.failed_nfiles, 1);
    assert_eq!(stats.decrypted_nfiles, 1);
    assert!(!dir.path().join("a.dat").exists());
    assert_eq!(fs::read(dir.path().join("sub/b.pdf")).unwrap(), pdf("sibling"));
}

#[rstest]
fn test_failed_rewrite_keeps_existing_output() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("report.pdf");
    write(&dir.path().join("report.pdf.vvv"), &tesla_file(ID_B, KEY_B, &pdf("fresh")));
    write(&output, &pdf("earlier copy"));
    // A directory in the way of the staging file makes the write fail.
    fs::create_dir(dir.path().join("report.pdf.tmp")).unwrap();
    let options = ScanOptions::new([dir.path()]).with_overwrite(true);

    let stats = scan(&options, &key_store()).unwrap();
    assert_eq!(stats.failed_nfiles, 1);
    assert_eq!(stats.decrypted_nfiles, 0);
    assert_eq!(fs::read(&output).unwrap(), pdf("earlier copy"));

    fs::remove_dir(dir.path().join("report.pdf.tmp")).unwrap();
    let stats = scan(&options, &key_store()).unwrap();
    assert_eq!(stats.decrypted_nfiles, 1);
    assert_eq!(stats.overwrite_nfiles, 1);
    assert_eq!(fs::read(&output).unwrap(), pdf("fresh"));
    assert!(!dir.path().join("report.pdf.tmp").exists());
}

#[rstest]
fn test_new_factors_unlock_pending_file(infected: Infected) {
    let store = key_store();
    scan(&infected.options(), &store).unwrap();
    assert!(!infected.tree.path("sub5/d1.pdf").exists());

    store.store(&KeyId::new(ID_D), factors_d(), None);
    let stats = scan(&infected.options(), &store).unwrap();

    assert_eq!(stats.decrypted_nfiles, 1);
    assert_eq!(fs::read(infected.tree.path("sub5/d1.pdf")).unwrap(), pdf("pending"));
    assert!(store.pending().is_empty());
}

#[rstest]
fn test_file_root_is_processed_directly(infected: Infected) {
    let options = ScanOptions::new([infected.tree.path("sub2/b2.txt.vvv")]);
    let stats = scan(&options, &key_store()).unwrap();

    assert_eq!(stats.ndirs(), 0);
    assert_eq!(stats.scanned_nfiles, 1);
    assert_eq!(stats.decrypted_nfiles, 1);
    assert_eq!(
        fs::read(infected.tree.path("sub2/b2.txt")).unwrap(),
        b"Meeting notes for Tuesday.\n"
    );
}

#[rstest]
fn test_progress_reports_every_file(infected: Infected) {
    let calls = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&calls);
    let options = infected.options().with_dry_run(true).with_progress(true);
    let store = key_store();

    let stats = Scanner::new(&options, &store)
        .unwrap()
        .with_progress(Box::new(move |progress| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert!(progress.files_seen >= 1);
        }))
        .run()
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), stats.scanned_nfiles);
}

#[rstest]
fn test_stopped_scan_visits_nothing(infected: Infected) {
    let options = infected.options();
    let store = key_store();
    let running = Arc::new(AtomicBool::new(false));

    let stats = Scanner::new(&options, &store)
        .unwrap()
        .with_running_flag(running)
        .run()
        .unwrap();

    assert_eq!(stats, ScanStatistics::default());
    assert!(!infected.tree.path("a1.pdf").exists());
}

#[test]
fn test_missing_root_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let options = ScanOptions::new([dir.path().join("nowhere")]);

    let err = scan(&options, &MemoryKeyStore::new()).unwrap_err();
    assert!(matches!(err, ScanError::Config(ConfigError::MissingRoot(_))));
}

#[test]
fn test_empty_root() {
    let dir = TempDir::new().unwrap();
    let stats = scan(&ScanOptions::new([dir.path()]), &MemoryKeyStore::new()).unwrap();

    assert_eq!(stats.visited_ndirs, 1);
    assert_eq!(stats.scanned_nfiles, 0);
}
