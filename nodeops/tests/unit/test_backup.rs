//! Backup and restore tests against a simulated node

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use common::{CountingConfirm, EngineCall, TestEnv, NODE_CONFIG};

use nodeops::backup::archive::{self, Manifest, CONFIG_DIR, MANIFEST_FILE, SYSTEM_INFO_FILE, WALLET_DIR};
use nodeops::backup::manager::BackupManager;
use nodeops::deploy::engine::ComposeAction;
use nodeops::errors::OpsError;

/// Extract `archive_path` and return the archive root
fn extract(archive_path: &Path, into: &Path) -> PathBuf {
    archive::unpack(archive_path, into).unwrap()
}

fn age_file(path: &Path, secs_ago: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
        .unwrap();
}

fn write_wallet(env: &TestEnv) {
    let wallet = env.path("data/wallets/default");
    fs::create_dir_all(&wallet).unwrap();
    fs::write(wallet.join("wallet.dat"), b"wallet-bytes").unwrap();
}

#[tokio::test]
async fn test_backup_restore_round_trip() {
    let env = TestEnv::new();
    let original = fs::read(env.path("bitcoin.conf")).unwrap();

    let report = BackupManager::new(&env.ctx).create_backup(false).await.unwrap();
    assert!(report.path.starts_with(env.path("backups")));
    let name = report.path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("node_backup_"));
    assert!(name.ends_with(".tar.gz"));

    fs::write(env.path("bitcoin.conf"), "rpcpassword=changed-later\n").unwrap();

    let restored = BackupManager::new(&env.ctx)
        .restore_backup(&report.path)
        .await
        .unwrap();
    assert_eq!(fs::read(env.path("bitcoin.conf")).unwrap(), original);
    assert_eq!(
        fs::read_to_string(restored.previous_config.unwrap()).unwrap(),
        "rpcpassword=changed-later\n"
    );

    // The service is brought back up after a restore
    assert_eq!(
        env.calls().last(),
        Some(&EngineCall::Compose(ComposeAction::Up))
    );
}

#[tokio::test]
async fn test_archive_contents() {
    let env = TestEnv::new();
    let report = BackupManager::new(&env.ctx).create_backup(false).await.unwrap();

    let scratch = tempfile::tempdir().unwrap();
    let root = extract(&report.path, scratch.path());
    assert!(root.join(MANIFEST_FILE).is_file());
    assert!(root.join(SYSTEM_INFO_FILE).is_file());
    assert_eq!(
        fs::read_to_string(root.join("config").join("bitcoin.conf")).unwrap(),
        NODE_CONFIG
    );

    let manifest = archive::validate(&root).unwrap();
    assert_eq!(manifest, report.manifest);
    assert!(!manifest.includes_chainstate);

    let info: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join(SYSTEM_INFO_FILE)).unwrap()).unwrap();
    assert_eq!(info["profile"], "standard");
}

#[tokio::test]
async fn test_wallet_disabled_never_pauses() {
    let env = TestEnv::new();
    fs::write(
        env.path("bitcoin.conf"),
        format!("{}disablewallet=1\n", NODE_CONFIG),
    )
    .unwrap();
    write_wallet(&env);
    env.set_running(true);
    env.state().wallets = vec!["default".to_string()];

    let report = BackupManager::new(&env.ctx).create_backup(false).await.unwrap();
    assert!(!report.manifest.includes_wallet);
    assert!(!report.paused_service);
    assert!(env.calls().is_empty());
    assert!(env.state().running);
    // The wallet probe is skipped entirely
    assert!(!env.state().rpc_calls.contains(&"listwallets".to_string()));

    let scratch = tempfile::tempdir().unwrap();
    let root = extract(&report.path, scratch.path());
    assert!(!root.join(WALLET_DIR).exists());
}

#[tokio::test]
async fn test_loaded_wallet_is_copied_inside_pause() {
    let env = TestEnv::new();
    write_wallet(&env);
    env.set_running(true);
    env.state().wallets = vec!["default".to_string()];

    let report = BackupManager::new(&env.ctx).create_backup(false).await.unwrap();
    assert!(report.manifest.includes_wallet);
    assert!(report.paused_service);
    assert_eq!(
        env.calls(),
        vec![
            EngineCall::Compose(ComposeAction::Stop),
            EngineCall::Compose(ComposeAction::Start),
        ]
    );
    assert!(env.state().running);

    let scratch = tempfile::tempdir().unwrap();
    let root = extract(&report.path, scratch.path());
    assert_eq!(
        fs::read(root.join(WALLET_DIR).join("default").join("wallet.dat")).unwrap(),
        b"wallet-bytes"
    );
}

#[tokio::test]
async fn test_no_loaded_wallet_skips_wallet() {
    let env = TestEnv::new();
    write_wallet(&env);
    env.set_running(true);

    let report = BackupManager::new(&env.ctx).create_backup(false).await.unwrap();
    assert!(!report.manifest.includes_wallet);
    assert!(env.calls().is_empty());
}

#[tokio::test]
async fn test_wallet_probe_failure_is_not_an_error() {
    let env = TestEnv::new();
    write_wallet(&env);
    env.set_running(true);
    env.state()
        .rpc_overrides
        .insert("listwallets".to_string(), Err("Method not found".to_string()));

    let report = BackupManager::new(&env.ctx).create_backup(false).await.unwrap();
    assert!(!report.manifest.includes_wallet);
    assert!(!report.paused_service);
}

#[tokio::test]
async fn test_pause_scope_resumes_after_failure() {
    let env = TestEnv::new();
    env.set_running(true);

    let result: Result<(), OpsError> = BackupManager::new(&env.ctx)
        .with_service_paused(async { Err(OpsError::Internal("copy failed".to_string())) })
        .await;

    assert!(matches!(result, Err(OpsError::Internal(_))));
    assert_eq!(
        env.calls(),
        vec![
            EngineCall::Compose(ComposeAction::Stop),
            EngineCall::Compose(ComposeAction::Start),
        ]
    );
    assert!(env.state().running);
}

#[tokio::test]
async fn test_pause_scope_resumes_after_interrupt() {
    let env = TestEnv::new();
    env.set_running(true);

    let result: Result<(), OpsError> = BackupManager::new(&env.ctx)
        .with_service_paused_until(
            std::future::pending::<Result<(), OpsError>>(),
            std::future::ready(()),
        )
        .await;

    assert!(matches!(result, Err(OpsError::Interrupted(_))));
    assert_eq!(
        env.calls(),
        vec![
            EngineCall::Compose(ComposeAction::Stop),
            EngineCall::Compose(ComposeAction::Start),
        ]
    );
    assert!(env.state().running);
}

#[tokio::test]
async fn test_chainstate_is_opt_in() {
    let env = TestEnv::new();
    let chainstate = env.path("data/chainstate");
    fs::create_dir_all(&chainstate).unwrap();
    fs::write(chainstate.join("000001.ldb"), b"utxo").unwrap();

    let default = BackupManager::new(&env.ctx).create_backup(false).await.unwrap();
    assert!(!default.manifest.includes_chainstate);

    let full = BackupManager::new(&env.ctx).create_backup(true).await.unwrap();
    assert!(full.manifest.includes_chainstate);
    assert_ne!(default.path, full.path);

    let scratch = tempfile::tempdir().unwrap();
    let root = extract(&full.path, scratch.path());
    assert!(root.join("chainstate").join("000001.ldb").is_file());
}

#[tokio::test]
async fn test_retention_keeps_most_recently_created() {
    let mut env = TestEnv::new();
    env.ctx.settings.backup.retention = 2;

    let backups = env.path("backups");
    fs::create_dir_all(&backups).unwrap();
    // Names sort in the opposite order of creation
    let oldest = backups.join("node_backup_20990101_000000.tar.gz");
    let middle = backups.join("node_backup_20500101_000000.tar.gz");
    let newest = backups.join("node_backup_20000101_000000.tar.gz");
    for (path, age) in [(&oldest, 3000), (&middle, 2000), (&newest, 1000)] {
        fs::write(path, b"old archive").unwrap();
        age_file(path, age);
    }
    let unrelated = backups.join("notes.txt");
    fs::write(&unrelated, b"keep me").unwrap();

    let report = BackupManager::new(&env.ctx).create_backup(false).await.unwrap();

    let mut removed = report.removed.clone();
    removed.sort();
    let mut expected = vec![oldest.clone(), middle.clone()];
    expected.sort();
    assert_eq!(removed, expected);

    assert!(report.path.exists());
    assert!(newest.exists());
    assert!(!oldest.exists());
    assert!(!middle.exists());
    assert!(unrelated.exists());

    let listed = BackupManager::new(&env.ctx).list_backups().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].path, report.path);
    assert_eq!(listed[1].path, newest);
}

#[tokio::test]
async fn test_list_without_backup_dir() {
    let env = TestEnv::new();
    assert!(BackupManager::new(&env.ctx)
        .list_backups()
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_restore_missing_archive() {
    let env = TestEnv::new();
    let err = BackupManager::new(&env.ctx)
        .restore_backup(&env.path("backups/nope.tar.gz"))
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::ArchiveNotFound(_)));
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_restore_declined_changes_nothing() {
    let env = TestEnv::new();
    let report = BackupManager::new(&env.ctx).create_backup(false).await.unwrap();
    fs::write(env.path("bitcoin.conf"), "rpcuser=someone-else\n").unwrap();

    let ctx = env.ctx.with_confirm(CountingConfirm::new(false));
    let err = BackupManager::new(&ctx)
        .restore_backup(&report.path)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Aborted(_)));
    assert_eq!(
        fs::read_to_string(env.path("bitcoin.conf")).unwrap(),
        "rpcuser=someone-else\n"
    );
    assert!(env.calls().is_empty());
}

#[tokio::test]
async fn test_restore_invalid_archive_leaves_live_state_untouched() {
    let env = TestEnv::new();
    env.set_running(true);
    let bogus = env.path("backups/node_backup_20240101_000000.tar.gz");
    fs::create_dir_all(bogus.parent().unwrap()).unwrap();
    fs::write(&bogus, b"definitely not a tarball").unwrap();

    let err = BackupManager::new(&env.ctx)
        .restore_backup(&bogus)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::InvalidArchive(_)));
    assert_eq!(err.exit_code(), 5);
    assert_eq!(fs::read_to_string(env.path("bitcoin.conf")).unwrap(), NODE_CONFIG);
    // The service was never stopped
    assert!(env.calls().is_empty());
    assert!(env.state().running);
}

#[tokio::test]
async fn test_restore_running_service_with_wallet() {
    let env = TestEnv::new();
    write_wallet(&env);
    env.set_running(true);
    env.state().wallets = vec!["default".to_string()];
    let report = BackupManager::new(&env.ctx).create_backup(false).await.unwrap();

    fs::remove_dir_all(env.path("data/wallets")).unwrap();
    env.clear_calls();

    let restored = BackupManager::new(&env.ctx)
        .restore_backup(&report.path)
        .await
        .unwrap();
    assert!(restored.restored_wallet);
    assert_eq!(
        fs::read(env.path("data/wallets/default/wallet.dat")).unwrap(),
        b"wallet-bytes"
    );
    assert_eq!(
        env.calls(),
        vec![
            EngineCall::Compose(ComposeAction::Down {
                remove_images: false
            }),
            EngineCall::Compose(ComposeAction::Up),
        ]
    );
}

#[tokio::test]
async fn test_backup_requires_config() {
    let env = TestEnv::new();
    fs::remove_file(env.path("bitcoin.conf")).unwrap();
    let err = BackupManager::new(&env.ctx)
        .create_backup(false)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::MissingFile(_)));
    assert!(!env.path("backups").exists());
}

#[tokio::test]
async fn test_restore_refuses_config_outside_archive() {
    let env = TestEnv::new();
    let outside_dir = tempfile::tempdir().unwrap();
    let outside = outside_dir.path().join("planted.conf");
    let planted = b"rpcpassword=from-outside\n";
    fs::write(&outside, planted).unwrap();

    // Well-formed archive whose manifest names a file beyond its own root
    let staging = tempfile::tempdir().unwrap();
    fs::create_dir_all(staging.path().join(CONFIG_DIR)).unwrap();
    fs::write(staging.path().join(CONFIG_DIR).join("bitcoin.conf"), NODE_CONFIG).unwrap();
    let manifest = Manifest::new(
        "node_backup_20240101_000000",
        &outside.display().to_string(),
        planted,
    );
    fs::write(
        staging.path().join(MANIFEST_FILE),
        serde_json::to_vec(&manifest).unwrap(),
    )
    .unwrap();
    let crafted = env.path("backups/node_backup_20240101_000000.tar.gz");
    archive::pack(staging.path(), "node_backup_20240101_000000", &crafted).unwrap();

    let err = BackupManager::new(&env.ctx)
        .restore_backup(&crafted)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::InvalidArchive(_)));
    assert_eq!(fs::read_to_string(env.path("bitcoin.conf")).unwrap(), NODE_CONFIG);
    assert!(env.calls().is_empty());
}
