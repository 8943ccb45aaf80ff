//! End-to-end install runs against a local HTTP server.

mod common;

use std::path::PathBuf;
use std::time::Duration;

use common::{
    Fixture, MAIN_CLASS, Route, TestServer, installer, manifest, manifest_with_versions,
    serve_fixtures, serve_install, three_jars,
};
use silk_installer_lib::core::profile::InstallProfile;
use silk_installer_lib::{
    InstallEvent, InstallationTarget, InstallerError, LaunchDescriptor, LoaderRequest, Phase,
    ProgressBus, uninstall,
};

fn target(root: &std::path::Path) -> InstallationTarget {
    InstallationTarget::new(root, "silk")
}

fn request() -> LoaderRequest {
    LoaderRequest::latest("1.2")
}

// ─── Resolution ───

#[tokio::test]
async fn resolves_loader_for_runtime_inside_range() {
    let server = serve_install(&three_jars()).await;
    let installer = installer(&server, ProgressBus::default());

    let plan = installer.resolver().resolve(&request()).await.unwrap();
    assert_eq!(plan.loader_version, "2.3.0");
    assert_eq!(plan.runtime_version, "1.2");
    assert_eq!(plan.artifacts.len(), 3);
}

#[tokio::test]
async fn runtime_outside_every_range_has_no_compatible_version() {
    let server = serve_install(&three_jars()).await;
    let installer = installer(&server, ProgressBus::default());
    let root = tempfile::tempdir().unwrap();

    let err = installer
        .install(&LoaderRequest::latest("2.0"), &target(root.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, InstallerError::NoCompatibleVersion { .. }), "{err}");
    assert!(!target(root.path()).launch_descriptor_path().exists());
}

#[tokio::test]
async fn missing_manifest_is_unavailable() {
    let server = TestServer::start().await;
    let installer = installer(&server, ProgressBus::default());

    let err = installer.resolver().resolve(&request()).await.unwrap_err();
    assert!(matches!(err, InstallerError::ManifestUnavailable { .. }), "{err}");
    assert_eq!(server.hits("/manifest.json"), 1, "404 is not retried");
}

// ─── Install ───

#[tokio::test]
async fn fresh_install_writes_files_profile_and_descriptor() {
    let fixtures = three_jars();
    let server = serve_install(&fixtures).await;
    let bus = ProgressBus::default();
    let mut events = bus.subscribe();
    let installer = installer(&server, bus);
    let root = tempfile::tempdir().unwrap();
    let target = target(root.path());

    let outcome = installer.install(&request(), &target).await.unwrap();
    assert_eq!(outcome.loader_version, "2.3.0");
    assert_eq!(outcome.downloaded, 3);
    assert_eq!(outcome.reused, 0);
    assert!(outcome.launch_option.starts_with("java -Xmx1G -cp \""));
    assert!(outcome.launch_option.ends_with(&format!("{MAIN_CLASS} %command%")));

    for fixture in &fixtures {
        assert_eq!(std::fs::read(root.path().join(fixture.path)).unwrap(), fixture.body);
    }

    let descriptor =
        LaunchDescriptor::load_validated(&target.launch_descriptor_path(), root.path()).unwrap();
    assert_eq!(descriptor.entry_point, MAIN_CLASS);
    assert_eq!(descriptor.classpath.len(), 3);
    assert_eq!(descriptor.jvm_args, vec!["-Xmx1G".to_string()]);

    let profile = InstallProfile::load(&target.profile_path()).await.unwrap().unwrap();
    assert_eq!(profile.loader_version, "2.3.0");
    assert_eq!(profile.paths.len(), 3);

    assert!(!target.staging_root().exists(), "staging is cleaned up");

    let mut phases = Vec::new();
    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            InstallEvent::PhaseStarted { phase } => phases.push(phase),
            InstallEvent::Completed { loader_version } => {
                assert_eq!(loader_version, "2.3.0");
                completed = true;
            }
            _ => {}
        }
    }
    assert_eq!(phases, vec![Phase::Resolve, Phase::Download, Phase::Write, Phase::Bootstrap]);
    assert!(completed);
}

#[tokio::test]
async fn second_run_fetches_no_artifacts() {
    let fixtures = three_jars();
    let server = serve_install(&fixtures).await;
    let root = tempfile::tempdir().unwrap();
    let target = target(root.path());

    installer(&server, ProgressBus::default())
        .install(&request(), &target)
        .await
        .unwrap();
    let first = LaunchDescriptor::load(&target.launch_descriptor_path()).unwrap();

    let outcome = installer(&server, ProgressBus::default())
        .install(&request(), &target)
        .await
        .unwrap();
    assert_eq!(outcome.downloaded, 0);
    assert_eq!(outcome.reused, 3);
    for fixture in &fixtures {
        assert_eq!(server.hits(fixture.primary()), 1, "{}", fixture.id);
    }

    let second = LaunchDescriptor::load(&target.launch_descriptor_path()).unwrap();
    assert_eq!(first.classpath, second.classpath);
    assert_eq!(first.entry_point, second.entry_point);
}

#[tokio::test]
async fn mismatching_mirror_falls_back_to_the_next() {
    let fixtures = vec![
        Fixture::new("silk-loader", "silk-loader.jar", b"hello")
            .with_mirrors(&["/bad/silk-loader.jar", "/good/silk-loader.jar"]),
    ];
    let server = serve_install(&fixtures).await;
    server.serve("/bad/silk-loader.jar", Route::ok(&b"hellx"[..]));
    let root = tempfile::tempdir().unwrap();

    let outcome = installer(&server, ProgressBus::default())
        .install(&request(), &target(root.path()))
        .await
        .unwrap();
    assert_eq!(outcome.downloaded, 1);
    assert_eq!(server.hits("/bad/silk-loader.jar"), 1, "mismatch is not retried on the same mirror");
    assert_eq!(server.hits("/good/silk-loader.jar"), 1);
    assert_eq!(std::fs::read(root.path().join("silk-loader.jar")).unwrap(), b"hello");
}

#[tokio::test]
async fn every_mirror_mismatching_is_an_integrity_violation() {
    let fixtures = vec![
        Fixture::new("silk-loader", "silk-loader.jar", b"hello")
            .with_mirrors(&["/m1/silk-loader.jar", "/m2/silk-loader.jar"]),
    ];
    let server = serve_install(&fixtures).await;
    server.serve("/m1/silk-loader.jar", Route::ok(&b"hellx"[..]));
    server.serve("/m2/silk-loader.jar", Route::ok(&b"helly"[..]));
    let root = tempfile::tempdir().unwrap();
    let target = target(root.path());

    let err = installer(&server, ProgressBus::default())
        .install(&request(), &target)
        .await
        .unwrap_err();
    assert!(matches!(err, InstallerError::IntegrityViolation { .. }), "{err}");
    assert!(!err.is_retryable());
    assert!(!root.path().join("silk-loader.jar").exists());
    assert!(!target.launch_descriptor_path().exists());
    assert!(!target.staging_root().exists());
}

#[tokio::test]
async fn transient_errors_are_retried_then_reported() {
    let fixtures = vec![Fixture::new("silk-loader", "silk-loader.jar", b"hello")];
    let server = serve_install(&fixtures).await;
    server.serve(
        fixtures[0].primary(),
        Route {
            status: Some(axum::http::StatusCode::SERVICE_UNAVAILABLE),
            ..Route::default()
        },
    );
    let root = tempfile::tempdir().unwrap();

    let err = installer(&server, ProgressBus::default())
        .install(&request(), &target(root.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, InstallerError::DownloadFailed { .. }), "{err}");
    assert!(err.is_retryable());
    assert_eq!(server.hits(fixtures[0].primary()), 2);
}

#[tokio::test]
async fn failed_commit_reports_what_landed_and_a_rerun_finishes_it() {
    let fixtures = three_jars();
    let server = serve_install(&fixtures).await;
    let root = tempfile::tempdir().unwrap();
    let target = target(root.path());

    // A directory where the third jar belongs makes its commit fail.
    let blocker = root.path().join("lib/c.jar");
    std::fs::create_dir_all(&blocker).unwrap();
    std::fs::write(blocker.join("keep.txt"), b"user data").unwrap();

    let err = installer(&server, ProgressBus::default())
        .install(&request(), &target)
        .await
        .unwrap_err();
    match err {
        InstallerError::InstallationIncomplete {
            committed, failed, ..
        } => {
            assert_eq!(
                committed,
                vec![PathBuf::from("silk-loader.jar"), PathBuf::from("lib/a.jar")]
            );
            assert_eq!(failed, vec![PathBuf::from("lib/c.jar")]);
        }
        other => panic!("expected InstallationIncomplete, got {other}"),
    }
    assert!(!target.launch_descriptor_path().exists());
    assert!(root.path().join("silk-loader.jar").is_file());
    assert!(!target.staging_root().exists());

    std::fs::remove_dir_all(&blocker).unwrap();
    let outcome = installer(&server, ProgressBus::default())
        .install(&request(), &target)
        .await
        .unwrap();
    assert_eq!(outcome.downloaded, 1);
    assert_eq!(outcome.reused, 2);
    assert_eq!(server.hits("/a/silk-loader.jar"), 1);
    assert_eq!(server.hits("/a/lib/a.jar"), 1);
    assert_eq!(server.hits("/a/lib/c.jar"), 2);
    assert!(LaunchDescriptor::load_validated(&target.launch_descriptor_path(), root.path()).is_ok());
}

#[tokio::test]
async fn cancellation_leaves_the_target_untouched() {
    let fixtures = three_jars();
    let server = TestServer::start().await;
    serve_fixtures(&server, &fixtures);
    server.serve("/manifest.json", Route::ok(manifest(&server, &fixtures)));
    server.serve(
        "/a/lib/c.jar",
        Route {
            body: fixtures[2].body.clone(),
            delay: Some(Duration::from_secs(2)),
            ..Route::default()
        },
    );

    let bus = ProgressBus::default();
    let installer = installer(&server, bus.clone());
    let root = tempfile::tempdir().unwrap();
    let target = target(root.path());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        bus.cancel();
    });
    let err = installer.install(&request(), &target).await.unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, InstallerError::Cancelled), "{err}");
    assert!(!target.launch_descriptor_path().exists());
    assert!(!root.path().join("silk-loader.jar").exists());
    assert!(!root.path().join("lib").exists());
    assert!(!target.silk_dir().exists());
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

// ─── Descriptor repair ───

#[tokio::test]
async fn ensure_installed_repairs_a_tampered_descriptor() {
    let fixtures = three_jars();
    let server = serve_install(&fixtures).await;
    let root = tempfile::tempdir().unwrap();
    let target = target(root.path());

    installer(&server, ProgressBus::default())
        .install(&request(), &target)
        .await
        .unwrap();

    let path = target.launch_descriptor_path();
    let mut raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    raw["entryPoint"] = serde_json::Value::from("evil.Main");
    std::fs::write(&path, raw.to_string()).unwrap();

    let descriptor = installer(&server, ProgressBus::default())
        .ensure_installed(&request(), &target)
        .await
        .unwrap();
    assert_eq!(descriptor.entry_point, MAIN_CLASS);
    for fixture in &fixtures {
        assert_eq!(server.hits(fixture.primary()), 1, "files were already in place");
    }
}

#[tokio::test]
async fn ensure_installed_refetches_a_deleted_classpath_entry() {
    let fixtures = three_jars();
    let server = serve_install(&fixtures).await;
    let root = tempfile::tempdir().unwrap();
    let target = target(root.path());

    installer(&server, ProgressBus::default())
        .install(&request(), &target)
        .await
        .unwrap();
    std::fs::remove_file(root.path().join("lib/a.jar")).unwrap();

    installer(&server, ProgressBus::default())
        .ensure_installed(&request(), &target)
        .await
        .unwrap();
    assert_eq!(server.hits("/a/lib/a.jar"), 2);
    assert_eq!(server.hits("/a/silk-loader.jar"), 1);
    assert_eq!(std::fs::read(root.path().join("lib/a.jar")).unwrap(), b"library a");
}

#[tokio::test]
async fn ensure_installed_keeps_a_valid_install() {
    let server = serve_install(&three_jars()).await;
    let root = tempfile::tempdir().unwrap();
    let target = target(root.path());

    installer(&server, ProgressBus::default())
        .install(&request(), &target)
        .await
        .unwrap();
    installer(&server, ProgressBus::default())
        .ensure_installed(&request(), &target)
        .await
        .unwrap();
    assert_eq!(server.hits("/manifest.json"), 1, "no second resolve");
}

#[tokio::test]
async fn ensure_installed_honours_an_exact_loader_request() {
    let fixtures = three_jars();
    let server = serve_install(&fixtures).await;
    let root = tempfile::tempdir().unwrap();
    let target = target(root.path());

    installer(&server, ProgressBus::default())
        .install(&request(), &target)
        .await
        .unwrap();

    // Same version asked for explicitly: nothing to do.
    let current = installer(&server, ProgressBus::default())
        .ensure_installed(&LoaderRequest::exact("1.2", "2.3.0"), &target)
        .await
        .unwrap();
    assert_eq!(current.loader_version, "2.3.0");
    assert_eq!(server.hits("/manifest.json"), 1);

    // A newer version the manifest does not list yet cannot be satisfied.
    let err = installer(&server, ProgressBus::default())
        .ensure_installed(&LoaderRequest::exact("1.2", "2.4.0"), &target)
        .await
        .unwrap_err();
    assert!(matches!(err, InstallerError::NoCompatibleVersion { .. }), "{err}");

    server.serve(
        "/manifest.json",
        Route::ok(manifest_with_versions(&server, &fixtures, &["2.3.0", "2.4.0"])),
    );
    let upgraded = installer(&server, ProgressBus::default())
        .ensure_installed(&LoaderRequest::exact("1.2", "2.4.0"), &target)
        .await
        .unwrap();
    assert_eq!(upgraded.loader_version, "2.4.0");
    assert_eq!(
        LaunchDescriptor::load(&target.launch_descriptor_path())
            .unwrap()
            .loader_version,
        "2.4.0"
    );
}

// ─── Uninstall ───

#[tokio::test]
async fn uninstall_removes_only_installed_files() {
    let server = serve_install(&three_jars()).await;
    let root = tempfile::tempdir().unwrap();
    let target = target(root.path());
    std::fs::write(root.path().join("EquilinoxWindows.exe"), b"game").unwrap();

    installer(&server, ProgressBus::default())
        .install(&request(), &target)
        .await
        .unwrap();
    let report = uninstall(&target).await.unwrap();

    assert_eq!(report.removed.len(), 3);
    assert!(report.missing.is_empty());
    assert!(!root.path().join("lib").exists());
    assert!(!target.silk_dir().exists());
    assert!(root.path().join("EquilinoxWindows.exe").exists());
}
