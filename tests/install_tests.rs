// End-to-end install pipeline tests against throwaway prefixes
//
// Every test installs a fake product (a shell script) into a temporary prefix, so
// these run without network access and never touch the real system.


use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tapkeg::{BundleSource, InstallRequest, TapkegError, VariantLabel};
use test_helpers::*;

fn linux_request(env: &TestEnvironment, formula: &str) -> InstallRequest {
    let mut request = InstallRequest::new(formula, BundleSource::Unpacked(env.bundle.clone()));
    request.os = Some("linux".to_string());
    request.arch = Some("amd64".to_string());
    request
}

#[tokio::test]
async fn test_install_linux_amd64_end_to_end() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", WORKING_BINARY);
    let pm = env.package_manager(vec![sample_formula(&["linux_amd64"])]);

    let result = pm.install(&linux_request(&env, "sample")).await.unwrap();

    assert_eq!(result.name, "sample");
    assert_eq!(result.version, "1.0.0");
    assert_eq!(result.variant, VariantLabel::Stable);
    assert!(result.tested);

    // Binary is in the executable directory and still executable
    let binary = env.prefix.join("bin/sample");
    assert!(binary.is_file());
    use std::os::unix::fs::PermissionsExt;
    assert_ne!(fs::metadata(&binary).unwrap().permissions().mode() & 0o111, 0);

    // One completion file per shell
    assert!(env.prefix.join("etc/bash_completion.d/sample.bash").is_file());
    assert!(env.prefix.join("share/fish/vendor_completions.d/sample.fish").is_file());
    assert!(env.prefix.join("share/zsh/site-functions/_sample").is_file());

    // Agent archive kept out of bin
    assert!(
        env.prefix
            .join("Cellar/sample/1.0.0/libexec/sample-agents.tar.gz")
            .is_file()
    );
    assert!(!env.prefix.join("bin/sample-agents.tar.gz").exists());

    // Receipt records the install
    let installed = pm.installed().unwrap();
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].binary_name(), "sample");
    assert_eq!(installed[0].receipt.installed_files.len(), 5);

    // Scratch workspace is gone
    let scratch = result.scratch_dir.expect("completions need a scratch dir");
    assert!(scratch.starts_with(&env.bundle));
    assert!(!scratch.exists());
    assert!(env.bundle_leftovers("sample").is_empty());

    assert!(result.caveats.contains("sample daemon start"));
    assert!(!result.caveats.contains("WARNING"));
}

#[tokio::test]
async fn test_no_artifact_for_apple_silicon() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", WORKING_BINARY);
    let pm = env.package_manager(vec![sample_formula(&["darwin_amd64"])]);

    let mut request = linux_request(&env, "sample");
    request.os = Some("macos".to_string());
    request.arch = Some("arm64".to_string());

    let err = pm.install(&request).await.unwrap_err();
    assert!(matches!(err, TapkegError::NoArtifactForPlatform { .. }));
    assert!(err.to_string().contains("darwin_arm64"));
    assert!(env.prefix_files().is_empty());
}

#[tokio::test]
async fn test_unsupported_platform_touches_nothing() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", WORKING_BINARY);
    let pm = env.package_manager(vec![sample_formula(&["linux_amd64"])]);

    let mut request = linux_request(&env, "sample");
    request.os = Some("plan9".to_string());

    let err = pm.install(&request).await.unwrap_err();
    assert!(matches!(err, TapkegError::UnsupportedPlatform { .. }));
    assert!(err.to_string().contains("plan9/amd64"));
    assert!(env.prefix_files().is_empty());
    assert!(env.bundle_leftovers("sample").is_empty());
}

#[tokio::test]
async fn test_linux_arm64_is_unsupported() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", WORKING_BINARY);
    let pm = env.package_manager(vec![sample_formula(&["linux_amd64"])]);

    let mut request = linux_request(&env, "sample");
    request.arch = Some("aarch64".to_string());

    let err = pm.install(&request).await.unwrap_err();
    assert!(matches!(err, TapkegError::UnsupportedPlatform { .. }));
    assert!(env.prefix_files().is_empty());
}

#[tokio::test]
async fn test_prerelease_not_defined() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", WORKING_BINARY);
    let pm = env.package_manager(vec![sample_formula(&["linux_amd64"])]);

    let mut request = linux_request(&env, "sample");
    request.variant = Some(VariantLabel::Prerelease);

    let err = pm.install(&request).await.unwrap_err();
    assert!(matches!(err, TapkegError::VariantNotFound { .. }));
    assert!(env.prefix_files().is_empty());
}

#[tokio::test]
async fn test_beta_conflicts_with_installed_stable() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", WORKING_BINARY);
    let pm = env.package_manager(vec![
        sample_formula(&["linux_amd64"]),
        sample_beta_formula(&["linux_amd64"]),
    ]);

    pm.install(&linux_request(&env, "sample")).await.unwrap();
    let before = env.prefix_files();
    let bash_before = fs::read(env.prefix.join("etc/bash_completion.d/sample.bash")).unwrap();

    let err = pm
        .install(&linux_request(&env, "sample-beta"))
        .await
        .unwrap_err();

    match &err {
        TapkegError::ConflictingInstallation { formula, conflicts } => {
            assert_eq!(formula, "sample-beta");
            assert_eq!(conflicts.len(), 1);
            assert!(conflicts[0].starts_with("sample 1.0.0"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Nothing was copied, nothing was generated
    assert_eq!(env.prefix_files(), before);
    assert_eq!(
        fs::read(env.prefix.join("etc/bash_completion.d/sample.bash")).unwrap(),
        bash_before
    );
    assert!(!env.prefix.join("Cellar/sample-beta").exists());
    assert!(env.bundle_leftovers("sample").is_empty());
}

#[tokio::test]
async fn test_failed_generation_leaves_no_completions() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", FAILING_GENERATE_BINARY);
    let pm = env.package_manager(vec![sample_formula(&["linux_amd64"])]);

    let err = pm.install(&linux_request(&env, "sample")).await.unwrap_err();

    match &err {
        TapkegError::CompletionGenerationFailed { formula, reason } => {
            assert_eq!(formula, "sample");
            assert!(reason.contains("generator crashed"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(!env.prefix.join("etc/bash_completion.d").exists());
    assert!(!env.prefix.join("share/fish/vendor_completions.d").exists());
    assert!(!env.prefix.join("share/zsh/site-functions").exists());
    assert!(!env.prefix.join("bin/sample").exists());
    assert!(pm.installed().unwrap().is_empty());

    // The partial script written before the crash went away with the scratch dir
    assert!(env.bundle_leftovers("sample").is_empty());
}

#[tokio::test]
async fn test_generation_timeout_is_a_failed_run() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", "#!/bin/sh\nsleep 5\n");
    let pm = env
        .package_manager(vec![sample_formula(&["linux_amd64"])])
        .with_timeout(Some(Duration::from_millis(200)));

    let err = pm.install(&linux_request(&env, "sample")).await.unwrap_err();
    assert!(matches!(err, TapkegError::CompletionGenerationFailed { ref reason, .. } if reason.contains("timed out")));
    assert!(env.prefix_files().is_empty());
    assert!(env.bundle_leftovers("sample").is_empty());
}

#[tokio::test]
async fn test_failed_smoke_test_keeps_installed_files() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", FAILING_VERSION_BINARY);
    let pm = env.package_manager(vec![sample_formula(&["linux_amd64"])]);

    let err = pm.install(&linux_request(&env, "sample")).await.unwrap_err();
    assert!(matches!(err, TapkegError::PostInstallVerificationFailed { .. }));

    assert!(env.prefix.join("bin/sample").is_file());
    assert!(env.prefix.join("share/zsh/site-functions/_sample").is_file());
    assert_eq!(pm.installed().unwrap().len(), 1);
    assert!(pm.test("sample").await.is_err());
}

#[tokio::test]
async fn test_missing_agent_archive_fails_before_any_step() {
    let env = TestEnvironment::new();
    write_executable(&env.bundle.join("sample"), WORKING_BINARY);
    let pm = env.package_manager(vec![sample_formula(&["linux_amd64"])]);

    let err = pm.install(&linux_request(&env, "sample")).await.unwrap_err();
    assert!(matches!(err, TapkegError::MissingBundleFile { .. }));
    assert!(env.prefix_files().is_empty());
}

#[tokio::test]
async fn test_install_from_verified_archive() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", WORKING_BINARY);
    let (archive, sha256) = env.pack_bundle();

    let mut formula = sample_formula(&["linux_amd64"]);
    for artifact in formula.variants[0].artifacts.values_mut() {
        artifact.sha256 = sha256.clone();
    }
    let pm = env.package_manager(vec![formula]);

    let mut request = linux_request(&env, "sample");
    request.source = BundleSource::Archive(archive);

    let result = pm.install(&request).await.unwrap();
    assert!(env.prefix.join("bin/sample").is_file());
    assert_eq!(result.installed_files.len(), 5);
    assert!(!result.scratch_dir.unwrap().exists());
}

#[tokio::test]
async fn test_install_from_relative_bundle_path() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", WORKING_BINARY);
    let pm = env.package_manager(vec![sample_formula(&["linux_amd64"])]);

    let relative = relative_to_cwd(&env.bundle);
    assert!(relative.is_relative());
    let mut request = linux_request(&env, "sample");
    request.source = BundleSource::Unpacked(relative);

    let result = pm.install(&request).await.unwrap();
    assert!(env.prefix.join("bin/sample").is_file());
    assert!(env.prefix.join("share/zsh/site-functions/_sample").is_file());
    assert!(!result.scratch_dir.unwrap().exists());
    assert!(env.bundle_leftovers("sample").is_empty());
}

#[tokio::test]
async fn test_archive_checksum_mismatch_aborts_before_install() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", WORKING_BINARY);
    let (archive, _) = env.pack_bundle();

    // Published checksum is "aaaa..." which the archive does not match
    let pm = env.package_manager(vec![sample_formula(&["linux_amd64"])]);
    let mut request = linux_request(&env, "sample");
    request.source = BundleSource::Archive(archive);

    let err = pm.install(&request).await.unwrap_err();
    assert!(matches!(err, TapkegError::ChecksumMismatch { .. }));
    assert!(env.prefix_files().is_empty());
}

#[tokio::test]
async fn test_agents_into_bin_override() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", WORKING_BINARY);
    let index = tapkeg::FormulaIndex::from_formulae([sample_formula(&["linux_amd64"])]).unwrap();
    let layout = env
        .layout
        .clone()
        .with_agent_destination(Some(tapkeg::AgentDestination::Bin));
    let pm = tapkeg::PackageManager::with_index(index, layout);

    pm.install(&linux_request(&env, "sample")).await.unwrap();
    assert!(env.prefix.join("bin/sample-agents.tar.gz").is_file());
    assert!(!env.prefix.join("Cellar/sample/1.0.0/libexec").exists());
}

#[tokio::test]
async fn test_legacy_single_shell_completion() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", WORKING_BINARY);

    let mut formula = sample_formula(&["linux_amd64"]);
    formula.completions.truncate(1);
    formula.completions[0].file = "sample".to_string();
    let pm = env.package_manager(vec![formula]);

    pm.install(&linux_request(&env, "sample")).await.unwrap();
    assert!(env.prefix.join("etc/bash_completion.d/sample").is_file());
    assert!(!env.prefix.join("share/zsh/site-functions").exists());
}

#[tokio::test]
async fn test_uninstall_removes_everything_it_installed() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", WORKING_BINARY);
    let pm = env.package_manager(vec![
        sample_formula(&["linux_amd64"]),
        sample_beta_formula(&["linux_amd64"]),
    ]);

    pm.install(&linux_request(&env, "sample")).await.unwrap();
    let result = pm.uninstall("sample").unwrap();
    assert_eq!(result.versions, vec!["1.0.0".to_string()]);
    assert_eq!(result.removed_files.len(), 4);
    assert!(!env.prefix.join("Cellar/sample").exists());

    let leftovers: Vec<PathBuf> = env.prefix_files();
    assert!(leftovers.is_empty(), "left behind: {leftovers:?}");

    // The slot is free for the conflicting variant now
    let result = pm.install(&linux_request(&env, "sample-beta")).await.unwrap();
    assert!(result.caveats.contains("WARNING"));

    assert!(matches!(
        pm.uninstall("sample"),
        Err(TapkegError::NotInstalled(_))
    ));
}

#[tokio::test]
async fn test_dry_run_plan_does_not_touch_disk() {
    let env = TestEnvironment::new();
    env.write_bundle("sample", WORKING_BINARY);
    let pm = env.package_manager(vec![sample_formula(&["linux_amd64"])]);

    let plan = pm.plan(&linux_request(&env, "sample")).unwrap();
    assert_eq!(plan.steps.len(), 7);
    assert!(plan.steps[1].to_string().contains("generate"));
    assert!(env.prefix_files().is_empty());
    assert!(env.bundle_leftovers("sample").is_empty());
}
