//! Integration tests for Kiln
//!
//! These exercise the CLI surface without a container runtime; engine
//! behavior against a runtime is covered by the in-process fakes in the
//! unit tests.

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn kiln() -> Command {
        cargo_bin_cmd!("kiln")
    }

    #[test]
    fn help_displays() {
        kiln()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build-artifact optimizer"));
    }

    #[test]
    fn version_displays() {
        kiln()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[test]
    fn config_show() {
        kiln()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("registry_volume"));
    }

    #[test]
    fn config_path() {
        kiln()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn custom_config_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.toml");
        std::fs::write(&path, "[image]\nname = \"shrinker\"\n").unwrap();

        kiln()
            .args(["--config", path.to_str().unwrap(), "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("shrinker"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.toml");
        std::fs::write(&path, "not [valid toml").unwrap();

        kiln()
            .args(["--config", path.to_str().unwrap(), "config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn codegen_missing_spec_dir_fails() {
        kiln()
            .args(["codegen", "/nonexistent/proto"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Path not found"));
    }

    #[test]
    fn build_rejects_unknown_mode() {
        kiln()
            .args(["build", "--mode", "teleport"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid value"));
    }

    #[test]
    fn build_missing_source_fails() {
        // Fails either on runtime detection or on the missing path; both are
        // failures, never a hang or a success.
        let _ = kiln()
            .args(["build", "/nonexistent/kiln-project"])
            .assert()
            .failure();
    }
}
