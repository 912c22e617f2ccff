#[cfg(test)]
mod tests {
    use std::path::Path;

    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn replistore(base: &Path) -> Command {
        let mut cmd = Command::cargo_bin("replistore").expect("binary should build");
        cmd.env("RUST_LOG", "off").arg("--base-dir").arg(base);
        cmd
    }

    /// Runs an upload and returns the new file id from its output.
    fn upload(base: &Path, file: &Path) -> String {
        let output = replistore(base)
            .args(["upload", "--file"])
            .arg(file)
            .output()
            .expect("upload should run");
        assert!(output.status.success());

        let stdout = String::from_utf8(output.stdout).unwrap();
        stdout
            .trim()
            .rsplit(' ')
            .next()
            .expect("upload prints the file id")
            .to_string()
    }

    #[test]
    fn test_upload_list_download_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("store");
        let source = temp_dir.path().join("report.txt");
        std::fs::write(&source, b"quarterly numbers, replicated twice").unwrap();

        let id = upload(&base, &source);

        replistore(&base)
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains(&id).and(predicate::str::contains("report.txt")));

        let target = temp_dir.path().join("restored.txt");
        replistore(&base)
            .args(["download", "--file-id", id.as_str(), "--output"])
            .arg(&target)
            .assert()
            .success()
            .stdout(predicate::str::contains("35 bytes written"));
        assert_eq!(
            std::fs::read(&target).unwrap(),
            b"quarterly numbers, replicated twice"
        );
    }

    #[test]
    fn test_duplicate_upload_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("store");
        let source = temp_dir.path().join("a.bin");
        std::fs::write(&source, b"same content").unwrap();
        let copy = temp_dir.path().join("b.bin");
        std::fs::write(&copy, b"same content").unwrap();

        let id = upload(&base, &source);

        replistore(&base)
            .args(["upload", "--file"])
            .arg(&copy)
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("duplicate of {}", id)));
    }

    #[test]
    fn test_audit_reports_health() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("store");
        let source = temp_dir.path().join("audit.txt");
        std::fs::write(&source, b"check every copy").unwrap();

        let id = upload(&base, &source);

        replistore(&base)
            .args(["audit", "--file-id", id.as_str()])
            .assert()
            .success()
            .stdout(predicate::str::contains("audit.txt: healthy"));

        replistore(&base)
            .arg("nodes")
            .assert()
            .success()
            .stdout(predicate::str::contains("node1").and(predicate::str::contains("node2")));
    }

    #[test]
    fn test_delete_then_download_fails() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("store");
        let source = temp_dir.path().join("gone.txt");
        std::fs::write(&source, b"short lived").unwrap();

        let id = upload(&base, &source);

        replistore(&base)
            .args(["delete", "--file-id", id.as_str()])
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("deleted {}", id)));

        replistore(&base)
            .args(["download", "--file-id", id.as_str(), "--output"])
            .arg(temp_dir.path().join("never.txt"))
            .assert()
            .failure();
    }

    #[test]
    fn test_download_keeps_stored_name_inside_working_dir() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("store");
        let workdir = temp_dir.path().join("work");
        std::fs::create_dir_all(&workdir).unwrap();
        let source = temp_dir.path().join("payload.txt");
        std::fs::write(&source, b"stay put").unwrap();

        let output = replistore(&base)
            .args(["upload", "--name", "../escape.txt", "--file"])
            .arg(&source)
            .output()
            .unwrap();
        assert!(output.status.success());
        let stdout = String::from_utf8(output.stdout).unwrap();
        let id = stdout.trim().rsplit(' ').next().unwrap().to_string();

        replistore(&base)
            .current_dir(&workdir)
            .args(["download", "--file-id", id.as_str()])
            .assert()
            .success();

        assert_eq!(std::fs::read(workdir.join("escape.txt")).unwrap(), b"stay put");
        assert!(!temp_dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_rejects_malformed_file_id() {
        let temp_dir = TempDir::new().unwrap();

        replistore(temp_dir.path())
            .args(["download", "--file-id", "not-a-uuid"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not-a-uuid"));
    }
}
