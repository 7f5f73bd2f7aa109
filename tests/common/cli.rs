//! Scratch repositories and `mt` invocations for CLI tests.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use assert_cmd::Command;
use git2::Repository;
use tempfile::TempDir;

pub const TEST_USER: &str = "Jane Doe <jane@example.com>";

/// A git repository in a temp dir, isolated from the user's config.
pub struct MtWorkspace {
    pub temp_dir: TempDir,
    pub root: PathBuf,
    editor: Option<String>,
}

impl MtWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let root = temp_dir.path().join("repo");
        fs::create_dir_all(&root).expect("repo dir");
        let repo = Repository::init(&root).expect("git init");
        let mut config = repo.config().expect("git config");
        config.set_str("user.name", "Jane Doe").expect("user.name");
        config.set_str("user.email", "jane@example.com").expect("user.email");
        Self {
            temp_dir,
            root,
            editor: None,
        }
    }

    /// Use `script` (a shell snippet run with the file as `$1`) as editor.
    #[cfg(unix)]
    pub fn with_editor_script(mut self, script: &str) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let path = self.temp_dir.path().join("editor.sh");
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).expect("write editor");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod editor");
        self.editor = Some(path.display().to_string());
        self
    }

    /// Use `command` verbatim as editor.
    pub fn with_editor(mut self, command: &str) -> Self {
        self.editor = Some(command.to_string());
        self
    }

    pub fn issues_dir(&self) -> PathBuf {
        self.root.join(".issues")
    }

    pub fn repo(&self) -> Repository {
        Repository::open(&self.root).expect("open repo")
    }

    /// `mt` command preconfigured for this workspace.
    pub fn mt(&self) -> Command {
        let mut cmd = Command::cargo_bin("mt").expect("mt binary");
        cmd.current_dir(&self.root)
            .env("MAILTRACK_USER", TEST_USER)
            .env("XDG_CONFIG_HOME", self.temp_dir.path().join("config-home"))
            .env("HOME", self.temp_dir.path())
            .env_remove("MAILTRACK_LOG")
            .env_remove("MAILTRACK_ISSUES_DIR")
            .env_remove("VISUAL")
            .env_remove("EDITOR");
        match &self.editor {
            Some(editor) => cmd.env("MAILTRACK_EDITOR", editor),
            None => cmd.env("MAILTRACK_EDITOR", "false"),
        };
        cmd
    }
}

pub struct RunOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Run `mt` with `args`; `label` names the step in failure messages.
pub fn run_mt<I, S>(workspace: &MtWorkspace, args: I, label: &str) -> RunOutput
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = workspace
        .mt()
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("{label}: failed to run mt: {e}"));
    RunOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

/// Create an issue with `-m SUBJECT` and return its id.
pub fn add_issue(workspace: &MtWorkspace, subject: &str) -> String {
    let out = run_mt(workspace, ["add", "-m", subject], "add issue");
    assert!(out.status.success(), "add failed: {}", out.stderr);
    out.stdout
        .trim()
        .strip_prefix("Added new issue ")
        .unwrap_or_else(|| panic!("unexpected add output: {}", out.stdout))
        .to_string()
}

/// Message files stored for `issue_id`.
pub fn message_files(workspace: &MtWorkspace, issue_id: &str) -> Vec<PathBuf> {
    let dir = workspace.issues_dir().join(issue_id);
    walkdir::WalkDir::new(&dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .parent()
                .and_then(Path::file_name)
                .is_some_and(|p| p == "new" || p == "cur")
        })
        .map(|e| e.path().to_path_buf())
        .collect()
}
