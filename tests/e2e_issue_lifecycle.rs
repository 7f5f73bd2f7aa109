mod common;
use common::cli::{MtWorkspace, add_issue, message_files, run_mt};
use predicates::prelude::*;
use serde_json::Value;

#[test]
fn test_resolved_issue_hidden_by_default() {
    let workspace = MtWorkspace::new();
    let id = add_issue(&workspace, "login fails");

    let list = run_mt(&workspace, ["list"], "list");
    assert!(list.status.success(), "list failed: {}", list.stderr);
    assert!(list.stdout.contains(&format!("{id} (  0) [new]: login fails")));

    let update = run_mt(&workspace, ["add", &id, "-p", "state=fixed", "-n"], "fix");
    assert!(update.status.success(), "update failed: {}", update.stderr);
    assert!(update.stdout.contains("State: fixed"));
    assert!(update.stdout.contains("changed properties (state=fixed)"));

    let list = run_mt(&workspace, ["list"], "list default");
    assert!(!list.stdout.contains("login fails"));

    let list = run_mt(&workspace, ["list", "--all"], "list all");
    assert!(list.stdout.contains(&format!("{id} (  1) [fixed]: login fails")));

    let list = run_mt(&workspace, ["list", "-p", "state=fixed"], "list fixed");
    assert!(list.stdout.contains("login fails"));
}

#[test]
fn test_reply_to_comment_index() {
    let workspace = MtWorkspace::new();
    let id = add_issue(&workspace, "crash on save");
    for subject in ["first reply", "second reply"] {
        let out = run_mt(&workspace, ["add", &id, "-m", subject], subject);
        assert!(out.status.success(), "{subject}: {}", out.stderr);
    }

    let out = run_mt(&workspace, ["add", &id, "-i", "2", "-m", "answer to second"], "reply 2");
    assert!(out.status.success(), "reply failed: {}", out.stderr);
    assert!(out.stdout.contains("Comments:"));
    assert!(out.stdout.contains("  2: [jane] second reply\n    3: [jane] answer to second"));

    let show = run_mt(&workspace, ["show", &id, "-a", "--json"], "show json");
    assert!(show.status.success(), "show failed: {}", show.stderr);
    let details: Value = serde_json::from_str(&show.stdout).expect("show json");
    let messages = details["messages"].as_array().expect("messages");
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[3]["in_reply_to"], messages[2]["message_id"]);
    assert_eq!(messages[2]["in_reply_to"], messages[0]["message_id"]);
    assert_eq!(message_files(&workspace, &id).len(), 4);
}

#[test]
fn test_out_of_range_index_replies_to_root() {
    let workspace = MtWorkspace::new();
    let id = add_issue(&workspace, "slow startup");

    workspace
        .mt()
        .args(["add", &id, "-i", "7", "-m", "profiling"])
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "No such comment number in mailbox, commenting on the issue itself",
        ))
        .stdout(predicate::str::contains("  1: [jane] profiling"));

    workspace
        .mt()
        .args(["show", &id, "-i", "9"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Comment out of range, showing the issue itself"))
        .stdout(predicate::str::contains("Subject: slow startup"));
}

#[test]
fn test_find_substring_and_exact() {
    let workspace = MtWorkspace::new();
    let id = add_issue(&workspace, "login fails");
    add_issue(&workspace, "logout hangs");

    let found = run_mt(&workspace, ["find", "login"], "find");
    assert!(found.stdout.contains(&format!("{id} (  0) [new]: login fails")));
    assert!(!found.stdout.contains("logout"));

    let exact = run_mt(&workspace, ["find", "login", "-e"], "find exact");
    assert!(exact.status.success());
    assert!(exact.stdout.trim().is_empty());

    let exact = run_mt(&workspace, ["find", "LOGIN FAILS", "-e"], "find exact case");
    assert!(exact.stdout.contains("login fails"));

    let cased = run_mt(&workspace, ["find", "LOGIN", "-c"], "find case sensitive");
    assert!(cased.stdout.trim().is_empty());

    let regex = run_mt(&workspace, ["find", "^log(in|out)", "-r"], "find regex");
    assert_eq!(regex.stdout.lines().count(), 2);
}

#[test]
fn test_unknown_and_ambiguous_ids_warn() {
    let workspace = MtWorkspace::new();
    std::fs::create_dir_all(workspace.issues_dir().join("aa11")).unwrap();
    std::fs::create_dir_all(workspace.issues_dir().join("aa22")).unwrap();

    workspace
        .mt()
        .args(["show", "zz"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No such issue: zz"));

    workspace
        .mt()
        .args(["add", "aa", "-m", "hello"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Multiple choices:"))
        .stderr(predicate::str::contains("aa11"))
        .stderr(predicate::str::contains("aa22"));
    assert!(message_files(&workspace, "aa11").is_empty());
    assert!(message_files(&workspace, "aa22").is_empty());
}

#[test]
fn test_protected_property_rejected() {
    let workspace = MtWorkspace::new();
    let id = add_issue(&workspace, "x");
    workspace
        .mt()
        .args(["add", &id, "-p", "Message-Id=<evil>", "-n"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Message-Id cannot be changed"));
    assert_eq!(message_files(&workspace, &id).len(), 1);
}

#[test]
fn test_missing_issues_folder_lists_nothing() {
    let workspace = MtWorkspace::new();
    workspace
        .mt()
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
