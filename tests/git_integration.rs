//! Integration tests for the git2 backend.
//!
//! These tests use real repositories created via tempfile and cross-check
//! results with the git CLI.

mod support;

use std::path::PathBuf;

use repoflow::core::types::{BranchName, Oid};
use repoflow::git::{
    ApplyOutcome, FileState, Git, GitBackend, GitError, MergeOutcome, PickOutcome,
};
use support::TestRepo;

fn open(repo: &TestRepo) -> Git {
    Git::open(repo.path()).expect("failed to open test repo")
}

fn oid(s: &str) -> Oid {
    Oid::new(s).unwrap()
}

mod open {
    use super::*;

    #[test]
    fn discovers_from_subdirectory() {
        let repo = TestRepo::new();
        repo.write("src/lib.rs", "");
        let git = Git::open(&repo.path().join("src")).unwrap();
        assert_eq!(
            git.paths().work_dir().canonicalize().unwrap(),
            repo.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn exact_does_not_search_upwards() {
        let repo = TestRepo::new();
        std::fs::create_dir_all(repo.path().join("src")).unwrap();
        let result = Git::open_exact(&repo.path().join("src"));
        assert!(matches!(result, Err(GitError::NotARepo { .. })));
    }

    #[test]
    fn bare_repository_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        support::run_git(dir.path(), &["init", "--bare"]);
        assert!(matches!(Git::open(dir.path()), Err(GitError::BareRepo)));
    }
}

mod queries {
    use super::*;

    #[test]
    fn head_and_branch_match_cli() {
        let repo = TestRepo::new();
        let git = open(&repo);
        assert_eq!(git.head_commit().unwrap().unwrap().as_str(), repo.rev_parse("HEAD"));
        assert_eq!(git.current_branch().unwrap().unwrap().as_str(), "main");
    }

    #[test]
    fn detached_head_has_no_branch() {
        let repo = TestRepo::new();
        let head = repo.rev_parse("HEAD");
        repo.git(&["checkout", "--detach", &head]);
        assert_eq!(open(&repo).current_branch().unwrap(), None);
    }

    #[test]
    fn identity_comes_from_config() {
        let repo = TestRepo::new();
        let id = open(&repo).identity().unwrap();
        assert_eq!(id.name, "Test User");
        assert_eq!(id.email, "test@example.com");
    }

    #[test]
    fn commit_info_reads_summary_and_author() {
        let repo = TestRepo::new();
        let head = repo.commit_file("a.txt", "a\n", "Add a\n\nLonger body");
        let info = open(&repo).commit_info(&oid(&head)).unwrap();
        assert_eq!(info.summary, "Add a");
        assert_eq!(info.author_name, "Test User");
    }

    #[test]
    fn statuses_cover_modified_and_untracked() {
        let repo = TestRepo::new();
        repo.write("README.md", "changed\n");
        repo.write("new.txt", "new\n");
        let git = open(&repo);

        let all = git.file_statuses(&[]).unwrap();
        let state = |p: &str| {
            all.iter()
                .find(|s| s.path == PathBuf::from(p))
                .map(|s| s.state)
        };
        assert_eq!(state("README.md"), Some(FileState::Modified));
        assert_eq!(state("new.txt"), Some(FileState::Untracked));

        // Untracked files are not in the way of an operation.
        assert_eq!(git.dirty_paths().unwrap(), vec![PathBuf::from("README.md")]);
    }

    #[test]
    fn requested_paths_include_unmodified() {
        let repo = TestRepo::new();
        let git = open(&repo);
        let statuses = git
            .file_statuses(&[repo.path().join("README.md")])
            .unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].state, FileState::Unmodified);
    }

    #[test]
    fn commits_between_is_oldest_first() {
        let repo = TestRepo::new();
        let base = repo.rev_parse("HEAD");
        let c1 = repo.commit_file("a.txt", "a\n", "one");
        let c2 = repo.commit_file("b.txt", "b\n", "two");
        let git = open(&repo);

        let commits = git.commits_between(Some(&oid(&base)), &oid(&c2)).unwrap();
        assert_eq!(commits, vec![oid(&c1), oid(&c2)]);
        assert_eq!(
            git.merge_base(&oid(&c2), &oid(&base)).unwrap(),
            Some(oid(&base))
        );
    }

    #[test]
    fn fingerprint_tracks_index_content() {
        let repo = TestRepo::new();
        let mut git = open(&repo);
        let before = git.fingerprint().unwrap();
        assert_eq!(before, git.fingerprint().unwrap());

        repo.write("README.md", "staged\n");
        repo.git(&["add", "README.md"]);
        assert_ne!(before, git.fingerprint().unwrap());
    }
}

mod stash {
    use super::*;

    #[test]
    fn save_apply_drop_round_trip() {
        let repo = TestRepo::new();
        repo.write("README.md", "local edit\n");
        let mut git = open(&repo);

        let stash = git.stash_save("repoflow test").unwrap().unwrap();
        assert_eq!(repo.read("README.md"), "# Test Repo\n");
        assert_eq!(git.stash_list().unwrap(), vec![stash.clone()]);

        assert_eq!(git.stash_apply(&stash).unwrap(), ApplyOutcome::Clean);
        assert_eq!(repo.read("README.md"), "local edit\n");

        git.stash_drop(&stash).unwrap();
        assert_eq!(repo.stash_count(), 0);
    }

    #[test]
    fn clean_tree_has_nothing_to_stash() {
        let repo = TestRepo::new();
        assert_eq!(open(&repo).stash_save("nothing").unwrap(), None);
    }

    #[test]
    fn entries_are_found_by_commit_after_shifting() {
        let repo = TestRepo::new();
        let mut git = open(&repo);
        repo.write("README.md", "first\n");
        let first = git.stash_save("first").unwrap().unwrap();
        repo.write("README.md", "second\n");
        git.stash_save("second").unwrap().unwrap();

        // `first` is now stash@{1}.
        git.stash_apply(&first).unwrap();
        assert_eq!(repo.read("README.md"), "first\n");
    }

    #[test]
    fn conflicting_apply_reports_paths() {
        let repo = TestRepo::new();
        let mut git = open(&repo);
        repo.write("README.md", "stashed\n");
        let stash = git.stash_save("conflict").unwrap().unwrap();
        repo.commit_file("README.md", "committed\n", "change readme");

        assert_eq!(
            git.stash_apply(&stash).unwrap(),
            ApplyOutcome::Conflicts(vec![PathBuf::from("README.md")])
        );
        assert_eq!(repo.stash_count(), 1);
    }

    #[test]
    fn handle_follows_commits_made_by_other_processes() {
        let repo = TestRepo::new();
        let mut git = open(&repo);
        git.head_commit().unwrap();
        repo.commit_file("notes.txt", "external\n", "external commit");

        repo.write("README.md", "local edit\n");
        let stash = git.stash_save("after external commit").unwrap().unwrap();
        assert_eq!(git.stash_apply(&stash).unwrap(), ApplyOutcome::Clean);
        assert_eq!(repo.read("README.md"), "local edit\n");
        assert_eq!(repo.read("notes.txt"), "external\n");
    }
}

mod merge {
    use super::*;

    #[test]
    fn fast_forward_moves_branch() {
        let repo = TestRepo::new();
        repo.git(&["checkout", "-b", "feature"]);
        let tip = repo.commit_file("a.txt", "a\n", "feature work");
        repo.git(&["checkout", "main"]);

        let outcome = open(&repo).merge(&oid(&tip)).unwrap();
        assert_eq!(outcome, MergeOutcome::FastForward(oid(&tip)));
        assert_eq!(repo.rev_parse("main"), tip);
        assert_eq!(repo.read("a.txt"), "a\n");
    }

    #[test]
    fn ancestor_is_up_to_date() {
        let repo = TestRepo::new();
        let base = repo.rev_parse("HEAD");
        repo.commit_file("a.txt", "a\n", "ahead");
        assert_eq!(open(&repo).merge(&oid(&base)).unwrap(), MergeOutcome::UpToDate);
    }

    #[test]
    fn diverged_branches_create_merge_commit() {
        let repo = TestRepo::new();
        repo.git(&["checkout", "-b", "feature"]);
        let theirs = repo.commit_file("b.txt", "b\n", "theirs");
        repo.git(&["checkout", "main"]);
        repo.commit_file("a.txt", "a\n", "ours");

        let outcome = open(&repo).merge(&oid(&theirs)).unwrap();
        let MergeOutcome::Merged(commit) = outcome else {
            panic!("expected merge commit, got {:?}", outcome);
        };
        assert_eq!(commit.as_str(), repo.rev_parse("HEAD"));
        assert_eq!(repo.rev_parse("HEAD^2"), theirs);
        assert!(repo.git(&["status", "--porcelain"]).is_empty());
    }

    #[test]
    fn conflicts_leave_pending_merge() {
        let repo = TestRepo::new();
        repo.git(&["checkout", "-b", "feature"]);
        let theirs = repo.commit_file("README.md", "theirs\n", "theirs");
        repo.git(&["checkout", "main"]);
        let ours = repo.commit_file("README.md", "ours\n", "ours");

        let mut git = open(&repo);
        let MergeOutcome::Conflicts { paths, message } = git.merge(&oid(&theirs)).unwrap() else {
            panic!("expected conflicts");
        };
        assert_eq!(paths, vec![PathBuf::from("README.md")]);
        assert!(message.starts_with("Merge"), "message: {}", message);

        // Resolve by hand, then finalize.
        repo.write("README.md", "both\n");
        git.stage_path(&repo.path().join("README.md")).unwrap();
        let commit = git.commit_pending(&message).unwrap().unwrap();
        assert_eq!(repo.rev_parse("HEAD^1"), ours);
        assert_eq!(repo.rev_parse("HEAD^2"), theirs);
        assert_eq!(commit.as_str(), repo.rev_parse("HEAD"));
    }
}

mod history {
    use super::*;

    #[test]
    fn cherry_pick_preserves_message_and_author() {
        let repo = TestRepo::new();
        repo.git(&["checkout", "-b", "feature"]);
        let pick = repo.commit_file("a.txt", "a\n", "feature change");
        repo.git(&["checkout", "main"]);
        let main_tip = repo.commit_file("m.txt", "m\n", "main change");

        let PickOutcome::Picked(new) = open(&repo).cherry_pick(&oid(&pick)).unwrap() else {
            panic!("expected a new commit");
        };
        assert_ne!(new.as_str(), pick);
        assert_eq!(repo.rev_parse("HEAD^"), main_tip);
        assert_eq!(repo.subjects()[0], "feature change");
        assert_eq!(
            repo.git(&["log", "-1", "--format=%an <%ae>", pick.as_str()]),
            repo.git(&["log", "-1", "--format=%an <%ae>", "HEAD"])
        );
        assert_eq!(repo.read("a.txt"), "a\n");
    }

    #[test]
    fn cherry_pick_of_present_change_is_empty() {
        let repo = TestRepo::new();
        repo.git(&["checkout", "-b", "feature"]);
        let pick = repo.commit_file("a.txt", "a\n", "same change");
        repo.git(&["checkout", "main"]);
        repo.commit_file("a.txt", "a\n", "same change on main");

        assert_eq!(open(&repo).cherry_pick(&oid(&pick)).unwrap(), PickOutcome::Empty);
    }

    #[test]
    fn reset_hard_discards_changes_and_state() {
        let repo = TestRepo::new();
        let base = repo.rev_parse("HEAD");
        repo.commit_file("a.txt", "a\n", "later");
        repo.write("README.md", "dirty\n");

        open(&repo).reset_hard(&oid(&base)).unwrap();
        assert_eq!(repo.rev_parse("HEAD"), base);
        assert!(!repo.path().join("a.txt").exists());
        assert_eq!(repo.read("README.md"), "# Test Repo\n");
    }

    #[test]
    fn revert_path_restores_head_version() {
        let repo = TestRepo::new();
        repo.write("README.md", "edited\n");
        repo.write("extra.txt", "added\n");
        repo.git(&["add", "extra.txt"]);
        let mut git = open(&repo);

        git.revert_path(&repo.path().join("README.md")).unwrap();
        git.revert_path(&repo.path().join("extra.txt")).unwrap();
        assert_eq!(repo.read("README.md"), "# Test Repo\n");
        assert!(!repo.path().join("extra.txt").exists());
    }
}

mod branches {
    use super::*;

    #[test]
    fn create_and_checkout() {
        let repo = TestRepo::new();
        let head = repo.rev_parse("HEAD");
        let mut git = open(&repo);
        let name = BranchName::new("topic").unwrap();

        git.create_branch(&name, &oid(&head)).unwrap();
        git.checkout_branch(&name).unwrap();
        assert_eq!(repo.branch(), "topic");
    }

    #[test]
    fn checkout_blocked_by_local_changes() {
        let repo = TestRepo::new();
        repo.git(&["checkout", "-b", "other"]);
        repo.commit_file("README.md", "other\n", "other readme");
        repo.git(&["checkout", "main"]);
        repo.write("README.md", "local\n");

        let result = open(&repo).checkout_branch(&BranchName::new("other").unwrap());
        assert!(matches!(result, Err(GitError::Conflict { .. })), "{:?}", result);
        assert_eq!(repo.branch(), "main");
        assert_eq!(repo.read("README.md"), "local\n");
    }

    #[test]
    fn unknown_branch_is_an_error() {
        let repo = TestRepo::new();
        let result = open(&repo).checkout_branch(&BranchName::new("missing").unwrap());
        assert!(result.is_err());
    }
}
