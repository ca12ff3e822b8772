use std::time::Duration;

use gf_core::config::{Config, ConfigError, CredentialProvider, TokensConfig};
use gf_core::git2_ops::{CloneOptions, HistoryOptions};
use gf_core::types::{CommitOrder, ProviderType};

#[test]
fn empty_file_yields_defaults() {
    let cfg = Config::from_toml("").unwrap();
    assert_eq!(cfg.general.log_level, "info");
    assert!(!cfg.general.json_logs());
    assert_eq!(cfg.clone.max_concurrent, 5);
    assert_eq!(cfg.clone.depth, None);
    assert_eq!(cfg.history.order, CommitOrder::NewestFirst);
    assert_eq!(cfg.tokens.max_wait_secs, 0);
}

#[test]
fn sections_override_defaults() {
    let cfg = Config::from_toml(
        r#"
        [general]
        log_format = "json"

        [clone]
        max_concurrent = 12
        depth = 1
        timeout_secs = 90
        branch = "main"
        workspace_root = "/var/tmp/fleet"

        [blame]
        max_concurrent = 3

        [history]
        order = "topological"
        include_stats = true
        max_count = 500

        [tokens]
        github_tokens_env = "MY_GH_TOKENS"
        max_wait_secs = 30
        "#,
    )
    .unwrap();

    assert!(cfg.general.json_logs());
    assert_eq!(cfg.blame.effective_concurrency(), 3);
    assert_eq!(cfg.tokens.env_var(ProviderType::GitHub), "MY_GH_TOKENS");
    assert_eq!(cfg.tokens.max_wait(), Duration::from_secs(30));
    assert_eq!(cfg.clone.workspace_root().to_str(), Some("/var/tmp/fleet"));

    let clone = CloneOptions::from(&cfg.clone);
    assert_eq!(clone.depth, Some(1));
    assert_eq!(clone.branch.as_deref(), Some("main"));
    assert_eq!(clone.timeout, Some(Duration::from_secs(90)));

    let history = HistoryOptions::from(&cfg.history);
    assert_eq!(history.order, CommitOrder::Topological);
    assert!(history.include_stats);
    assert_eq!(history.max_count, Some(500));
}

#[test]
fn validation_rejects_nonsense() {
    for text in [
        "[clone]\nmax_concurrent = 0",
        "[clone]\ndepth = 0",
        "[clone]\ntimeout_secs = 0",
        "[blame]\nmax_concurrent = 0",
        "[history]\nstream_buffer = 0",
        "[general]\nlog_format = \"xml\"",
    ] {
        assert!(
            matches!(Config::from_toml(text), Err(ConfigError::Validation(_))),
            "{text}"
        );
    }
}

#[test]
fn parse_errors_are_reported() {
    assert!(matches!(
        Config::from_toml("[clone]\nmax_concurrent = \"many\""),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn round_trips_through_toml() {
    let mut cfg = Config::default();
    cfg.clone.depth = Some(5);
    cfg.history.order = CommitOrder::OldestFirst;
    let text = cfg.to_toml().unwrap();
    let back = Config::from_toml(&text).unwrap();
    assert_eq!(back.clone.depth, Some(5));
    assert_eq!(back.history.order, CommitOrder::OldestFirst);
}

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[clone]\nmax_concurrent = 2\n").unwrap();
    assert_eq!(Config::load_from(&path).unwrap().clone.max_concurrent, 2);
    assert!(matches!(
        Config::load_from(dir.path().join("absent.toml")),
        Err(ConfigError::Io(_))
    ));
}

#[test]
fn tokens_come_from_env() {
    // Unique names keep this independent of the real environment.
    let tokens = TokensConfig {
        github_tokens_env: "GF_TEST_GH_TOKENS".into(),
        gitlab_tokens_env: "GF_TEST_GL_TOKENS".into(),
        bitbucket_tokens_env: "GF_TEST_BB_TOKENS".into(),
        max_wait_secs: 0,
    };
    std::env::set_var("GF_TEST_GH_TOKENS", "ghp_one, ghp_two");
    std::env::set_var("GF_TEST_GL_TOKEN", "glpat_single");

    let gh = CredentialProvider::tokens_for(&tokens, ProviderType::GitHub);
    assert_eq!(
        gh.iter().map(|c| c.secret()).collect::<Vec<_>>(),
        vec!["ghp_one", "ghp_two"]
    );
    let gl = CredentialProvider::tokens_for(&tokens, ProviderType::GitLab);
    assert_eq!(gl.len(), 1);
    assert_eq!(gl[0].secret(), "glpat_single");
    assert!(CredentialProvider::tokens_for(&tokens, ProviderType::BitBucket).is_empty());
}
