// Integration tests for Executor module
// This file should be run with cargo test --test test_executor
#![allow(dead_code)]

#[path = "../src/executor/mod.rs"]
mod executor;

#[path = "../src/settings/mod.rs"]
mod settings;

use executor::{ExecutorConfig, ExecutorError, LocalExecutor, RemoteExecutor};
use settings::{AuthMethod, RemoteTarget};
use std::path::{Path, PathBuf};

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    });
}

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("syshardn-exec-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write an executable shell script
#[cfg(unix)]
fn write_script(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path.to_string_lossy().into_owned()
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn target(auth: AuthMethod) -> RemoteTarget {
    RemoteTarget {
        host: "127.0.0.1".to_string(),
        port: 22,
        username: "ops".to_string(),
        auth,
        tool_path: "syshardn".to_string(),
    }
}

/// A stand-in ssh client that runs the final argument with `sh -c`
#[cfg(unix)]
fn fake_ssh(dir: &Path) -> RemoteExecutor {
    let ssh = write_script(dir, "fake-ssh", "for last; do :; done\nexec sh -c \"$last\"");
    RemoteExecutor::new(ExecutorConfig {
        ssh_program: ssh,
        ..Default::default()
    })
}

#[cfg(all(test, unix))]
mod local_tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_zero_is_success() {
        init_tracing();
        let dir = scratch_dir();
        let tool = write_script(&dir, "tool", "echo '{\"ok\":true}'; exit 0");

        let result = LocalExecutor::new().run(&argv(&[&tool, "check"]), &[]).await.unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_exit_one_is_success() {
        init_tracing();
        let dir = scratch_dir();
        let tool = write_script(&dir, "tool", "echo 'findings present'; exit 1");

        let result = LocalExecutor::new().run(&argv(&[&tool]), &[]).await.unwrap();
        assert!(result.success, "exit 1 reports findings, not failure");
        assert_eq!(result.exit_code, Some(1));
        assert!(result.into_checked().is_ok());
    }

    #[tokio::test]
    async fn test_exit_two_is_failure_with_stderr() {
        init_tracing();
        let dir = scratch_dir();
        let tool = write_script(&dir, "tool", "echo 'permission denied' >&2; exit 2");

        let result = LocalExecutor::new().run(&argv(&[&tool]), &[]).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.stderr.trim(), "permission denied");

        match result.into_checked() {
            Err(ExecutorError::NonZeroExit { code, message }) => {
                assert_eq!(code, Some(2));
                assert_eq!(message, "permission denied");
            }
            other => panic!("expected NonZeroExit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_without_stderr_names_code() {
        init_tracing();
        let dir = scratch_dir();
        let tool = write_script(&dir, "tool", "exit 3");

        let err = LocalExecutor::new()
            .run(&argv(&[&tool]), &[])
            .await
            .unwrap()
            .into_checked()
            .unwrap_err();
        assert_eq!(err.to_string(), "Command failed with exit code 3");
    }

    #[tokio::test]
    async fn test_stdout_and_stderr_captured_separately() {
        init_tracing();
        let dir = scratch_dir();
        let tool = write_script(&dir, "tool", "echo out; echo err >&2; echo more");

        let result = LocalExecutor::new().run(&argv(&[&tool]), &[]).await.unwrap();
        assert_eq!(result.stdout, "out\nmore\n");
        assert_eq!(result.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_env_overrides_reach_child() {
        init_tracing();
        let dir = scratch_dir();
        let tool = write_script(&dir, "tool", "echo \"$SYSHARDN_PROFILE\"");

        let env = vec![("SYSHARDN_PROFILE".to_string(), "strict".to_string())];
        let result = LocalExecutor::new().run(&argv(&[&tool]), &env).await.unwrap();
        assert_eq!(result.stdout.trim(), "strict");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        init_tracing();
        let missing = scratch_dir().join("no-such-tool");

        let err = LocalExecutor::new()
            .run(&[missing.to_string_lossy().into_owned()], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::SpawnFailure(_, _)));
    }
}

#[cfg(all(test, unix))]
mod remote_tests {
    use super::*;

    #[tokio::test]
    async fn test_command_line_runs_through_session() {
        init_tracing();
        let dir = scratch_dir();
        let executor = fake_ssh(&dir);

        let result = executor
            .run("printf '%s' \"a \\\"quoted\\\" arg\"", &target(AuthMethod::Default))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout, "a \"quoted\" arg");
    }

    #[tokio::test]
    async fn test_exit_255_is_transport_failure() {
        init_tracing();
        let dir = scratch_dir();
        let executor = fake_ssh(&dir);

        let err = executor
            .run("echo 'Connection refused' >&2; exit 255", &target(AuthMethod::Default))
            .await
            .unwrap_err();
        match err {
            ExecutorError::TransportAuthFailure(message) => {
                assert!(message.contains("Connection refused"))
            }
            other => panic!("expected TransportAuthFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tool_exit_two_is_not_transport_failure() {
        init_tracing();
        let dir = scratch_dir();
        let executor = fake_ssh(&dir);

        let result = executor
            .run("exit 2", &target(AuthMethod::Default))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(2));
    }

    #[tokio::test]
    async fn test_connection_sentinel() {
        init_tracing();
        let dir = scratch_dir();
        let executor = fake_ssh(&dir);

        tokio_test::assert_ok!(executor.test_connection(&target(AuthMethod::Default)).await);
    }

    #[tokio::test]
    async fn test_connection_without_sentinel_fails() {
        init_tracing();
        let dir = scratch_dir();
        let ssh = write_script(&dir, "silent-ssh", "exit 0");
        let executor = RemoteExecutor::new(ExecutorConfig {
            ssh_program: ssh,
            ..Default::default()
        });

        let err = tokio_test::assert_err!(executor.test_connection(&target(AuthMethod::Default)).await);
        assert!(matches!(err, ExecutorError::TransportAuthFailure(_)));
    }

    #[tokio::test]
    async fn test_key_auth_unreachable_is_transport_failure() {
        init_tracing();
        let dir = scratch_dir();
        let ssh = write_script(&dir, "denied-ssh", "exit 255");
        let executor = RemoteExecutor::new(ExecutorConfig {
            ssh_program: ssh,
            ..Default::default()
        });

        let err = executor
            .test_connection(&target(AuthMethod::PrivateKey(PathBuf::from("/keys/id_ed25519"))))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::TransportAuthFailure(_)));
    }

    #[tokio::test]
    async fn test_password_auth_feeds_sshpass_env() {
        init_tracing();
        let dir = scratch_dir();
        // Stand-in sshpass: report what it received instead of running ssh
        let sshpass = write_script(&dir, "fake-sshpass", "printf '%s %s %s\\n' \"$1\" \"$2\" \"$SSHPASS\"");
        let executor = RemoteExecutor::new(ExecutorConfig {
            sshpass_program: sshpass,
            ..Default::default()
        });

        let result = executor
            .run("true", &target(AuthMethod::Password("s3cret".to_string())))
            .await
            .unwrap();
        assert_eq!(result.stdout.trim(), "-e ssh s3cret");
    }

    #[tokio::test]
    async fn test_sshpass_bad_password_is_auth_failure() {
        init_tracing();
        let dir = scratch_dir();
        let sshpass = write_script(&dir, "fake-sshpass", "exit 5");
        let executor = RemoteExecutor::new(ExecutorConfig {
            sshpass_program: sshpass,
            ..Default::default()
        });

        let err = executor
            .run("true", &target(AuthMethod::Password("wrong".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::TransportAuthFailure(_)));
    }

    #[tokio::test]
    async fn test_missing_sshpass_mentions_sshpass() {
        init_tracing();
        let missing = scratch_dir().join("sshpass");
        let executor = RemoteExecutor::new(ExecutorConfig {
            sshpass_program: missing.to_string_lossy().into_owned(),
            ..Default::default()
        });

        let err = executor
            .run("true", &target(AuthMethod::Password("pw".to_string())))
            .await
            .unwrap_err();
        match err {
            ExecutorError::TransportAuthFailure(message) => assert!(message.contains("sshpass")),
            other => panic!("expected TransportAuthFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scp_download() {
        init_tracing();
        let dir = scratch_dir();
        let source = dir.join("remote-report.html");
        std::fs::write(&source, "<html></html>").unwrap();
        // Stand-in scp: copy `host:path` to the destination
        let scp = write_script(
            &dir,
            "fake-scp",
            "for last; do :; done\neval src=\\${$(($# - 1))}\ncp \"${src#*:}\" \"$last\"",
        );
        let executor = RemoteExecutor::new(ExecutorConfig {
            scp_program: scp,
            ..Default::default()
        });

        let dest = dir.join("downloaded.html");
        executor
            .copy_from_remote(&target(AuthMethod::Default), &source.to_string_lossy(), &dest)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "<html></html>");
    }
}
