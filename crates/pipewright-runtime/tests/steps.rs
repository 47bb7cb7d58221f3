mod common;

use std::sync::Arc;

use common::*;
use pipewright_runtime::{Composition, FailureKind, Invocation, RunStatus, Status};
use pipewright_secrets::MemoryVault;
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_always_step_runs_after_failure() {
  let yaml = r#"
name: ci
jobs:
  build:
    steps:
      - run: compile
      - run: package
      - name: upload logs
        if: always()
        run: upload
      - if: failure()
        run: notify
"#;
  let runner = ScriptedRunner::new(|req, _| match req.command.as_str() {
    "compile" => exit(1),
    _ => ok(""),
  });
  let outcome = run(yaml, runner.clone(), empty_vault()).await;

  let steps = &outcome.jobs["build"].steps;
  assert_eq!(steps[0].status, Status::Failure);
  assert_eq!(steps[1].status, Status::Skipped);
  assert_eq!(steps[2].status, Status::Success);
  assert_eq!(steps[2].name, "upload logs");
  assert_eq!(steps[3].status, Status::Success);
  assert_eq!(runner.commands(), vec!["compile", "upload", "notify"]);
  assert_eq!(outcome.jobs["build"].status, Status::Failure);
}

#[tokio::test]
async fn test_non_blocking_step_failure() {
  let yaml = r#"
name: ci
jobs:
  build:
    steps:
      - id: lint
        continue-on-error: true
        run: lint
      - if: steps.lint.outcome == 'failure' && steps.lint.conclusion == 'success'
        run: report lint
"#;
  let runner = ScriptedRunner::new(|req, _| match req.command.as_str() {
    "lint" => exit(1),
    _ => ok(""),
  });
  let outcome = run(yaml, runner.clone(), empty_vault()).await;

  let job = &outcome.jobs["build"];
  assert_eq!(job.steps[0].status, Status::Failure);
  assert!(job.steps[0].continue_on_error);
  assert_eq!(job.steps[1].status, Status::Success);
  // The job still records the failure
  assert_eq!(job.status, Status::Failure);
  assert_eq!(runner.commands(), vec!["lint", "report lint"]);
}

#[tokio::test]
async fn test_false_condition_skips_step() {
  let yaml = r#"
name: ci
jobs:
  build:
    steps:
      - if: github.event_name == 'pull_request'
        run: comment
      - run: build
"#;
  let runner = ScriptedRunner::succeeding();
  let outcome = run(yaml, runner.clone(), empty_vault()).await;
  let steps = &outcome.jobs["build"].steps;
  assert_eq!(steps[0].status, Status::Skipped);
  assert_eq!(steps[0].attempts, 0);
  assert_eq!(steps[1].status, Status::Success);
  assert_eq!(outcome.status, RunStatus::Success);
  assert_eq!(runner.commands(), vec!["build"]);
}

#[tokio::test]
async fn test_retry_until_success() {
  let yaml = r#"
name: ci
max-retry-attempts: 3
retry-backoff: constant
retry-initial-delay-ms: 1
jobs:
  fetch:
    steps:
      - run: curl deps
"#;
  let runner = ScriptedRunner::new(|_, previous| if previous < 2 { exit(7) } else { ok("") });
  let outcome = run(yaml, runner.clone(), empty_vault()).await;

  let step = &outcome.jobs["fetch"].steps[0];
  assert_eq!(step.status, Status::Success);
  assert_eq!(step.attempts, 3);
  assert!(step.error.is_none());
  assert_eq!(runner.commands().len(), 3);
}

#[tokio::test]
async fn test_retries_exhausted() {
  let yaml = r#"
name: ci
jobs:
  fetch:
    steps:
      - run: curl deps
        max-retry-attempts: 2
        retry-initial-delay-ms: 1
"#;
  let runner = ScriptedRunner::new(|_, _| exit(7));
  let outcome = run(yaml, runner.clone(), empty_vault()).await;

  let step = &outcome.jobs["fetch"].steps[0];
  assert_eq!(step.status, Status::Failure);
  assert_eq!(step.attempts, 2);
  let error = step.error.as_ref().unwrap();
  assert_eq!(error.kind, FailureKind::StepExecutionFailure);
  assert_eq!(error.message, "command exited with code 7");
}

#[tokio::test]
async fn test_expression_failures_are_not_retried() {
  let yaml = r#"
name: ci
inputs:
  target: {}
jobs:
  deploy:
    steps:
      - run: deploy ${{ inputs.target }}
        max-retry-attempts: 5
        retry-initial-delay-ms: 1
"#;
  let runner = ScriptedRunner::succeeding();
  let outcome = run(yaml, runner.clone(), empty_vault()).await;

  let step = &outcome.jobs["deploy"].steps[0];
  assert_eq!(step.status, Status::Failure);
  assert_eq!(step.attempts, 0);
  let error = step.error.as_ref().unwrap();
  assert_eq!(error.kind, FailureKind::UnresolvedReference);
  assert_eq!(error.path, "deploy/0");
  assert!(runner.commands().is_empty());
}

#[tokio::test]
async fn test_default_for_absent_input() {
  let yaml = r#"
name: ci
inputs:
  target: {}
jobs:
  deploy:
    steps:
      - run: deploy ${{ inputs.target || 'staging' }}
"#;
  let runner = ScriptedRunner::succeeding();
  run(yaml, runner.clone(), empty_vault()).await;
  assert_eq!(runner.commands(), vec!["deploy staging"]);
}

#[tokio::test]
async fn test_step_timeout() {
  let yaml = r#"
name: ci
jobs:
  build:
    steps:
      - run: hang
        timeout-ms: 30
"#;
  let runner = ScriptedRunner::new(|_, _| slow(std::time::Duration::from_secs(30)));
  let outcome = run(yaml, runner, empty_vault()).await;
  let step = &outcome.jobs["build"].steps[0];
  assert_eq!(step.status, Status::Failure);
  assert_eq!(step.error.as_ref().unwrap().kind, FailureKind::Timeout);
}

#[tokio::test]
async fn test_env_layering() {
  let yaml = r#"
name: ci
env:
  LEVEL: workflow
  NAME: ci
jobs:
  build:
    env:
      LEVEL: job
      GREETING: hello ${{ env.NAME }}
    steps:
      - env:
          LEVEL: step
        run: build
      - run: after
"#;
  let runner = ScriptedRunner::succeeding();
  run(yaml, runner.clone(), empty_vault()).await;

  let calls = runner.calls();
  assert_eq!(calls[0].env["LEVEL"], "step");
  assert_eq!(calls[0].env["GREETING"], "hello ci");
  assert_eq!(calls[1].env["LEVEL"], "job");
}

#[tokio::test]
async fn test_shell_and_working_directory() {
  let yaml = r#"
name: ci
jobs:
  build:
    steps:
      - run: cargo build
        shell: bash -e
        working-directory: crates/${{ github.ref_name }}
      - run: make
"#;
  let runner = ScriptedRunner::succeeding();
  run(yaml, runner.clone(), empty_vault()).await;

  let calls = runner.calls();
  assert_eq!(calls[0].shell, "bash -e");
  assert_eq!(calls[0].working_dir.as_deref(), Some(std::path::Path::new("crates/main")));
  assert_eq!(calls[1].shell, "sh -e");
  assert_eq!(calls[1].working_dir, None);
}

const SECRET_WORKFLOW: &str = r#"
name: ci
secrets:
  NPM_TOKEN:
    required: true
  SLACK_HOOK: {}
jobs:
  build:
    steps:
      - run: npm ci
  publish:
    needs: build
    steps:
      - env:
          TOKEN: ${{ secrets.NPM_TOKEN }}
        run: npm publish
"#;

#[tokio::test]
async fn test_secrets_resolved_only_where_referenced() {
  let vault = RecordingVault::new(MemoryVault::new().with_secret("NPM_TOKEN", "npm-abc123"));
  let runner = ScriptedRunner::succeeding();
  let outcome = run(SECRET_WORKFLOW, runner.clone(), vault.clone()).await;

  assert_eq!(outcome.status, RunStatus::Success);
  assert_eq!(vault.lookups(), vec!["NPM_TOKEN"]);

  let calls = runner.calls();
  assert!(!calls[0].env.contains_key("TOKEN"));
  assert_eq!(calls[1].env["TOKEN"], "npm-abc123");
}

#[tokio::test]
async fn test_environment_scoped_secret() {
  let yaml = r#"
name: ci
secrets:
  DEPLOY_KEY:
    required: true
jobs:
  staging:
    environment: staging
    steps:
      - run: deploy ${{ secrets.DEPLOY_KEY }}
  production:
    environment: ${{ 'production' }}
    steps:
      - run: deploy ${{ secrets.DEPLOY_KEY }}
"#;
  let vault = MemoryVault::new()
    .with_secret("DEPLOY_KEY", "shared-key")
    .with_environment_secret("production", "DEPLOY_KEY", "prod-key");
  let runner = ScriptedRunner::succeeding();
  let outcome = run(yaml, runner.clone(), Arc::new(vault)).await;

  assert_eq!(outcome.jobs["production"].environment.as_deref(), Some("production"));
  let mut commands = runner.commands();
  commands.sort();
  assert_eq!(commands, vec!["deploy prod-key", "deploy shared-key"]);
}

#[tokio::test]
async fn test_missing_required_secret_fails_step() {
  let runner = ScriptedRunner::succeeding();
  let outcome = run(SECRET_WORKFLOW, runner.clone(), empty_vault()).await;

  let step = &outcome.jobs["publish"].steps[0];
  assert_eq!(step.status, Status::Failure);
  let error = step.error.as_ref().unwrap();
  assert_eq!(error.kind, FailureKind::SecretNotFound);
  assert_eq!(error.path, "publish/0");
  assert_eq!(runner.commands(), vec!["npm ci"]);
}

#[tokio::test]
async fn test_optional_secret_falls_back() {
  let yaml = r#"
name: ci
secrets:
  SLACK_HOOK: {}
jobs:
  notify:
    steps:
      - run: notify ${{ secrets.SLACK_HOOK || 'disabled' }}
"#;
  let runner = ScriptedRunner::succeeding();
  run(yaml, runner.clone(), empty_vault()).await;
  assert_eq!(runner.commands(), vec!["notify disabled"]);
}

#[tokio::test]
async fn test_secret_values_are_registered_for_redaction() {
  let yaml = r#"
name: ci
secrets:
  TOKEN:
    required: true
jobs:
  build:
    steps:
      - run: login ${{ secrets.TOKEN }}
"#;
  let vault = MemoryVault::new().with_secret("TOKEN", "tok-s3cr3t");
  let runner = ScriptedRunner::new(|_, _| Reply {
    exit_code: 1,
    stdout: "auth failed for tok-s3cr3t\n::add-mask::derived-value".to_string(),
    delay: None,
  });
  let rt = runtime(
    Composition::standalone(lock(yaml)),
    runner,
    Arc::new(vault),
  );
  let outcome = rt
    .execute(invocation(), CancellationToken::new())
    .await
    .unwrap();

  let step = &outcome.jobs["build"].steps[0];
  assert_eq!(rt.redactor().redact(&step.log), "auth failed for ***");
  assert_eq!(rt.redactor().redact("derived-value"), "***");

  // The failure snapshot never carries secret values
  let context = &step.error.as_ref().unwrap().context;
  assert_eq!(context["secrets"], json!({"TOKEN": "***"}));
}

#[tokio::test]
async fn test_inputs_and_github_scope() {
  let yaml = r#"
name: ci
inputs:
  target: {}
jobs:
  deploy:
    steps:
      - run: deploy ${{ inputs.target }} from ${{ github.ref }}
"#;
  let runner = ScriptedRunner::succeeding();
  let mut invocation = invocation();
  invocation
    .inputs
    .insert("target".to_string(), json!("production"));
  let rt = runtime(
    Composition::standalone(lock(yaml)),
    runner.clone(),
    empty_vault(),
  );
  rt.execute(
    Invocation {
      environment: Some("production".to_string()),
      ..invocation
    },
    CancellationToken::new(),
  )
  .await
  .unwrap();
  assert_eq!(runner.commands(), vec!["deploy production from refs/heads/main"]);
}
