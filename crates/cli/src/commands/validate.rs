//! Validate Command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use conformance_common::{ActionConfig, PlanConfig};

use crate::commands::{EXIT_ABORTED, EXIT_OK};
use crate::output::{print_error, print_success, print_warning};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Plan configuration file (*.config.json)
    #[arg(short, long)]
    pub config: PathBuf,
}

pub async fn execute(args: ValidateArgs) -> Result<i32> {
    let plan = match PlanConfig::load(&args.config) {
        Ok(plan) => plan,
        Err(e) => {
            print_error(&format!("{}: {}", args.config.display(), e));
            return Ok(EXIT_ABORTED);
        }
    };

    let api = plan
        .actions
        .iter()
        .filter(|a| matches!(a, ActionConfig::Api(_)))
        .count();
    print_success(&format!(
        "{} is valid: {} module(s), {} action(s) ({} api, {} browser), {} capture variable(s)",
        args.config.display(),
        plan.modules.len(),
        plan.actions.len(),
        api,
        plan.actions.len() - api,
        plan.capture_vars.len()
    ));

    for module in &plan.modules {
        for name in module.action_names() {
            if plan.action(name).is_none() {
                print_warning(&format!(
                    "module '{}' references unknown action '{}'",
                    module.name, name
                ));
            }
        }
    }

    Ok(EXIT_OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_valid_config_exits_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.config.json");
        std::fs::write(
            &path,
            r#"{"actions": [{"name": "a", "type": "api", "endpoint": "/x"}], "modules": [{"name": "m", "actions": ["a", "ghost"]}]}"#,
        )
        .unwrap();

        let code = execute(ValidateArgs { config: path }).await.unwrap();
        assert_eq!(code, EXIT_OK);
    }

    #[tokio::test]
    async fn test_bad_suffix_exits_aborted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, "{}").unwrap();

        let code = execute(ValidateArgs { config: path }).await.unwrap();
        assert_eq!(code, EXIT_ABORTED);
    }

    #[tokio::test]
    async fn test_duplicate_modules_exit_aborted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.config.json");
        std::fs::write(&path, r#"{"modules": [{"name": "m"}, {"name": "m"}]}"#).unwrap();

        let code = execute(ValidateArgs { config: path }).await.unwrap();
        assert_eq!(code, EXIT_ABORTED);
    }
}
