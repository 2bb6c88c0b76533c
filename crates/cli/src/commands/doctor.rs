use std::fs;

use serde::Serialize;
use ticketdesk_core::config::{AppConfig, LoadOptions};
use ticketdesk_core::domain::resources::ResourceNames;
use ticketdesk_provision::{AccountApi, AwsCloud};

use crate::commands::current_thread_runtime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: [&str; 3] = ["resource_names", "handler_artifact", "aws_identity"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_resource_names(&config));
            checks.push(check_handler_artifact(&config));
            checks.push(check_aws_identity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in DEPENDENT_CHECKS {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_resource_names(config: &AppConfig) -> DoctorCheck {
    match ResourceNames::for_agent(&config.agent.name) {
        Ok(names) => DoctorCheck {
            name: "resource_names",
            status: CheckStatus::Pass,
            details: format!(
                "roles `{}`, `{}`; policies `{}`, `{}`; function `{}`",
                names.lambda_role,
                names.agent_role,
                names.table_policy,
                names.agent_policy,
                config.function_name()
            ),
        },
        Err(error) => DoctorCheck {
            name: "resource_names",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_handler_artifact(config: &AppConfig) -> DoctorCheck {
    let path = &config.function.artifact_path;
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() && metadata.len() > 0 => DoctorCheck {
            name: "handler_artifact",
            status: CheckStatus::Pass,
            details: format!("found `{}` ({} bytes)", path.display(), metadata.len()),
        },
        Ok(_) => DoctorCheck {
            name: "handler_artifact",
            status: CheckStatus::Fail,
            details: format!("`{}` is not a non-empty file", path.display()),
        },
        Err(error) => DoctorCheck {
            name: "handler_artifact",
            status: CheckStatus::Fail,
            details: format!("cannot read `{}`: {error}", path.display()),
        },
    }
}

fn check_aws_identity(config: &AppConfig) -> DoctorCheck {
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "aws_identity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let cloud = AwsCloud::connect(&config.aws).await;
        cloud.caller_account().await
    });

    match result {
        Ok(account) => DoctorCheck {
            name: "aws_identity",
            status: CheckStatus::Pass,
            details: format!("account {} in {}", account.account_id, account.region),
        },
        Err(error) => DoctorCheck {
            name: "aws_identity",
            status: CheckStatus::Fail,
            details: format!("failed to resolve caller identity: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
