use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use muplink_serial::{DevEnumerator, EndpointEnumerator};
use serde::Serialize;

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::OutputFormat;

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Info,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    schema_id: &'static str,
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(_args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let checks = vec![
        enumeration_check(),
        endpoints_present_check(),
        link_defaults_check(),
    ];

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let overall = if has_fail { "fail" } else { "pass" };

    let output = DoctorOutput {
        schema_id: "https://schemas.3leaps.dev/muplink/cli/v1/doctor-report.schema.json",
        checks,
        overall,
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn enumeration_check() -> CheckResult {
    match DevEnumerator::new().endpoints() {
        Ok(_) => CheckResult {
            name: "serial-enumeration".to_string(),
            status: CheckStatus::Pass,
            detail: "/dev is readable".to_string(),
        },
        Err(err) => CheckResult {
            name: "serial-enumeration".to_string(),
            status: CheckStatus::Fail,
            detail: err.to_string(),
        },
    }
}

fn endpoints_present_check() -> CheckResult {
    match DevEnumerator::new().endpoints() {
        Ok(endpoints) if endpoints.is_empty() => CheckResult {
            name: "endpoints-present".to_string(),
            status: CheckStatus::Warn,
            detail: "no ttyACM*/ttyUSB* endpoints found; is a board plugged in?".to_string(),
        },
        Ok(endpoints) => CheckResult {
            name: "endpoints-present".to_string(),
            status: CheckStatus::Pass,
            detail: format!(
                "{} candidate endpoint(s): {}",
                endpoints.len(),
                endpoints
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        },
        Err(_) => CheckResult {
            name: "endpoints-present".to_string(),
            status: CheckStatus::Warn,
            detail: "enumeration unavailable".to_string(),
        },
    }
}

fn link_defaults_check() -> CheckResult {
    CheckResult {
        name: "link-defaults".to_string(),
        status: CheckStatus::Info,
        detail: format!(
            "{} baud, 8 data bits, no parity, 1 stop bit, no flow control",
            muplink_serial::DEFAULT_BAUD_RATE
        ),
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHECK", "STATUS", "DETAIL"]);
            for check in &output.checks {
                table.add_row(vec![
                    check.name.clone(),
                    format!("{:?}", check.status).to_lowercase(),
                    check.detail.clone(),
                ]);
            }
            println!("{table}");
            println!("overall: {}", output.overall);
        }
        _ => {
            for check in &output.checks {
                println!(
                    "{}: {} — {}",
                    check.name,
                    format!("{:?}", check.status).to_lowercase(),
                    check.detail
                );
            }
            println!("overall: {}", output.overall);
        }
    }
}
