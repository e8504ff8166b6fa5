//! Result and error rendering.

use admgr_core::{Error, ErrorCode};
use admgr_directory::SearchOutcome;
use serde::Serialize;
use std::io::{self, Write};

/// What a completed operation has to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report {
    /// Nothing beyond success.
    Done,
    /// Attribute values.
    Values { values: Vec<String> },
    /// Search or list result.
    Entries { result: SearchOutcome },
    /// Groups a user was removed from.
    Removed { groups: Vec<String> },
}

#[derive(Serialize)]
struct SuccessResponse<'a> {
    status: ErrorCode,
    #[serde(flatten)]
    report: &'a Report,
}

/// Writes `report` to `out`: one value or DN per line, or a JSON document.
pub fn write_report(out: &mut impl Write, report: &Report, json: bool) -> io::Result<()> {
    if json {
        let response = SuccessResponse {
            status: ErrorCode::Success,
            report,
        };
        serde_json::to_writer_pretty(&mut *out, &response)?;
        return writeln!(out);
    }

    let lines: &[String] = match report {
        Report::Values { values } => values,
        Report::Entries {
            result: SearchOutcome::Found(dns),
        } => dns,
        Report::Done
        | Report::Removed { .. }
        | Report::Entries {
            result: SearchOutcome::NotFound,
        } => &[],
    };
    for line in lines {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

/// Writes a failure to `out` as `error: ...` or as a JSON error response.
pub fn write_error(out: &mut impl Write, err: &anyhow::Error, json: bool) -> io::Result<()> {
    if json {
        let message = format!("{err:#}");
        let response = match err.downcast_ref::<Error>() {
            Some(core) => {
                let mut response = core.clone().into_error_response();
                response.error.message = message;
                serde_json::to_value(response)?
            }
            None => serde_json::json!({ "error": { "code": "CLI_ERROR", "message": message } }),
        };
        serde_json::to_writer_pretty(&mut *out, &response)?;
        return writeln!(out);
    }
    writeln!(out, "error: {err:#}")
}
