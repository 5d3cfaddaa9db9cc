//! User-facing error message formatting.
//!
//! Matches on typed errors (duckdb::Error, io::ErrorKind) found in a report's
//! cause chain and keeps messages to one line for the error modal.

use std::io;

/// Format a duckdb::Error as a single-line message.
pub fn user_message_from_duckdb(err: &duckdb::Error) -> String {
    use duckdb::Error as DE;

    match err {
        DE::DuckDBFailure(_, Some(msg)) => first_line(msg),
        DE::QueryReturnedNoRows => "The query returned no rows.".to_string(),
        DE::InvalidColumnIndex(idx) => format!("Column index {} is out of range.", idx),
        DE::InvalidColumnName(name) => format!("Column not found: {}.", name),
        #[allow(unreachable_patterns)]
        _ => first_line(&err.to_string()),
    }
}

/// Format an io::Error as a user-facing message by matching on ErrorKind.
pub fn user_message_from_io(err: &io::Error) -> String {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::NotFound => "File or directory not found.".to_string(),
        ErrorKind::PermissionDenied => "Permission denied. Check file access.".to_string(),
        ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            "Invalid or corrupted data.".to_string()
        }
        ErrorKind::UnexpectedEof => "Unexpected end of file.".to_string(),
        ErrorKind::OutOfMemory => "Out of memory.".to_string(),
        _ => {
            let msg = err.to_string();
            if msg.contains("No space left") {
                return "No space left on device. Free up disk space and try again.".to_string();
            }
            msg
        }
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("An error occurred")
        .to_string()
}

/// Format a color_eyre Report by downcasting to known error types.
/// The outermost context message is kept in front of the typed cause.
pub fn user_message_from_report(report: &color_eyre::eyre::Report) -> String {
    for (depth, cause) in report.chain().enumerate() {
        let typed = if let Some(de) = cause.downcast_ref::<duckdb::Error>() {
            Some(user_message_from_duckdb(de))
        } else {
            cause.downcast_ref::<io::Error>().map(user_message_from_io)
        };
        if let Some(msg) = typed {
            return if depth == 0 {
                msg
            } else {
                format!("{}: {}", first_line(&report.to_string()), msg)
            };
        }
    }
    first_line(&report.to_string())
}
