//! User-facing error reports.

use console::style;

use shiplio_deploy::DeployError;
use shiplio_log_stream::SessionError;

const SESSION_EXPIRED: &str = "Session expired. Please login again.";
const LOGIN_HINT: &str = "Run 'shiplio login' to get started.";

/// Lines describing `err` under `title`, or nothing if the failure has
/// already been shown (a failed build prints its own verdict).
pub fn failure_lines(title: &str, err: &anyhow::Error) -> Vec<String> {
    if let Some(DeployError::Session(SessionError::BuildFailed)) = err.downcast_ref::<DeployError>()
    {
        return Vec::new();
    }

    let mut lines = vec![format!("× {title}")];

    if let Some(DeployError::Upload(upload)) = err.downcast_ref::<DeployError>() {
        if upload.is_unauthorized() {
            lines.push(format!("  • {SESSION_EXPIRED}"));
            lines.push(format!("  • {LOGIN_HINT}"));
            return lines;
        }
        let details = upload.details();
        if !details.is_empty() {
            lines.extend(details.into_iter().map(|d| format!("  • {d}")));
            return lines;
        }
    }

    lines.push(format!("  • {err:#}"));
    lines
}

/// Prints a failure report on stderr.
pub fn failure(title: &str, err: &anyhow::Error) {
    tracing::debug!("{title}: {err:?}");
    for (i, line) in failure_lines(title, err).iter().enumerate() {
        if i == 0 {
            eprintln!("\n{}", style(line).red().bold());
        } else {
            eprintln!("{}", style(line).red());
        }
    }
}
