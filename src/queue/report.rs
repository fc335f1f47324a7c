//! Human-readable job report rendering.

use super::model::{Job, JobStatus};

pub fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Running => "running",
        JobStatus::Success => "success",
        JobStatus::PartialSuccess => "partial success",
        JobStatus::Failed => "failed",
        JobStatus::Blocked => "blocked",
        JobStatus::Canceled => "canceled",
    }
}

/// Render a job as a markdown report: status, scope, progress, evidence
/// pointers, and retry lineage. Everything a human needs to answer "what
/// happened and why" without reading logs.
pub fn render(job: &Job) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Job {}\n\n", job.job_id));
    out.push_str(&format!("- **Status**: {}\n", status_label(job.status)));
    out.push_str(&format!("- **Plan**: {}\n", job.plan_id));
    out.push_str(&format!("- **Scope**: {}\n", job.scope_summary));
    out.push_str(&format!(
        "- **Mode**: {}{}\n",
        if job.mode.simulated { "simulated" } else { "real portal" },
        if job.mode.dry_run { " (dry run)" } else { "" },
    ));
    out.push_str(&format!("- **Created**: {}\n", job.created_at.to_rfc3339()));
    if let Some(started) = job.started_at {
        out.push_str(&format!("- **Started**: {}\n", started.to_rfc3339()));
    }
    if let Some(finished) = job.finished_at {
        out.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    if let Some(retry_of) = &job.retry_of {
        out.push_str(&format!("- **Retry of**: {retry_of}\n"));
    }
    if job.cancel_requested && !job.status.is_terminal() {
        out.push_str("- **Cancellation requested** — stops at next item boundary\n");
    }

    let p = &job.progress;
    out.push_str(&format!(
        "\n## Progress\n\n{}% — {}\n\n\
         | total | success | failed | blocked | not attempted |\n\
         |-------|---------|--------|---------|---------------|\n\
         | {} | {} | {} | {} | {} |\n",
        p.percent,
        p.message,
        p.total_items,
        p.success,
        p.failed,
        p.blocked,
        p.total_items.saturating_sub(p.success + p.failed + p.blocked),
    ));

    if let Some(error) = &job.error {
        out.push_str(&format!("\n## Error\n\n{error}\n"));
    }
    if let (Some(run_id), Some(evidence)) = (&job.run_id, &job.evidence_path) {
        out.push_str(&format!(
            "\n## Evidence\n\nRun `{}` — artifacts under `{}`\n",
            run_id,
            evidence.display()
        ));
    }
    out
}
