use obs_deploy_core::manifest::ManifestOutcome;
use obs_deploy_core::readiness::ReadinessOutcome;
use obs_deploy_core::reconcile::ReconcileReport;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    // Calculate column widths
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let render = |cells: Vec<String>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{:width$}", cell, width = w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", render(headers.iter().map(|h| h.to_string()).collect()));
    println!(
        "{}",
        widths
            .iter()
            .map(|&w| "-".repeat(w))
            .collect::<Vec<_>>()
            .join("  ")
    );
    for row in rows {
        println!("{}", render(row));
    }
}

fn snake(value: &impl Serialize) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// One row per reconciliation step: STEP, RESULT, DETAIL.
pub fn summary_rows(report: &ReconcileReport) -> Vec<Vec<String>> {
    let mut rows = vec![
        vec![
            "namespace".to_string(),
            snake(&report.namespace_outcome),
            report.namespace.clone(),
        ],
        vec![
            "repositories".to_string(),
            "refreshed".to_string(),
            report.repositories.join(", "),
        ],
    ];

    for r in &report.releases {
        let values = r
            .values
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "chart defaults".to_string());
        rows.push(vec![
            format!("release/{}", r.role),
            snake(&r.action),
            format!("{} ({}, {})", r.release, r.chart, values),
        ]);
    }

    rows.push(vec![
        "secret".to_string(),
        snake(&report.secret),
        String::new(),
    ]);

    rows.push(match &report.manifests {
        ManifestOutcome::Applied { resources } => vec![
            "manifests".to_string(),
            "applied".to_string(),
            format!("{} resource(s)", resources.len()),
        ],
        ManifestOutcome::Skipped { reason } => {
            vec!["manifests".to_string(), "skipped".to_string(), reason.clone()]
        }
    });

    rows.push(match &report.readiness {
        ReadinessOutcome::Ready { polls } => vec![
            "readiness".to_string(),
            "ready".to_string(),
            format!("{polls} poll(s)"),
        ],
        ReadinessOutcome::TimedOut { pending, .. } => vec![
            "readiness".to_string(),
            "timed_out".to_string(),
            format!("{} pod(s) not ready", pending.len()),
        ],
    });

    rows
}

pub fn print_summary(report: &ReconcileReport) {
    print_table(&["STEP", "RESULT", "DETAIL"], summary_rows(report));
    if !report.warnings.is_empty() {
        println!();
        for w in &report.warnings {
            println!("warning: {w}");
        }
    }
}
