//! Build commands.

use anyhow::{Context, Result};
use laneci_core::{BuildParameters, BuildRecord, BuildStatus, ResourceId};
use laneci_service::Services;

fn print_summary(build: &BuildRecord) {
    let lane = match &build.platform {
        Some(platform) => format!("{} {}", platform, build.lane),
        None => build.lane.clone(),
    };
    println!(
        "#{:<4} {}  {:<8} {:<20} {}",
        build.number,
        build.id.short(),
        build.status.to_string(),
        lane,
        build.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

pub async fn list(services: &Services, project: &str, unfinished: bool) -> Result<()> {
    let project = services.projects().get_by_name(project).await?;
    let builds = services.builds();
    let records = if unfinished {
        builds.unfinished_builds(project.id).await?
    } else {
        builds.list_builds(project.id).await?
    };

    if records.is_empty() {
        println!("No builds for {}", project.project_name);
    }
    for build in &records {
        print_summary(build);
    }
    Ok(())
}

pub async fn show(services: &Services, id: &str) -> Result<()> {
    let id: ResourceId = id
        .parse()
        .with_context(|| format!("Invalid build ID: {}", id))?;
    let build = services.builds().get_build(id).await?;

    print_summary(&build);
    for (key, value) in &build.parameters {
        println!("  {}={}", key, value);
    }
    println!();
    for row in &build.rows {
        println!("{}", row.transcript_line());
    }
    if let Some(error) = &build.error {
        println!("\nError: {}", error.message);
        for line in &error.context {
            println!("  {}", line);
        }
    }
    for artifact in &build.artifacts {
        println!("Artifact: {} {}", artifact.kind, artifact.path);
    }
    Ok(())
}

/// Trigger a build and stream its rows until it finishes.
pub async fn trigger(services: &Services, project: &str, parameters: BuildParameters) -> Result<()> {
    let project = services.projects().get_by_name(project).await?;
    let builds = services.builds();

    let id = builds
        .trigger_build(project.id, parameters, |row| {
            println!("[{}] {}", row.row_type, row.message);
        })
        .await
        .with_context(|| format!("Failed to trigger {}", project.project_name))?;
    println!("Build {} started for {}", id.short(), project.project_name);

    let build = builds.wait(id).await?;
    print_summary(&build);

    match build.status {
        BuildStatus::Success => Ok(()),
        _ => {
            let reason = build
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "lane reported a failure".to_string());
            anyhow::bail!("Build #{} failed: {}", build.number, reason)
        }
    }
}
