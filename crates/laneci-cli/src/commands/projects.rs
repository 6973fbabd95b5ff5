//! Project commands.

use anyhow::Result;
use laneci_service::Services;

pub async fn list(services: &Services) -> Result<()> {
    let projects = services.projects().list().await?;
    if projects.is_empty() {
        println!("No projects");
        return Ok(());
    }
    for project in projects {
        println!(
            "{}  {:<24} {:<20} {}{}",
            project.id.short(),
            project.project_name,
            project.lane,
            project.repo_config.git_url,
            if project.enabled { "" } else { "  (disabled)" }
        );
    }
    Ok(())
}

pub async fn add(
    services: &Services,
    name: &str,
    git_url: &str,
    full_name: &str,
    lane: &str,
) -> Result<()> {
    let project = services
        .projects()
        .create(name, git_url, full_name, lane)
        .await?;
    println!("Added project {} ({})", project.project_name, project.id);
    Ok(())
}

pub async fn set_enabled(services: &Services, name: &str, enabled: bool) -> Result<()> {
    let projects = services.projects();
    let project = projects.get_by_name(name).await?;
    projects.set_enabled(project.id, enabled).await?;
    println!(
        "{} {}",
        if enabled { "Enabled" } else { "Disabled" },
        project.project_name
    );
    Ok(())
}

pub async fn remove(services: &Services, name: &str) -> Result<()> {
    let projects = services.projects();
    let project = projects.get_by_name(name).await?;
    projects.delete(project.id).await?;
    println!("Removed {}", project.project_name);
    Ok(())
}
