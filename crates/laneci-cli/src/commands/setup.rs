//! First-time setup commands.

use anyhow::{Context, Result};
use laneci_core::{GitHubCredential, ProviderCredential};
use laneci_service::Services;

pub async fn status(services: &Services) -> Result<()> {
    let onboarding = services.onboarding();
    let missing = onboarding.missing_keys();
    if missing.is_empty() {
        println!("All settings present");
    } else {
        println!("Missing settings:");
        for key in &missing {
            println!("  {}", key);
        }
    }

    println!(
        "Configuration repository: {} ({})",
        services.store.root().display(),
        if services.store.exists() { "present" } else { "not cloned" }
    );
    if onboarding.correct_setup().await? {
        println!("Setup complete");
    } else {
        println!("Setup incomplete");
    }
    Ok(())
}

pub async fn create_repo(services: &Services, name: &str) -> Result<()> {
    let repo = services
        .onboarding()
        .create_configuration_repository(name)
        .await
        .with_context(|| format!("Failed to create repository {}", name))?;
    println!("Created {} ({})", repo.full_name, repo.clone_url);
    println!("Set LANECI_CONFIG_REPO_URL={} and run `laneci setup init`", repo.clone_url);
    Ok(())
}

pub async fn init(services: &Services) -> Result<()> {
    services
        .onboarding()
        .trigger_initial_setup()
        .await
        .context("Failed to set up the configuration repository")?;
    println!("Configuration repository ready at {}", services.store.root().display());
    Ok(())
}

pub async fn seed(services: &Services, password: &str, token: Option<String>) -> Result<()> {
    let email = services
        .settings
        .ci_user
        .email
        .clone()
        .context("No CI user configured, set LANECI_CI_USER")?;

    let credential: Option<ProviderCredential> =
        token.map(|token| GitHubCredential::new(email.clone(), token).into());
    let user = services.onboarding().seed(&email, password, credential).await?;
    println!("Seeded CI user {} ({})", user.email, user.id.short());
    Ok(())
}
