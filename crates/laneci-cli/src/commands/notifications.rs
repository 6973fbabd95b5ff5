//! Notification commands.

use anyhow::Result;
use laneci_core::NotificationPriority;
use laneci_service::Services;

pub async fn list(services: &Services) -> Result<()> {
    for notification in services.notifications().list().await? {
        println!(
            "[{:?}] {}: {}",
            notification.priority, notification.name, notification.message
        );
    }
    Ok(())
}

pub async fn add(
    services: &Services,
    priority: NotificationPriority,
    name: &str,
    message: &str,
) -> Result<()> {
    match services
        .notifications()
        .create(priority, name, message)
        .await?
    {
        Some(_) => println!("Posted {}", name),
        None => println!("{} is already posted", name),
    }
    Ok(())
}

pub async fn remove(services: &Services, name: &str) -> Result<()> {
    let removed = services.notifications().delete(name).await?;
    println!("Removed {} notification(s)", removed);
    Ok(())
}
