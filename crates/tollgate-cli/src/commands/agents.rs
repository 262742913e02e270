//! Agent registry and task reset commands.

use anyhow::{Context as _, Result};
use chrono::Utc;
use tollgate_core::TaskId;
use tollgate_scheduler::{authorize_agent, create_agent, reset_task};

use super::Context;

pub async fn create(ctx: &Context, agent_id: &str, capabilities: Vec<String>) -> Result<()> {
    let (agent, token) = create_agent(&ctx.agents, agent_id, capabilities).await?;
    println!("Created agent {}", agent.agent_id);
    println!("Capabilities: {}", agent.capabilities.join(", "));
    println!("Auth token (shown once): {token}");
    Ok(())
}

pub async fn authorize(ctx: &Context, agent_id: &str) -> Result<()> {
    let token = authorize_agent(&ctx.agents, agent_id).await?;
    println!("New auth token for {agent_id} (shown once): {token}");
    Ok(())
}

pub async fn reset(ctx: &Context, task_id: &str) -> Result<()> {
    let id: TaskId = task_id
        .parse()
        .with_context(|| format!("Invalid task id: {task_id}"))?;
    let task = reset_task(&ctx.ledger, id, Utc::now()).await?;
    println!("Task {} ({}) is back in the queue", task.id, task.name);
    Ok(())
}
