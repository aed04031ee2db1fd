// src/cli/status.rs — Lifetime history and spend

use std::sync::Arc;

use crate::infra::config::Config;
use crate::infra::paths;
use crate::memory::embeddings::LocalEmbedder;
use crate::memory::store::CycleRecord;

/// Display config location, store size, lifetime totals and recent cycles.
pub async fn show_status(config: &Config, recent: u32) -> anyhow::Result<()> {
    let config_path = paths::config_file_path();
    let db_path = config.memory.resolved_db_path();

    println!("ouroboros v{}", env!("CARGO_PKG_VERSION"));
    println!();

    if config_path.exists() {
        println!("  Config:     {} (loaded)", config_path.display());
    } else {
        println!("  Config:     (using defaults)");
    }
    println!(
        "  Models:     builder={} critic={} embedder={}",
        config.models.builder, config.models.critic, config.models.embedder
    );

    if !db_path.exists() {
        println!("  Database:   (not initialized)");
        return Ok(());
    }
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    println!(
        "  Database:   {} ({})",
        db_path.display(),
        format_bytes(db_size)
    );

    // Embedding is never used here; the local embedder avoids needing a key.
    let store = super::run::open_store(config, Arc::new(LocalEmbedder::default()))?;
    let summary = store.history_summary()?;
    println!();
    println!("  History:");
    println!(
        "    Cycles:     {} total ({} solved)",
        summary.cycles, summary.solved
    );
    println!("    Spend:      ${:.4}", summary.total_cost_usd);
    println!("    Skills:     {}", summary.skills);

    let cycles = store.recent_cycles(recent)?;
    if !cycles.is_empty() {
        println!();
        println!("  Recent:");
        for record in &cycles {
            println!("    {}", format_cycle_line(record));
        }
    }
    Ok(())
}

fn format_cycle_line(record: &CycleRecord) -> String {
    let objective: String = record.objective.chars().take(48).collect();
    format!(
        "{} {:<18} {:>2} attempt(s) ${:<8.4} {}",
        record.created_at.format("%Y-%m-%d %H:%M"),
        record.outcome,
        record.attempts,
        record.cost_usd,
        objective
    )
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1}MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.0KB");
        assert_eq!(format_bytes(3 * 1_048_576), "3.0MB");
    }

    #[test]
    fn test_format_cycle_line() {
        let record = CycleRecord {
            id: "c1".into(),
            task_id: "t1".into(),
            objective: "reverse a string".into(),
            outcome: "solved".into(),
            attempts: 2,
            cost_usd: 0.0125,
            skill_id: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
        };
        let line = format_cycle_line(&record);
        assert!(line.starts_with("2026-03-01 09:30 solved"));
        assert!(line.contains(" 2 attempt(s) $0.0125"));
        assert!(line.ends_with("reverse a string"));
    }
}
