use crate::config::Config;
use crate::model::{week_label, Board, MONTHS, WEEKS};
use crate::server;
use crate::storage::DataDir;
use anyhow::{Context, Result};
use chrono::{Datelike, Local};

pub async fn serve(config: Config) -> Result<()> {
    server::serve(config).await
}

pub fn list(config: &Config, year: Option<i32>) -> Result<()> {
    let year = year.unwrap_or_else(|| Local::now().year());
    let board = DataDir::new(config.data_dir.clone()).scan(year);
    print!("{}", format_board(&board));
    Ok(())
}

pub fn add(config: &Config, program: String, deadline: String, name: String) -> Result<()> {
    let data = DataDir::new(config.data_dir.clone());
    let file = data
        .add_item(&program, &deadline, &name)
        .with_context(|| format!("adding {:?} to {}", name, program))?;
    println!("Added {}", file);
    Ok(())
}

pub fn reschedule(config: &Config, file: String, deadline: String) -> Result<()> {
    let data = DataDir::new(config.data_dir.clone());
    let outcome = data
        .reschedule(&file, &deadline)
        .with_context(|| format!("rescheduling {} to {}", file, deadline))?;
    println!("Deprecated {}", outcome.deprecated);
    println!("Updated {}", outcome.updated);
    Ok(())
}

fn format_board(board: &Board) -> String {
    let mut out = format!("Board: {}\n", board.year);
    for month in 1..=MONTHS {
        let empty = (1..=WEEKS).all(|w| board.items_in(month, w).is_empty());
        if empty {
            continue;
        }
        out.push_str(&format!("{:02}\n", month));
        for week in 1..=WEEKS {
            for item in board.items_in(month, week) {
                out.push_str(&format!(
                    "  [{}] {}: {} ({})\n",
                    week_label(week),
                    item.deadline,
                    item.title,
                    item.file
                ));
            }
        }
    }
    if board.placed() == 0 {
        out.push_str("  (empty)\n");
    }
    for warning in &board.warnings {
        out.push_str(&format!("warning: {}\n", warning));
    }
    out
}
