//! Terminal output for draws, winners and verification reports

use colored::{ColoredString, Colorize};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use draw_core::{Draw, DrawStatus, PaymentStatus, Winner, WinnerStatus};
use draw_engine::VerificationReport;
use std::collections::HashMap;
use uuid::Uuid;

pub fn print_section(title: &str) {
    println!("\n{}", format!("━━━ {} ━━━", title).bright_blue().bold());
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn payment_label(status: PaymentStatus) -> ColoredString {
    match status {
        PaymentStatus::Paid => status.as_str().green(),
        PaymentStatus::Pending => status.as_str().yellow(),
        PaymentStatus::Failed => status.as_str().red(),
    }
}

pub fn print_draw(draw: &Draw) {
    let status = match draw.status {
        DrawStatus::Completed => draw.status.as_str().green(),
        DrawStatus::Pending => draw.status.as_str().yellow(),
        DrawStatus::Failed => draw.status.as_str().red(),
    };

    println!("  {:<14} {}", "Id:", draw.id);
    println!("  {:<14} {}", "Status:", status);
    println!(
        "  {:<14} {} participants, {} entries",
        "Eligible:", draw.total_eligible_participants, draw.total_entries
    );
    println!("  {:<14} {}", "Executed by:", draw.executed_by);
    if let Some(strategy) = draw.strategy {
        println!("  {:<14} {}", "Strategy:", strategy);
    }
    if let Some(seed) = &draw.seed {
        println!("  {:<14} {}", "Seed:", seed);
    }
    if let Some(reason) = &draw.failure_reason {
        println!("  {:<14} {}", "Failure:", reason.red());
    }
}

pub fn print_winners(winners: &[Winner], tier_names: &HashMap<Uuid, String>) {
    if winners.is_empty() {
        println!("{}", "  No winners recorded.".yellow());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Tier").fg(Color::Cyan),
            Cell::new("Role").fg(Color::Cyan),
            Cell::new("MSISDN").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Payment").fg(Color::Cyan),
            Cell::new("Winner ID").fg(Color::Cyan),
        ]);

    for w in winners {
        let tier = tier_names
            .get(&w.prize_tier_id)
            .cloned()
            .unwrap_or_else(|| short_id(&w.prize_tier_id));
        let status_color = match w.status {
            WinnerStatus::Replaced => Color::Red,
            WinnerStatus::Confirmed => Color::Green,
            _ => Color::White,
        };
        let payment_color = match w.payment_status {
            PaymentStatus::Paid => Color::Green,
            PaymentStatus::Pending => Color::Yellow,
            PaymentStatus::Failed => Color::Red,
        };

        table.add_row(vec![
            Cell::new(tier),
            Cell::new(role(w)),
            Cell::new(&w.msisdn).fg(Color::Green),
            Cell::new(w.status.as_str()).fg(status_color),
            Cell::new(w.payment_status.as_str()).fg(payment_color),
            Cell::new(w.id.to_string()),
        ]);
    }

    println!("{table}");
}

pub fn print_verification(report: &VerificationReport) {
    print_section(&format!("Verify draw {}", report.draw_date));
    println!(
        "  {:<14} {}",
        "Strategy:",
        report
            .strategy
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".into())
    );
    println!(
        "  {:<14} {}",
        "Digest:",
        report.recorded_digest.as_deref().unwrap_or("-")
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Tier").fg(Color::Cyan),
            Cell::new("Winners").fg(Color::Cyan),
            Cell::new("Runner-ups").fg(Color::Cyan),
            Cell::new("Result").fg(Color::Cyan),
        ]);

    for tier in &report.tiers {
        let (result, color) = if tier.matches() {
            ("match", Color::Green)
        } else {
            ("MISMATCH", Color::Red)
        };
        table.add_row(vec![
            Cell::new(&tier.tier_name),
            Cell::new(tier.recorded_winners.len()),
            Cell::new(tier.recorded_runner_ups.len()),
            Cell::new(result).fg(color),
        ]);
    }
    println!("{table}");

    if report.is_match() {
        print_success("Draw reproduces from its recorded seed");
    } else {
        for m in &report.mismatches {
            println!("  {} {}", "✗".red(), m);
        }
    }
}

fn role(w: &Winner) -> String {
    match (w.runner_up_rank, w.is_runner_up) {
        (None, _) => "winner".to_string(),
        (Some(rank), true) => format!("runner-up #{}", rank),
        (Some(rank), false) => format!("promoted (#{})", rank),
    }
}

fn short_id(id: &Uuid) -> String {
    id.to_string()[..8].to_string()
}
