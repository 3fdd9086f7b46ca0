use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{info, warn};

use mlk_core::{
    cursor::Progress,
    settings::{parse_list, Settings},
    stats::Statistics,
    store::ControlFlags,
};

use crate::router::AppState;

use super::{escape_html, is_admin, reply};

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

const HELP: &str = "🤖 <b>Masslooking bot</b>\n\n\
<b>📋 Commands:</b>\n\
/run - Start discovery and engagement\n\
/stop - Stop and discard pending channels\n\
/stats - Counters and search progress\n\
/settings - Show current settings\n\
/set - Change settings, one per line:\n\
<code>max channels: 150</code> (or ∞)\n\
<code>posts: 1-5</code>\n\
<code>delay: 20-1000</code> (or _ for none)\n\
/topics a, b - Set search topics\n\
/keywords a, b - Set search keywords\n\
/reset_stats - Zero the counters\n\
/lock, /unlock - Restrict access to the admin";

pub async fn handle_command(
    bot: &Bot,
    msg: &Message,
    text: &str,
    user_id: i64,
    state: &Arc<AppState>,
) -> ResponseResult<()> {
    let chat_id = msg.chat.id;
    let engine = &state.engine;
    let (cmd, arg) = parse_command(text);

    match cmd.as_str() {
        "start" | "help" => {
            let mut flags = engine.store().control_flags();
            if flags.admin_user.is_none() {
                flags.admin_user = Some(user_id);
                match engine.store().save_control_flags(&flags) {
                    Ok(()) => info!(user_id, "admin user set"),
                    Err(e) => warn!(error = %e, "failed to save admin user"),
                }
            }
            reply(bot, chat_id, HELP).await;
        }

        "run" => {
            let settings = engine.settings();
            if settings.topics.is_empty() || settings.keywords.is_empty() {
                reply(bot, chat_id, "⚠️ Set /topics and /keywords first.").await;
                return Ok(());
            }
            let body = match engine.start(settings).await {
                Ok(true) => "▶️ Started.".to_string(),
                Ok(false) => "Already running.".to_string(),
                Err(e) => format!("❌ Failed to start: <code>{}</code>", escape_html(&e.to_string())),
            };
            reply(bot, chat_id, &body).await;
        }

        "stop" => {
            let body = match engine.stop().await {
                Ok(true) => "⏹ Stopped.".to_string(),
                Ok(false) => "Not running.".to_string(),
                Err(e) => format!("❌ Failed to stop: <code>{}</code>", escape_html(&e.to_string())),
            };
            reply(bot, chat_id, &body).await;
        }

        "stats" | "status" => {
            let body = format_status(
                engine.is_running().await,
                &engine.statistics(),
                &engine.progress(),
                engine.processed_count(),
                engine.queue_len(),
            );
            reply(bot, chat_id, &body).await;
        }

        "settings" => {
            reply(bot, chat_id, &format_settings(&engine.settings())).await;
        }

        "set" => {
            let mut settings = engine.settings();
            let body = match settings.apply_text(&arg) {
                Ok(()) => match engine.save_settings(&settings) {
                    Ok(()) => format!("✅ Saved.{}\n\n{}", restart_note(state).await, format_settings(&settings)),
                    Err(e) => format!("❌ {}", escape_html(&e.to_string())),
                },
                Err(e) => format!("❌ {}", escape_html(&e.to_string())),
            };
            reply(bot, chat_id, &body).await;
        }

        "topics" | "keywords" => {
            let mut settings = engine.settings();
            let list = parse_list(&arg);
            if list.is_empty() {
                let current = if cmd == "topics" {
                    &settings.topics
                } else {
                    &settings.keywords
                };
                let body = format!("Current {cmd}: {}", escape_html(&join_or_none(current)));
                reply(bot, chat_id, &body).await;
                return Ok(());
            }
            if cmd == "topics" {
                settings.topics = list;
            } else {
                settings.keywords = list;
            }
            let body = match engine.save_settings(&settings) {
                Ok(()) => format!("✅ Saved {cmd}.{}", restart_note(state).await),
                Err(e) => format!("❌ {}", escape_html(&e.to_string())),
            };
            reply(bot, chat_id, &body).await;
        }

        "lock" | "unlock" => {
            let mut flags = engine.store().control_flags();
            if !is_admin(user_id, &flags, &state.admin_users) {
                reply(bot, chat_id, "Only the admin can change access.").await;
                return Ok(());
            }
            flags.access_restricted = cmd == "lock";
            let body = match engine.store().save_control_flags(&flags) {
                Ok(()) => access_line(&flags),
                Err(e) => format!("❌ {}", escape_html(&e.to_string())),
            };
            reply(bot, chat_id, &body).await;
        }

        "reset_stats" => {
            engine.reset_statistics();
            reply(bot, chat_id, "🔄 Statistics reset.").await;
        }

        _ => {
            reply(bot, chat_id, "Unknown command. Send /help.").await;
        }
    }

    Ok(())
}

async fn restart_note(state: &AppState) -> &'static str {
    if state.engine.is_running().await {
        " Applies after /stop and /run."
    } else {
        ""
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

fn access_line(flags: &ControlFlags) -> String {
    if flags.access_restricted {
        "🔒 Access restricted to the admin.".to_string()
    } else {
        "🔓 Access open.".to_string()
    }
}

fn format_settings(s: &Settings) -> String {
    let max = match s.max_channels {
        Some(n) => n.to_string(),
        None => "∞".to_string(),
    };
    let delay = if s.delay_range.is_zero() {
        "none".to_string()
    } else {
        format!("{}-{} s", s.delay_range.min(), s.delay_range.max())
    };
    format!(
        "⚙️ <b>Settings</b>\n\
Max channels: {max}\n\
Posts per channel: {}-{}\n\
Delay between actions: {delay}\n\
Topics: {}\n\
Keywords: {}",
        s.posts_range.min(),
        s.posts_range.max(),
        escape_html(&join_or_none(&s.topics)),
        escape_html(&join_or_none(&s.keywords)),
    )
}

fn format_status(
    running: bool,
    stats: &Statistics,
    progress: &Progress,
    processed: usize,
    queued: usize,
) -> String {
    let state = if running { "▶️ Running" } else { "⏹ Stopped" };
    let mut out = format!(
        "📊 <b>Statistics</b>\n\
{state}\n\n\
Comments sent: {}\n\
Reactions set: {}\n\
Channels processed: {}\n\
Errors: {}\n\
Processed (all time): {processed}\n\
Queued: {queued}",
        stats.comments_sent, stats.reactions_set, stats.channels_processed, stats.errors,
    );

    if progress.total_combinations > 0 {
        let current = match (progress.cooldown_until, &progress.current_topic, &progress.current_keyword) {
            (Some(until), _, _) => format!("cooling down until {}", until.format("%H:%M UTC")),
            (None, Some(t), Some(k)) => format!("{} / {}", escape_html(t), escape_html(k)),
            _ => "cycle complete".to_string(),
        };
        out.push_str(&format!(
            "\n\n🔎 <b>Search</b>\n\
Combination: {}/{} ({:.1}%)\n\
Current: {current}\n\
Found channels: {}",
            progress.current_combination,
            progress.total_combinations,
            progress.progress_percent,
            progress.found_channels,
        ));
        if let Some(last) = progress.last_search_time {
            out.push_str(&format!("\nLast search: {}", last.format("%Y-%m-%d %H:%M UTC")));
        }
    }
    out
}
