//! Control bot update handlers.
//!
//! Every message passes the access check first; commands are dispatched in
//! [`commands`], anything else gets a short hint.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message, types::ParseMode};
use tokio::time::sleep;
use tracing::warn;

use mlk_core::store::ControlFlags;

use crate::router::AppState;

mod commands;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user_id) = msg.from().map(|u| u.id.0 as i64) else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let flags = state.engine.store().control_flags();
    if !is_authorized(user_id, &flags, &state.admin_users) {
        reply(&bot, msg.chat.id, "Access is restricted. Contact the bot owner.").await;
        return Ok(());
    }

    if text.starts_with('/') {
        return commands::handle_command(&bot, &msg, text, user_id, &state).await;
    }

    reply(&bot, msg.chat.id, "Send /help for the list of commands.").await;
    Ok(())
}

pub(crate) fn is_admin(user_id: i64, flags: &ControlFlags, admin_users: &[i64]) -> bool {
    flags.admin_user == Some(user_id) || admin_users.contains(&user_id)
}

/// With access unrestricted everyone is served; otherwise admins only.
pub(crate) fn is_authorized(user_id: i64, flags: &ControlFlags, admin_users: &[i64]) -> bool {
    !flags.access_restricted || is_admin(user_id, flags, admin_users)
}

/// Send an HTML reply, retrying once when Telegram asks us to slow down.
pub(crate) async fn reply(bot: &Bot, chat_id: ChatId, html: &str) {
    const MAX_RETRIES: usize = 1;
    let mut attempts = 0usize;
    loop {
        match bot
            .send_message(chat_id, html.to_string())
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => return,
            Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                attempts += 1;
                sleep(d).await;
            }
            Err(e) => {
                warn!(error = %e, "control bot reply failed");
                return;
            }
        }
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
