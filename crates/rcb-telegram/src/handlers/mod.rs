//! Telegram update handlers.
//!
//! Only the configured owner is served; everything else is logged and dropped.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::{info, warn};

use rcb_core::{
    commands::{parse_command, BotCommand},
    domain::{ChatId, UserId},
    security::is_authorized,
};

use crate::router::AppState;

mod commands;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));

    if !is_authorized(user_id, state.cfg.telegram_user_id) {
        info!(
            chat_id = chat_id.0,
            user_id = user_id.map(|u| u.0),
            "ignoring message from unauthorized user"
        );
        return Ok(());
    }
    let Some(user_id) = user_id else {
        return Ok(());
    };

    let Some(text) = msg.text() else {
        return Ok(());
    };

    // A pasted redirect URL is treated as `/auth <url>`.
    let cmd = parse_command(text).unwrap_or_else(|| {
        if text.trim_start().starts_with("http") {
            BotCommand::Auth(text.trim().to_string())
        } else {
            BotCommand::Help
        }
    });

    if let Err(e) = commands::handle_command(&state, chat_id, user_id, cmd).await {
        warn!(error = %e, "failed to reply to command");
    }
    Ok(())
}
