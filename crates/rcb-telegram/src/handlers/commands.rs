use tracing::{error, info};

use rcb_core::{
    commands::{BotCommand, HELP_HTML},
    domain::{ChatId, UserId},
    errors::Error,
    formatting::escape_html,
    notice::UserInfo,
    security::{authorization_code, authorization_url, oauth_state},
    Result,
};

use crate::router::AppState;

/// Run a command and reply. Only a failed reply is returned; command errors are reported in chat.
pub(crate) async fn handle_command(
    state: &AppState,
    chat_id: ChatId,
    user_id: UserId,
    cmd: BotCommand,
) -> Result<()> {
    info!(command = cmd.name(), "command");
    match run(state, chat_id, user_id, cmd).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(error = %e, "command failed");
            state
                .messenger
                .send_html(chat_id, &error_html(&e))
                .await
                .map(|_| ())
        }
    }
}

async fn run(state: &AppState, chat_id: ChatId, user_id: UserId, cmd: BotCommand) -> Result<()> {
    let reply = match cmd {
        BotCommand::Start => {
            state.messenger.send_text(chat_id, "OK").await?;
            return Ok(());
        }
        BotCommand::Help => HELP_HTML.to_string(),
        BotCommand::Login => {
            let url = authorization_url(
                &state.cfg.fibapi_base_url,
                &state.cfg.fibapi_client_id,
                &state.cfg.fibapi_redirect_uri,
                &oauth_state(user_id),
            )?;
            login_html(&url)
        }
        BotCommand::Auth(input) if input.trim().is_empty() => {
            "Usage: /auth &lt;code or redirect URL&gt;".to_string()
        }
        BotCommand::Auth(input) => {
            let code = authorization_code(&input, &oauth_state(user_id))?;
            let info = state.upstream.authorize(&code).await?;
            format!("Hello, {}!", escape_html(&info.first_name))
        }
        BotCommand::Logout => logout_html(state.upstream.logout().await?).to_string(),
        BotCommand::WhoAmI => profile_html(&state.upstream.user_info().await?),
        BotCommand::Test => {
            // Sends the notice itself, or the "no notices" message.
            state.feed.push_latest().await?;
            return Ok(());
        }
        BotCommand::Debug(Some(id)) => {
            state.feed.send_notice(chat_id, id).await?;
            return Ok(());
        }
        BotCommand::Debug(None) => "Usage: /debug &lt;notice id&gt;".to_string(),
        BotCommand::Push => pushed_html(state.feed.push_new().await?),
        BotCommand::Unknown(name) => format!(
            "Unknown command <code>/{}</code>. Send /help.",
            escape_html(&name)
        ),
    };

    state.messenger.send_html(chat_id, &reply).await?;
    Ok(())
}

fn login_html(url: &str) -> String {
    format!(
        "<a href=\"{}\">Log in with your FIB account</a>\n\nThen send /auth followed by the code or the full address you were redirected to.",
        escape_html(url)
    )
}

fn logout_html(had_credentials: bool) -> &'static str {
    if had_credentials {
        "Logged out. Your FIB API token has been revoked."
    } else {
        "You are not logged in."
    }
}

fn profile_html(info: &UserInfo) -> String {
    let mut out = format!(
        "<b>{} {}</b>",
        escape_html(&info.first_name),
        escape_html(&info.last_names)
    );
    if let Some(username) = info.username.as_deref().filter(|u| !u.is_empty()) {
        out.push_str(&format!("\n<code>{}</code>", escape_html(username)));
    }
    out
}

fn pushed_html(delivered: usize) -> String {
    match delivered {
        0 => "<i>No new notices</i>".to_string(),
        1 => "Delivered 1 new notice.".to_string(),
        n => format!("Delivered {n} new notices."),
    }
}

fn error_html(e: &Error) -> String {
    let mut out = format!("⚠️ {}", escape_html(&e.to_string()));
    if e.requires_reauthorization() && !matches!(e, Error::CredentialsMissing) {
        out.push_str("\n\nSend /login to authorize again.");
    }
    out
}
