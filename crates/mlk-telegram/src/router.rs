use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use mlk_core::engine::Engine;

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    /// Operators from config; always authorized, always admins.
    pub admin_users: Vec<i64>,
}

/// Serve the control bot until the dispatcher stops.
pub async fn run_polling(
    token: String,
    engine: Engine,
    admin_users: Vec<i64>,
) -> anyhow::Result<()> {
    let bot = Bot::new(token);

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "control bot started"),
        Err(e) => warn!(error = %e, "control bot get_me failed"),
    }

    let state = Arc::new(AppState {
        engine,
        admin_users,
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
