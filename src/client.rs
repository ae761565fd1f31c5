//! Owned client value tying transport, session, dispatcher and capability
//! surface together.
//!
//! Lifecycle: [`CrawlClient::connect`] → [`CrawlClient::start_game`] →
//! capability calls → [`CrawlClient::teardown`]. There is no global instance.
//! Dropping the client without teardown leaves the socket tasks running until
//! the server hangs up.
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::capability::Capabilities;
use crate::config::Config;
use crate::dispatch::{Action, DispatchError, Dispatcher, GameStart, NewGame};
use crate::game::{SessionState, SharedSession};
use crate::metrics;
use crate::webtiles::Transport;

const TEARDOWN_GRACE: Duration = Duration::from_secs(1);
/// Escapes tried before quitting a resumed save.
const MAX_ESCAPES: usize = 3;

pub struct CrawlClient {
    config: Config,
    transport: Transport,
    session: SharedSession,
    dispatcher: Arc<Dispatcher>,
    capabilities: Capabilities,
    game_ids: Vec<String>,
}

impl CrawlClient {
    /// Connect and log in with the configured credentials.
    pub async fn connect(config: Config) -> Result<Self, DispatchError> {
        let session = SessionState::shared(config.dispatch.message_log_capacity);
        let conn = Transport::connect(&config.server, session.clone()).await?;
        let dispatcher = Arc::new(Dispatcher::new(
            session.clone(),
            conn.events,
            conn.transport.outbound(),
            conn.transport.link(),
            config.dispatch.clone(),
        ));
        debug!("Login exchange produced {} message(s)", conn.initial.len());
        Ok(Self {
            capabilities: Capabilities::new(dispatcher.clone()),
            transport: conn.transport,
            game_ids: conn.game_ids,
            session,
            dispatcher,
            config,
        })
    }

    pub fn game_ids(&self) -> &[String] {
        &self.game_ids
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Start a game with the configured character. A resumed save is quit and
    /// the game restarted once when `abandon_stale_saves` is set.
    pub async fn start_game(&self) -> Result<GameStart, DispatchError> {
        let game_id = self
            .config
            .game
            .game_id
            .clone()
            .or_else(|| self.game_ids.first().cloned())
            .ok_or_else(|| DispatchError::InvalidAction("the server offers no games".to_string()))?;
        let request = NewGame::from_config(game_id, &self.config.game);
        let start = self.dispatcher.start_game(&request).await?;
        if !(start.resumed && self.config.game.abandon_stale_saves) {
            return Ok(start);
        }

        info!("Abandoning stale save before starting fresh");
        self.abandon_current().await?;
        let restarted = self.dispatcher.start_game(&request).await?;
        if restarted.resumed {
            warn!("Server resumed a save again; continuing with it");
        }
        Ok(restarted)
    }

    async fn abandon_current(&self) -> Result<(), DispatchError> {
        for _ in 0..MAX_ESCAPES {
            let blocked = self.session.read().await.ui.blocker().is_some();
            if !blocked {
                break;
            }
            if let Err(e) = self.dispatcher.dispatch(Action::Escape).await {
                debug!("Escape before quit did not settle: {}", e);
            }
        }
        let result = self.dispatcher.dispatch(Action::Quit).await?;
        info!("Stale save abandoned ({} log line(s))", result.log_lines.len());
        Ok(())
    }

    /// Close the connection; any waiter observes `ConnectionLost`.
    pub async fn teardown(self) {
        self.transport.shutdown(TEARDOWN_GRACE).await;
        let m = metrics::snapshot();
        debug!(
            "Session metrics: frames={} decoded={} unrecognized={} decode_errors={} heartbeats={} actions={} turn_actions={} ui_blocks={} timeouts={} rejections={}",
            m.frames_received,
            m.messages_decoded,
            m.messages_unrecognized,
            m.decode_errors,
            m.heartbeats_sent,
            m.actions_dispatched,
            m.turn_actions,
            m.ui_blocks,
            m.settle_timeouts,
            m.server_rejections
        );
        info!("Client torn down");
    }
}
