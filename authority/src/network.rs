use crate::game::AuthorityGame;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{msg, timestamp_millis, ClientType, Envelope, RegisterData};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Largest simulation step applied after a stall
const MAX_DELTA_TIME: f32 = 1.0 / 20.0;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub tick_rate: u32,
    pub ping_interval: Duration,
    /// Base delay before the first reconnect; doubles on every further attempt
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    /// Period of self-generated throws. `None` waits for observers.
    pub auto_throw_interval: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: format!("ws://127.0.0.1:{}", shared::DEFAULT_WS_PORT),
            tick_rate: 60,
            ping_interval: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(3),
            max_reconnect_attempts: 5,
            auto_throw_interval: None,
        }
    }
}

impl ClientConfig {
    /// Rejects periods that would stall or panic the session timers.
    pub fn validate(&self) -> Result<(), String> {
        if tick_period(self.tick_rate).is_none() {
            return Err(format!("unusable tick rate {}", self.tick_rate));
        }
        if self.ping_interval.is_zero() {
            return Err("ping interval must be positive".to_string());
        }
        if self.auto_throw_interval.is_some_and(|every| every.is_zero()) {
            return Err("standalone throw interval must be positive".to_string());
        }
        Ok(())
    }
}

/// Period of one fixed tick, or `None` when `tick_rate` is 0 or so high the
/// period rounds to zero.
pub fn tick_period(tick_rate: u32) -> Option<Duration> {
    Duration::try_from_secs_f64(1.0 / tick_rate as f64)
        .ok()
        .filter(|period| !period.is_zero())
}

/// Parses a fractional-second interval flag. `0` disables the timer.
pub fn interval_from_secs(secs: f32) -> Result<Option<Duration>, String> {
    if secs == 0.0 {
        return Ok(None);
    }
    match Duration::try_from_secs_f32(secs) {
        Ok(period) if !period.is_zero() => Ok(Some(period)),
        Ok(_) => Err(format!("interval {}s is too short", secs)),
        Err(e) => Err(format!("invalid interval {}s: {}", secs, e)),
    }
}

/// Delay before reconnect attempt `attempt` (1-based): `base * 2^(attempt - 1)`.
pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent)
}

/// Connects the authority game to the relay and keeps it connected.
pub struct AuthorityClient {
    config: ClientConfig,
    game: AuthorityGame,
    started: Instant,
}

impl AuthorityClient {
    pub fn new(config: ClientConfig, game: AuthorityGame) -> Self {
        Self {
            config,
            game,
            started: Instant::now(),
        }
    }

    /// Runs sessions against the relay, reconnecting with exponential backoff.
    /// Returns an error once the reconnect attempts are exhausted.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.config.validate()?;
        let mut attempt = 0;

        loop {
            match connect_async(self.config.server_url.as_str()).await {
                Ok((socket, _)) => {
                    info!("Connected to relay at {}", self.config.server_url);
                    attempt = 0;
                    match self.session(socket).await {
                        Ok(()) => warn!("Relay closed the connection"),
                        Err(e) => error!("Connection lost: {}", e),
                    }
                }
                Err(e) => warn!("Could not reach {}: {}", self.config.server_url, e),
            }

            attempt += 1;
            if attempt > self.config.max_reconnect_attempts {
                return Err(format!(
                    "giving up after {} reconnect attempts",
                    self.config.max_reconnect_attempts
                )
                .into());
            }

            let delay = reconnect_delay(self.config.reconnect_interval, attempt);
            info!(
                "Reconnecting in {:?} (attempt {}/{})",
                delay, attempt, self.config.max_reconnect_attempts
            );
            sleep(delay).await;
        }
    }

    /// One connected session: register, then multiplex socket reads with the
    /// tick, ping and standalone-throw timers until the socket closes.
    async fn session(&mut self, socket: Socket) -> Result<(), Box<dyn std::error::Error>> {
        let (mut write, mut read) = socket.split();

        let register = Envelope::new(
            msg::REGISTER,
            &RegisterData {
                client_type: Some(ClientType::Main),
            },
        );
        write.send(Message::Text(register.encode()?)).await?;

        let period = tick_period(self.config.tick_rate).ok_or("unusable tick rate")?;
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut ping = interval(self.config.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately
        ping.tick().await;

        let auto_throw_every = self.config.auto_throw_interval;
        let mut auto_throw = interval(auto_throw_every.unwrap_or(Duration::from_secs(60)));
        auto_throw.tick().await;

        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => self.handle_text(&text),
                            Err(_) => warn!("Dropping non-UTF-8 binary frame"),
                        },
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                },

                _ = tick.tick() => {
                    let now = Instant::now();
                    let mut dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    if dt > MAX_DELTA_TIME {
                        debug!("Large delta time ({:.3}s), capping to {:.3}s", dt, MAX_DELTA_TIME);
                        dt = MAX_DELTA_TIME;
                    }

                    if let Some(result) = self.game.tick(self.started.elapsed(), dt) {
                        write.send(Message::Text(result.encode()?)).await?;
                    }
                },

                _ = ping.tick() => {
                    let ping = Envelope::bare(msg::PING).with_timestamp(timestamp_millis());
                    write.send(Message::Text(ping.encode()?)).await?;
                },

                _ = auto_throw.tick(), if auto_throw_every.is_some() => {
                    if let Err(e) = self.game.standalone_throw() {
                        debug!("Skipping standalone throw: {}", e);
                    }
                },
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        match Envelope::decode(text) {
            Ok(envelope) => self.game.handle_envelope(&envelope),
            Err(e) => warn!("Invalid message from relay: {}", e),
        }
    }
}
