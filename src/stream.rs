//! Marketplace event stream client.
//!
//! The stream speaks the Phoenix channel protocol (v2 array frames) over a
//! WebSocket: join `collection:<slug>`, heartbeat on the `phoenix` topic, and
//! receive `item_sold` / `item_listed` pushes on the collection topic.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use futures_util::{SinkExt, StreamExt};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

/// Protocol version requested from the socket.
const PHOENIX_VSN: &str = "2.0.0";

/// Initial and maximum delay between reconnect attempts.
const RECONNECT_BASE: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(60);

const ITEM_SOLD: &str = "item_sold";
const ITEM_LISTED: &str = "item_listed";

fn default_decimals() -> u32 {
    18
}

/// Amounts arrive as decimal strings, occasionally as bare numbers.
fn amount_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("expected amount, got {other}"))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemRef {
    /// `<chain>/<contract>/<token id>`
    pub nft_id: String,
    #[serde(default)]
    pub permalink: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentToken {
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemSold {
    pub item: ItemRef,
    #[serde(deserialize_with = "amount_string")]
    pub sale_price: String,
    pub payment_token: PaymentToken,
    #[serde(default)]
    pub maker: Option<Account>,
    #[serde(default)]
    pub taker: Option<Account>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemListed {
    pub item: ItemRef,
    #[serde(deserialize_with = "amount_string")]
    pub base_price: String,
    pub payment_token: PaymentToken,
    #[serde(default)]
    pub maker: Option<Account>,
}

/// Body of a pushed event: `{ event_type, sent_at, payload }`.
#[derive(Debug, Clone, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    sent_at: Option<String>,
    payload: T,
}

#[derive(Debug, Clone)]
pub enum StreamEvent {
    ItemSold(ItemSold),
    ItemListed(ItemListed),
}

impl StreamEvent {
    pub fn item(&self) -> &ItemRef {
        match self {
            StreamEvent::ItemSold(e) => &e.item,
            StreamEvent::ItemListed(e) => &e.item,
        }
    }

    /// Token id from the last segment of `nft_id`.
    pub fn token_id(&self) -> Option<&str> {
        let id = self.item().nft_id.split('/').nth(2)?;
        (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then_some(id)
    }
}

/// A decoded server frame.
#[derive(Debug)]
pub enum Inbound {
    Reply {
        msg_ref: Option<String>,
        ok: bool,
        response: Value,
    },
    Event(StreamEvent),
    ChannelClosed {
        topic: String,
        event: String,
    },
    Other {
        topic: String,
        event: String,
    },
}

/// `[join_ref, ref, topic, event, payload]`
#[derive(Debug, Deserialize)]
struct Frame(Option<String>, Option<String>, String, String, Value);

/// Decode one text frame. Malformed frames and event payloads are errors.
pub fn decode_frame(text: &str) -> Result<Inbound> {
    let Frame(_join_ref, msg_ref, topic, event, payload) =
        serde_json::from_str(text).context("not a phoenix frame")?;
    match event.as_str() {
        "phx_reply" => {
            let ok = payload.get("status").and_then(Value::as_str) == Some("ok");
            let response = payload.get("response").cloned().unwrap_or(Value::Null);
            Ok(Inbound::Reply {
                msg_ref,
                ok,
                response,
            })
        }
        ITEM_SOLD => {
            let env: Envelope<ItemSold> =
                serde_json::from_value(payload).context("malformed item_sold payload")?;
            debug!("item_sold sent_at={:?}", env.sent_at);
            Ok(Inbound::Event(StreamEvent::ItemSold(env.payload)))
        }
        ITEM_LISTED => {
            let env: Envelope<ItemListed> =
                serde_json::from_value(payload).context("malformed item_listed payload")?;
            debug!("item_listed sent_at={:?}", env.sent_at);
            Ok(Inbound::Event(StreamEvent::ItemListed(env.payload)))
        }
        "phx_error" | "phx_close" => Ok(Inbound::ChannelClosed { topic, event }),
        _ => Ok(Inbound::Other { topic, event }),
    }
}

fn frame(join_ref: Option<&str>, msg_ref: &str, topic: &str, event: &str) -> String {
    json!([join_ref, msg_ref, topic, event, {}]).to_string()
}

/// Subscription to one collection's sale and listing events.
pub struct StreamClient {
    socket_url: Url,
    topic: String,
    heartbeat: Duration,
}

impl StreamClient {
    pub fn new(base: &str, token: &str, collection_slug: &str, heartbeat: Duration) -> Result<Self> {
        Ok(Self {
            socket_url: socket_url(base, token)?,
            topic: format!("collection:{collection_slug}"),
            heartbeat,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Stay subscribed forever, reconnecting with a doubling delay.
    ///
    /// Each event's handler is awaited before the next frame is read.
    pub async fn run<F, Fut>(&self, mut on_event: F)
    where
        F: FnMut(StreamEvent) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut delay = RECONNECT_BASE;
        loop {
            let mut joined = false;
            if let Err(e) = self.session(&mut on_event, &mut joined).await {
                warn!("Stream session for {} ended: {e:#}", self.topic);
            }
            if joined {
                delay = RECONNECT_BASE;
            }
            info!("Reconnecting in {delay:?}");
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(RECONNECT_MAX);
        }
    }

    async fn session<F, Fut>(&self, on_event: &mut F, joined: &mut bool) -> Result<()>
    where
        F: FnMut(StreamEvent) -> Fut,
        Fut: Future<Output = ()>,
    {
        info!(
            "Connecting to {}://{}{}",
            self.socket_url.scheme(),
            self.socket_url.host_str().unwrap_or(""),
            self.socket_url.path()
        );
        let (ws_stream, _response) = connect_async(self.socket_url.as_str())
            .await
            .context("websocket connect failed")?;
        let (mut write, mut read) = ws_stream.split();

        let mut next_ref: u64 = 1;
        let join_ref = next_ref.to_string();
        write
            .send(Message::Text(
                frame(Some(&join_ref), &join_ref, &self.topic, "phx_join").into(),
            ))
            .await?;

        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    next_ref += 1;
                    let hb = frame(None, &next_ref.to_string(), "phoenix", "heartbeat");
                    write.send(Message::Text(hb.into())).await?;
                }
                msg = read.next() => {
                    let msg = msg.ok_or_else(|| anyhow!("stream ended"))??;
                    match msg {
                        Message::Text(text) => match decode_frame(text.as_str()) {
                            Ok(Inbound::Reply { msg_ref, ok, response }) => {
                                if msg_ref.as_deref() == Some(join_ref.as_str()) {
                                    if !ok {
                                        bail!("join of {} rejected: {response}", self.topic);
                                    }
                                    info!("Subscribed to {}", self.topic);
                                    *joined = true;
                                }
                            }
                            Ok(Inbound::Event(event)) => on_event(event).await,
                            Ok(Inbound::ChannelClosed { topic, event }) => {
                                bail!("{event} on {topic}");
                            }
                            Ok(Inbound::Other { topic, event }) => {
                                debug!("Ignoring {event} on {topic}");
                            }
                            Err(e) => warn!("Dropping frame: {e:#}"),
                        },
                        Message::Close(frame) => bail!("closed by server: {frame:?}"),
                        _ => {}
                    }
                }
            }
        }
    }
}

/// `<base>/websocket?token=..&vsn=2.0.0`
pub fn socket_url(base: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/websocket", base.trim_end_matches('/')))
        .with_context(|| format!("invalid stream url {base}"))?;
    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair("vsn", PHOENIX_VSN);
    Ok(url)
}
