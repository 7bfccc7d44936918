//! MPRIS player on the D-Bus session bus
//!
//! Talks to the player with plain method calls (`Properties.Get`, `AddTrack`, `Next`,
//! `GetTracksMetadata`) and listens for `PropertiesChanged` through a match rule
//! bound to the player's unique name. Wire values are decoded into
//! [`PropertyValue`] here; nothing above this module sees zbus types.

use super::types::{
    BackendError, ChangeFilter, ChangeStream, PlayerCommand, PropertiesChanged, PropertyValue,
    APPEND_TRACK,
};
use super::{PlayerBackend, PLAYER_INTERFACE, PLAYER_PATH, TRACKLIST_INTERFACE};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zbus::fdo::DBusProxy;
use zbus::message::Type as MessageType;
use zbus::names::BusName;
use zbus::zvariant::{ObjectPath, OwnedValue, Value};
use zbus::{Connection, MatchRule, Message, MessageStream};

const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Notification buffer between the bus reader and the detector
const NOTIFICATION_BUFFER: usize = 256;

/// Backend driving a player over D-Bus
pub struct DbusPlayer {
    connection: Connection,
    bus_name: String,
}

impl DbusPlayer {
    /// Connect to the session bus and address the player at `bus_name`
    pub async fn session(bus_name: impl Into<String>) -> Result<Self, BackendError> {
        let connection = Connection::session()
            .await
            .map_err(|e| BackendError::Disconnected(format!("session bus: {}", e)))?;
        let bus_name = bus_name.into();
        info!("Connected to the session bus for {}", bus_name);

        Ok(Self {
            connection,
            bus_name,
        })
    }

    async fn call<B>(
        &self,
        interface: &str,
        method: &str,
        body: &B,
    ) -> Result<Message, BackendError>
    where
        B: serde::Serialize + zbus::zvariant::DynamicType,
    {
        self.connection
            .call_method(
                Some(self.bus_name.as_str()),
                PLAYER_PATH,
                Some(interface),
                method,
                body,
            )
            .await
            .map_err(backend_error)
    }

    /// Unique name currently owning `name`
    async fn owner_of(&self, name: &str) -> Result<String, BackendError> {
        let bus = BusName::try_from(name)
            .map_err(|e| BackendError::Malformed(format!("bus name {}: {}", name, e)))?;
        let proxy = DBusProxy::new(&self.connection).await.map_err(backend_error)?;
        let owner = proxy.get_name_owner(bus).await.map_err(fdo_error)?;
        Ok(owner.to_string())
    }
}

#[async_trait]
impl PlayerBackend for DbusPlayer {
    async fn read_property(
        &self,
        interface: &str,
        name: &str,
    ) -> Result<PropertyValue, BackendError> {
        let reply = self
            .call(PROPERTIES_INTERFACE, "Get", &(interface, name))
            .await?;
        let value: OwnedValue = reply.body().deserialize().map_err(malformed)?;
        Ok(decode(&value))
    }

    async fn invoke(&self, command: PlayerCommand) -> Result<PropertyValue, BackendError> {
        match command {
            PlayerCommand::AddTrack {
                uri,
                set_as_current,
            } => {
                let after = ObjectPath::try_from(APPEND_TRACK).map_err(malformed)?;
                self.call(
                    TRACKLIST_INTERFACE,
                    "AddTrack",
                    &(uri.as_str(), after, set_as_current),
                )
                .await?;
                Ok(PropertyValue::Unit)
            }
            PlayerCommand::Next => {
                self.call(PLAYER_INTERFACE, "Next", &()).await?;
                Ok(PropertyValue::Unit)
            }
            PlayerCommand::GetTracksMetadata { slots } => {
                let paths = slots
                    .iter()
                    .map(|slot| ObjectPath::try_from(slot.as_str()))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(malformed)?;
                let reply = self
                    .call(TRACKLIST_INTERFACE, "GetTracksMetadata", &(paths,))
                    .await?;
                let entries: Vec<HashMap<String, OwnedValue>> =
                    reply.body().deserialize().map_err(malformed)?;

                Ok(PropertyValue::Array(
                    entries.iter().map(decode_map).collect(),
                ))
            }
        }
    }

    async fn subscribe_changes(&self, filter: ChangeFilter) -> Result<ChangeStream, BackendError> {
        // Signals carry the sender's unique name, so the rule must use it too
        let owner = self.owner_of(&filter.sender).await?;
        let rule = MatchRule::builder()
            .msg_type(MessageType::Signal)
            .sender(owner.as_str())
            .and_then(|b| b.interface(PROPERTIES_INTERFACE))
            .and_then(|b| b.member("PropertiesChanged"))
            .and_then(|b| b.path(filter.path.as_str()))
            .map_err(|e| BackendError::Malformed(format!("match rule: {}", e)))?
            .build();
        debug!("Adding PropertiesChanged match rule for {} ({})", filter.sender, owner);

        // AddMatch happens here; the bus refusing it is a rejection
        let stream = MessageStream::for_match_rule(rule, &self.connection, None)
            .await
            .map_err(|e| BackendError::Rejected(format!("AddMatch: {}", e)))?;

        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        tokio::spawn(forward_changes(stream, filter, tx));
        Ok(ChangeStream::new(rx))
    }
}

/// Pump matching signals into the change stream until either side closes
async fn forward_changes(
    stream: MessageStream,
    filter: ChangeFilter,
    tx: mpsc::Sender<PropertiesChanged>,
) {
    tokio::pin!(stream);
    loop {
        let message = tokio::select! {
            _ = tx.closed() => break,
            message = stream.next() => message,
        };

        match message {
            Some(Ok(message)) => match properties_changed(&message) {
                Ok(change) if filter.matches(&change) => {
                    if tx.send(change).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Ignoring PropertiesChanged from {}: {}", filter.sender, e),
            },
            Some(Err(e)) => {
                warn!("Notification stream from {} failed: {}", filter.sender, e);
                break;
            }
            None => break,
        }
    }
    debug!("Stopped forwarding notifications from {}", filter.sender);
}

fn properties_changed(message: &Message) -> Result<PropertiesChanged, BackendError> {
    let (interface, changed, invalidated): (String, HashMap<String, OwnedValue>, Vec<String>) =
        message.body().deserialize().map_err(malformed)?;

    Ok(PropertiesChanged {
        interface,
        changed: changed
            .iter()
            .map(|(name, value)| (name.clone(), decode(value)))
            .collect(),
        invalidated,
    })
}

/// Decode a wire value, unwrapping nested variants
fn decode(value: &Value<'_>) -> PropertyValue {
    match value {
        Value::Bool(v) => PropertyValue::Bool(*v),
        Value::U8(v) => PropertyValue::UInt64(u64::from(*v)),
        Value::U16(v) => PropertyValue::UInt64(u64::from(*v)),
        Value::U32(v) => PropertyValue::UInt64(u64::from(*v)),
        Value::U64(v) => PropertyValue::UInt64(*v),
        Value::I16(v) => PropertyValue::Int64(i64::from(*v)),
        Value::I32(v) => PropertyValue::Int64(i64::from(*v)),
        Value::I64(v) => PropertyValue::Int64(*v),
        Value::F64(v) => PropertyValue::Double(*v),
        Value::Str(s) => PropertyValue::Str(s.as_str().to_string()),
        Value::ObjectPath(p) => PropertyValue::ObjectPath(p.as_str().to_string()),
        Value::Value(inner) => decode(inner),
        Value::Array(items) => PropertyValue::Array(items.iter().map(decode).collect()),
        Value::Dict(dict) => PropertyValue::Dict(
            dict.iter()
                .filter_map(|(key, value)| match key {
                    Value::Str(key) => Some((key.as_str().to_string(), decode(value))),
                    _ => None,
                })
                .collect(),
        ),
        _ => PropertyValue::Unit,
    }
}

fn decode_map(map: &HashMap<String, OwnedValue>) -> PropertyValue {
    PropertyValue::Dict(
        map.iter()
            .map(|(key, value)| (key.clone(), decode(value)))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn malformed(e: impl std::fmt::Display) -> BackendError {
    BackendError::Malformed(e.to_string())
}

/// Error replies are rejections, everything else a transport failure
fn backend_error(e: zbus::Error) -> BackendError {
    match &e {
        zbus::Error::MethodError(..) | zbus::Error::FDO(_) => BackendError::Rejected(e.to_string()),
        zbus::Error::Variant(_) | zbus::Error::InvalidReply => BackendError::Malformed(e.to_string()),
        _ => BackendError::Disconnected(e.to_string()),
    }
}

fn fdo_error(e: zbus::fdo::Error) -> BackendError {
    match e {
        zbus::fdo::Error::ZBus(e) => backend_error(e),
        other => BackendError::Rejected(other.to_string()),
    }
}
