// world_server/server/src/systems/world_handlers.rs
//! Handlers for opcodes that are not bound to a zone: login, character
//! management and zone admission.

use crate::core::constants::{CHARACTER_NAME_MAX_LEN, CHARACTER_NAME_MIN_LEN};
use crate::core::error::{ServerError, ServerResult, StoreError};
use crate::core::types::ZoneKey;
use crate::network::framing::decode_payload;
use crate::network::messages;
use crate::network::opcodes::OpCode;
use crate::network::session::Session;
use crate::network::world_handler::{GlobalHandler, WorldHandler};
use crate::persistence::{with_timeout, NewCharacter};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Maps a login token to an account identity.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> Option<String>;
}

/// Development mode: every login lands on the shared `local` account.
#[derive(Debug, Default)]
pub struct LocalTokenValidator;

impl TokenValidator for LocalTokenValidator {
    fn validate(&self, _token: &str) -> Option<String> {
        Some("local".to_string())
    }
}

/// Treats the token itself as the identity. Empty tokens are refused.
#[derive(Debug, Default)]
pub struct PassthroughTokenValidator;

impl TokenValidator for PassthroughTokenValidator {
    fn validate(&self, token: &str) -> Option<String> {
        let token = token.trim();
        (!token.is_empty()).then(|| token.to_string())
    }
}

pub fn global_handlers() -> HashMap<OpCode, GlobalHandler> {
    let mut handlers: HashMap<OpCode, GlobalHandler> = HashMap::new();
    handlers.insert(OpCode::JwtLogin, handle_jwt_login);
    handlers.insert(OpCode::CharacterCreate, handle_character_create);
    handlers.insert(OpCode::DeleteCharacter, handle_delete_character);
    handlers.insert(OpCode::EnterWorld, handle_enter_world);
    handlers.insert(OpCode::ZoneSession, handle_zone_session);
    handlers
}

pub fn is_valid_character_name(name: &str) -> bool {
    (CHARACTER_NAME_MIN_LEN..=CHARACTER_NAME_MAX_LEN).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphabetic())
}

async fn send_character_list(world: &WorldHandler, session: &Session) -> ServerResult<()> {
    let account_id = session
        .account_id()
        .ok_or_else(|| ServerError::NotFound(format!("account for session {}", session.id())))?;
    let characters = with_timeout(world.storage_timeout(), world.store().character_list(account_id)).await?;
    let list = messages::CharacterList { characters: characters.iter().map(|c| c.summary()).collect() };
    session.send_stream(OpCode::CharacterList, &list)
}

pub fn handle_jwt_login<'a>(
    world: &'a WorldHandler,
    session: &'a Arc<Session>,
    payload: &'a [u8],
) -> BoxFuture<'a, ServerResult<()>> {
    Box::pin(async move {
        let login: messages::JwtLogin = decode_payload(payload)?;
        let Some(identity) = world.validator().validate(&login.token) else {
            warn!("Session {}: login token rejected", session.id());
            return session.send_stream(OpCode::JwtResponse, &messages::JwtResponse { status: 0 });
        };

        let account_id = match with_timeout(world.storage_timeout(), world.store().get_or_create_account(&identity)).await {
            Ok(id) => id,
            Err(e) => {
                session.send_stream(OpCode::JwtResponse, &messages::JwtResponse { status: 0 })?;
                return Err(e.into());
            }
        };
        session.set_account_id(account_id);
        session.set_authenticated(true);
        info!("Session {} authenticated as account {}", session.id(), account_id);

        session.send_stream(OpCode::JwtResponse, &messages::JwtResponse { status: 1 })?;
        send_character_list(world, session).await
    })
}

pub fn handle_character_create<'a>(
    world: &'a WorldHandler,
    session: &'a Arc<Session>,
    payload: &'a [u8],
) -> BoxFuture<'a, ServerResult<()>> {
    Box::pin(async move {
        let request: messages::CharacterCreate = decode_payload(payload)?;
        let account_id = session
            .account_id()
            .ok_or_else(|| ServerError::NotFound(format!("account for session {}", session.id())))?;

        let created = if is_valid_character_name(&request.name) {
            let new = NewCharacter {
                name: request.name.clone(),
                race: request.race,
                char_class: request.char_class,
                gender: request.gender,
                start_zone: request.start_zone,
            };
            match with_timeout(world.storage_timeout(), world.store().create_character(account_id, new)).await {
                Ok(record) => {
                    info!("Account {} created character {}", account_id, record.name);
                    true
                }
                Err(e) => {
                    warn!("Session {}: character create failed: {}", session.id(), e);
                    false
                }
            }
        } else {
            warn!("Session {}: invalid character name {:?}", session.id(), request.name);
            false
        };

        session.send_stream(OpCode::CharacterCreateResult, &messages::IntValue { value: i64::from(created) })?;
        send_character_list(world, session).await
    })
}

pub fn handle_delete_character<'a>(
    world: &'a WorldHandler,
    session: &'a Arc<Session>,
    payload: &'a [u8],
) -> BoxFuture<'a, ServerResult<()>> {
    Box::pin(async move {
        let request: messages::StringValue = decode_payload(payload)?;
        let account_id = session
            .account_id()
            .ok_or_else(|| ServerError::NotFound(format!("account for session {}", session.id())))?;
        match with_timeout(world.storage_timeout(), world.store().delete_character(account_id, &request.value)).await {
            Ok(()) => info!("Account {} deleted character {}", account_id, request.value),
            Err(e) => warn!("Session {}: delete of {} failed: {}", session.id(), request.value, e),
        }
        send_character_list(world, session).await
    })
}

/// Loads the chosen character and points the client at its zone.
pub fn handle_enter_world<'a>(
    world: &'a WorldHandler,
    session: &'a Arc<Session>,
    payload: &'a [u8],
) -> BoxFuture<'a, ServerResult<()>> {
    Box::pin(async move {
        let request: messages::StringValue = decode_payload(payload)?;
        let character = with_timeout(world.storage_timeout(), world.store().load_character(&request.value)).await?;
        if Some(character.account_id) != session.account_id() {
            warn!("Session {} tried to enter as {} owned by another account", session.id(), character.name);
            return Err(StoreError::CharacterNotFound(request.value).into());
        }

        let target = messages::ZoneSession { zone_id: character.zone_id, instance_id: character.instance_id };
        info!("Session {} entering world as {} ({})", session.id(), character.name, ZoneKey::new(target.zone_id, target.instance_id));
        session.set_character(Some(character));
        session.send_stream(OpCode::PostEnterWorld, &target)
    })
}

/// Binds the session to the zone its character is in.
pub fn handle_zone_session<'a>(
    world: &'a WorldHandler,
    session: &'a Arc<Session>,
    payload: &'a [u8],
) -> BoxFuture<'a, ServerResult<()>> {
    Box::pin(async move {
        let request: messages::ZoneSession = decode_payload(payload)?;
        let key = ZoneKey::new(request.zone_id, request.instance_id);
        let matches_character = session
            .character()
            .map_or(false, |c| c.zone_id == key.zone_id && c.instance_id == key.instance_id);

        let valid = matches_character && world.zones().get_or_create(key).await.is_some();
        if valid {
            session.set_zone(Some(key));
            info!("Session {} bound to {}", session.id(), key);
        } else {
            warn!("Session {}: zone session for {} refused", session.id(), key);
        }
        session.send_stream(OpCode::ZoneSessionValid, &messages::IntValue { value: i64::from(valid) })
    })
}
