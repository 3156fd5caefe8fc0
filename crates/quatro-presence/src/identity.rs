//! Who is on the other end of a connection.
//!
//! Credential storage and login live outside this server. By the time a
//! client opens its socket it already holds a token, and the server only
//! needs to turn that token into an [`Identity`] through an
//! [`IdentityResolver`] supplied by the embedding application.

use quatro_protocol::{ParticipantId, ParticipantProfile};

use crate::PresenceError;

/// A resolved participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub profile: ParticipantProfile,
    /// Privileged participants receive admin snapshots and may clear or
    /// edit the queue.
    pub is_privileged: bool,
}

impl Identity {
    pub fn participant_id(&self) -> ParticipantId {
        self.profile.participant_id
    }

    pub fn display_name(&self) -> &str {
        &self.profile.display_name
    }
}

/// Resolves handshake tokens into identities.
///
/// Implementations typically look the token up in a session store or
/// verify a signed cookie. The returned future must be `Send` because
/// it is awaited inside per-connection tasks.
pub trait IdentityResolver: Send + Sync + 'static {
    /// # Errors
    /// [`PresenceError::AuthFailed`] if the token is unknown or invalid.
    fn resolve(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, PresenceError>> + Send;
}

/// Trusts whatever the client claims. For local play and tests only.
///
/// Token format: `id:name[:avatar[:admin]]`, e.g. `7:alice` or
/// `1:root::admin`. An empty avatar segment means no avatar.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevTokenResolver;

impl IdentityResolver for DevTokenResolver {
    async fn resolve(&self, token: &str) -> Result<Identity, PresenceError> {
        parse_dev_token(token)
    }
}

fn parse_dev_token(token: &str) -> Result<Identity, PresenceError> {
    let mut parts = token.split(':');

    let id = parts
        .next()
        .and_then(|id| id.trim().parse::<u64>().ok())
        .ok_or_else(|| PresenceError::AuthFailed("token must start with a numeric id".into()))?;

    let display_name = parts
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| PresenceError::AuthFailed("token is missing a display name".into()))?
        .to_owned();

    let avatar = parts
        .next()
        .filter(|avatar| !avatar.is_empty())
        .map(str::to_owned);

    let is_privileged = match parts.next() {
        None | Some("") => false,
        Some("admin") => true,
        Some(other) => {
            return Err(PresenceError::AuthFailed(format!(
                "unknown role {other:?}"
            )));
        }
    };

    Ok(Identity {
        profile: ParticipantProfile {
            participant_id: ParticipantId(id),
            display_name,
            avatar,
        },
        is_privileged,
    })
}
