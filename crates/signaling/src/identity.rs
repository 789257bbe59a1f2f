//! Identity-Kollaborateur – Token-Pruefung und Principal-Aufloesung
//!
//! Plaza verwaltet keine Konten. Ein externer Dienst prueft Tokens und
//! liefert die Anzeige-Attribute eines Principals. `SpeicherIdentitaet`
//! ist die In-Memory-Variante fuer Tests und Einzelinstanz-Betrieb.

use async_trait::async_trait;
use dashmap::DashMap;
use plaza_core::types::{Principal, UserId};
use std::sync::Arc;

/// Zugriff auf den Identity-Dienst
///
/// `Ok(None)` bedeutet "unbekannt", `Err` einen Ausfall des Dienstes.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Prueft ein Login-Token und liefert den zugehoerigen Principal
    async fn token_pruefen(&self, token: &str) -> plaza_core::Result<Option<UserId>>;

    /// Loest Anzeige-Attribute eines Principals auf
    async fn principal_aufloesen(&self, user_id: &UserId) -> plaza_core::Result<Option<Principal>>;
}

// ---------------------------------------------------------------------------
// SpeicherIdentitaet
// ---------------------------------------------------------------------------

/// In-Memory Identity-Dienst
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct SpeicherIdentitaet {
    inner: Arc<SpeicherIdentitaetInner>,
}

#[derive(Default)]
struct SpeicherIdentitaetInner {
    principals: DashMap<UserId, Principal>,
    tokens: DashMap<String, UserId>,
}

impl SpeicherIdentitaet {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt einen Principal an oder ersetzt ihn und verknuepft das Token
    pub fn principal_registrieren(&self, principal: Principal, token: impl Into<String>) {
        let user_id = principal.id;
        self.inner.principals.insert(user_id, principal);
        self.inner.tokens.insert(token.into(), user_id);
        tracing::debug!(user_id = %user_id, "Principal registriert");
    }

    /// Entfernt einen Principal samt aller seiner Tokens
    pub fn principal_entfernen(&self, user_id: &UserId) -> Option<Principal> {
        self.inner.tokens.retain(|_, uid| uid != user_id);
        self.inner.principals.remove(user_id).map(|(_, p)| p)
    }

    pub fn anzahl(&self) -> usize {
        self.inner.principals.len()
    }
}

#[async_trait]
impl IdentityProvider for SpeicherIdentitaet {
    async fn token_pruefen(&self, token: &str) -> plaza_core::Result<Option<UserId>> {
        Ok(self.inner.tokens.get(token).map(|uid| *uid.value()))
    }

    async fn principal_aufloesen(&self, user_id: &UserId) -> plaza_core::Result<Option<Principal>> {
        Ok(self
            .inner
            .principals
            .get(user_id)
            .map(|p| p.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_principal(name: &str) -> Principal {
        Principal {
            id: UserId::new(),
            name: name.to_string(),
            email: format!("{name}@example.org"),
            avatar: None,
        }
    }

    #[tokio::test]
    async fn token_fuehrt_zum_principal() {
        let identitaet = SpeicherIdentitaet::neu();
        let ada = test_principal("ada");
        identitaet.principal_registrieren(ada.clone(), "token-ada");

        let uid = identitaet.token_pruefen("token-ada").await.unwrap();
        assert_eq!(uid, Some(ada.id));
        assert_eq!(
            identitaet.principal_aufloesen(&ada.id).await.unwrap(),
            Some(ada)
        );
        assert_eq!(identitaet.token_pruefen("falsch").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entfernen_widerruft_tokens() {
        let identitaet = SpeicherIdentitaet::neu();
        let bob = test_principal("bob");
        identitaet.principal_registrieren(bob.clone(), "t1");
        identitaet.principal_registrieren(bob.clone(), "t2");

        assert!(identitaet.principal_entfernen(&bob.id).is_some());
        assert_eq!(identitaet.token_pruefen("t1").await.unwrap(), None);
        assert_eq!(identitaet.token_pruefen("t2").await.unwrap(), None);
        assert_eq!(identitaet.anzahl(), 0);
    }
}
