use crate::entities::order::DeliveryMethod;
use dashmap::DashMap;

/// Where a user currently is in the order flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    SelectProduct,
    SelectColor,
    SelectSize,
    EnterName,
    EnterPhone,
    ChooseDelivery,
    EnterPickupAddress,
    EnterCourierAddress,
    EnterCourierComment,
    Review,
    PaymentLinkIssued,
}

/// Per-user draft collected by the conversation
///
/// Lives only in memory; a restart or a catalog re-open starts a fresh one.
/// Persisted orders are unaffected either way.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub state: ConversationState,
    /// Model being browsed (card view)
    pub model_id: Option<i32>,
    /// Variant currently shown on the card
    pub variant_index: usize,
    /// Model committed by a color pick
    pub product_id: Option<i32>,
    pub color: Option<String>,
    pub size: Option<i32>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub delivery_method: Option<DeliveryMethod>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub pickup_point: Option<String>,
    pub courier_comment: Option<String>,
    /// Order persisted by finalize, once the payment link is out
    pub draft_order_id: Option<i64>,
}

/// Concurrent session map keyed by user id
///
/// Reads hand out clones and writes replace the entry wholesale, so two
/// interleaved updates for the same user can race but can never produce a
/// merged half-session, and users never see each other's state.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<i64, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session for a user, or a fresh idle one
    pub fn get(&self, user_id: i64) -> Session {
        self.sessions
            .get(&user_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Replaces the user's session
    pub fn put(&self, user_id: i64, session: Session) {
        self.sessions.insert(user_id, session);
    }

    /// Discards everything collected so far and starts over
    pub fn reset(&self, user_id: i64) -> Session {
        let fresh = Session::default();
        self.sessions.insert(user_id, fresh.clone());
        fresh
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_session_defaults_to_idle() {
        let store = SessionStore::new();
        let session = store.get(7);
        assert_eq!(session.state, ConversationState::Idle);
        assert!(store.is_empty());
    }

    #[test]
    fn put_replaces_wholesale() {
        let store = SessionStore::new();

        let mut first = Session::default();
        first.state = ConversationState::EnterPhone;
        first.full_name = Some("Иван".into());
        store.put(7, first);

        let mut second = Session::default();
        second.state = ConversationState::SelectProduct;
        store.put(7, second);

        let current = store.get(7);
        assert_eq!(current.state, ConversationState::SelectProduct);
        assert!(current.full_name.is_none());
    }

    #[test]
    fn reset_discards_collected_fields() {
        let store = SessionStore::new();

        let mut session = Session::default();
        session.state = ConversationState::Review;
        session.phone = Some("+79991234567".into());
        session.size = Some(42);
        store.put(7, session);

        let fresh = store.reset(7);
        assert_eq!(fresh.state, ConversationState::Idle);
        assert!(store.get(7).phone.is_none());
    }

    #[test]
    fn sessions_are_isolated_per_user() {
        let store = SessionStore::new();

        let mut a = Session::default();
        a.full_name = Some("A".into());
        store.put(1, a);

        let mut b = Session::default();
        b.full_name = Some("B".into());
        store.put(2, b);

        assert_eq!(store.get(1).full_name.as_deref(), Some("A"));
        assert_eq!(store.get(2).full_name.as_deref(), Some("B"));
        assert_eq!(store.len(), 2);
    }
}
