use storefront_cart::CartOwner;
use storefront_core::{CustomerId, SessionId};

/// Who is shopping on this request.
///
/// A request may carry an anonymous session, an authenticated customer,
/// both (right after login) or neither.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ShopperContext {
    session: Option<SessionId>,
    customer: Option<CustomerId>,
}

impl ShopperContext {
    pub fn new(session: Option<SessionId>, customer: Option<CustomerId>) -> Self {
        Self { session, customer }
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn customer(&self) -> Option<CustomerId> {
        self.customer
    }

    /// Authenticated shoppers always use their persistent cart.
    pub fn cart_owner(&self) -> Option<CartOwner> {
        match (self.customer, self.session) {
            (Some(c), _) => Some(CartOwner::Customer(c)),
            (None, Some(s)) => Some(CartOwner::Session(s)),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_wins_over_session() {
        let s = SessionId::new();
        let c = CustomerId::new();
        assert_eq!(ShopperContext::new(Some(s), Some(c)).cart_owner(), Some(CartOwner::Customer(c)));
        assert_eq!(ShopperContext::new(Some(s), None).cart_owner(), Some(CartOwner::Session(s)));
        assert_eq!(ShopperContext::default().cart_owner(), None);
    }
}
