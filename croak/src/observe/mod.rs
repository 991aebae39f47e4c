use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use croak_msg::Token;

use crate::exchange::{Exchange, ExchangeObserver};
use crate::stem::Stem;

mod orderer;
mod relation;

#[doc(inline)]
pub use orderer::NotificationOrderer;
#[doc(inline)]
pub use relation::ObserveRelation;

/// The observe relations of an endpoint (server side), keyed
/// by observer and token.
///
/// A relation is removed when the exchange that carries it completes.
#[derive(Debug, Default)]
pub struct Relations {
  map: Stem<HashMap<(SocketAddr, Token), Arc<ObserveRelation>>>,
}

struct Unregister {
  relations: Arc<Relations>,
  relation: Arc<ObserveRelation>,
}

impl ExchangeObserver for Unregister {
  fn completed(&self, _: &Exchange) {
    self.relation.cancel();
    self.relations.remove(&self.relation);
  }
}

impl Relations {
  /// Add an established relation, yielding the one it replaces
  /// (a re-registration by the same observer and token).
  ///
  /// The relation is removed again once `exchange` completes.
  pub(crate) fn add(relations: &Arc<Self>,
                    exchange: &Exchange,
                    relation: Arc<ObserveRelation>)
                    -> Option<Arc<ObserveRelation>> {
    exchange.add_observer(Arc::new(Unregister { relations: relations.clone(),
                                                relation: relation.clone() }));

    let prev = relations.map
                        .map_mut(|m| m.insert(relation.key(), relation.clone()))
                        .filter(|prev| !Arc::ptr_eq(prev, &relation));

    if exchange.is_complete() {
      relations.remove(&relation);
    }

    prev
  }

  /// Remove a relation, unless it was already replaced by another
  pub(crate) fn remove(&self, relation: &Arc<ObserveRelation>) -> bool {
    self.map.map_mut(|m| match m.get(&relation.key()) {
                        | Some(r) if Arc::ptr_eq(r, relation) => m.remove(&relation.key()).is_some(),
                        | _ => false,
                      })
  }

  /// The relation of an observer, by the token it observes with
  pub fn get(&self, remote: SocketAddr, token: Token) -> Option<Arc<ObserveRelation>> {
    self.map.map_ref(|m| m.get(&(remote, token)).cloned())
  }

  /// All current relations
  pub fn all(&self) -> Vec<Arc<ObserveRelation>> {
    self.map.map_ref(|m| m.values().cloned().collect())
  }

  /// Number of current relations
  pub fn len(&self) -> usize {
    self.map.map_ref(HashMap::len)
  }

  /// Are there no relations?
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use embedded_time::duration::Milliseconds;

  use super::*;
  use crate::exchange::Origin;
  use crate::net::SessionId;
  use crate::req::Req;

  fn exchange(token: u8) -> Arc<Exchange> {
    let mut req = Req::get("127.0.0.1:5683".parse().unwrap(), "a");
    req.set_token(Token::opaque(&[token]));
    Arc::new(Exchange::new(Origin::Remote, req, SessionId::default()))
  }

  #[test]
  fn reregistration_replaces() {
    let relations = Arc::new(Relations::default());
    let a = exchange(1);
    let b = exchange(1);
    let ra = Arc::new(ObserveRelation::new(&a, Milliseconds(0)));
    let rb = Arc::new(ObserveRelation::new(&b, Milliseconds(0)));

    assert!(Relations::add(&relations, &a, ra.clone()).is_none());
    let replaced = Relations::add(&relations, &b, rb.clone()).unwrap();
    assert!(Arc::ptr_eq(&replaced, &ra));
    assert_eq!(relations.len(), 1);

    a.set_complete();
    assert_eq!(relations.len(), 1);

    b.set_complete();
    assert!(relations.is_empty());
    assert!(rb.is_cancelled());
  }

  #[test]
  fn keyed_by_token() {
    let relations = Arc::new(Relations::default());
    let a = exchange(1);
    let b = exchange(2);
    Relations::add(&relations, &a, Arc::new(ObserveRelation::new(&a, Milliseconds(0))));
    Relations::add(&relations, &b, Arc::new(ObserveRelation::new(&b, Milliseconds(0))));

    assert_eq!(relations.len(), 2);
    assert!(relations.get(a.remote(), a.request().token).is_some());
  }
}
