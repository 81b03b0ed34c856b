//! Commerce order book.
//!
//! Stands in for the storefront's order table: creates orders, and exposes
//! the two mutations the gateway is allowed to make, marking an order paid
//! and appending notes. Both are CAS-guarded read-modify-writes.

use super::{StateError, MAX_CAS_ATTEMPTS};
use cashu_storage::StorageService;
use cashu_types::{
	current_timestamp, Order, OrderKey, OrderNote, OrderStatus, StorageKey, CASHU_PAYMENT_METHOD,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Counter id used to allocate order numbers.
const ORDER_SEQUENCE: &str = "orders";

/// Reads and mutates commerce orders.
pub struct OrderStore {
	storage: Arc<StorageService>,
}

impl OrderStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Creates a pending order settled through this gateway.
	pub async fn create(&self, total: Decimal, currency: &str) -> Result<Order, StateError> {
		let id = self
			.storage
			.next_sequence(StorageKey::Counters.as_str(), ORDER_SEQUENCE)
			.await?;
		let now = current_timestamp();
		let order = Order {
			id,
			order_key: OrderKey::generate(),
			total,
			currency: currency.trim().to_uppercase(),
			payment_method: CASHU_PAYMENT_METHOD.to_string(),
			status: OrderStatus::Pending,
			paid: false,
			transaction_id: None,
			notes: Vec::new(),
			created_at: now,
			updated_at: now,
		};

		let created = self
			.storage
			.store_if_unchanged(StorageKey::Orders.as_str(), &id.to_string(), None, &order)
			.await?;
		if !created {
			return Err(StateError::Contention(format!("order {} already exists", id)));
		}
		tracing::info!(order_id = id, total = %order.total, currency = %order.currency, "Created order");
		Ok(order)
	}

	/// Loads an order, `None` if it does not exist.
	pub async fn get(&self, order_id: u64) -> Result<Option<Order>, StateError> {
		Ok(self
			.storage
			.retrieve_versioned::<Order>(StorageKey::Orders.as_str(), &order_id.to_string())
			.await?
			.map(|v| v.value))
	}

	/// Applies `updater` and persists the result if it reports a change.
	///
	/// Returns the stored order and whether this call wrote it. The updater
	/// may run more than once when writers race.
	pub async fn update_with<F>(&self, order_id: u64, mut updater: F) -> Result<(Order, bool), StateError>
	where
		F: FnMut(&mut Order) -> bool,
	{
		let id = order_id.to_string();
		for _ in 0..MAX_CAS_ATTEMPTS {
			let current = self
				.storage
				.retrieve_versioned::<Order>(StorageKey::Orders.as_str(), &id)
				.await?
				.ok_or(StateError::OrderNotFound(order_id))?;

			let mut order = current.value;
			if !updater(&mut order) {
				return Ok((order, false));
			}
			order.updated_at = current_timestamp();

			if self
				.storage
				.store_if_unchanged(StorageKey::Orders.as_str(), &id, Some(&current.raw), &order)
				.await?
			{
				return Ok((order, true));
			}
			tokio::task::yield_now().await;
		}
		Err(StateError::Contention(format!("order {}", order_id)))
	}

	/// Marks an order paid unless it already is.
	///
	/// Only the call that performs the transition records `transaction_id`
	/// and `note`; it is the one that gets `true` back.
	pub async fn mark_paid(
		&self,
		order_id: u64,
		transaction_id: Option<&str>,
		note: Option<&str>,
	) -> Result<bool, StateError> {
		let (_, won) = self
			.update_with(order_id, |order| {
				if order.paid {
					return false;
				}
				let now = current_timestamp();
				order.paid = true;
				order.status = OrderStatus::Processing;
				order.transaction_id = transaction_id.map(str::to_string);
				if let Some(message) = note {
					order.notes.push(OrderNote {
						created_at: now,
						message: message.to_string(),
					});
				}
				true
			})
			.await?;
		if won {
			tracing::info!(order_id, "Order marked paid");
		}
		Ok(won)
	}

	/// Appends an audit note.
	pub async fn add_note(&self, order_id: u64, message: &str) -> Result<(), StateError> {
		self.update_with(order_id, |order| {
			order.notes.push(OrderNote {
				created_at: current_timestamp(),
				message: message.to_string(),
			});
			true
		})
		.await?;
		Ok(())
	}

	/// Sets the commerce status. Paid orders keep theirs.
	pub async fn set_status(&self, order_id: u64, status: OrderStatus) -> Result<Order, StateError> {
		let (order, _) = self
			.update_with(order_id, |order| {
				if order.paid || order.status == status {
					return false;
				}
				order.status = status;
				true
			})
			.await?;
		Ok(order)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use cashu_storage::implementations::memory::MemoryStorage;

	fn store() -> OrderStore {
		OrderStore::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	#[tokio::test]
	async fn test_create_assigns_sequential_ids() {
		let store = store();
		let first = store.create(Decimal::new(1999, 2), "usd").await.unwrap();
		let second = store.create(Decimal::new(500, 2), "EUR").await.unwrap();
		assert_eq!(first.id, 1);
		assert_eq!(second.id, 2);
		assert_eq!(first.currency, "USD");
		assert!(first.uses_cashu());
		assert_ne!(first.order_key, second.order_key);

		let loaded = store.get(1).await.unwrap().unwrap();
		assert!(loaded.order_key.verify(first.order_key.expose_secret()));
		assert!(store.get(99).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_mark_paid_only_once() {
		let store = store();
		let order = store.create(Decimal::ONE, "USD").await.unwrap();

		assert!(store.mark_paid(order.id, Some("mq-1"), Some("paid")).await.unwrap());
		assert!(!store.mark_paid(order.id, Some("mq-2"), Some("again")).await.unwrap());

		let order = store.get(order.id).await.unwrap().unwrap();
		assert!(order.paid);
		assert_eq!(order.status, OrderStatus::Processing);
		assert_eq!(order.transaction_id.as_deref(), Some("mq-1"));
		assert_eq!(order.notes.len(), 1);
	}

	#[tokio::test]
	async fn test_concurrent_mark_paid_has_one_winner() {
		let store = Arc::new(store());
		let order = store.create(Decimal::ONE, "USD").await.unwrap();

		let tasks: Vec<_> = (0..8)
			.map(|i| {
				let store = store.clone();
				tokio::spawn(async move {
					let note = format!("note {}", i);
					store.mark_paid(order.id, None, Some(&note)).await.unwrap()
				})
			})
			.collect();
		let results = futures::future::join_all(tasks).await;
		let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
		assert_eq!(winners, 1);
		assert_eq!(store.get(order.id).await.unwrap().unwrap().notes.len(), 1);
	}

	#[tokio::test]
	async fn test_set_status_leaves_paid_orders() {
		let store = store();
		let order = store.create(Decimal::ONE, "USD").await.unwrap();
		let held = store.set_status(order.id, OrderStatus::OnHold).await.unwrap();
		assert_eq!(held.status, OrderStatus::OnHold);

		store.mark_paid(order.id, None, None).await.unwrap();
		let after = store.set_status(order.id, OrderStatus::Pending).await.unwrap();
		assert_eq!(after.status, OrderStatus::Processing);
	}

	#[tokio::test]
	async fn test_missing_order_is_not_found() {
		let err = store().add_note(5, "hello").await.unwrap_err();
		assert!(matches!(err, StateError::OrderNotFound(5)));
	}
}
