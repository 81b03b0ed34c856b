//! Scripted collaborators shared by the core tests.

use crate::handlers::{CheckoutHandler, ConfirmHandler};
use crate::quotes::QuoteManager;
use crate::state::{OrderStore, SettlementRepository};
use async_trait::async_trait;
use cashu_config::{Config, ConfigBuilder};
use cashu_lightning::{InvoiceResolverInterface, LightningError};
use cashu_mint::{FeeEstimator, MintError, MintInterface};
use cashu_price::implementations::fixed::FixedPriceSource;
use cashu_price::PriceOracle;
use cashu_storage::implementations::memory::MemoryStorage;
use cashu_storage::StorageService;
use cashu_types::{current_timestamp, Keyset, MeltQuote, MeltQuoteState, SAT_UNIT};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const INVOICE_PREFIX: &str = "lnbcscripted";

/// Resolver returning `lnbcscripted<sats>` and remembering the comment.
#[derive(Default)]
pub struct ScriptedResolver {
	calls: AtomicUsize,
	last_comment: Mutex<Option<String>>,
}

impl ScriptedResolver {
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn last_comment(&self) -> Option<String> {
		self.last_comment.lock().unwrap().clone()
	}
}

#[async_trait]
impl InvoiceResolverInterface for ScriptedResolver {
	async fn resolve(
		&self,
		_destination: &str,
		amount_sats: u64,
		comment: Option<&str>,
	) -> Result<String, LightningError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		*self.last_comment.lock().unwrap() = comment.map(str::to_string);
		Ok(format!("{}{}", INVOICE_PREFIX, amount_sats))
	}
}

/// Mint issuing `mq-<n>` quotes with a 10 sat reserve, 100 ppk keysets,
/// and reporting a configurable state on lookup.
pub struct ScriptedMint {
	state: Mutex<MeltQuoteState>,
	fail_quotes: bool,
	created: AtomicUsize,
	queries: AtomicUsize,
}

impl ScriptedMint {
	pub fn paying_state(state: &str) -> Self {
		Self {
			state: Mutex::new(MeltQuoteState::from(state.to_string())),
			fail_quotes: false,
			created: AtomicUsize::new(0),
			queries: AtomicUsize::new(0),
		}
	}

	pub fn failing_quotes() -> Self {
		Self {
			fail_quotes: true,
			..Self::paying_state("UNPAID")
		}
	}

	pub fn melt_quotes_created(&self) -> usize {
		self.created.load(Ordering::SeqCst)
	}

	pub fn state_queries(&self) -> usize {
		self.queries.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl MintInterface for ScriptedMint {
	async fn create_melt_quote(&self, _mint_url: &str, invoice: &str) -> Result<MeltQuote, MintError> {
		if self.fail_quotes {
			return Err(MintError::Unreachable("scripted failure".into()));
		}
		let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
		let amount = invoice
			.strip_prefix(INVOICE_PREFIX)
			.and_then(|s| s.parse().ok())
			.unwrap_or(0);
		Ok(MeltQuote {
			quote: format!("mq-{}", n),
			request: Some(invoice.to_string()),
			amount,
			fee_reserve: 10,
			unit: Some(SAT_UNIT.to_string()),
			state: MeltQuoteState::Unpaid,
			expiry: Some(current_timestamp() + 3600),
			payment_preimage: None,
			change: None,
		})
	}

	async fn melt_quote_state(&self, _mint_url: &str, quote_id: &str) -> Result<MeltQuote, MintError> {
		self.queries.fetch_add(1, Ordering::SeqCst);
		let state = self.state.lock().unwrap().clone();
		let payment_preimage = state.is_paid().then(|| format!("preimage-{}", quote_id));
		Ok(MeltQuote {
			quote: quote_id.to_string(),
			request: None,
			amount: 0,
			fee_reserve: 0,
			unit: Some(SAT_UNIT.to_string()),
			state,
			expiry: None,
			payment_preimage,
			change: None,
		})
	}

	async fn keysets(&self, _mint_url: &str) -> Result<Vec<Keyset>, MintError> {
		Ok(vec![Keyset {
			id: "00ffd48b8f5ecf80".into(),
			unit: SAT_UNIT.into(),
			active: true,
			input_fee_ppk: Some(100),
		}])
	}
}

/// Fully wired handlers over in-memory storage and a fixed 50000 price.
pub struct Harness {
	pub config: Config,
	pub storage: Arc<StorageService>,
	pub orders: Arc<OrderStore>,
	pub settlements: Arc<SettlementRepository>,
	pub quotes: Arc<QuoteManager>,
	pub confirm: ConfirmHandler,
	pub checkout: CheckoutHandler,
	pub mint: Arc<ScriptedMint>,
	pub resolver: Arc<ScriptedResolver>,
}

impl Harness {
	pub fn new(mint: ScriptedMint) -> Self {
		let config = ConfigBuilder::new().build();
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let orders = Arc::new(OrderStore::new(storage.clone()));
		let settlements = Arc::new(SettlementRepository::new(storage.clone()));
		let mint = Arc::new(mint);
		let resolver = Arc::new(ScriptedResolver::default());
		let oracle = Arc::new(PriceOracle::new(
			Arc::new(FixedPriceSource::new(Decimal::new(50_000, 0))),
			None,
		));
		let fees = Arc::new(FeeEstimator::new(mint.clone(), Duration::from_secs(3600)));

		let quotes = Arc::new(QuoteManager::new(
			config.gateway.clone(),
			config.quotes.clone(),
			orders.clone(),
			settlements.clone(),
			oracle,
			resolver.clone(),
			mint.clone(),
			fees,
		));
		let confirm = ConfirmHandler::new(
			config.gateway.clone(),
			config.quotes.clone(),
			orders.clone(),
			settlements.clone(),
			mint.clone(),
		);
		let checkout = CheckoutHandler::new(config.gateway.clone(), orders.clone(), quotes.clone());

		Self {
			config,
			storage,
			orders,
			settlements,
			quotes,
			confirm,
			checkout,
			mint,
			resolver,
		}
	}

	pub fn disable_gateway(&mut self) {
		self.config.gateway.enabled = false;
		self.checkout = CheckoutHandler::new(
			self.config.gateway.clone(),
			self.orders.clone(),
			self.quotes.clone(),
		);
	}
}
