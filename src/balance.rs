//! Metered request ledger.
//!
//! Each account is granted an initial balance the first time it is seen and
//! pays a fixed cost per request. Stores sit behind [`BalanceStore`] so the
//! meter does not care whether balances live in memory or on disk.

use crate::types::Quote;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub const DEFAULT_INITIAL_BALANCE: Decimal = dec!(1000);
pub const DEFAULT_REQUEST_COST: Decimal = dec!(0.10);

/// Balance storage. `debit` must check and subtract atomically.
pub trait BalanceStore: Send + Sync {
    /// Current balance, granting the initial balance on first sight.
    fn balance(&self, account: &str) -> Result<Quote, BalanceError>;

    /// Subtracts `amount` and returns the new balance. Fails without
    /// touching the balance when it is below `amount`.
    fn debit(&self, account: &str, amount: Quote) -> Result<Quote, BalanceError>;
}

impl std::fmt::Debug for dyn BalanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BalanceStore")
    }
}

// shared by both stores: grant on first sight, then check-and-subtract
fn debit_entry(
    balances: &mut HashMap<String, Quote>,
    initial: Quote,
    account: &str,
    amount: Quote,
) -> Result<Quote, BalanceError> {
    if account.trim().is_empty() {
        return Err(BalanceError::EmptyAccount);
    }
    let balance = balances.entry(account.to_string()).or_insert(initial);
    if *balance < amount {
        return Err(BalanceError::InsufficientBalance {
            required: amount,
            available: *balance,
        });
    }
    *balance = balance.sub(amount);
    Ok(*balance)
}

fn balance_entry(balances: &mut HashMap<String, Quote>, initial: Quote, account: &str) -> Result<Quote, BalanceError> {
    if account.trim().is_empty() {
        return Err(BalanceError::EmptyAccount);
    }
    Ok(*balances.entry(account.to_string()).or_insert(initial))
}

fn lock(balances: &Mutex<HashMap<String, Quote>>) -> Result<MutexGuard<'_, HashMap<String, Quote>>, BalanceError> {
    balances.lock().map_err(|_| BalanceError::LockPoisoned)
}

#[derive(Debug)]
pub struct MemoryBalanceStore {
    initial: Quote,
    balances: Mutex<HashMap<String, Quote>>,
}

impl Default for MemoryBalanceStore {
    fn default() -> Self {
        Self::new(Quote::new(DEFAULT_INITIAL_BALANCE))
    }
}

impl MemoryBalanceStore {
    pub fn new(initial: Quote) -> Self {
        Self {
            initial,
            balances: Mutex::new(HashMap::new()),
        }
    }
}

impl BalanceStore for MemoryBalanceStore {
    fn balance(&self, account: &str) -> Result<Quote, BalanceError> {
        balance_entry(&mut *lock(&self.balances)?, self.initial, account)
    }

    fn debit(&self, account: &str, amount: Quote) -> Result<Quote, BalanceError> {
        debit_entry(&mut *lock(&self.balances)?, self.initial, account, amount)
    }
}

/// Balances kept in a JSON object on disk, rewritten after every debit.
#[derive(Debug)]
pub struct FileBalanceStore {
    path: PathBuf,
    initial: Quote,
    balances: Mutex<HashMap<String, Quote>>,
}

impl FileBalanceStore {
    /// Opens the ledger at `path`, starting empty when the file does not exist.
    pub fn open(path: impl Into<PathBuf>, initial: Quote) -> Result<Self, BalanceError> {
        let path = path.into();
        let balances = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), accounts = balances.len(), "ledger opened");

        Ok(Self {
            path,
            initial,
            balances: Mutex::new(balances),
        })
    }

    // write-then-rename so a crash never leaves half a file behind
    fn persist(&self, balances: &HashMap<String, Quote>) -> Result<(), BalanceError> {
        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&tmp, serde_json::to_string_pretty(balances)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl BalanceStore for FileBalanceStore {
    fn balance(&self, account: &str) -> Result<Quote, BalanceError> {
        balance_entry(&mut *lock(&self.balances)?, self.initial, account)
    }

    fn debit(&self, account: &str, amount: Quote) -> Result<Quote, BalanceError> {
        let mut balances = lock(&self.balances)?;
        let previous = balances.get(account).copied();
        let remaining = debit_entry(&mut balances, self.initial, account, amount)?;

        // memory must not run ahead of disk. undo the debit, and the grant if it was new
        if let Err(e) = self.persist(&balances) {
            match previous {
                Some(balance) => balances.insert(account.to_string(), balance),
                None => balances.remove(account),
            };
            warn!(account, error = %e, "ledger write failed, debit rolled back");
            return Err(e);
        }
        Ok(remaining)
    }
}

/// Result of a successful charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub account: String,
    pub cost: Quote,
    pub balance: Quote,
}

/// Charges a fixed cost per request against a [`BalanceStore`].
#[derive(Debug, Clone)]
pub struct RequestMeter {
    store: Arc<dyn BalanceStore>,
    cost: Quote,
}

impl RequestMeter {
    pub fn new(store: Arc<dyn BalanceStore>, cost: Quote) -> Self {
        Self { store, cost }
    }

    pub fn balance(&self, account: &str) -> Result<Quote, BalanceError> {
        self.store.balance(account)
    }

    pub fn charge(&self, account: &str) -> Result<Receipt, BalanceError> {
        let balance = self.store.debit(account, self.cost)?;
        info!(account, cost = %self.cost, %balance, "request charged");

        Ok(Receipt {
            account: account.to_string(),
            cost: self.cost,
            balance,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BalanceError {
    #[error("Insufficient balance: need {required} USDC, have {available}")]
    InsufficientBalance { required: Quote, available: Quote },

    #[error("Account id is empty")]
    EmptyAccount,

    #[error("Ledger lock poisoned")]
    LockPoisoned,

    #[error("Ledger io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger file is malformed: {0}")]
    Serde(#[from] serde_json::Error),
}
