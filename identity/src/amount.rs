//! Currency-tagged stake amounts.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Arbitrary precision non-negative amount. Serialized as a decimal string.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Amount(BigUint);

impl Amount {
    pub fn new(value: u64) -> Self {
        Amount(BigUint::from(value))
    }

    pub fn zero() -> Self {
        Amount(BigUint::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(&self, other: &Amount) -> Amount {
        Amount(&self.0 + &other.0)
    }

    /// Returns `None` when `other` exceeds `self`.
    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        if other.0 > self.0 {
            return None;
        }
        Some(Amount(&self.0 - &other.0))
    }

    /// Integer division, `None` for a zero divisor.
    pub fn checked_div(&self, divisor: &Amount) -> Option<Amount> {
        if divisor.is_zero() {
            return None;
        }
        Some(Amount(&self.0 / &divisor.0))
    }

    pub fn to_i64(&self) -> Option<i64> {
        self.0.to_i64()
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount::new(value)
    }
}

impl From<BigUint> for Amount {
    fn from(value: BigUint) -> Self {
        Amount(value)
    }
}

impl FromStr for Amount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigUint::from_str(s.trim())
            .map(Amount)
            .map_err(|e| format!("invalid amount {:?}: {}", s, e))
    }
}

impl TryFrom<String> for Amount {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.0.to_string()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chain a currency originates from
pub type ChainType = u32;

/// Named currency
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    pub name: String,
    #[serde(default)]
    pub chain: ChainType,
}

impl Currency {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), chain: 0 }
    }
}

/// Amount tagged with its currency
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub currency: Currency,
    pub amount: Amount,
}

impl Coin {
    pub fn new(currency: Currency, amount: impl Into<Amount>) -> Self {
        Self { currency, amount: amount.into() }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency.name)
    }
}

/// Registry of currencies known to the chain, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyList {
    by_name: BTreeMap<String, Currency>,
}

impl CurrencyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a currency. Returns `false` if the name was already taken.
    pub fn register(&mut self, currency: Currency) -> bool {
        if self.by_name.contains_key(&currency.name) {
            return false;
        }
        self.by_name.insert(currency.name.clone(), currency);
        true
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Currency> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl FromIterator<Currency> for CurrencyList {
    fn from_iter<I: IntoIterator<Item = Currency>>(iter: I) -> Self {
        let mut list = CurrencyList::new();
        for currency in iter {
            list.register(currency);
        }
        list
    }
}
