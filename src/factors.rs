//! Multisets of prime factors.
//!
//! A [`FactorSet`] holds the known factorization of the integer TeslaCrypt
//! embeds in every file header. The AES key is the product of some subset
//! of these factors.

use crate::error::FactorError;
use num_bigint::BigUint;
use num_traits::{Num, One};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A multiset of integers, each at least 2.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FactorSet {
    factors: Vec<BigUint>,
}

impl FactorSet {
    /// Creates a set from already-parsed integers.
    pub fn new(factors: Vec<BigUint>) -> Result<Self, FactorError> {
        if let Some(bad) = factors.iter().find(|f| **f < BigUint::from(2u8)) {
            return Err(FactorError::TooSmall(bad.to_string()));
        }
        Ok(Self { factors })
    }

    /// Parses decimal strings, ignoring surrounding whitespace.
    pub fn from_decimal<I, S>(values: I) -> Result<Self, FactorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let factors = values
            .into_iter()
            .map(|s| {
                let s = s.as_ref().trim();
                BigUint::from_str_radix(s, 10).map_err(|_| FactorError::Parse(s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(factors)
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BigUint> {
        self.factors.iter()
    }

    /// Product of every factor; 1 for the empty set.
    pub fn product(&self) -> BigUint {
        self.factors.iter().fold(BigUint::one(), |acc, f| acc * f)
    }

    /// Whether the whole multiset multiplies back to `target`.
    pub fn reconstructs(&self, target: &BigUint) -> bool {
        !self.is_empty() && self.product() == *target
    }

    /// Distinct values paired with their multiplicity, largest first.
    pub fn grouped_descending(&self) -> Vec<(BigUint, usize)> {
        let mut sorted = self.factors.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));

        let mut groups: Vec<(BigUint, usize)> = Vec::new();
        for value in sorted {
            match groups.last_mut() {
                Some((last, count)) if *last == value => *count += 1,
                _ => groups.push((value, 1)),
            }
        }
        groups
    }
}

impl TryFrom<Vec<String>> for FactorSet {
    type Error = FactorError;

    fn try_from(values: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_decimal(values)
    }
}

impl From<FactorSet> for Vec<String> {
    fn from(set: FactorSet) -> Self {
        set.factors.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for FactorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.factors.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}
