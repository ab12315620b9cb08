//! Subset-product key search.
//!
//! TeslaCrypt stores `key * secret` in the header. Once that integer has been
//! factorized, the key is the product of some subset of its factors whose
//! byte length is exactly the key width. This module enumerates those
//! subsets with a pruned depth-first search and lets a caller-supplied
//! validator decide which candidates are real.

use crate::error::RecoveryError;
use crate::factors::FactorSet;
use crate::types::AesKey;
use num_bigint::BigUint;
use num_traits::One;
use std::collections::BTreeSet;
use std::convert::Infallible;

/// Returns every key of `width_bytes` that is the product of a non-empty
/// subset of `factors` and that `validate` accepts.
///
/// The validator is called at most once per distinct candidate value. A
/// validator error aborts the search.
pub fn recover<F, E>(
    factors: &FactorSet,
    width_bytes: usize,
    validate: F,
) -> Result<BTreeSet<AesKey>, RecoveryError>
where
    F: FnMut(&AesKey) -> Result<bool, E>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if width_bytes == 0 {
        return Err(RecoveryError::InvalidArgument(
            "key width must be at least one byte".to_string(),
        ));
    }
    if factors.is_empty() {
        return Ok(BTreeSet::new());
    }

    let mut search = SubsetSearch::new(factors, width_bytes, validate);
    search.descend(0, &BigUint::one(), false)?;
    Ok(search.accepted)
}

/// Every in-range subset product, without validation.
pub fn candidates(
    factors: &FactorSet,
    width_bytes: usize,
) -> Result<BTreeSet<AesKey>, RecoveryError> {
    recover(factors, width_bytes, |_| Ok::<_, Infallible>(true))
}

struct SubsetSearch<F> {
    groups: Vec<(BigUint, usize)>,
    // suffix[i] = product of every factor in groups[i..], with multiplicity
    suffix: Vec<BigUint>,
    lower: BigUint,
    upper: BigUint,
    width: usize,
    validate: F,
    tested: BTreeSet<BigUint>,
    accepted: BTreeSet<AesKey>,
}

impl<F, E> SubsetSearch<F>
where
    F: FnMut(&AesKey) -> Result<bool, E>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn new(factors: &FactorSet, width: usize, validate: F) -> Self {
        let groups = factors.grouped_descending();

        let mut suffix = vec![BigUint::one(); groups.len() + 1];
        for (i, (value, count)) in groups.iter().enumerate().rev() {
            let mut acc = suffix[i + 1].clone();
            for _ in 0..*count {
                acc *= value;
            }
            suffix[i] = acc;
        }

        Self {
            groups,
            suffix,
            lower: BigUint::one() << (8 * (width - 1)),
            upper: BigUint::one() << (8 * width),
            width,
            validate,
            tested: BTreeSet::new(),
            accepted: BTreeSet::new(),
        }
    }

    fn descend(&mut self, idx: usize, product: &BigUint, picked: bool) -> Result<(), RecoveryError> {
        if *product >= self.upper {
            return Ok(());
        }
        if product * &self.suffix[idx] < self.lower {
            return Ok(());
        }

        if idx == self.groups.len() {
            if picked && *product >= self.lower {
                self.test(product)?;
            }
            return Ok(());
        }

        let (value, count) = self.groups[idx].clone();
        let mut current = product.clone();
        for taken in 0..=count {
            if taken > 0 {
                current *= &value;
                if current >= self.upper {
                    break;
                }
            }
            self.descend(idx + 1, &current, picked || taken > 0)?;
        }
        Ok(())
    }

    fn test(&mut self, product: &BigUint) -> Result<(), RecoveryError> {
        if !self.tested.insert(product.clone()) {
            return Ok(());
        }

        let bytes = product.to_bytes_be();
        debug_assert_eq!(bytes.len(), self.width);
        let candidate = AesKey::new(bytes);

        let ok = (self.validate)(&candidate).map_err(|e| RecoveryError::Validation(e.into()))?;
        if ok {
            self.accepted.insert(candidate);
        }
        Ok(())
    }
}
