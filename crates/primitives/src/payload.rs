use alloy_primitives::Bytes;
use alloy_rpc_types_engine::ExecutionPayloadV3;

/// The EIP-2718 type byte of a deposit transaction.
pub const DEPOSIT_TX_TYPE: u8 = 0x7E;

/// Errors returned by [`sanity_check_payload`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadSanityError {
    /// The payload has no transactions, so it cannot carry the mandatory deposits.
    #[error("no transactions in returned payload")]
    NoTransactions,
    /// The first transaction is not a deposit.
    #[error("first transaction was not deposit tx. Got type {tx_type:#04x}")]
    FirstNotDeposit {
        /// The type byte of the first transaction.
        tx_type: u8,
    },
    /// A transaction could not be classified because it is empty.
    #[error("invalid transaction at idx {index}: empty transaction")]
    EmptyTransaction {
        /// The index of the empty transaction.
        index: usize,
    },
    /// A deposit appears after a non-deposit transaction.
    #[error("deposit tx ({index}) after other tx in l2 block with prev deposit at idx {last_deposit}")]
    DepositAfterNonDeposit {
        /// The index of the out-of-place deposit.
        index: usize,
        /// The index of the last deposit of the leading run.
        last_deposit: usize,
    },
}

/// Returns whether an opaque transaction is a deposit.
///
/// Fails with [`PayloadSanityError::EmptyTransaction`] (index 0) if the transaction is empty,
/// since its type cannot be determined. Callers that know the index should remap it.
pub fn is_deposit_tx(tx: &Bytes) -> Result<bool, PayloadSanityError> {
    tx.first()
        .map(|ty| *ty == DEPOSIT_TX_TYPE)
        .ok_or(PayloadSanityError::EmptyTransaction { index: 0 })
}

/// Classifies the transaction at `index`, reporting the index if it is empty.
fn is_deposit_at(txs: &[Bytes], index: usize) -> Result<bool, PayloadSanityError> {
    is_deposit_tx(&txs[index]).map_err(|_| PayloadSanityError::EmptyTransaction { index })
}

/// Returns the index of the last deposit of the leading deposit run.
///
/// Walks the transactions from the start until the first non-deposit. Any transaction that is
/// looked at and cannot be classified is an error.
fn last_deposit(txs: &[Bytes]) -> Result<usize, PayloadSanityError> {
    let mut last = 0;
    for index in 0..txs.len() {
        if !is_deposit_at(txs, index)? {
            break;
        }
        last = index;
    }
    Ok(last)
}

/// Checks that deposits form a non-empty contiguous prefix of `txs`.
pub fn check_deposit_ordering(txs: &[Bytes]) -> Result<(), PayloadSanityError> {
    let Some(first) = txs.first() else {
        return Err(PayloadSanityError::NoTransactions);
    };

    match first.first() {
        None => return Err(PayloadSanityError::EmptyTransaction { index: 0 }),
        Some(&tx_type) if tx_type != DEPOSIT_TX_TYPE => {
            return Err(PayloadSanityError::FirstNotDeposit { tx_type });
        }
        Some(_) => {}
    }

    let last_deposit = last_deposit(txs)?;
    for index in last_deposit + 1..txs.len() {
        if is_deposit_at(txs, index)? {
            return Err(PayloadSanityError::DepositAfterNonDeposit { index, last_deposit });
        }
    }

    Ok(())
}

/// Sanity-checks the transaction ordering of a payload before it may become canonical.
pub fn sanity_check_payload(payload: &ExecutionPayloadV3) -> Result<(), PayloadSanityError> {
    check_deposit_ordering(&payload.payload_inner.payload_inner.transactions)
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    fn deposit() -> Bytes {
        Bytes::from_static(&[DEPOSIT_TX_TYPE, 0xc0])
    }

    fn normal() -> Bytes {
        Bytes::from_static(&[0x02, 0xc0])
    }

    #[test]
    fn accepts_deposit_prefix() {
        assert_eq!(check_deposit_ordering(&[deposit(), deposit(), normal()]), Ok(()));
        assert_eq!(check_deposit_ordering(&[deposit()]), Ok(()));
        assert_eq!(check_deposit_ordering(&[deposit(), deposit()]), Ok(()));
    }

    #[test]
    fn rejects_deposit_after_normal_tx() {
        let err = check_deposit_ordering(&[deposit(), normal(), deposit()]).unwrap_err();
        assert_eq!(err, PayloadSanityError::DepositAfterNonDeposit { index: 2, last_deposit: 0 });
    }

    #[test]
    fn rejects_empty_payload() {
        assert_eq!(check_deposit_ordering(&[]), Err(PayloadSanityError::NoTransactions));
    }

    #[test]
    fn rejects_non_deposit_first() {
        let err = check_deposit_ordering(&[normal(), deposit(), deposit()]).unwrap_err();
        assert_eq!(err, PayloadSanityError::FirstNotDeposit { tx_type: 0x02 });
    }

    #[test]
    fn reports_index_of_empty_transaction() {
        let err = check_deposit_ordering(&[deposit(), normal(), Bytes::new()]).unwrap_err();
        assert_eq!(err, PayloadSanityError::EmptyTransaction { index: 2 });

        let err = check_deposit_ordering(&[Bytes::new()]).unwrap_err();
        assert_eq!(err, PayloadSanityError::EmptyTransaction { index: 0 });

        let err = check_deposit_ordering(&[deposit(), Bytes::new(), normal()]).unwrap_err();
        assert_eq!(err, PayloadSanityError::EmptyTransaction { index: 1 });
    }

    #[test]
    fn random_orderings_match_prefix_rule() {
        let mut rng = rand::rng();

        for _ in 0..500 {
            let len = rng.random_range(0..12);
            let is_deposit: Vec<bool> = (0..len).map(|_| rng.random_bool(0.5)).collect();
            let txs: Vec<Bytes> =
                is_deposit.iter().map(|d| if *d { deposit() } else { normal() }).collect();

            let first_normal = is_deposit.iter().position(|d| !d).unwrap_or(len);
            let expected = len > 0 && is_deposit[0] && !is_deposit[first_normal..].contains(&true);

            assert_eq!(
                check_deposit_ordering(&txs).is_ok(),
                expected,
                "ordering: {is_deposit:?}"
            );
        }
    }
}
