//! Helpers to build payloads in tests.

use alloy_primitives::{Address, B256, Bloom, Bytes, U256};
use alloy_rpc_types_engine::{ExecutionPayloadV1, ExecutionPayloadV2, ExecutionPayloadV3};

use crate::{engine::ExecutionPayloadEnvelope, payload::DEPOSIT_TX_TYPE};

/// Returns a minimal opaque deposit transaction.
pub fn deposit_tx() -> Bytes {
    Bytes::from_static(&[DEPOSIT_TX_TYPE, 0xc0])
}

/// Returns a minimal opaque EIP-1559 transaction.
pub fn normal_tx() -> Bytes {
    Bytes::from_static(&[0x02, 0xc0])
}

/// Builds a V3 payload for block `number` with the given transactions.
///
/// The block hash is derived from the number so that different blocks have different hashes.
pub fn payload(number: u64, transactions: Vec<Bytes>) -> ExecutionPayloadV3 {
    ExecutionPayloadV3 {
        payload_inner: ExecutionPayloadV2 {
            payload_inner: ExecutionPayloadV1 {
                parent_hash: B256::with_last_byte(number.saturating_sub(1) as u8),
                fee_recipient: Address::ZERO,
                state_root: B256::repeat_byte(0xaa),
                receipts_root: B256::ZERO,
                logs_bloom: Bloom::default(),
                prev_randao: B256::repeat_byte(0xbb),
                block_number: number,
                gas_limit: 30_000_000,
                gas_used: 21_000,
                timestamp: 1_700_000_000 + number * 2,
                extra_data: Bytes::new(),
                base_fee_per_gas: U256::from(7),
                block_hash: B256::with_last_byte(number as u8),
                transactions,
            },
            withdrawals: Vec::new(),
        },
        blob_gas_used: 0,
        excess_blob_gas: 0,
    }
}

/// Builds an envelope for block `number` with one deposit followed by two normal transactions.
pub fn envelope(number: u64) -> ExecutionPayloadEnvelope {
    ExecutionPayloadEnvelope::new(
        payload(number, vec![deposit_tx(), normal_tx(), normal_tx()]),
        Some(B256::repeat_byte(0xcc)),
    )
}

/// Builds an envelope for block `number` with the given transactions.
pub fn envelope_with_transactions(number: u64, transactions: Vec<Bytes>) -> ExecutionPayloadEnvelope {
    ExecutionPayloadEnvelope::new(payload(number, transactions), Some(B256::repeat_byte(0xcc)))
}
