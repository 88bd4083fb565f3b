use crate::engine::{ExecutionPayloadEnvelope, OpPayloadAttributes};

/// A trait for objects that can be summarized into a string for logging purposes.
///
/// Sometimes the Debug impl is too verbose, and the Display impl does something different
/// than what we want. This trait allows us to have our custom verbosity.
pub trait Summary {
    /// Returns a summary of the object.
    fn summary(&self) -> String;
}

impl Summary for ExecutionPayloadEnvelope {
    fn summary(&self) -> String {
        let payload = self.payload_v1();
        format!(
            "hash={}, number={}, parent={}, state_root={}, timestamp={}, fee_recipient={}, prev_randao={}, gas_used={}, txs={}",
            payload.block_hash,
            payload.block_number,
            payload.parent_hash,
            payload.state_root,
            payload.timestamp,
            payload.fee_recipient,
            payload.prev_randao,
            payload.gas_used,
            payload.transactions.len(),
        )
    }
}

impl Summary for OpPayloadAttributes {
    fn summary(&self) -> String {
        format!(
            "timestamp={}, fee_recipient={}, txs={}, deposits={}, no_tx_pool={}, gas_limit={:?}",
            self.payload_attributes.timestamp,
            self.payload_attributes.suggested_fee_recipient,
            self.transaction_count(),
            self.deposit_count(),
            self.no_tx_pool.unwrap_or(false),
            self.gas_limit.map(|limit| limit.to::<u64>()),
        )
    }
}
