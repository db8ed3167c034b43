//! Tags secondary-chain records and merges every upstream listing into the single
//! sequence the scan loop walks.

use crate::types::{ChainActivity, Transaction};

/// Returns `transactions` with `chain_id` set on every record. Order is preserved
/// and an existing tag is overwritten.
pub fn tag_secondary_chain(transactions: Vec<Transaction>, chain_id: u64) -> Vec<Transaction> {
    transactions
        .into_iter()
        .map(|tx| Transaction {
            chain_id: Some(chain_id),
            ..tx
        })
        .collect()
}

/// Concatenates the primary listings (normal, NFT, token) followed by the tagged
/// secondary listings in the same order.
pub fn merge_activity(activity: ChainActivity, secondary_chain_id: u64) -> Vec<Transaction> {
    let ChainActivity {
        transactions,
        nft_transfers,
        token_transfers,
        secondary_transactions,
        secondary_nft_transfers,
        secondary_token_transfers,
        holdings: _,
    } = activity;

    let mut merged = Vec::with_capacity(
        transactions.len()
            + nft_transfers.len()
            + token_transfers.len()
            + secondary_transactions.len()
            + secondary_nft_transfers.len()
            + secondary_token_transfers.len(),
    );
    merged.extend(transactions);
    merged.extend(nft_transfers);
    merged.extend(token_transfers);
    merged.extend(tag_secondary_chain(secondary_transactions, secondary_chain_id));
    merged.extend(tag_secondary_chain(secondary_nft_transfers, secondary_chain_id));
    merged.extend(tag_secondary_chain(secondary_token_transfers, secondary_chain_id));
    merged
}
