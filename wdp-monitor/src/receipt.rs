//! Pure receipt-evaluation logic (spec §4.4), kept separate from the polling
//! loop so the confirmation/reorg rules are unit-testable without a provider
//! (mirrors the teacher's style of factoring pure decision helpers —
//! `assert_requirements`, `assert_time` — out of its network-calling code).

/// The handful of receipt fields the monitor's decisions actually depend on,
/// extracted from the provider's `TransactionReceipt` at the call site so
/// this module stays provider-agnostic and independently testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptFields {
    pub status_success: bool,
    pub block_number: u64,
    pub gas_used: u64,
}

/// What one poll of `getTransactionReceipt` tells the monitor to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    /// Not yet mined.
    Pending,
    /// Mined and reverted (`status = 0`) — terminal (spec §4.4).
    Reverted { block_number: u64 },
    /// Mined with `status = 1` but short of the required confirmation depth.
    AwaitingConfirmations { block_number: u64, confirmations: u64 },
    /// Mined, successful, and past the required confirmation depth —
    /// terminal (spec §4.4).
    Confirmed { block_number: u64, gas_used: u64 },
}

/// Classifies a polled receipt against the current chain tip and the
/// chain's required confirmation depth.
pub fn evaluate_receipt(
    receipt: Option<ReceiptFields>,
    current_block: u64,
    confirmations_required: u64,
) -> ReceiptOutcome {
    let Some(receipt) = receipt else {
        return ReceiptOutcome::Pending;
    };
    if !receipt.status_success {
        return ReceiptOutcome::Reverted {
            block_number: receipt.block_number,
        };
    }
    let confirmations = current_block.saturating_sub(receipt.block_number) + 1;
    if confirmations >= confirmations_required {
        ReceiptOutcome::Confirmed {
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
        }
    } else {
        ReceiptOutcome::AwaitingConfirmations {
            block_number: receipt.block_number,
            confirmations,
        }
    }
}

/// Whether a previously-mined transaction disappeared from the chain on a
/// later poll — the reorg condition the monitor restarts on (spec §4.4:
/// "receipt seen then gone").
pub fn is_reorg(previously_seen_block: Option<u64>, receipt_now: Option<ReceiptFields>) -> bool {
    previously_seen_block.is_some() && receipt_now.is_none()
}

/// Whether a reorg that started at `reorg_started_block` has outlived the
/// configured reorg window without the transaction reappearing (spec §4.4:
/// "restart monitoring up to a reorg window ... then mark FAILED").
pub fn reorg_window_exhausted(reorg_started_block: u64, current_block: u64, reorg_window: u64) -> bool {
    current_block.saturating_sub(reorg_started_block) > reorg_window
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(status_success: bool, block_number: u64, gas_used: u64) -> ReceiptFields {
        ReceiptFields {
            status_success,
            block_number,
            gas_used,
        }
    }

    #[test]
    fn no_receipt_is_pending() {
        assert_eq!(evaluate_receipt(None, 100, 12), ReceiptOutcome::Pending);
    }

    #[test]
    fn reverted_status_is_terminal_regardless_of_confirmations() {
        let r = fields(false, 90, 21_000);
        assert_eq!(
            evaluate_receipt(Some(r), 200, 12),
            ReceiptOutcome::Reverted { block_number: 90 }
        );
    }

    #[test]
    fn success_below_confirmation_depth_is_awaiting() {
        let r = fields(true, 95, 21_000);
        assert_eq!(
            evaluate_receipt(Some(r), 100, 12),
            ReceiptOutcome::AwaitingConfirmations {
                block_number: 95,
                confirmations: 6
            }
        );
    }

    #[test]
    fn success_past_confirmation_depth_is_confirmed() {
        let r = fields(true, 95, 21_000);
        assert_eq!(
            evaluate_receipt(Some(r), 120, 12),
            ReceiptOutcome::Confirmed {
                block_number: 95,
                gas_used: 21_000
            }
        );
    }

    #[test]
    fn reorg_detected_when_receipt_disappears() {
        assert!(is_reorg(Some(90), None));
        assert!(!is_reorg(None, None));
        let r = fields(true, 90, 21_000);
        assert!(!is_reorg(Some(90), Some(r)));
    }

    #[test]
    fn reorg_window_tracks_block_distance() {
        assert!(!reorg_window_exhausted(100, 150, 64));
        assert!(reorg_window_exhausted(100, 165, 64));
    }
}
