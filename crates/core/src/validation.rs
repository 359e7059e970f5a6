//! Pure validation rules for the private-state-validation protocol. Inputs
//! fully determine outputs; the mediator decides whether a failed check is a
//! surfaced violation or a silent drop.

use std::collections::{BTreeMap, BTreeSet};

use confidant_types::{EncodedPayload, PrivacyMode, PublicKey, TxHash};

/// Affected transactions whose privacy mode differs from the new payload's.
/// Empty means the dependency graph is mode-consistent.
pub fn privacy_mode_mismatches<'a>(
    mode: PrivacyMode,
    affected: &'a BTreeMap<TxHash, EncodedPayload>,
) -> Vec<&'a TxHash> {
    affected
        .iter()
        .filter(|(_, acoth)| acoth.privacy_mode != mode)
        .map(|(tx_hash, _)| tx_hash)
        .collect()
}

/// Set equality between a payload's recipient list and an affected
/// transaction's, ignoring order and multiplicity.
pub fn recipients_match(recipients: &[PublicKey], acoth: &EncodedPayload) -> bool {
    let ours: BTreeSet<&PublicKey> = recipients.iter().collect();
    let theirs: BTreeSet<&PublicKey> = acoth.recipient_keys.iter().collect();
    ours == theirs
}

/// Whether the claimed sender of an inbound payload plausibly participated in
/// every affected transaction. False when fewer references resolved locally
/// than the payload claims (a possible recipient-discovery probe) or when any
/// resolved reference does not list the sender as a recipient.
pub fn sender_is_genuine(
    sender: &PublicKey,
    claimed_count: usize,
    resolved: &BTreeMap<TxHash, EncodedPayload>,
) -> bool {
    resolved.len() >= claimed_count
        && resolved
            .values()
            .all(|acoth| acoth.recipient_keys.contains(sender))
}
