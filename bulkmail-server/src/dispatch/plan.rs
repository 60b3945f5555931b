//! Sender capacity and recipient partitioning

/// The list holds more recipients than the senders may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error(
    "{recipients} recipients exceed the capacity of {senders} sender(s) \
     ({max_per_sender} each); {needed} sender(s) needed"
)]
pub struct OverCapacity {
    pub recipients: usize,
    pub senders: usize,
    pub max_per_sender: usize,
    pub needed: usize,
}

/// Senders required to carry `recipients`.
pub fn senders_needed(recipients: usize, max_per_sender: usize) -> usize {
    recipients.div_ceil(max_per_sender.max(1))
}

pub fn check_capacity(
    recipients: usize,
    senders: usize,
    max_per_sender: usize,
) -> Result<(), OverCapacity> {
    if senders.saturating_mul(max_per_sender) >= recipients {
        return Ok(());
    }

    Err(OverCapacity {
        recipients,
        senders,
        max_per_sender,
        needed: senders_needed(recipients, max_per_sender),
    })
}

/// Contiguous slice per sender: sender `i` gets
/// `[i * max_per_sender, (i + 1) * max_per_sender)`, clamped to the list.
///
/// Always returns one slice per sender; trailing senders may get an empty one.
pub fn partition<T>(recipients: &[T], senders: usize, max_per_sender: usize) -> Vec<&[T]> {
    (0..senders)
        .map(|i| {
            let start = i.saturating_mul(max_per_sender).min(recipients.len());
            let end = start.saturating_add(max_per_sender).min(recipients.len());
            &recipients[start..end]
        })
        .collect()
}
