//! Queue merging for a drain pass
//!
//! The intake side already merges repeat edits into a resident request, but a
//! drain can still dequeue more than one request for the same document when
//! intake raced a previous pass. Merging here keeps the drain loop writing
//! each document at most once per pass.

use std::collections::HashMap;

use crate::domain::DocumentId;

use super::request::SaveRequest;

/// Collapse the dequeued batch to one request per document
///
/// Requests merge in intake order: later field values win, the merged request
/// keeps the earliest seq (so drain order reflects first arrival) and the
/// highest version, and every waiter survives.
pub(crate) fn merge_queue(mut batch: Vec<SaveRequest>) -> Vec<SaveRequest> {
    if batch.len() < 2 {
        return batch;
    }

    batch.sort_by_key(|request| request.seq);

    let mut order: Vec<DocumentId> = Vec::new();
    let mut merged: HashMap<DocumentId, SaveRequest> = HashMap::new();

    for mut request in batch {
        match merged.get_mut(&request.document_id) {
            Some(existing) => {
                existing.changes.merge_from(request.changes.clone());
                existing.version = existing.version.max(request.version);
                existing.absorb_waiters(&mut request);
            }
            None => {
                order.push(request.document_id.clone());
                merged.insert(request.document_id.clone(), request);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| merged.remove(&id))
        .collect()
}
