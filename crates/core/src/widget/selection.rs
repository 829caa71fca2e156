//! Pure selection update: how a drop changes the selection list.

/// Result of applying a batch of accepted files to the current selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPlan<T> {
    /// The selection after the drop.
    pub next: Vec<T>,
    /// Incoming files that made it into `next`.
    pub added: Vec<T>,
    /// Incoming files beyond the remaining capacity, dropped from the end.
    pub overflow: Vec<T>,
    /// Whether the previous selection was discarded.
    pub replaced: bool,
}

/// Apply `incoming` to `current` under a `max_files` limit.
///
/// With `max_files == 1` the first incoming file replaces the selection.
/// Otherwise files are appended until the limit and the excess is cut from
/// the end of the incoming batch.
#[must_use]
pub fn plan_selection<T: Clone>(current: &[T], incoming: Vec<T>, max_files: usize) -> SelectionPlan<T> {
    let max_files = max_files.max(1);

    if max_files == 1 {
        let mut incoming = incoming.into_iter();
        return match incoming.next() {
            Some(first) => SelectionPlan {
                next: vec![first.clone()],
                added: vec![first],
                overflow: incoming.collect(),
                replaced: true,
            },
            None => SelectionPlan {
                next: current.to_vec(),
                added: Vec::new(),
                overflow: Vec::new(),
                replaced: false,
            },
        };
    }

    let capacity = max_files.saturating_sub(current.len());
    let mut added = incoming;
    let overflow = if added.len() > capacity {
        added.split_off(capacity)
    } else {
        Vec::new()
    };

    let mut next = current.to_vec();
    next.extend(added.iter().cloned());

    SelectionPlan {
        next,
        added,
        overflow,
        replaced: false,
    }
}
