//! Neutralises watermark operations in a decoded content stream.
//!
//! Text show operators are deleted (`'` and `"` keep their line move),
//! `Do` and `sh` are deleted, and path painting inside a flagged region
//! becomes `n` so clipping paths still take effect. Graphics state
//! operators are never touched, so the `q`/`Q` and `BT`/`ET` structure of
//! the stream stays balanced.
//!
//! Deleting a show operator also deletes its glyph advance. When a kept
//! show operator follows in the same text object without an intervening
//! positioning operator, the kept text would move; the owning candidate
//! is reverted and reported instead.

use std::collections::{BTreeMap, BTreeSet};

use lopdf::content::Operation;

use crate::model::{Candidate, Target};

const SHOW_OPS: &[&str] = &["Tj", "TJ", "'", "\""];
const PATH_PAINT_OPS: &[&str] = &["S", "s", "f", "F", "f*", "B", "B*", "b", "b*"];
const POSITION_OPS: &[&str] = &["Td", "TD", "Tm", "T*"];

/// Result of neutralising a page's candidates.
#[derive(Debug, Clone, Default)]
pub struct Removal {
    /// Rewritten operations
    pub operations: Vec<Operation>,

    /// Indices of candidates that were removed
    pub removed: Vec<usize>,

    /// Indices of candidates left in place, with the reason
    pub unsupported: Vec<(usize, String)>,

    changed: bool,
}

impl Removal {
    /// Whether `operations` differs from the input.
    pub fn is_changed(&self) -> bool {
        self.changed
    }
}

fn is_show(op: &Operation) -> bool {
    SHOW_OPS.contains(&op.operator.as_str())
}

fn is_paint(op: &Operation) -> bool {
    is_show(op)
        || PATH_PAINT_OPS.contains(&op.operator.as_str())
        || matches!(op.operator.as_str(), "Do" | "sh" | "BI")
}

/// Neutralise the content-stream candidates of one page.
///
/// Annotation candidates are ignored here; they live outside the stream.
pub fn remove_candidates(operations: &[Operation], candidates: &[Candidate]) -> Removal {
    let mut removal = Removal::default();
    let mut owned: Vec<Option<Vec<usize>>> = vec![None; candidates.len()];

    for (i, candidate) in candidates.iter().enumerate() {
        let op_at = |index: usize, want: fn(&Operation) -> bool| {
            operations.get(index).filter(|op| want(op)).map(|_| vec![index])
        };
        match &candidate.target {
            Target::Text { op_index } => match op_at(*op_index, is_show) {
                Some(ops) => owned[i] = Some(ops),
                None => removal
                    .unsupported
                    .push((i, "text operation not found in content stream".into())),
            },
            Target::XObject { op_index, name } => {
                match op_at(*op_index, |op| op.operator == "Do") {
                    Some(ops) => owned[i] = Some(ops),
                    None => removal
                        .unsupported
                        .push((i, format!("placement of /{} not found in content stream", name))),
                }
            }
            Target::Region { start, end } => {
                let end = (*end).min(operations.len().saturating_sub(1));
                owned[i] = Some(
                    (*start..=end)
                        .filter(|&j| operations.get(j).is_some_and(is_paint))
                        .collect(),
                );
            }
            Target::Embedded { name, .. } => removal.unsupported.push((
                i,
                format!("watermark text shares form XObject /{} with other content", name),
            )),
            Target::Annotation { .. } => {}
        }
    }

    // Revert candidates whose removal would shift kept text, until stable
    loop {
        let neutral = neutral_ops(&owned);
        let conflicts = shifted_text(operations, &neutral);
        if conflicts.is_empty() {
            break;
        }
        for op in conflicts {
            for owner in neutral.get(&op).into_iter().flatten() {
                if owned[*owner].take().is_some() {
                    log::debug!(
                        "reverting candidate {:?}: op {} shares a text line with kept text",
                        candidates[*owner].label,
                        op
                    );
                    removal.unsupported.push((
                        *owner,
                        "removing it would shift text that follows on the same line".into(),
                    ));
                }
            }
        }
    }

    let neutral = neutral_ops(&owned);
    removal.removed = owned
        .iter()
        .enumerate()
        .filter_map(|(i, ops)| ops.as_ref().map(|_| i))
        .collect();
    removal.unsupported.sort_by_key(|(i, _)| *i);

    if neutral.is_empty() {
        removal.operations = operations.to_vec();
        return removal;
    }

    removal.changed = true;
    removal.operations = Vec::with_capacity(operations.len());
    for (index, op) in operations.iter().enumerate() {
        if !neutral.contains_key(&index) {
            removal.operations.push(op.clone());
            continue;
        }
        match op.operator.as_str() {
            "Tj" | "TJ" | "Do" | "sh" | "BI" => {}
            "'" => removal.operations.push(Operation::new("T*", vec![])),
            "\"" => {
                if let [word_spacing, char_spacing, ..] = op.operands.as_slice() {
                    removal
                        .operations
                        .push(Operation::new("Tw", vec![word_spacing.clone()]));
                    removal
                        .operations
                        .push(Operation::new("Tc", vec![char_spacing.clone()]));
                }
                removal.operations.push(Operation::new("T*", vec![]));
            }
            _ => removal.operations.push(Operation::new("n", vec![])),
        }
    }
    removal
}

/// Operation index to the candidates that neutralise it.
fn neutral_ops(owned: &[Option<Vec<usize>>]) -> BTreeMap<usize, Vec<usize>> {
    let mut map: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (candidate, ops) in owned.iter().enumerate() {
        for &op in ops.iter().flatten() {
            map.entry(op).or_default().push(candidate);
        }
    }
    map
}

/// Neutralised show operators whose lost advance would move kept text.
fn shifted_text(operations: &[Operation], neutral: &BTreeMap<usize, Vec<usize>>) -> BTreeSet<usize> {
    let mut conflicts = BTreeSet::new();
    let mut pending: Vec<usize> = Vec::new();

    for (index, op) in operations.iter().enumerate() {
        let operator = op.operator.as_str();
        if matches!(operator, "BT" | "ET") || POSITION_OPS.contains(&operator) {
            pending.clear();
            continue;
        }
        if !is_show(op) {
            continue;
        }
        // ' and " move to the next line before showing
        if matches!(operator, "'" | "\"") {
            pending.clear();
        }
        if neutral.contains_key(&index) {
            pending.push(index);
        } else if !pending.is_empty() {
            conflicts.extend(pending.drain(..));
        }
    }
    conflicts
}
