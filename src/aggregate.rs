use crate::types::Bucket;
use std::collections::HashMap;

/// Label of the synthetic bucket holding everything beyond the top N.
pub const REMAINDER_LABEL: &str = "OTROS";

/// Whether an empty remainder bucket is emitted. The dashboard aggregations
/// omit it; the earlier map-filter variant always emits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainderPolicy {
    OmitIfEmpty,
    AlwaysEmit,
}

/// Counts labels, keeps the `top_n` most frequent as individual buckets and
/// folds the rest into one `OTROS` bucket ordered last. Ties in count break
/// by first appearance, so output is deterministic for a given input order.
pub fn aggregate<I, S>(labels: I, top_n: usize, policy: RemainderPolicy) -> Vec<Bucket>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    // Count per distinct label, remembering first-seen order.
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for label in labels {
        let label = label.as_ref();
        match index.get(label) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(label.to_string(), counts.len());
                counts.push((label.to_string(), 1));
            }
        }
    }

    if counts.is_empty() {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| counts[b].1.cmp(&counts[a].1).then(a.cmp(&b)));

    let mut buckets: Vec<Bucket> = order
        .iter()
        .take(top_n)
        .map(|&i| Bucket::new(counts[i].0.clone(), counts[i].1))
        .collect();

    let remainder: usize = order.iter().skip(top_n).map(|&i| counts[i].1).sum();
    if remainder > 0 || policy == RemainderPolicy::AlwaysEmit {
        buckets.push(Bucket::new(REMAINDER_LABEL, remainder));
    }

    buckets
}
