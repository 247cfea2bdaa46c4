//! Default task grouping.

use std::collections::{HashMap, HashSet};

use crate::operator::types::{Item, RawItems, Task, INPUTS_GROUP};

/// Inner join of the input slots by item key.
///
/// - Keys come out in first-seen order of slot 0.
/// - A key missing from any slot is dropped.
/// - Within a slot the first item with a key wins.
pub fn inner_join(raw: &RawItems) -> Vec<Task> {
    let slots = match raw.get(INPUTS_GROUP) {
        Some(slots) if !slots.is_empty() => slots,
        _ => return Vec::new(),
    };

    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&Item>> = HashMap::new();

    for (i, items) in slots.iter().enumerate() {
        let mut seen: HashSet<&str> = HashSet::new();
        for item in items {
            let key = item.key.as_str();
            if !seen.insert(key) {
                continue;
            }
            if i == 0 {
                order.push(key);
                groups.insert(key, vec![item]);
            } else if let Some(group) = groups.get_mut(key) {
                group.push(item);
            }
        }
        groups.retain(|k, _| seen.contains(k));
    }

    order
        .into_iter()
        .filter_map(|key| {
            let group = groups.remove(key)?;
            Some(Task::new(key, group.into_iter().cloned().collect()))
        })
        .collect()
}
