//! Round-robin placement for `start N` and `stop N`.
use std::collections::VecDeque;

/// Region for each of `count` new instances: instance `i` goes to region
/// `i mod regions.len()`.
#[must_use]
pub fn start_assignments<T>(count: usize, regions: &[T]) -> Vec<&T> {
    (0..count)
        .filter_map(|index| {
            index
                .checked_rem(regions.len())
                .and_then(|slot| regions.get(slot))
        })
        .collect()
}

/// Picks up to `limit` items, one per non-empty region per round, starting
/// at region 0. Returns `(region_index, item)` in selection order.
#[must_use]
pub fn select_round_robin<T>(per_region: Vec<Vec<T>>, limit: usize) -> Vec<(usize, T)> {
    let available = per_region.iter().map(Vec::len).fold(0usize, usize::saturating_add);
    let wanted = limit.min(available);
    let region_count = per_region.len();
    let mut queues: Vec<VecDeque<T>> = per_region.into_iter().map(VecDeque::from).collect();

    let mut selected = Vec::with_capacity(wanted);
    let mut cursor = 0usize;
    while selected.len() < wanted {
        let Some(region) = cursor.checked_rem(region_count) else {
            break;
        };
        cursor = cursor.wrapping_add(1);
        if let Some(item) = queues.get_mut(region).and_then(VecDeque::pop_front) {
            selected.push((region, item));
        }
    }
    selected
}

/// Regroups a selection by region index.
#[must_use]
pub fn group_by_region<T>(selected: Vec<(usize, T)>, region_count: usize) -> Vec<Vec<T>> {
    let mut groups: Vec<Vec<T>> = (0..region_count).map(|_| Vec::new()).collect();
    for (region, item) in selected {
        if let Some(group) = groups.get_mut(region) {
            group.push(item);
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    #[test]
    fn start_spreads_remainder_to_earliest_regions() -> Result<(), String> {
        let regions = regions(&["us-east-1", "eu-west-1", "sa-east-1"]);
        let assigned = start_assignments(5, &regions);
        let expected = ["us-east-1", "eu-west-1", "sa-east-1", "us-east-1", "eu-west-1"];
        if assigned != expected {
            return Err(format!("Unexpected assignment: {:?}", assigned));
        }
        Ok(())
    }

    #[test]
    fn start_without_regions_assigns_nothing() -> Result<(), String> {
        if !start_assignments::<String>(3, &[]).is_empty() {
            return Err("Expected no assignments".to_owned());
        }
        Ok(())
    }

    #[test]
    fn stop_all_alternates_between_regions() -> Result<(), String> {
        let selected = select_round_robin(
            vec![vec!["a1", "a2", "a3"], vec!["b1", "b2"]],
            usize::MAX,
        );
        let order: Vec<usize> = selected.iter().map(|(region, _)| *region).collect();
        if order != [0, 1, 0, 1, 0] {
            return Err(format!("Unexpected region order: {:?}", order));
        }
        let items: Vec<&str> = selected.iter().map(|(_, item)| *item).collect();
        if items != ["a1", "b1", "a2", "b2", "a3"] {
            return Err(format!("Unexpected items: {:?}", items));
        }
        Ok(())
    }

    #[test]
    fn stop_skips_exhausted_regions() -> Result<(), String> {
        let selected = select_round_robin(vec![vec![], vec!["b1", "b2"], vec!["c1"]], 3);
        let grouped = group_by_region(selected, 3);
        let expected: Vec<Vec<&str>> = vec![vec![], vec!["b1", "b2"], vec!["c1"]];
        if grouped != expected {
            return Err(format!("Unexpected grouping: {:?}", grouped));
        }
        Ok(())
    }

    #[test]
    fn stop_limit_caps_selection() -> Result<(), String> {
        let selected = select_round_robin(vec![vec![1, 2], vec![3, 4]], 3);
        if selected != [(0, 1), (1, 3), (0, 2)] {
            return Err(format!("Unexpected selection: {:?}", selected));
        }
        Ok(())
    }
}
