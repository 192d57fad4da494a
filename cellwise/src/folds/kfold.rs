use crate::common::*;

/// Splits the positions `0..len` into shuffled groups.
///
/// The number of groups is clamped into `1..=len`. The positions are shuffled
/// once and cut into contiguous chunks, where the first `len % num_groups`
/// chunks take one extra position. An empty input yields no groups.
pub fn kfold_groups<R>(len: usize, num_groups: usize, rng: &mut R) -> Vec<Vec<usize>>
where
    R: Rng,
{
    if len == 0 {
        return vec![];
    }
    let num_groups = num_groups.clamp(1, len);

    let mut positions: Vec<usize> = (0..len).collect();
    positions.shuffle(rng);

    let base = len / num_groups;
    let remainder = len % num_groups;
    let mut iter = positions.into_iter();

    (0..num_groups)
        .map(|group_index| {
            let size = if group_index < remainder {
                base + 1
            } else {
                base
            };
            iter.by_ref().take(size).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_cover_all_positions() {
        let mut rng = StdRng::seed_from_u64(41);
        let groups = kfold_groups(11, 3, &mut rng);

        let sizes: Vec<_> = groups.iter().map(|group| group.len()).collect();
        assert_eq!(sizes, vec![4, 4, 3]);

        let positions: Vec<_> = groups.into_iter().flatten().sorted().collect();
        assert_eq!(positions, (0..11).collect::<Vec<_>>());
    }

    #[test]
    fn group_count_is_clamped() {
        let mut rng = StdRng::seed_from_u64(41);
        assert_eq!(kfold_groups(2, 3, &mut rng).len(), 2);
        assert_eq!(kfold_groups(4, 0, &mut rng).len(), 1);
        assert!(kfold_groups(0, 3, &mut rng).is_empty());
    }

    #[test]
    fn split_is_deterministic() {
        let lhs = kfold_groups(9, 3, &mut StdRng::seed_from_u64(41));
        let rhs = kfold_groups(9, 3, &mut StdRng::seed_from_u64(41));
        assert_eq!(lhs, rhs);
    }
}
