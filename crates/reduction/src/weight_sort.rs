#![forbid(unsafe_code)]

use lumper_mc::StateIndex;

use crate::weight_cmp;

/// Max slice size to use insertion sort.
const MAX_INSERTION_SORT_SIZE: usize = 44;

/// Sorts the given elements ascending by their accumulated weight using a
/// dual-pivot quicksort, treating weights within the accuracy as equal.
///
/// # Details
///
/// The comparator is never a strict comparison of the doubles, so elements
/// whose weights lie within the accuracy of each other end up adjacent and
/// can be grouped by scanning the sorted run. Since the tolerant comparator
/// is not transitive, the order among almost-equal weights is unspecified.
pub fn sort_by_weight(elements: &mut [StateIndex], weights: &[f64]) {
    if elements.len() > 1 {
        dual_pivot_quicksort(elements, weights);
    }
}

fn dual_pivot_quicksort(elements: &mut [StateIndex], weights: &[f64]) {
    let len = elements.len();
    if len <= MAX_INSERTION_SORT_SIZE {
        insertion_sort(elements, weights);
        return;
    }

    // Take the pivots from the outermost elements, smallest first.
    if weight_cmp(weights[elements[0]], weights[elements[len - 1]]).is_gt() {
        elements.swap(0, len - 1);
    }
    let pivot1 = weights[elements[0]];
    let pivot2 = weights[elements[len - 1]];

    // Invariant: [1, less) is below pivot1, [less, k) lies between the
    // pivots, and (great, len - 1) is above pivot2.
    let mut less = 1;
    let mut great = len - 2;
    let mut k = 1;
    while k <= great {
        if weight_cmp(weights[elements[k]], pivot1).is_lt() {
            elements.swap(k, less);
            less += 1;
        } else if weight_cmp(weights[elements[k]], pivot2).is_gt() {
            while k < great && weight_cmp(weights[elements[great]], pivot2).is_gt() {
                great -= 1;
            }
            elements.swap(k, great);
            great -= 1;

            if weight_cmp(weights[elements[k]], pivot1).is_lt() {
                elements.swap(k, less);
                less += 1;
            }
        }
        k += 1;
    }

    // Move the pivots between the three parts.
    elements.swap(0, less - 1);
    elements.swap(len - 1, great + 1);

    dual_pivot_quicksort(&mut elements[..less - 1], weights);
    dual_pivot_quicksort(&mut elements[less..=great], weights);
    dual_pivot_quicksort(&mut elements[great + 2..], weights);
}

fn insertion_sort(elements: &mut [StateIndex], weights: &[f64]) {
    for i in 1..elements.len() {
        let mut j = i;
        while j > 0 && weight_cmp(weights[elements[j - 1]], weights[elements[j]]).is_gt() {
            elements.swap(j - 1, j);
            j -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::Rng;
    use test_log::test;

    use lumper_utilities::random_test;

    use crate::ACCURACY;

    /// Every element is at most tolerantly greater than its successor.
    fn assert_sorted(elements: &[StateIndex], weights: &[f64]) {
        for window in elements.windows(2) {
            assert!(
                !weight_cmp(weights[window[0]], weights[window[1]]).is_gt(),
                "Elements {} and {} are out of order: {} > {}",
                window[0],
                window[1],
                weights[window[0]],
                weights[window[1]]
            );
        }
    }

    #[test]
    fn test_random_sort_by_weight() {
        random_test(100, |rng| {
            let len = rng.random_range(1..200);
            let weights: Vec<f64> = (0..len).map(|_| rng.random::<f64>()).collect();
            let mut elements: Vec<StateIndex> = (0..len).map(StateIndex::new).collect();

            sort_by_weight(&mut elements, &weights);

            assert_sorted(&elements, &weights);

            // The result is a permutation of the input.
            let mut seen = vec![false; len];
            for element in &elements {
                assert!(!seen[element.value()]);
                seen[element.value()] = true;
            }
        });
    }

    #[test]
    fn test_sort_by_weight_near_ties() {
        random_test(100, |rng| {
            // Weights drawn from a few clusters that are closer than the
            // accuracy internally, but clearly separated from each other.
            let len = rng.random_range(1..200);
            let weights: Vec<f64> = (0..len)
                .map(|_| {
                    let cluster = rng.random_range(0..4) as f64;
                    cluster + rng.random::<f64>() * ACCURACY / 2.0
                })
                .collect();
            let mut elements: Vec<StateIndex> = (0..len).map(StateIndex::new).collect();

            sort_by_weight(&mut elements, &weights);

            assert_sorted(&elements, &weights);

            // The clusters appear as maximal runs of tolerantly equal weights.
            let mut boundaries = 0;
            for window in elements.windows(2) {
                if !crate::is_weight_equal(weights[window[0]], weights[window[1]]) {
                    boundaries += 1;
                }
            }
            let clusters: std::collections::HashSet<u64> = weights.iter().map(|w| *w as u64).collect();
            assert_eq!(boundaries, clusters.len() - 1);
        });
    }
}
