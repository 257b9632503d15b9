use std::collections::{BTreeMap, HashSet};

use crate::{analysis::labels::Label, consts::DEFAULT_DISTANCE_THRESHOLD, layout::element::Detection};

/// A cross-image correspondence between two same-class detections.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchedPair {
    /// Index into the left detections.
    pub left: usize,
    /// Index into the right detections.
    pub right: usize,
    /// Euclidean distance between the two box centers.
    pub distance: f32,
}

pub type MatchesByClass = BTreeMap<Label, Vec<MatchedPair>>;

/// Pairs boxes between the two halves of a page by class and center distance.
///
/// Every left box, in detector order, takes the nearest right box of the same
/// class that no earlier left box has claimed. The pair is kept only when that
/// distance is within `distance_threshold`. Ties go to the lower right index.
#[derive(Clone, Copy, Debug)]
pub struct BoxMatcher {
    pub distance_threshold: f32,
}

impl Default for BoxMatcher {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

impl BoxMatcher {
    pub fn new(distance_threshold: f32) -> Self {
        Self { distance_threshold }
    }

    /// Matches `left` against `right`.
    ///
    /// Classes present on both sides always get an entry, possibly empty.
    /// Classes present on only one side get none.
    pub fn match_boxes(&self, left: &[Detection], right: &[Detection]) -> MatchesByClass {
        let left_by_class = group_by_class(left);
        let right_by_class = group_by_class(right);

        let mut matches_by_class = MatchesByClass::new();

        for (label, left_indices) in &left_by_class {
            let Some(right_indices) = right_by_class.get(label) else {
                continue;
            };

            let mut claimed = HashSet::with_capacity(right_indices.len());
            let mut pairs = Vec::new();

            for &left_idx in left_indices {
                let left_bbox = &left[left_idx].bbox;

                let mut best: Option<(usize, f32)> = None;
                for &right_idx in right_indices {
                    if claimed.contains(&right_idx) {
                        continue;
                    }

                    let distance = left_bbox.center_distance(&right[right_idx].bbox);
                    // strict comparison keeps the first candidate on ties
                    if best.is_none_or(|(_, min)| distance < min) {
                        best = Some((right_idx, distance));
                    }
                }

                let Some((right_idx, distance)) = best else {
                    continue;
                };
                if distance <= self.distance_threshold {
                    claimed.insert(right_idx);
                    pairs.push(MatchedPair {
                        left: left_idx,
                        right: right_idx,
                        distance,
                    });
                }
            }

            matches_by_class.insert(*label, pairs);
        }

        matches_by_class
    }
}

/// Groups detection indices by class, keeping detector order within a class.
fn group_by_class(detections: &[Detection]) -> BTreeMap<Label, Vec<usize>> {
    let mut grouped: BTreeMap<Label, Vec<usize>> = BTreeMap::new();
    for (idx, detection) in detections.iter().enumerate() {
        grouped.entry(detection.label).or_default().push(idx);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::bbox::Bbox;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, label: Label) -> Detection {
        Detection::new(Bbox::from_xyxy(x1, y1, x2, y2), label, 0.9, 0)
    }

    #[test]
    fn test_match_rejects_pairs_beyond_threshold() {
        let left = vec![det(0., 0., 10., 10., Label::Text)];
        let right = vec![det(100., 0., 110., 10., Label::Text)];

        let matches = BoxMatcher::new(5.0).match_boxes(&left, &right);

        // the class is shared, so the key exists but holds no pair
        assert_eq!(matches.get(&Label::Text), Some(&vec![]));
    }

    #[test]
    fn test_match_accepts_pairs_within_threshold() {
        let left = vec![det(0., 0., 10., 10., Label::Text)];
        let right = vec![det(100., 0., 110., 10., Label::Text)];

        let matches = BoxMatcher::new(200.0).match_boxes(&left, &right);

        assert_eq!(
            matches.get(&Label::Text),
            Some(&vec![MatchedPair {
                left: 0,
                right: 0,
                distance: 100.0
            }])
        );
    }

    #[test]
    fn test_match_threshold_is_inclusive() {
        let left = vec![det(0., 0., 10., 10., Label::Text)];
        let right = vec![det(50., 0., 60., 10., Label::Text)];

        let matches = BoxMatcher::new(50.0).match_boxes(&left, &right);
        assert_eq!(matches[&Label::Text].len(), 1);

        let matches = BoxMatcher::new(49.9).match_boxes(&left, &right);
        assert!(matches[&Label::Text].is_empty());
    }

    #[test]
    fn test_match_never_crosses_classes() {
        let left = vec![
            det(0., 0., 10., 10., Label::Text),
            det(0., 50., 10., 60., Label::Title),
        ];
        // the closest right box to each left box has the other class
        let right = vec![
            det(0., 0., 10., 10., Label::Title),
            det(0., 50., 10., 60., Label::Text),
        ];

        let matches = BoxMatcher::new(1000.0).match_boxes(&left, &right);

        for (label, pairs) in &matches {
            for pair in pairs {
                assert_eq!(left[pair.left].label, *label);
                assert_eq!(right[pair.right].label, *label);
            }
        }
        assert_eq!(matches[&Label::Text][0].right, 1);
        assert_eq!(matches[&Label::Title][0].right, 0);
    }

    #[test]
    fn test_match_right_index_claimed_once() {
        // both left boxes are nearest to right box 0
        let left = vec![
            det(0., 0., 10., 10., Label::Text),
            det(0., 2., 10., 12., Label::Text),
        ];
        let right = vec![
            det(0., 1., 10., 11., Label::Text),
            det(0., 40., 10., 50., Label::Text),
        ];

        let matches = BoxMatcher::new(100.0).match_boxes(&left, &right);
        let pairs = &matches[&Label::Text];

        // the earlier left box wins the contested right box
        assert_eq!(pairs[0].left, 0);
        assert_eq!(pairs[0].right, 0);
        assert_eq!(pairs[1].left, 1);
        assert_eq!(pairs[1].right, 1);

        let mut rights = pairs.iter().map(|p| p.right).collect::<Vec<_>>();
        rights.dedup();
        assert_eq!(rights.len(), pairs.len());
    }

    #[test]
    fn test_match_left_without_candidate_is_dropped() {
        let left = vec![
            det(0., 0., 10., 10., Label::Text),
            det(0., 20., 10., 30., Label::Text),
        ];
        let right = vec![det(0., 0., 10., 10., Label::Text)];

        let matches = BoxMatcher::new(100.0).match_boxes(&left, &right);
        assert_eq!(
            matches[&Label::Text],
            vec![MatchedPair {
                left: 0,
                right: 0,
                distance: 0.0
            }]
        );
    }

    #[test]
    fn test_match_tie_goes_to_first_right_box() {
        let left = vec![det(10., 0., 20., 10., Label::Caption)];
        // equidistant on either side of the left box
        let right = vec![
            det(0., 0., 10., 10., Label::Caption),
            det(20., 0., 30., 10., Label::Caption),
        ];

        let matches = BoxMatcher::new(100.0).match_boxes(&left, &right);
        assert_eq!(matches[&Label::Caption][0].right, 0);
    }

    #[test]
    fn test_match_one_sided_and_empty_classes() {
        let left = vec![det(0., 0., 10., 10., Label::Table)];
        let right = vec![det(0., 0., 10., 10., Label::Formula)];

        let matches = BoxMatcher::default().match_boxes(&left, &right);
        assert!(matches.is_empty());

        assert!(BoxMatcher::default().match_boxes(&[], &right).is_empty());
        assert!(BoxMatcher::default().match_boxes(&left, &[]).is_empty());
    }

    #[test]
    fn test_match_is_deterministic() {
        let left = (0..6)
            .map(|i| det(0., i as f32 * 15., 10., i as f32 * 15. + 10., Label::Text))
            .collect::<Vec<_>>();
        let right = (0..6)
            .rev()
            .map(|i| det(3., i as f32 * 15. + 2., 13., i as f32 * 15. + 12., Label::Text))
            .collect::<Vec<_>>();

        let matcher = BoxMatcher::new(30.0);
        let first = matcher.match_boxes(&left, &right);
        let second = matcher.match_boxes(&left, &right);
        assert_eq!(first, second);

        for pair in &first[&Label::Text] {
            assert!(pair.distance <= 30.0);
        }
    }
}
