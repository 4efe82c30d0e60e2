//! Property tests for the sparse sampler and candidate elimination.

use std::io::Cursor;

use proptest::prelude::*;
use typeprobe::{
    sample, ConverterList, ErrorPolicy, SampleBound, SampleStrategy, SamplerConfig,
    TypeCandidateSet,
};

fn numbered_file(lines: usize, width: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for i in 0..lines {
        data.extend_from_slice(format!("{:0width$}\n", i, width = width).as_bytes());
    }
    data
}

fn sampled_lines(data: Vec<u8>, max_rows: usize) -> (Vec<usize>, SampleStrategy) {
    let config = SamplerConfig {
        skip_header: false,
        bound: SampleBound::Rows(max_rows),
        error_policy: ErrorPolicy::Propagate,
    };
    let mut seen = Vec::new();
    let report = sample(&mut Cursor::new(data), &config, |line| {
        let text = std::str::from_utf8(line).unwrap();
        seen.push(text.parse::<usize>().unwrap());
        Ok(())
    })
    .unwrap();
    assert_eq!(report.lines, seen.len());
    (seen, report.strategy)
}

/// A sparse sample starts at the first line, ends at the last one and never
/// goes backward or repeats a line.
#[test]
fn test_sparse_sample_covers_whole_file() {
    let (seen, strategy) = sampled_lines(numbered_file(10_000, 6), 200);
    assert_eq!(strategy, SampleStrategy::Sparse);
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&9_999));
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert!(seen.len() <= 200);
    // Spread over the middle, not clustered in the head block
    assert!(seen.iter().any(|&i| (4_000..6_000).contains(&i)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_sample_is_ordered_and_bounded(
        lines in 1usize..3_000,
        width in 1usize..12,
        max_rows in 1usize..400,
    ) {
        let (seen, _) = sampled_lines(numbered_file(lines, width), max_rows);
        prop_assert!(!seen.is_empty());
        // Bounds below 5 still read a four-line head block and the tail
        prop_assert!(seen.len() <= max_rows.max(5));
        prop_assert_eq!(seen[0], 0);
        prop_assert!(seen.windows(2).all(|w| w[0] < w[1]), "not ordered: {:?}", seen);
        prop_assert!(seen.iter().all(|&i| i < lines));
        prop_assert_eq!(*seen.last().unwrap(), lines - 1);
    }

    /// Observing more values never brings a converter back.
    #[test]
    fn test_elimination_is_monotone(values in prop::collection::vec(
        prop_oneof![
            "-?[0-9]{1,6}",
            "-?[0-9]{1,4}\\.[0-9]{1,3}",
            "20[0-2][0-9]-0[1-9]-1[0-9] 1[0-9]:[0-5][0-9]:[0-5][0-9]",
            "20[0-2][0-9]-0[1-9]-1[0-9] 1[0-9]:[0-5][0-9]:[0-5][0-9]\\.[0-9]{1,6}",
            "[a-z]{1,8}",
            Just("NULL".to_string()),
            Just(String::new()),
        ],
        0..40,
    )) {
        let mut set = TypeCandidateSet::with_converters("col", ConverterList::builtin());
        let mut previous: Vec<String> = set.candidate_names().into_iter().map(String::from).collect();

        for value in &values {
            set.observe(value);
            let current: Vec<String> = set.candidate_names().into_iter().map(String::from).collect();
            prop_assert!(
                current.iter().all(|name| previous.contains(name)),
                "{:?} is not a subset of {:?}",
                current,
                previous
            );
            previous = current;
        }

        // The chosen converter accepts everything it was shown
        if let Ok(best) = set.best() {
            for value in &values {
                prop_assert!(best.converter.convert(value).is_ok(), "rejected {:?}", value);
            }
        }
    }
}
