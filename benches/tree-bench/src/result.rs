/// Token preceding the throughput on a result line of the executable
pub const THROUGHPUT_MARKER: &str = "MOPS: ";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TreeBenchMetrics {
    /// One entry per line carrying a readable throughput, in output order
    pub throughputs: Vec<f64>,
    /// Lines carrying the marker but no readable number
    pub malformed: Vec<String>,
}

pub fn parse_output(output: &str) -> TreeBenchMetrics {
    let mut metrics = TreeBenchMetrics::default();

    for line in output.lines() {
        let Some((_, value)) = line.split_once(THROUGHPUT_MARKER) else {
            continue;
        };
        match value.trim().parse::<f64>() {
            // a record line only carries unsigned decimals
            Ok(mops) if mops.is_finite() && mops.is_sign_positive() => {
                metrics.throughputs.push(mops)
            }
            _ => metrics.malformed.push(line.to_owned()),
        }
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrapes_throughput_line() {
        let output = "\
Tree size:1000
THREADS:4
L:10
I:80
R:10
SEED:1996
THREADS: 4 I: 80 R: 10 L: 10 MOPS: 14.5833
===============================================
All tests passed (12 assertions in 1 test case)
";
        assert_eq!(parse_output(output).throughputs, [14.5833]);
    }

    #[test]
    fn output_without_marker_yields_nothing() {
        let metrics = parse_output("Tree size:1000\nTHREADS:4\n");
        assert!(metrics.throughputs.is_empty());
        assert!(metrics.malformed.is_empty());
    }

    #[test]
    fn unreadable_throughput_is_reported() {
        let metrics = parse_output("MOPS: fast\nMOPS: 2\nMOPS: inf\n");
        assert_eq!(metrics.throughputs, [2.0]);
        assert_eq!(metrics.malformed, ["MOPS: fast", "MOPS: inf"]);
    }

    #[test]
    fn negative_throughput_is_reported() {
        let metrics = parse_output("MOPS: -2.5\nMOPS: -0.0\nMOPS: 0.0\n");
        assert_eq!(metrics.throughputs, [0.0]);
        assert_eq!(metrics.malformed, ["MOPS: -2.5", "MOPS: -0.0"]);
    }
}
