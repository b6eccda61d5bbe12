//! Job-selector argument grammar (§6): `<start>-<end>` inclusive ranges,
//! `<a>;<b>;...` unions, and multiple arguments, all 1-based. Invalid or
//! out-of-range tokens are silently skipped.

/// Parses job selector arguments into a deduplicated, sorted list of
/// 1-based job indices bounded by `job_count`.
pub fn parse_job_selectors(args: &[String], job_count: usize) -> Vec<usize> {
    let mut selected = Vec::new();

    for arg in args {
        for token in arg.split(';') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            for index in parse_token(token, job_count) {
                if !selected.contains(&index) {
                    selected.push(index);
                }
            }
        }
    }

    selected.sort_unstable();
    selected
}

fn parse_token(token: &str, job_count: usize) -> Vec<usize> {
    if let Some((start, end)) = token.split_once('-') {
        let (Ok(start), Ok(end)) = (start.trim().parse::<usize>(), end.trim().parse::<usize>()) else {
            return Vec::new();
        };
        if start == 0 || end == 0 || start > end {
            return Vec::new();
        }
        (start..=end).filter(|i| *i >= 1 && *i <= job_count).collect()
    } else {
        match token.parse::<usize>() {
            Ok(index) if index >= 1 && index <= job_count => vec![index],
            _ => Vec::new(),
        }
    }
}
