use std::path::Path;

use super::{CompileMessage, Severity, ShaderFragment};

/// Pieces of a `path(line, colStart-colEnd): message` diagnostic, already
/// converted to 0-based lines and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDiagnostic<'a> {
    pub path: &'a str,
    pub line: u32,
    pub columns: Option<(u32, u32)>,
    pub text: &'a str,
}

/// Parses one diagnostic line. Returns `None` when the line has no bracketed
/// location or any of its numbers fail to convert.
pub fn parse_diagnostic_line(line: &str) -> Option<ParsedDiagnostic<'_>> {
    let open = line.find('(')?;
    let close = open + line[open..].find(')')?;

    let path = line[..open].trim();
    let text = line[close + 1..]
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | ':'));

    let mut numbers = line[open + 1..close].split(',');
    let line_no = zero_based(numbers.next()?)?;
    let columns = match numbers.next() {
        Some(columns) => {
            let mut bounds = columns.splitn(2, '-');
            let start = zero_based(bounds.next()?)?;
            let end = match bounds.next() {
                Some(end) => end.trim().parse::<u32>().ok()?,
                None => start.checked_add(1)?,
            };
            Some((start, end))
        }
        None => None,
    };

    Some(ParsedDiagnostic {
        path,
        line: line_no,
        columns,
        text,
    })
}

/// Converts a 1-based number to 0-based, flooring at zero. Values outside
/// the `i32` range are rejected.
fn zero_based(text: &str) -> Option<u32> {
    let value = text.trim().parse::<i32>().ok()?;
    u32::try_from(value.max(1) - 1).ok()
}

fn severity_of(text: &str) -> Severity {
    let lower = text.trim_start().to_ascii_lowercase();
    if lower.starts_with("warning") {
        Severity::Warning
    } else if lower.starts_with("info") || lower.starts_with("note") {
        Severity::Info
    } else {
        Severity::Error
    }
}

/// Splits a backend info log into messages attributed to `origin`.
///
/// Lines that do not parse become a single error carrying the raw text at
/// line 0; they never stop the remaining lines from being parsed.
pub fn parse_diagnostics(origin: &Path, log: &str) -> Vec<CompileMessage> {
    log.lines()
        .map(|line| line.trim_end_matches(['\r', '\0']))
        .filter(|line| !line.trim().is_empty())
        .map(|raw| match parse_diagnostic_line(raw) {
            Some(parsed) => CompileMessage {
                raw_text: raw.to_owned(),
                text: parsed.text.to_owned(),
                path: origin.to_path_buf(),
                line: parsed.line,
                fragment_index: 0,
                columns: parsed.columns,
                severity: severity_of(parsed.text),
            },
            None => CompileMessage {
                raw_text: raw.to_owned(),
                text: raw.to_owned(),
                path: origin.to_path_buf(),
                line: 0,
                fragment_index: 0,
                columns: None,
                severity: Severity::Error,
            },
        })
        .collect()
}

/// Prefix sums of fragment newline counts, used to turn a line in the
/// concatenated compile unit into a fragment index and local line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentLineMap {
    ends: Vec<u32>,
}

impl FragmentLineMap {
    pub fn new(fragments: &[ShaderFragment]) -> Self {
        Self::from_line_counts(fragments.iter().map(ShaderFragment::newline_count))
    }

    pub fn from_line_counts(counts: impl IntoIterator<Item = u32>) -> Self {
        let ends = counts
            .into_iter()
            .scan(0u32, |total, count| {
                *total += count;
                Some(*total)
            })
            .collect();
        Self { ends }
    }

    pub fn len(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// First line of fragment `index` within the compile unit.
    pub fn offset(&self, index: usize) -> u32 {
        match index {
            0 => 0,
            _ => self.ends.get(index - 1).copied().unwrap_or_else(|| self.total()),
        }
    }

    fn total(&self) -> u32 {
        self.ends.last().copied().unwrap_or(0)
    }

    /// Returns `(fragment index, local line)` for a 0-based unit line. Lines
    /// after the final newline belong to the last fragment.
    pub fn locate(&self, line: u32) -> (usize, u32) {
        let index = match self.ends.iter().position(|end| line < *end) {
            Some(index) => index,
            None if self.ends.is_empty() => return (0, line),
            None => self.ends.len() - 1,
        };
        (index, line - self.offset(index))
    }

    pub fn remap(&self, message: &mut CompileMessage) {
        let (index, line) = self.locate(message.line);
        message.fragment_index = index;
        message.line = line;
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn parses_line_and_column_range() {
        let parsed = parse_diagnostic_line("shader.frag(12, 5-9): error: bad token").unwrap();
        assert_eq!(parsed.path, "shader.frag");
        assert_eq!(parsed.line, 11);
        assert_eq!(parsed.columns, Some((4, 9)));
        assert_eq!(parsed.text, "error: bad token");
    }

    #[test]
    fn single_column_gets_width_of_one() {
        let parsed = parse_diagnostic_line("0(3, 7) : error C0000: syntax error").unwrap();
        assert_eq!(parsed.line, 2);
        assert_eq!(parsed.columns, Some((6, 7)));
        assert_eq!(parsed.text, "error C0000: syntax error");
    }

    #[test]
    fn line_only_and_floor_at_zero() {
        let parsed = parse_diagnostic_line("0(0) : warning C7022: unrecognized profile").unwrap();
        assert_eq!(parsed.line, 0);
        assert_eq!(parsed.columns, None);
        assert_eq!(severity_of(parsed.text), Severity::Warning);
    }

    #[test]
    fn conversion_failures_do_not_parse() {
        assert!(parse_diagnostic_line("no location here").is_none());
        assert!(parse_diagnostic_line("fx(twelve): error").is_none());
        assert!(parse_diagnostic_line("fx(1, a-b): error").is_none());
        assert!(parse_diagnostic_line("fx(1: unterminated").is_none());
    }

    #[test]
    fn out_of_range_numbers_do_not_parse() {
        assert!(parse_diagnostic_line("0(1, 4294967296) : error: x").is_none());
        assert!(parse_diagnostic_line("0(-9223372036854775808) : error: x").is_none());
        assert!(parse_diagnostic_line("0(4294967300) : error: x").is_none());
        assert!(parse_diagnostic_line("fx(1, 99999999999): error").is_none());
        assert!(parse_diagnostic_line("fx(1, 3--2): error").is_none());
        assert!(parse_diagnostic_line("fx(1, 3-99999999999): error").is_none());
    }

    #[test]
    fn negative_line_floors_at_zero() {
        let parsed = parse_diagnostic_line("fx(-4, 2147483647) : error: x").unwrap();
        assert_eq!(parsed.line, 0);
        assert_eq!(parsed.columns, Some((2147483646, 2147483647)));
    }

    #[test]
    fn overflowing_lines_fall_back_to_the_raw_text() {
        let log = "0(1, 4294967296) : error: x
0(4294967300) : error: y
0(2) : error: z
";
        let messages = parse_diagnostics(Path::new("fx.frag"), log);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].text, "0(1, 4294967296) : error: x");
        assert_eq!(messages[0].columns, None);
        assert_eq!(messages[1].text, "0(4294967300) : error: y");
        assert_eq!(messages[1].line, 0);
        assert_eq!(messages[2].line, 1);
    }

    #[test]
    fn bad_lines_fall_back_without_dropping_the_batch() {
        let log = "0(2) : error C0000: first\nsomething odd happened\n\n0(4, 1) : error C0001: second\n";
        let messages = parse_diagnostics(Path::new("fx.frag"), log);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].line, 1);
        assert_eq!(messages[1].text, "something odd happened");
        assert_eq!(messages[1].raw_text, "something odd happened");
        assert_eq!(messages[1].line, 0);
        assert_eq!(messages[1].severity, Severity::Error);
        assert_eq!(messages[2].text, "error C0001: second");
        assert!(messages
            .iter()
            .all(|message| message.path == PathBuf::from("fx.frag")));
    }

    #[test]
    fn remaps_cumulative_lines_to_fragments() {
        let counts = [3u32, 5, 2];
        let map = FragmentLineMap::from_line_counts(counts);

        for line in 0..10u32 {
            let (index, local) = map.locate(line);
            let expected_index = match line {
                0..=2 => 0,
                3..=7 => 1,
                _ => 2,
            };
            assert_eq!(index, expected_index, "line {line}");
            assert_eq!(local, line - map.offset(index), "line {line}");
        }
        assert_eq!(map.offset(2), 8);
    }

    #[test]
    fn lines_past_the_end_stay_with_the_last_fragment() {
        let map = FragmentLineMap::from_line_counts([2, 2]);
        assert_eq!(map.locate(4), (1, 2));
        assert_eq!(FragmentLineMap::default().locate(6), (0, 6));
    }

    #[test]
    fn empty_fragments_never_own_a_line() {
        let map = FragmentLineMap::from_line_counts([1, 0, 3]);
        assert_eq!(map.locate(0), (0, 0));
        assert_eq!(map.locate(1), (2, 0));
    }
}
