use super::CheckError;

/// Field delimiter in checker output: `file:line:col: CODE description`.
const DELIMITER: char = ':';

/// A single style problem reported by the checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub filename: String,
    pub line: usize,
    pub col: usize,
    pub code: String,
    pub description: String,
}

impl Violation {
    /// Review comment body, linking the rule code to its documentation.
    /// `rule_url` may contain `{code}`.
    pub fn comment_body(&self, rule_url: &str) -> String {
        format!(
            "At column {}: [({}) {}]({})",
            self.col,
            self.code,
            self.description,
            rule_url.replace("{code}", &self.code)
        )
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Line {}, col {}: [{}] {}",
            self.line, self.col, self.code, self.description
        )
    }
}

/// Parse checker output for `filename` into violations, in output order.
///
/// Blank output means no problems. Any line that doesn't have the
/// `file:line:col: CODE description` shape fails the whole parse.
pub fn parse_output(output: &str, filename: &str) -> Result<Vec<Violation>, CheckError> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_line(line, filename))
        .collect()
}

fn parse_line(line: &str, filename: &str) -> Result<Violation, CheckError> {
    let malformed = |reason: &str| CheckError::MalformedOutput {
        line: line.to_string(),
        reason: reason.to_string(),
    };

    let fields: Vec<&str> = line.splitn(4, DELIMITER).collect();
    let &[_, line_no, col, remainder] = fields.as_slice() else {
        return Err(malformed("expected 4 ':'-separated fields"));
    };

    let line_no = parse_number(line_no).ok_or_else(|| malformed("line is not a positive integer"))?;
    let col = parse_number(col).ok_or_else(|| malformed("column is not a positive integer"))?;

    let remainder = remainder.trim();
    let (code, description) = remainder.split_once(' ').unwrap_or((remainder, ""));
    if code.is_empty() {
        return Err(malformed("missing violation code"));
    }

    Ok(Violation {
        filename: filename.to_string(),
        line: line_no,
        col,
        code: code.to_string(),
        description: description.trim_start().to_string(),
    })
}

fn parse_number(field: &str) -> Option<usize> {
    field.trim().parse::<usize>().ok().filter(|n| *n > 0)
}
